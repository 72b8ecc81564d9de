//! Corpus discovery and catalog validation.
//!
//! The loader only reads files; it never executes fixture code. Every
//! validation failure is a fatal [`CatalogError`]: a corpus with a broken
//! label cannot produce trustworthy verdicts, so nothing runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sha2::Digest;
use thiserror::Error;

use crate::catalog::{AnnotationRecord, Catalog, ExpectedBehavior, Scenario};

/// Fatal load-time failure; aborts the run before any scenario executes.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus root {0} contains no C fixtures")]
    EmptyCorpus(String),
    #[error("fixture {path} has no annotation sidecar (expected {sidecar})")]
    MissingAnnotation { path: String, sidecar: String },
    #[error("malformed annotation {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate scenario id '{0}'")]
    DuplicateId(String),
    #[error("scenario '{id}': finding line {line} out of range (source has {source_lines} lines)")]
    LineOutOfRange {
        id: String,
        line: u32,
        source_lines: u32,
    },
    #[error("scenario '{id}': crash-expected with zero expected findings")]
    CrashWithoutCause { id: String },
    #[error("scenario '{id}': unknown signal name '{signal}'")]
    UnknownSignal { id: String, signal: String },
}

/// Load and validate the corpus under `root` into a [`Catalog`].
///
/// Fixtures are the `*.c` files directly under the root, each with a
/// co-located `<stem>.expect.json` sidecar. Discovery order is sorted so
/// repeated loads of an unchanged corpus are identical.
pub fn load_catalog(root: &Path) -> Result<Catalog, CatalogError> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|err| CatalogError::Io {
            path: root.display().to_string(),
            source: err,
        })?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("c"))
        .collect();
    sources.sort();

    if sources.is_empty() {
        return Err(CatalogError::EmptyCorpus(root.display().to_string()));
    }

    let mut seen_ids = BTreeSet::new();
    let mut scenarios = Vec::with_capacity(sources.len());
    for source in sources {
        let scenario = load_scenario(&source)?;
        if !seen_ids.insert(scenario.id.clone()) {
            return Err(CatalogError::DuplicateId(scenario.id));
        }
        scenarios.push(scenario);
    }
    scenarios.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Catalog { scenarios })
}

fn load_scenario(source: &Path) -> Result<Scenario, CatalogError> {
    let sidecar = source.with_extension("expect.json");
    if !sidecar.is_file() {
        return Err(CatalogError::MissingAnnotation {
            path: source.display().to_string(),
            sidecar: sidecar.display().to_string(),
        });
    }

    let bytes = std::fs::read(source).map_err(|err| CatalogError::Io {
        path: source.display().to_string(),
        source: err,
    })?;
    let source_lines = count_lines(&bytes);
    let source_sha256 = hex_lower(&sha2::Sha256::digest(&bytes));

    let body = std::fs::read_to_string(&sidecar).map_err(|err| CatalogError::Io {
        path: sidecar.display().to_string(),
        source: err,
    })?;
    let record: AnnotationRecord =
        serde_json::from_str(&body).map_err(|err| CatalogError::Malformed {
            path: sidecar.display().to_string(),
            source: err,
        })?;

    let id = record.id.clone().unwrap_or_else(|| {
        source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    for finding in &record.expected_findings {
        if finding.line == 0 || finding.line > source_lines {
            return Err(CatalogError::LineOutOfRange {
                id,
                line: finding.line,
                source_lines,
            });
        }
    }
    if record.expected_behavior == ExpectedBehavior::CrashExpected
        && record.expected_findings.is_empty()
    {
        // A crash needs an attributable cause.
        return Err(CatalogError::CrashWithoutCause { id });
    }
    if let Some(signal) = &record.deliver_signal
        && defectbench_exec::signal_by_name(signal).is_none()
    {
        return Err(CatalogError::UnknownSignal {
            id,
            signal: signal.clone(),
        });
    }

    let source_path = source.canonicalize().map_err(|err| CatalogError::Io {
        path: source.display().to_string(),
        source: err,
    })?;

    Ok(Scenario {
        id,
        source_path,
        source_lines,
        source_sha256,
        category: record.category,
        expected_findings: record.expected_findings,
        expected_behavior: record.expected_behavior,
        deliver_signal: record.deliver_signal,
        accepted_outcomes: record.accepted_outcomes,
    })
}

/// Write a scenario's canonical annotation to `path` (pretty JSON).
pub fn write_annotation(scenario: &Scenario, path: &Path) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(&scenario.annotation())
        .map_err(std::io::Error::other)?;
    std::fs::write(path, body)
}

fn count_lines(bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return 0;
    }
    let mut lines = bytes.iter().filter(|b| **b == b'\n').count();
    if bytes.last() != Some(&b'\n') {
        lines += 1;
    }
    lines as u32
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(&mut out, "{b:02x}").expect("writing to String should not fail");
    }
    out
}
