//! Fixture compilation.
//!
//! The corpus is compiled with the host C compiler as an external
//! collaborator. Fixtures intentionally omit headers and trip warnings, so
//! they are built as permissive gnu89 with diagnostics suppressed; a
//! fixture that still fails to build is an inconclusive scenario, never a
//! batch abort.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// A fixture failed to build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The compiler itself could not be launched.
    #[error("failed to launch compiler '{compiler}': {source}")]
    Launch {
        compiler: String,
        #[source]
        source: std::io::Error,
    },
    /// The compiler ran and rejected the fixture.
    #[error("compiling {source_path} failed: {diagnostics}")]
    Rejected {
        source_path: String,
        diagnostics: String,
    },
}

/// Compile one C fixture into `out_dir/fixture` and return the binary path.
pub fn compile_fixture(
    compiler: &str,
    source: &Path,
    out_dir: &Path,
) -> Result<PathBuf, BuildError> {
    let binary = out_dir.join("fixture");
    let output = Command::new(compiler)
        .arg("-std=gnu89")
        .arg("-w")
        .arg("-o")
        .arg(&binary)
        .arg(source)
        .output()
        .map_err(|err| BuildError::Launch {
            compiler: compiler.to_string(),
            source: err,
        })?;

    if !output.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostics.is_empty() {
            diagnostics = format!("compiler exited with {}", output.status);
        }
        return Err(BuildError::Rejected {
            source_path: source.display().to_string(),
            diagnostics,
        });
    }
    Ok(binary)
}
