//! Catalog model: scenarios and their ground-truth annotations.
//!
//! A [`Scenario`] is constructed once at load time and is immutable
//! thereafter; workers share it read-only. The serde shapes here double as
//! the sidecar annotation wire format (`<fixture>.expect.json`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed defect taxonomy. One category per fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectCategory {
    UninitializedRead,
    DoubleFree,
    InvalidFree,
    IntegerOverflow,
    IntegerTruncation,
    UnsafeCopy,
    FormatString,
    CommandInjection,
    TaintedPath,
    SignalReentrancy,
    FileRace,
}

impl DefectCategory {
    /// Every category, in taxonomy order.
    pub const ALL: [DefectCategory; 11] = [
        DefectCategory::UninitializedRead,
        DefectCategory::DoubleFree,
        DefectCategory::InvalidFree,
        DefectCategory::IntegerOverflow,
        DefectCategory::IntegerTruncation,
        DefectCategory::UnsafeCopy,
        DefectCategory::FormatString,
        DefectCategory::CommandInjection,
        DefectCategory::TaintedPath,
        DefectCategory::SignalReentrancy,
        DefectCategory::FileRace,
    ];

    /// Kebab-case wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectCategory::UninitializedRead => "uninitialized-read",
            DefectCategory::DoubleFree => "double-free",
            DefectCategory::InvalidFree => "invalid-free",
            DefectCategory::IntegerOverflow => "integer-overflow",
            DefectCategory::IntegerTruncation => "integer-truncation",
            DefectCategory::UnsafeCopy => "unsafe-copy",
            DefectCategory::FormatString => "format-string",
            DefectCategory::CommandInjection => "command-injection",
            DefectCategory::TaintedPath => "tainted-path",
            DefectCategory::SignalReentrancy => "signal-reentrancy",
            DefectCategory::FileRace => "file-race",
        }
    }
}

impl fmt::Display for DefectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefectCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DefectCategory::ALL
            .iter()
            .copied()
            .find(|cat| cat.as_str() == s)
            .ok_or_else(|| format!("unknown defect category '{s}'"))
    }
}

/// Declared acceptable termination class for a correct run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedBehavior {
    /// A correct run terminates on an uncaught signal.
    CrashExpected,
    /// A correct run may exit normally or hang until the timeout.
    HangPossible,
    /// A correct run exits normally (the defect is guarded at runtime).
    BenignIfGuarded,
    /// Behavior legitimately varies between runs (uninitialized reads,
    /// signal races); judged against the declared acceptable set.
    UndefinedNondeterministic,
}

/// Whether a defect always manifests or only under specific inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Definite,
    Conditional,
}

/// Coarse termination class used for nondeterministic behavior sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BehaviorClass {
    Exit,
    Signal,
    Timeout,
}

/// One ground-truth finding: the defect sink, not the root cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFinding {
    /// 1-based source line of the sink (e.g. the `free` call, not the
    /// allocation).
    pub line: u32,
    /// Defect subtype within the scenario category (free-form, e.g.
    /// `missing-format-arg`).
    pub kind: String,
    pub severity: Severity,
    /// Stdout marker proving the triggering branch ran. When set on a
    /// `conditional` finding and absent from captured stdout, the finding
    /// is excluded from false-negative counting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

/// Sidecar annotation record, co-located with each fixture as
/// `<stem>.expect.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationRecord {
    /// Scenario id; defaults to the fixture file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub category: DefectCategory,
    pub expected_behavior: ExpectedBehavior,
    #[serde(default)]
    pub expected_findings: Vec<ExpectedFinding>,
    /// Signal the runner delivers mid-run (handler fixtures), by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_signal: Option<String>,
    /// Acceptable behavior set for `undefined-nondeterministic` scenarios;
    /// absent means all of exit/signal/timeout are acceptable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_outcomes: Option<Vec<BehaviorClass>>,
}

/// One fixture plus its ground truth. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub id: String,
    pub source_path: PathBuf,
    /// Line count of the source at load time; bounds finding validation
    /// and scopes spurious findings.
    pub source_lines: u32,
    /// SHA-256 of the source bytes, tying reports to exact corpus content.
    pub source_sha256: String,
    pub category: DefectCategory,
    pub expected_findings: Vec<ExpectedFinding>,
    pub expected_behavior: ExpectedBehavior,
    pub deliver_signal: Option<String>,
    pub accepted_outcomes: Option<Vec<BehaviorClass>>,
}

impl Scenario {
    /// Canonical annotation record for this scenario (id always present).
    /// Writing it back and reloading yields an identical scenario.
    #[must_use]
    pub fn annotation(&self) -> AnnotationRecord {
        AnnotationRecord {
            id: Some(self.id.clone()),
            category: self.category,
            expected_behavior: self.expected_behavior,
            expected_findings: self.expected_findings.clone(),
            deliver_signal: self.deliver_signal.clone(),
            accepted_outcomes: self.accepted_outcomes.clone(),
        }
    }
}

/// Validated, deduplicated scenario collection, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub scenarios: Vec<Scenario>,
}

impl Catalog {
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Keep only scenarios of one category (CLI `--filter`).
    #[must_use]
    pub fn filtered(mut self, category: DefectCategory) -> Catalog {
        self.scenarios.retain(|s| s.category == category);
        self
    }
}
