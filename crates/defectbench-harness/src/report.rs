//! Report generation.
//!
//! Reports are sorted by scenario id before emission so repeated runs
//! against an unchanged candidate produce byte-identical output modulo
//! the timestamp.

use serde::{Deserialize, Serialize};

use crate::catalog::{DefectCategory, Scenario, Severity};
use crate::matcher::Verdict;
use crate::runner::Observation;
use crate::score::ScoreSummary;

/// Whether a scenario produced a verdict at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioStatus {
    Scored,
    /// The fixture failed to build; nothing to score.
    Inconclusive,
}

/// Per-scenario line of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub id: String,
    pub category: DefectCategory,
    pub status: ScenarioStatus,
    /// Exit label of the fixture run (`exit:0`, `signal:11`, `timeout`).
    pub exit: String,
    pub crash_consistent: bool,
    pub matched: usize,
    pub missed: usize,
    pub missed_definite: usize,
    /// Source lines of missed findings, for triage.
    pub missed_lines: Vec<u32>,
    pub spurious: usize,
    pub spurious_lines: Vec<u32>,
    pub unexercised: usize,
    pub duration_ms: u64,
    /// Digest of the exact source bytes this verdict applies to.
    pub source_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ScenarioReport {
    /// Build a scored report line from a verdict.
    #[must_use]
    pub fn scored(scenario: &Scenario, observation: &Observation, verdict: &Verdict) -> Self {
        Self {
            id: scenario.id.clone(),
            category: scenario.category,
            status: ScenarioStatus::Scored,
            exit: observation.exit.label(),
            crash_consistent: verdict.crash_consistent,
            matched: verdict.matched.len(),
            missed: verdict.missed.len(),
            missed_definite: verdict
                .missed
                .iter()
                .filter(|f| f.severity == Severity::Definite)
                .count(),
            missed_lines: verdict.missed.iter().map(|f| f.line).collect(),
            spurious: verdict.spurious.len(),
            spurious_lines: verdict.spurious.iter().map(|r| r.line).collect(),
            unexercised: verdict.unexercised.len(),
            duration_ms: observation.duration_ms,
            source_sha256: scenario.source_sha256.clone(),
            note: observation
                .detector_failed
                .then(|| String::from("detector failed to launch")),
        }
    }

    /// Build an inconclusive report line (build failure).
    #[must_use]
    pub fn inconclusive(scenario: &Scenario, note: String) -> Self {
        Self {
            id: scenario.id.clone(),
            category: scenario.category,
            status: ScenarioStatus::Inconclusive,
            exit: String::new(),
            crash_consistent: false,
            matched: 0,
            missed: 0,
            missed_definite: 0,
            missed_lines: Vec::new(),
            spurious: 0,
            spurious_lines: Vec::new(),
            unexercised: 0,
            duration_ms: 0,
            source_sha256: scenario.source_sha256.clone(),
            note: Some(note),
        }
    }
}

/// The full benchmark report: summary metrics plus per-scenario lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub title: String,
    pub corpus_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    pub timestamp: String,
    pub summary: ScoreSummary,
    pub scenarios: Vec<ScenarioReport>,
}

impl BenchReport {
    /// Assemble a report from sorted scenario lines.
    #[must_use]
    pub fn new(
        corpus_root: String,
        detector: Option<String>,
        timestamp: String,
        scenarios: Vec<ScenarioReport>,
    ) -> Self {
        let summary = ScoreSummary::from_reports(&scenarios);
        Self {
            title: String::from("defectbench report"),
            corpus_root,
            detector,
            timestamp,
            summary,
            scenarios,
        }
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Corpus: {}\n", self.corpus_root));
        if let Some(detector) = &self.detector {
            out.push_str(&format!("- Detector: {detector}\n"));
        }
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Scenarios: {}\n", self.summary.scenarios));
        out.push_str(&format!("- Scored: {}\n", self.summary.scored));
        out.push_str(&format!(
            "- Inconclusive: {}\n",
            self.summary.inconclusive.len()
        ));
        out.push_str(&format!(
            "- Behaviorally inconsistent: {}\n",
            self.summary.inconsistent.len()
        ));
        out.push_str(&format!(
            "- Missed definite findings: {}\n\n",
            self.summary.missed_definite
        ));

        out.push_str("| Category | TP | FP | FN | Precision | Recall |\n");
        out.push_str("|----------|----|----|----|-----------|--------|\n");
        for (category, score) in &self.summary.per_category {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {:.2} | {:.2} |\n",
                category,
                score.true_positives,
                score.false_positives,
                score.false_negatives,
                score.precision(),
                score.recall()
            ));
        }
        out.push('\n');

        out.push_str("| Scenario | Category | Exit | Consistent | Matched | Missed | Spurious |\n");
        out.push_str("|----------|----------|------|------------|---------|--------|----------|\n");
        for line in &self.scenarios {
            let (exit, consistent) = match line.status {
                ScenarioStatus::Scored => (
                    line.exit.as_str(),
                    if line.crash_consistent { "yes" } else { "NO" },
                ),
                ScenarioStatus::Inconclusive => ("-", "inconclusive"),
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                line.id, line.category, exit, consistent, line.matched, line.missed, line.spurious
            ));
        }

        if !self.summary.inconsistent.is_empty() {
            out.push_str("\n## Inconsistent scenarios\n\n");
            for id in &self.summary.inconsistent {
                out.push_str(&format!("- {id}\n"));
            }
        }
        if !self.summary.inconclusive.is_empty() {
            out.push_str("\n## Inconclusive scenarios\n\n");
            for id in &self.summary.inconclusive {
                out.push_str(&format!("- {id}\n"));
            }
        }
        out
    }

    /// Render the report as pretty JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
