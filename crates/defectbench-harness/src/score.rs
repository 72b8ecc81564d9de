//! Aggregation of per-scenario reports into corpus-level metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::{ScenarioReport, ScenarioStatus};

/// Finding-level counters for one category (or the whole corpus).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl CategoryScore {
    /// TP/(TP+FP), 0 when the denominator is 0.
    #[must_use]
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP/(TP+FN), 0 when the denominator is 0.
    #[must_use]
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Corpus-level summary folded from sorted scenario reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub scenarios: usize,
    pub scored: usize,
    /// Scenario ids that failed to build (inconclusive).
    pub inconclusive: Vec<String>,
    /// Scenario ids with `crash_consistent == false` (behavioral
    /// regressions, independent of finding-level accuracy).
    pub inconsistent: Vec<String>,
    /// Missed findings with `definite` severity across the corpus; any
    /// nonzero value is a regression for the exit code.
    pub missed_definite: usize,
    /// Keyed by category wire name so serialization order is stable.
    pub per_category: BTreeMap<String, CategoryScore>,
    pub totals: CategoryScore,
}

impl ScoreSummary {
    /// Fold scenario reports into a summary.
    #[must_use]
    pub fn from_reports(reports: &[ScenarioReport]) -> Self {
        let mut per_category: BTreeMap<String, CategoryScore> = BTreeMap::new();
        let mut totals = CategoryScore::default();
        let mut inconclusive = Vec::new();
        let mut inconsistent = Vec::new();
        let mut missed_definite = 0;
        let mut scored = 0;

        for report in reports {
            match report.status {
                ScenarioStatus::Inconclusive => {
                    inconclusive.push(report.id.clone());
                    continue;
                }
                ScenarioStatus::Scored => scored += 1,
            }
            let entry = per_category
                .entry(report.category.as_str().to_string())
                .or_default();
            entry.true_positives += report.matched;
            entry.false_positives += report.spurious;
            entry.false_negatives += report.missed;
            totals.true_positives += report.matched;
            totals.false_positives += report.spurious;
            totals.false_negatives += report.missed;
            missed_definite += report.missed_definite;
            if !report.crash_consistent {
                inconsistent.push(report.id.clone());
            }
        }

        Self {
            scenarios: reports.len(),
            scored,
            inconclusive,
            inconsistent,
            missed_definite,
            per_category,
            totals,
        }
    }

    /// `0` all consistent and no missed definite findings; `1` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.inconsistent.is_empty() && self.missed_definite == 0 {
            0
        } else {
            1
        }
    }
}
