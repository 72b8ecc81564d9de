//! Oracle matcher: reconcile an observation against ground truth.
//!
//! Pure and deterministic: given the same (scenario, observation, policy)
//! the verdict is identical, regardless of the order the detector emitted
//! its findings in.

use std::collections::BTreeSet;

use defectbench_exec::ExitKind;
use thiserror::Error;

use crate::catalog::{BehaviorClass, DefectCategory, ExpectedBehavior, ExpectedFinding, Scenario, Severity};
use crate::runner::{Observation, ReportedFinding};

/// Matching rules; tolerances exist because detectors commonly report the
/// allocation site instead of the free site (or vice versa) for the same
/// logical defect.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Maximum |reported line - expected line| for a match.
    pub tolerance: u32,
    /// Whether an `undefined-nondeterministic` scenario that only ever
    /// exited normally counts as consistent.
    pub nondet_normal_exit_ok: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tolerance: 0,
            nondet_normal_exit_ok: true,
        }
    }
}

/// A defensive post-load invariant failed; a bug in the catalog, fatal to
/// the batch rather than a scenario failure.
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error(
        "scenario '{id}': expected finding line {line} out of range (source has {source_lines} lines)"
    )]
    FindingLineOutOfRange {
        id: String,
        line: u32,
        source_lines: u32,
    },
}

/// Per-scenario reconciliation of expected vs reported findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Expected findings corroborated by a report (true positives).
    pub matched: Vec<ExpectedFinding>,
    /// Expected findings with no corroborating report (false negatives).
    pub missed: Vec<ExpectedFinding>,
    /// Conditional findings whose triggering branch did not run, per the
    /// stdout marker; excluded from false-negative counting.
    pub unexercised: Vec<ExpectedFinding>,
    /// Reports with no corresponding expected finding (false positives),
    /// scoped to lines inside the scenario source.
    pub spurious: Vec<ReportedFinding>,
    /// Observed termination is compatible with the declared behavior.
    pub crash_consistent: bool,
}

/// Reconcile one observation against one scenario.
pub fn match_observation(
    scenario: &Scenario,
    observation: &Observation,
    policy: &MatchPolicy,
) -> Result<Verdict, MatchError> {
    for finding in &scenario.expected_findings {
        if finding.line == 0 || finding.line > scenario.source_lines {
            return Err(MatchError::FindingLineOutOfRange {
                id: scenario.id.clone(),
                line: finding.line,
                source_lines: scenario.source_lines,
            });
        }
    }

    // Reports outside the source are dropped before matching; sorting makes
    // the verdict independent of detector emission order.
    let mut reports: Vec<&ReportedFinding> = observation
        .reported
        .iter()
        .filter(|r| r.line >= 1 && r.line <= scenario.source_lines)
        .collect();
    reports.sort_by(|a, b| {
        a.line
            .cmp(&b.line)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.message.cmp(&b.message))
    });

    let mut corroborated = vec![false; scenario.expected_findings.len()];
    let mut spurious = Vec::new();
    for report in reports {
        if !category_compatible(report, scenario.category) {
            spurious.push(report.clone());
            continue;
        }
        // One report corroborates at most one expected finding; nearest
        // line wins, ties go to the first-declared expected finding.
        let mut best: Option<usize> = None;
        for (index, expected) in scenario.expected_findings.iter().enumerate() {
            if corroborated[index] {
                continue;
            }
            let distance = report.line.abs_diff(expected.line);
            if distance > policy.tolerance {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => {
                    distance < report.line.abs_diff(scenario.expected_findings[current].line)
                }
            };
            if better {
                best = Some(index);
            }
        }
        match best {
            Some(index) => corroborated[index] = true,
            None => spurious.push(report.clone()),
        }
    }

    let stdout = String::from_utf8_lossy(&observation.stdout);
    let mut matched = Vec::new();
    let mut missed = Vec::new();
    let mut unexercised = Vec::new();
    for (index, expected) in scenario.expected_findings.iter().enumerate() {
        if corroborated[index] {
            matched.push(expected.clone());
        } else if branch_not_taken(expected, &stdout) {
            unexercised.push(expected.clone());
        } else {
            missed.push(expected.clone());
        }
    }

    Ok(Verdict {
        matched,
        missed,
        unexercised,
        spurious,
        crash_consistent: crash_consistent(scenario, observation, policy),
    })
}

fn category_compatible(report: &ReportedFinding, category: DefectCategory) -> bool {
    match report.category.as_deref() {
        None => true,
        // A guess that does not parse as a known category never matches;
        // garbage categories must not corroborate anything.
        Some(guess) => guess.parse::<DefectCategory>() == Ok(category),
    }
}

/// Best-effort branch-taken check: a conditional finding with a marker the
/// fixture never printed did not execute its triggering branch.
fn branch_not_taken(expected: &ExpectedFinding, stdout: &str) -> bool {
    expected.severity == Severity::Conditional
        && expected
            .marker
            .as_deref()
            .is_some_and(|marker| !stdout.contains(marker))
}

fn crash_consistent(scenario: &Scenario, observation: &Observation, policy: &MatchPolicy) -> bool {
    match scenario.expected_behavior {
        ExpectedBehavior::CrashExpected => matches!(observation.exit, ExitKind::Signaled(_)),
        ExpectedBehavior::BenignIfGuarded => matches!(observation.exit, ExitKind::Exited(_)),
        ExpectedBehavior::HangPossible => {
            matches!(observation.exit, ExitKind::Exited(_) | ExitKind::TimedOut)
        }
        ExpectedBehavior::UndefinedNondeterministic => {
            if observation.behavior_set.is_empty() {
                return false;
            }
            let accepted: BTreeSet<BehaviorClass> = scenario
                .accepted_outcomes
                .clone()
                .map(BTreeSet::from_iter)
                .unwrap_or_else(|| {
                    BTreeSet::from([
                        BehaviorClass::Exit,
                        BehaviorClass::Signal,
                        BehaviorClass::Timeout,
                    ])
                });
            if !observation.behavior_set.is_subset(&accepted) {
                return false;
            }
            if !policy.nondet_normal_exit_ok
                && observation.behavior_set.iter().all(|b| *b == BehaviorClass::Exit)
            {
                return false;
            }
            true
        }
    }
}
