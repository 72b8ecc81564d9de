//! Scenario execution engine.
//!
//! For each catalog entry: compile the fixture into a scratch directory,
//! run it (N times for nondeterministic scenarios) under the resource
//! envelope, optionally invoke the candidate detector against the source,
//! and hand the resulting [`Observation`] to the matcher. Per-scenario
//! failures never abort the batch; compile failures become inconclusive
//! scenario reports.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use defectbench_exec::{
    CancelToken, ExecRequest, ExitKind, ScratchDir, SignalPlan, compile_fixture, execute,
    signal_by_name,
};
use parking_lot::Mutex;

use crate::catalog::{BehaviorClass, Catalog, ExpectedBehavior, Scenario};
use crate::matcher::{MatchError, MatchPolicy, match_observation};
use crate::report::ScenarioReport;

/// Resource envelope and run options for one batch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// C compiler executable.
    pub compiler: String,
    /// Wall-clock timeout per execution.
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub grace: Duration,
    /// Delay before delivering a scenario's `deliver_signal`.
    pub signal_delay: Duration,
    /// Per-stream capture cap in bytes.
    pub output_cap: usize,
    /// Repetitions for `undefined-nondeterministic` scenarios.
    pub repeat: usize,
    /// Candidate detector executable; when absent only crash consistency
    /// is exercised.
    pub detector: Option<PathBuf>,
    /// Worker pool size.
    pub jobs: usize,
    pub policy: MatchPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            compiler: String::from("cc"),
            timeout: Duration::from_secs(5),
            grace: Duration::from_secs(2),
            signal_delay: Duration::from_millis(500),
            output_cap: 1 << 20,
            repeat: 3,
            detector: None,
            jobs: 4,
            policy: MatchPolicy::default(),
        }
    }
}

/// One detector-reported finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFinding {
    pub line: u32,
    /// Detector's category guess; `None` when the field was empty.
    pub category: Option<String>,
    pub message: String,
}

/// Result of running a scenario; owned by the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Exit of the first fixture execution.
    pub exit: ExitKind,
    /// Distinct termination classes across repetitions.
    pub behavior_set: BTreeSet<BehaviorClass>,
    /// Findings parsed from detector stdout; unordered, may duplicate.
    pub reported: Vec<ReportedFinding>,
    /// The detector process failed to launch (scenario scored all-missed).
    pub detector_failed: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u64,
}

/// Terminal state of one scenario run.
#[derive(Debug, Clone)]
pub enum ScenarioOutcome {
    Observed(Observation),
    /// The fixture failed to compile; inconclusive, not a batch abort.
    BuildFailed(String),
}

/// Execute one scenario end to end. Never panics past this boundary.
pub fn run_scenario(scenario: &Scenario, cfg: &RunConfig, cancel: &CancelToken) -> ScenarioOutcome {
    let scratch = match ScratchDir::create(&scenario.id) {
        Ok(scratch) => scratch,
        Err(err) => return ScenarioOutcome::BuildFailed(format!("scratch dir: {err}")),
    };
    let binary = match compile_fixture(&cfg.compiler, &scenario.source_path, scratch.path()) {
        Ok(binary) => binary,
        Err(err) => return ScenarioOutcome::BuildFailed(err.to_string()),
    };

    let signal_plan = scenario
        .deliver_signal
        .as_deref()
        .and_then(signal_by_name)
        .map(|signal| SignalPlan {
            signal,
            after: cfg.signal_delay,
        });

    let reps = if scenario.expected_behavior == ExpectedBehavior::UndefinedNondeterministic {
        cfg.repeat.max(1)
    } else {
        1
    };

    let mut behavior_set = BTreeSet::new();
    let mut first_exit = None;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut duration_ms = 0u64;
    for rep in 0..reps {
        if cancel.is_cancelled() && rep > 0 {
            break;
        }
        let outcome = execute(
            &ExecRequest {
                program: &binary,
                args: Vec::new(),
                cwd: scratch.path(),
                timeout: cfg.timeout,
                grace: cfg.grace,
                output_cap: cfg.output_cap,
                signal_plan,
            },
            cancel,
        );
        duration_ms += outcome.duration.as_millis() as u64;
        if let Some(class) = behavior_class(&outcome.exit) {
            behavior_set.insert(class);
        }
        if first_exit.is_none() {
            first_exit = Some(outcome.exit);
            stdout = outcome.stdout;
            stderr = outcome.stderr;
        }
    }
    let exit = first_exit
        .unwrap_or_else(|| ExitKind::ToolError(String::from("fixture never executed")));

    let (reported, detector_failed) = match &cfg.detector {
        None => (Vec::new(), false),
        Some(detector) => {
            let outcome = execute(
                &ExecRequest {
                    program: detector,
                    args: vec![scenario.source_path.display().to_string()],
                    cwd: scratch.path(),
                    timeout: cfg.timeout,
                    grace: cfg.grace,
                    output_cap: cfg.output_cap,
                    signal_plan: None,
                },
                cancel,
            );
            duration_ms += outcome.duration.as_millis() as u64;
            match outcome.exit {
                ExitKind::ToolError(_) => (Vec::new(), true),
                _ => (parse_detector_output(&outcome.stdout), false),
            }
        }
    };

    ScenarioOutcome::Observed(Observation {
        exit,
        behavior_set,
        reported,
        detector_failed,
        stdout,
        stderr,
        duration_ms,
    })
}

/// Run the whole catalog on a bounded worker pool and return per-scenario
/// reports sorted by id.
///
/// Scenarios are claimed through an atomic cursor; results are folded
/// under one accumulation lock held only during the push. A matcher
/// invariant violation is a fatal catalog bug and fails the batch.
pub fn run_batch(
    catalog: &Catalog,
    cfg: &RunConfig,
    cancel: &CancelToken,
) -> Result<Vec<ScenarioReport>, MatchError> {
    let cursor = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let results: Mutex<Vec<ScenarioReport>> = Mutex::new(Vec::with_capacity(catalog.len()));
    let error: Mutex<Option<MatchError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..cfg.jobs.max(1) {
            scope.spawn(|| {
                loop {
                    if cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(scenario) = catalog.scenarios.get(index) else {
                        break;
                    };
                    let report = match run_scenario(scenario, cfg, cancel) {
                        ScenarioOutcome::BuildFailed(note) => {
                            ScenarioReport::inconclusive(scenario, note)
                        }
                        ScenarioOutcome::Observed(observation) => {
                            match match_observation(scenario, &observation, &cfg.policy) {
                                Ok(verdict) => {
                                    ScenarioReport::scored(scenario, &observation, &verdict)
                                }
                                Err(err) => {
                                    *error.lock() = Some(err);
                                    failed.store(true, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                    };
                    results.lock().push(report);
                }
            });
        }
    });

    if let Some(err) = error.into_inner() {
        return Err(err);
    }
    let mut reports = results.into_inner();
    reports.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(reports)
}

/// Parse newline-delimited `line:category:message` detector records.
/// Unrecognized lines are ignored, not fatal.
#[must_use]
pub fn parse_detector_output(bytes: &[u8]) -> Vec<ReportedFinding> {
    let text = String::from_utf8_lossy(bytes);
    let mut findings = Vec::new();
    for raw in text.lines() {
        let mut parts = raw.splitn(3, ':');
        let Some(line_part) = parts.next() else {
            continue;
        };
        let Ok(line) = line_part.trim().parse::<u32>() else {
            continue;
        };
        let Some(category_part) = parts.next() else {
            continue;
        };
        if line == 0 {
            continue;
        }
        let category = {
            let trimmed = category_part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        let message = parts.next().unwrap_or("").trim().to_string();
        findings.push(ReportedFinding {
            line,
            category,
            message,
        });
    }
    findings
}

fn behavior_class(exit: &ExitKind) -> Option<BehaviorClass> {
    match exit {
        ExitKind::Exited(_) => Some(BehaviorClass::Exit),
        ExitKind::Signaled(_) => Some(BehaviorClass::Signal),
        ExitKind::TimedOut => Some(BehaviorClass::Timeout),
        ExitKind::ToolError(_) => None,
    }
}
