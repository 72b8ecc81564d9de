//! Benchmark harness for a corpus of labeled C defect fixtures.
//!
//! This crate provides:
//! - Catalog: immutable model of scenarios and their ground-truth labels
//! - Loader: fixture discovery, sidecar annotation parsing, validation
//! - Runner: sandboxed compile-and-run plus detector invocation
//! - Matcher: oracle reconciliation of reported vs expected findings
//! - Scorer: per-category precision/recall and regression counting
//! - Reporter: stable, sorted human-readable + machine-readable reports

#![forbid(unsafe_code)]

pub mod catalog;
pub mod loader;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod score;
pub mod structured_log;

pub use catalog::{
    AnnotationRecord, BehaviorClass, Catalog, DefectCategory, ExpectedBehavior, ExpectedFinding,
    Scenario, Severity,
};
pub use loader::{CatalogError, load_catalog, write_annotation};
pub use matcher::{MatchError, MatchPolicy, Verdict, match_observation};
pub use report::{BenchReport, ScenarioReport, ScenarioStatus};
pub use runner::{Observation, ReportedFinding, RunConfig, ScenarioOutcome, run_batch, run_scenario};
pub use score::{CategoryScore, ScoreSummary};
