//! CLI entrypoint for the defectbench harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use defectbench_exec::{CancelToken, install_interrupt_handler};
use defectbench_harness::structured_log::{LogEmitter, LogEntry, LogLevel, LogOutcome};
use defectbench_harness::{
    BenchReport, Catalog, DefectCategory, MatchPolicy, RunConfig, ScenarioReport, ScenarioStatus,
    load_catalog, run_batch,
};

/// Benchmark harness for a labeled C defect corpus.
#[derive(Debug, Parser)]
#[command(name = "defectbench")]
#[command(about = "Oracle-driven benchmark harness for C defect fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the corpus (and optionally a candidate detector) and score it.
    Run {
        /// Corpus root directory containing fixtures + annotation sidecars.
        corpus_root: PathBuf,
        /// Candidate detector executable; invoked per scenario with the
        /// source path, expected to emit `line:category:message` records.
        #[arg(long)]
        detector: Option<PathBuf>,
        /// Wall-clock timeout per execution, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout: u64,
        /// Grace period between SIGTERM and SIGKILL, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        grace: u64,
        /// Delay before delivering a scenario's test signal, in milliseconds.
        #[arg(long, default_value_t = 500)]
        signal_delay: u64,
        /// Repetitions for undefined-nondeterministic scenarios.
        #[arg(long, default_value_t = 3)]
        repeat: usize,
        /// Only run scenarios of this category.
        #[arg(long)]
        filter: Option<String>,
        /// Line tolerance for finding matches.
        #[arg(long, default_value_t = 0)]
        tolerance: u32,
        /// Treat "undefined but only ever exited normally" as a regression.
        #[arg(long)]
        strict_nondet: bool,
        /// Worker pool size.
        #[arg(long, default_value_t = 4)]
        jobs: usize,
        /// C compiler executable.
        #[arg(long, default_value = "cc")]
        cc: String,
        /// Emit the report as JSON on stdout (default is a text table).
        #[arg(long, conflicts_with = "text")]
        json: bool,
        /// Emit the report as a text table on stdout (the default).
        #[arg(long)]
        text: bool,
        /// Also write the report to this path (markdown, plus a `.json`
        /// sibling).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Load and validate the catalog without running anything.
    Validate {
        /// Corpus root directory.
        corpus_root: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            corpus_root,
            detector,
            timeout,
            grace,
            signal_delay,
            repeat,
            filter,
            tolerance,
            strict_nondet,
            jobs,
            cc,
            json,
            text: _,
            report,
            log,
        } => run_command(RunArgs {
            corpus_root,
            detector,
            timeout,
            grace,
            signal_delay,
            repeat,
            filter,
            tolerance,
            strict_nondet,
            jobs,
            cc,
            json,
            report,
            log,
        }),
        Command::Validate { corpus_root } => validate_command(&corpus_root),
    };
    std::process::exit(code);
}

struct RunArgs {
    corpus_root: PathBuf,
    detector: Option<PathBuf>,
    timeout: u64,
    grace: u64,
    signal_delay: u64,
    repeat: usize,
    filter: Option<String>,
    tolerance: u32,
    strict_nondet: bool,
    jobs: usize,
    cc: String,
    json: bool,
    report: Option<PathBuf>,
    log: Option<PathBuf>,
}

fn run_command(args: RunArgs) -> i32 {
    let catalog = match load_filtered_catalog(&args.corpus_root, args.filter.as_deref()) {
        Ok(catalog) => catalog,
        Err(code) => return code,
    };
    eprintln!(
        "Loaded {} scenario(s) from {}",
        catalog.len(),
        args.corpus_root.display()
    );

    // Relative detector paths would break once workers chdir into scratch
    // directories.
    let detector = args
        .detector
        .map(|path| path.canonicalize().unwrap_or(path));

    let cfg = RunConfig {
        compiler: args.cc,
        timeout: Duration::from_millis(args.timeout),
        grace: Duration::from_millis(args.grace),
        signal_delay: Duration::from_millis(args.signal_delay),
        repeat: args.repeat,
        detector,
        jobs: args.jobs,
        policy: MatchPolicy {
            tolerance: args.tolerance,
            nondet_normal_exit_ok: !args.strict_nondet,
        },
        ..RunConfig::default()
    };

    install_interrupt_handler();
    let cancel = CancelToken::new();
    let reports = match run_batch(&catalog, &cfg, &cancel) {
        Ok(reports) => reports,
        Err(err) => {
            eprintln!("fatal catalog bug: {err}");
            return 2;
        }
    };

    let doc = BenchReport::new(
        args.corpus_root.display().to_string(),
        cfg.detector.as_ref().map(|p| p.display().to_string()),
        format!("{:?}", std::time::SystemTime::now()),
        reports,
    );

    if let Some(path) = &args.log
        && let Err(err) = emit_log(path, &doc)
    {
        eprintln!("failed writing log {}: {err}", path.display());
    }

    if args.json {
        print!("{}", doc.to_json());
    } else {
        print!("{}", doc.to_markdown());
    }
    if let Some(path) = &args.report {
        if let Err(err) = write_report_files(path, &doc) {
            eprintln!("failed writing report {}: {err}", path.display());
        } else {
            eprintln!("Wrote report to {}", path.display());
        }
    }

    if cancel.is_cancelled() {
        eprintln!("run cancelled before completing {} scenario(s)", catalog.len());
        return 1;
    }
    doc.summary.exit_code()
}

fn validate_command(corpus_root: &PathBuf) -> i32 {
    match load_catalog(corpus_root) {
        Ok(catalog) => {
            eprintln!(
                "Catalog OK: {} scenario(s) in {}",
                catalog.len(),
                corpus_root.display()
            );
            for scenario in &catalog.scenarios {
                eprintln!(
                    "  {} [{}] {} finding(s)",
                    scenario.id,
                    scenario.category,
                    scenario.expected_findings.len()
                );
            }
            0
        }
        Err(err) => {
            eprintln!("catalog error: {err}");
            2
        }
    }
}

fn load_filtered_catalog(root: &PathBuf, filter: Option<&str>) -> Result<Catalog, i32> {
    let catalog = match load_catalog(root) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("catalog error: {err}");
            return Err(2);
        }
    };
    match filter {
        None => Ok(catalog),
        Some(raw) => match raw.parse::<DefectCategory>() {
            Ok(category) => {
                let filtered = catalog.filtered(category);
                if filtered.is_empty() {
                    eprintln!("filter '{category}' matches no scenarios");
                }
                Ok(filtered)
            }
            Err(err) => {
                eprintln!("bad --filter: {err}");
                Err(2)
            }
        },
    }
}

fn emit_log(path: &PathBuf, doc: &BenchReport) -> std::io::Result<()> {
    let trace_id = format!("defectbench::run-{}", std::process::id());
    let mut emitter = LogEmitter::to_file(path)?;
    emitter.emit(&LogEntry::new(trace_id.as_str(), LogLevel::Info, "run_start"))?;
    for line in &doc.scenarios {
        emitter.emit(
            &LogEntry::new(trace_id.as_str(), LogLevel::Info, "scenario_complete")
                .with_scenario(line.id.as_str(), line.category.as_str())
                .with_outcome(scenario_outcome(line))
                .with_exit(line.exit.as_str())
                .with_duration_ms(line.duration_ms),
        )?;
    }
    emitter.emit(
        &LogEntry::new(trace_id.as_str(), LogLevel::Info, "run_complete").with_details(
            serde_json::json!({
                "scenarios": doc.summary.scenarios,
                "inconsistent": doc.summary.inconsistent.len(),
                "missed_definite": doc.summary.missed_definite,
            }),
        ),
    )
}

fn scenario_outcome(line: &ScenarioReport) -> LogOutcome {
    match line.status {
        ScenarioStatus::Inconclusive => LogOutcome::Inconclusive,
        ScenarioStatus::Scored => {
            if !line.crash_consistent && line.exit == "timeout" {
                LogOutcome::Timeout
            } else if line.crash_consistent && line.missed_definite == 0 {
                LogOutcome::Pass
            } else {
                LogOutcome::Fail
            }
        }
    }
}

fn write_report_files(path: &PathBuf, doc: &BenchReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_markdown())?;
    std::fs::write(path.with_extension("json"), doc.to_json())
}
