//! Integration tests for the execution envelope: exit/signal/timeout
//! classification, output caps, signal delivery, and cancellation, all
//! driven through `/bin/sh` subprocesses.

use std::path::Path;
use std::time::{Duration, Instant};

use defectbench_exec::{CancelToken, ExecOutcome, ExecRequest, ExitKind, ScratchDir, SignalPlan, execute};

fn run_sh(
    scratch: &ScratchDir,
    script: &str,
    timeout: Duration,
    signal_plan: Option<SignalPlan>,
) -> ExecOutcome {
    let req = ExecRequest {
        program: Path::new("/bin/sh"),
        args: vec![String::from("-c"), String::from(script)],
        cwd: scratch.path(),
        timeout,
        grace: Duration::from_millis(500),
        output_cap: 64 * 1024,
        signal_plan,
    };
    execute(&req, &CancelToken::new())
}

#[test]
fn normal_exit_code_is_captured() {
    let scratch = ScratchDir::create("exit3").expect("scratch");
    let out = run_sh(&scratch, "exit 3", Duration::from_secs(5), None);
    assert_eq!(out.exit, ExitKind::Exited(3));
}

#[test]
fn stdout_and_stderr_are_captured_separately() {
    let scratch = ScratchDir::create("streams").expect("scratch");
    let out = run_sh(&scratch, "echo out; echo err >&2", Duration::from_secs(5), None);
    assert_eq!(out.exit, ExitKind::Exited(0));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");
    assert_eq!(String::from_utf8_lossy(&out.stderr), "err\n");
}

#[test]
fn uncaught_signal_is_classified_as_signaled() {
    let scratch = ScratchDir::create("selfkill").expect("scratch");
    let out = run_sh(&scratch, "kill -SEGV $$", Duration::from_secs(5), None);
    assert_eq!(out.exit, ExitKind::Signaled(libc::SIGSEGV));
}

#[test]
fn busy_wait_times_out_within_timeout_plus_grace() {
    let scratch = ScratchDir::create("busywait").expect("scratch");
    let started = Instant::now();
    let out = run_sh(
        &scratch,
        "while :; do :; done",
        Duration::from_millis(300),
        None,
    );
    assert_eq!(out.exit, ExitKind::TimedOut);
    // timeout (300ms) + grace (500ms) + scheduling slack
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn output_is_capped_but_child_is_drained() {
    let scratch = ScratchDir::create("cap").expect("scratch");
    let req = ExecRequest {
        program: Path::new("/bin/sh"),
        args: vec![
            String::from("-c"),
            String::from("i=0; while [ $i -lt 2000 ]; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; i=$((i+1)); done"),
        ],
        cwd: scratch.path(),
        timeout: Duration::from_secs(10),
        grace: Duration::from_millis(500),
        output_cap: 1024,
        signal_plan: None,
    };
    let out = execute(&req, &CancelToken::new());
    assert_eq!(out.exit, ExitKind::Exited(0));
    assert_eq!(out.stdout.len(), 1024);
}

#[test]
fn delivered_signal_allows_voluntary_exit() {
    let scratch = ScratchDir::create("trap").expect("scratch");
    let out = run_sh(
        &scratch,
        "trap 'exit 42' USR1; sleep 30 & wait",
        Duration::from_secs(10),
        Some(SignalPlan {
            signal: libc::SIGUSR1,
            after: Duration::from_millis(200),
        }),
    );
    assert_eq!(out.exit, ExitKind::Exited(42));
}

#[test]
fn delivered_signal_kills_handlerless_fixture() {
    let scratch = ScratchDir::create("nohandler").expect("scratch");
    let out = run_sh(
        &scratch,
        "sleep 30",
        Duration::from_secs(10),
        Some(SignalPlan {
            signal: libc::SIGUSR1,
            after: Duration::from_millis(200),
        }),
    );
    assert_eq!(out.exit, ExitKind::Signaled(libc::SIGUSR1));
}

#[test]
fn cancelled_token_terminates_promptly() {
    let scratch = ScratchDir::create("cancel").expect("scratch");
    let token = CancelToken::new();
    token.cancel();
    let req = ExecRequest {
        program: Path::new("/bin/sh"),
        args: vec![String::from("-c"), String::from("sleep 30")],
        cwd: scratch.path(),
        timeout: Duration::from_secs(30),
        grace: Duration::from_millis(200),
        output_cap: 1024,
        signal_plan: None,
    };
    let started = Instant::now();
    let out = execute(&req, &token);
    assert_eq!(out.exit, ExitKind::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn missing_program_is_a_tool_error() {
    let scratch = ScratchDir::create("noprog").expect("scratch");
    let req = ExecRequest {
        program: Path::new("/definitely/not/here"),
        args: Vec::new(),
        cwd: scratch.path(),
        timeout: Duration::from_secs(1),
        grace: Duration::from_millis(100),
        output_cap: 1024,
        signal_plan: None,
    };
    let out = execute(&req, &CancelToken::new());
    assert!(matches!(out.exit, ExitKind::ToolError(_)));
}
