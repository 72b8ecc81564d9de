//! Process-group execution under a resource envelope.
//!
//! Fixtures are arbitrary native programs that may crash on a signal, hang
//! in a busy-wait loop, install their own signal handlers, or fork. Every
//! execution therefore runs in its own process group; timeout escalation
//! (SIGTERM, grace period, SIGKILL) and test-signal delivery both target
//! the whole group so children never outlive the harness.
//!
//! [`execute`] never returns an error: spawn failures, signals, and
//! timeouts are all encoded in [`ExitKind`].

use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::interrupt::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 4096;

/// Terminal classification of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Process exited normally with the given code.
    Exited(i32),
    /// Process was terminated by a signal it did not catch.
    Signaled(i32),
    /// Process exceeded the wall-clock timeout (or the run was cancelled)
    /// and was force-killed.
    TimedOut,
    /// The process could not be launched or awaited at all.
    ToolError(String),
}

impl ExitKind {
    /// Stable human-readable label used in reports (`exit:0`, `signal:11`,
    /// `timeout`, `tool-error`).
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            ExitKind::Exited(code) => format!("exit:{code}"),
            ExitKind::Signaled(signo) => format!("signal:{signo}"),
            ExitKind::TimedOut => String::from("timeout"),
            ExitKind::ToolError(_) => String::from("tool-error"),
        }
    }
}

/// Mid-run signal delivery plan for handler fixtures.
///
/// The delay timer is independent of the wall-clock timeout: the signal is
/// sent `after` the process starts, and the normal timeout regime then
/// decides whether the process exited voluntarily or needs a force-kill.
#[derive(Debug, Clone, Copy)]
pub struct SignalPlan {
    /// Signal number to deliver (e.g. `libc::SIGINT`).
    pub signal: i32,
    /// Delay from process start until delivery.
    pub after: Duration,
}

/// One sandboxed execution request.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    /// Program to run.
    pub program: &'a Path,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory; also exported as `TMPDIR` so fixture temp files
    /// stay inside the scratch namespace.
    pub cwd: &'a Path,
    /// Wall-clock timeout before SIGTERM escalation begins.
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub grace: Duration,
    /// Per-stream capture cap in bytes; excess output is drained and
    /// discarded so the child never blocks on a full pipe.
    pub output_cap: usize,
    /// Optional test-signal delivery.
    pub signal_plan: Option<SignalPlan>,
}

/// Result of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit: ExitKind,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

/// Execute a request to completion. Blocks for at most `timeout + grace`
/// (plus reaping) and always returns an outcome.
pub fn execute(req: &ExecRequest<'_>, cancel: &CancelToken) -> ExecOutcome {
    let start = Instant::now();

    let mut cmd = Command::new(req.program);
    cmd.args(&req.args)
        .current_dir(req.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default())
        .env("TMPDIR", req.cwd);
    unsafe {
        // New process group: group-wide kill reaches forked children.
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecOutcome {
                exit: ExitKind::ToolError(format!(
                    "failed to spawn {}: {err}",
                    req.program.display()
                )),
                stdout: Vec::new(),
                stderr: Vec::new(),
                duration: start.elapsed(),
            };
        }
    };

    let stdout_reader = spawn_capped_reader(child.stdout.take(), req.output_cap);
    let stderr_reader = spawn_capped_reader(child.stderr.take(), req.output_cap);
    let pgid = child.id() as i32;

    let mut signal_sent = req.signal_plan.is_none();
    let exit = loop {
        match child.try_wait() {
            Ok(Some(status)) => break classify(status),
            Ok(None) => {}
            Err(err) => {
                kill_group(pgid, libc::SIGKILL);
                let _ = child.wait();
                break ExitKind::ToolError(format!("wait failed: {err}"));
            }
        }

        let elapsed = start.elapsed();
        if cancel.is_cancelled() || elapsed >= req.timeout {
            break terminate_group(&mut child, pgid, req.grace);
        }
        if !signal_sent
            && let Some(plan) = req.signal_plan
            && elapsed >= plan.after
        {
            kill_group(pgid, plan.signal);
            signal_sent = true;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    // The child is dead by now, so the pipes hit EOF and the readers finish.
    let stdout = stdout_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
    let stderr = stderr_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();

    ExecOutcome {
        exit,
        stdout,
        stderr,
        duration: start.elapsed(),
    }
}

/// Resolve a symbolic signal name (`SIGINT`, `SIGTERM`, ...) to its number.
#[must_use]
pub fn signal_by_name(name: &str) -> Option<i32> {
    let trimmed = name.trim();
    let bare = trimmed.strip_prefix("SIG").unwrap_or(trimmed);
    match bare.to_ascii_uppercase().as_str() {
        "HUP" => Some(libc::SIGHUP),
        "INT" => Some(libc::SIGINT),
        "QUIT" => Some(libc::SIGQUIT),
        "USR1" => Some(libc::SIGUSR1),
        "USR2" => Some(libc::SIGUSR2),
        "ALRM" => Some(libc::SIGALRM),
        "TERM" => Some(libc::SIGTERM),
        _ => None,
    }
}

fn classify(status: ExitStatus) -> ExitKind {
    if let Some(code) = status.code() {
        ExitKind::Exited(code)
    } else if let Some(signo) = status.signal() {
        ExitKind::Signaled(signo)
    } else {
        ExitKind::ToolError(String::from("process ended without code or signal"))
    }
}

fn kill_group(pgid: i32, signal: i32) {
    // Negative pid targets the whole process group.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

/// SIGTERM the group, wait out the grace period, then SIGKILL and reap.
fn terminate_group(child: &mut Child, pgid: i32, grace: Duration) -> ExitKind {
    kill_group(pgid, libc::SIGTERM);
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return ExitKind::TimedOut,
            Ok(None) => {}
            Err(_) => break,
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    kill_group(pgid, libc::SIGKILL);
    let _ = child.wait();
    ExitKind::TimedOut
}

fn spawn_capped_reader<R>(stream: Option<R>, cap: usize) -> Option<std::thread::JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    let mut stream = stream?;
    Some(std::thread::spawn(move || {
        let mut captured = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = cap.saturating_sub(captured.len());
                    captured.extend_from_slice(&chunk[..n.min(room)]);
                    // Past the cap we keep draining so the child never
                    // stalls on a full pipe.
                }
            }
        }
        captured
    }))
}
