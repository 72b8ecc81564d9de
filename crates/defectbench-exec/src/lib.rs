//! Sandboxed execution adapter for the defectbench harness.
//!
//! This crate owns every interaction with untrusted native code: compiling
//! deliberately-broken C fixtures, running them (or the candidate detector)
//! inside a dedicated process group under a resource envelope, delivering
//! test signals, and tearing down per-run scratch directories.
//!
//! It is the only crate in the workspace permitted to contain `unsafe`
//! (for `pre_exec` and `libc` signal/kill calls). Everything above it sees
//! infallible [`ExecOutcome`] values instead of panics or raw errors.

pub mod compile;
pub mod interrupt;
pub mod process;
pub mod scratch;

pub use compile::{BuildError, compile_fixture};
pub use interrupt::{CancelToken, install_interrupt_handler, interrupted};
pub use process::{ExecOutcome, ExecRequest, ExitKind, SignalPlan, execute, signal_by_name};
pub use scratch::ScratchDir;
