//! Whole-run cancellation.
//!
//! The harness must be able to abandon a batch (operator interrupt) without
//! leaving orphaned fixture processes behind. A process-wide SIGINT/SIGTERM
//! latch feeds into [`CancelToken`], which the execution loop polls between
//! waits; on cancellation the active process group is force-killed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT/SIGTERM latch. Safe to call more than once.
pub fn install_interrupt_handler() {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

/// Whether the process-wide interrupt latch has fired.
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Cooperative cancellation handle shared by the worker pool.
///
/// A token is cancelled either explicitly (tests, embedding callers) or by
/// the process-wide interrupt latch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token (and every clone of it).
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once either this token or the interrupt latch has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || interrupted()
    }
}
