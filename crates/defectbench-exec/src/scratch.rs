//! Per-run scratch directories.
//!
//! Fixtures litter temp files (`/tmp/data.txt`-style file-race tests) and
//! compiled binaries. Each scenario run gets its own directory under the
//! system temp dir, used as both working directory and `TMPDIR`, and the
//! directory is removed on every exit path via `Drop`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQ: AtomicU64 = AtomicU64::new(0);

/// A scratch directory that removes itself (recursively) when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a namespaced scratch directory for one scenario run.
    ///
    /// The name embeds the harness pid and a process-local sequence number
    /// so concurrent workers and concurrent harness invocations never share
    /// a directory.
    pub fn create(label: &str) -> std::io::Result<Self> {
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let sanitized: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = std::env::temp_dir().join(format!(
            "defectbench-{}-{}-{}",
            std::process::id(),
            seq,
            sanitized
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Path of the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        // Teardown is best-effort; a fixture may have chmod'd its droppings.
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
