//! Cross-process mutual exclusion for tree-mutating operations
//!
//! One lock file rooted at the operation target keeps two invocations from
//! mutating the same tree concurrently. The guard removes the file on drop,
//! so every exit path (success, fatal error, cancellation) releases it.

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the lock marker inside the target directory.
pub const LOCK_FILE_NAME: &str = ".prjacl.lock";

/// RAII guard over the tree-scoped lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock for the tree rooted at `dir`.
    ///
    /// The lock file is created with `O_EXCL`, so exactly one invocation
    /// can hold it. The file records the holder's pid for diagnostics.
    ///
    /// # Errors
    ///
    /// [`Error::LockHeld`] when the file already exists; I/O errors from
    /// creation otherwise.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::LockHeld { path: path.clone() }
                } else {
                    Error::Io(e)
                }
            })?;
        let _ = writeln!(file, "{}", std::process::id());
        debug!(path = %path.display(), "lock acquired");
        Ok(Self { path })
    }

    /// Path of the held lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        } else {
            debug!(path = %self.path.display(), "lock released");
        }
    }
}
