//! Error types for prjacl
//!
//! Two layers:
//! - [`Error`] covers fatal conditions that abort an operation before or
//!   during setup (bad role spec, unresolvable root, lock held) plus the
//!   interruption outcome.
//! - [`RolerError`] covers per-entry backend failures. The pipeline logs
//!   these with path context and skips the entry; they never abort a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for prjacl operations
#[derive(Error, Debug)]
pub enum Error {
    /// The operator tried to change their own access
    #[error("managing yourself is not permitted: {user}")]
    SelfAssignment {
        /// Offending user identifier
        user: String,
    },

    /// The same user appears in more than one requested role
    #[error("user specified more than once: {user}")]
    DuplicateUser {
        /// Offending user identifier
        user: String,
    },

    /// A role that is derived or reserved was requested explicitly
    #[error("role '{role}' cannot be requested explicitly")]
    ReservedRole {
        /// Name of the rejected role
        role: String,
    },

    /// A requested user has no account on this system
    #[error("unknown user: {user}")]
    UnknownUser {
        /// Unresolvable user identifier
        user: String,
    },

    /// The target path does not exist or cannot be resolved
    #[error("path not found or unaccessible: {path}")]
    RootNotFound {
        /// Path as resolved from the command line
        path: PathBuf,
    },

    /// No role backend matched the operation root
    #[error("no role backend for path: {path}")]
    NoBackend {
        /// Path that no backend claimed
        path: PathBuf,
    },

    /// Reading the root's current roles failed during the pre-check
    #[error("cannot read roles on {path}: {source}")]
    RootRoles {
        /// Operation root
        path: PathBuf,
        /// Backend failure detail
        source: RolerError,
    },

    /// Another invocation holds the lock on this tree
    #[error("lock already held: {path}")]
    LockHeld {
        /// Lock file path
        path: PathBuf,
    },

    /// The run was stopped by a termination signal
    #[error("stopped by signal {signal}")]
    Interrupted {
        /// Signal number, reported as the process exit status
        signal: i32,
    },

    /// I/O error outside the per-entry recoverable paths
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-entry failures from a role backend
///
/// These are recoverable at the pipeline level: the entry is logged and
/// dropped, the batch continues.
#[derive(Error, Debug)]
pub enum RolerError {
    /// The entry disappeared between enumeration and application
    #[error("path not found: {path}")]
    NotFound {
        /// Affected path
        path: PathBuf,
    },

    /// The storage under the entry does not support role state
    #[error("roles unsupported on: {path}")]
    Unsupported {
        /// Affected path
        path: PathBuf,
    },

    /// A user identifier has no account on this system
    #[error("unknown user: {user}")]
    UnknownUser {
        /// Unresolvable user identifier
        user: String,
    },

    /// The backend rejected the read or update
    #[error("backend failure on {path}: {reason}")]
    Backend {
        /// Affected path
        path: PathBuf,
        /// Backend-specific detail
        reason: String,
    },
}

impl RolerError {
    /// Classify an errno from an xattr call against a path.
    pub fn from_errno(path: &std::path::Path, errno: i32) -> Self {
        match errno {
            libc::ENOENT => Self::NotFound {
                path: path.to_path_buf(),
            },
            libc::ENOTSUP => Self::Unsupported {
                path: path.to_path_buf(),
            },
            other => Self::Backend {
                path: path.to_path_buf(),
                reason: std::io::Error::from_raw_os_error(other).to_string(),
            },
        }
    }
}

/// Result type alias for [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for [`RolerError`]
pub type RolerResult<T> = std::result::Result<T, RolerError>;
