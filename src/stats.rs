//! Run statistics shared across pipeline stages
//!
//! Lock-free atomic counters, wrapped in `Arc` and cloned into the walker,
//! the role-application workers, and the traverse propagator. `Relaxed`
//! ordering is sufficient; counters only need eventual consistency and are
//! read once at the end of the run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated over one engine run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Paths emitted by the enumerator
    paths_found: AtomicU64,
    /// Paths whose role state was updated in stage one
    roles_applied: AtomicU64,
    /// Ancestor paths that received a traverse update in stage two
    traverse_applied: AtomicU64,
    /// Paths skipped as recoverable failures
    errors: AtomicU64,
}

impl RunStats {
    /// Fresh zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            paths_found: AtomicU64::new(0),
            roles_applied: AtomicU64::new(0),
            traverse_applied: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Count one enumerated path.
    pub fn record_path(&self) {
        self.paths_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one stage-one role application.
    pub fn record_role_applied(&self) {
        self.roles_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one stage-two traverse application.
    pub fn record_traverse_applied(&self) {
        self.traverse_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one recoverable per-path failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Paths enumerated so far.
    #[must_use]
    pub fn paths_found(&self) -> u64 {
        self.paths_found.load(Ordering::Relaxed)
    }

    /// Stage-one applications so far.
    #[must_use]
    pub fn roles_applied(&self) -> u64 {
        self.roles_applied.load(Ordering::Relaxed)
    }

    /// Stage-two applications so far.
    #[must_use]
    pub fn traverse_applied(&self) -> u64 {
        self.traverse_applied.load(Ordering::Relaxed)
    }

    /// Recoverable failures so far.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Snapshot the counters into a plain summary.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            paths_found: self.paths_found(),
            roles_applied: self.roles_applied(),
            traverse_applied: self.traverse_applied(),
            errors: self.errors(),
        }
    }
}

/// Immutable end-of-run snapshot of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Paths emitted by the enumerator
    pub paths_found: u64,
    /// Paths whose role state was updated in stage one
    pub roles_applied: u64,
    /// Ancestors that received a traverse update in stage two
    pub traverse_applied: u64,
    /// Paths skipped as recoverable failures
    pub errors: u64,
}
