//! Concurrent role-application stage
//!
//! A pool of worker threads drains a bounded entry stream, applies one role
//! map per entry through the resolved backend, and forwards the resulting
//! role state downstream. The same stage runs twice per engine run: once
//! for the requested roles over the project tree, once for traverse
//! permissions over the collected ancestor set.

use crate::acl::posix::SetOptions;
use crate::acl::roler::Backends;
use crate::acl::{RoleMap, RolePathMap};
use crate::cancel::CancelFlag;
use crate::stats::RunStats;
use crate::walker::PathEntry;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Which counter a stage feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Requested roles over the enumerated tree
    Roles,
    /// Traverse permission over ancestor directories
    Traverse,
}

/// One application stage, cloned into each worker thread.
#[derive(Clone)]
pub struct Applier {
    /// Role map applied to every incoming entry
    pub desired: RoleMap,
    /// Per-application write options
    pub options: SetOptions,
    /// Backend resolver
    pub backends: Backends,
    /// Stage identity for stats and log lines
    pub stage: Stage,
}

impl Applier {
    /// Spawn `workers` threads draining `entries` into `updates`.
    ///
    /// Each worker owns a clone of the update sender; the stage's side of
    /// the channel closes once every worker has exited, which is how the
    /// downstream consumer observes end of stream. Recoverable per-path
    /// failures are logged and counted, never fatal.
    #[must_use]
    pub fn spawn(
        self,
        workers: usize,
        entries: &Receiver<PathEntry>,
        updates: &Sender<RolePathMap>,
        stats: &Arc<RunStats>,
        cancel: &CancelFlag,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .filter_map(|index| {
                let applier = self.clone();
                let entries = entries.clone();
                let updates = updates.clone();
                let stats = Arc::clone(stats);
                let cancel = cancel.clone();
                std::thread::Builder::new()
                    .name(format!("applier-{index}"))
                    .spawn(move || applier.run(&entries, &updates, &stats, &cancel))
                    .map_err(|e| warn!(error = %e, "failed to spawn worker thread"))
                    .ok()
            })
            .collect()
    }

    fn run(
        &self,
        entries: &Receiver<PathEntry>,
        updates: &Sender<RolePathMap>,
        stats: &RunStats,
        cancel: &CancelFlag,
    ) {
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            if self.stage == Stage::Roles {
                stats.record_path();
            }
            match self.apply(&entry) {
                Ok(update) => {
                    match self.stage {
                        Stage::Roles => stats.record_role_applied(),
                        Stage::Traverse => stats.record_traverse_applied(),
                    }
                    // Receiver gone means the run is being torn down.
                    if updates.send(update).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "skipping path");
                    stats.record_error();
                }
            }
        }
        debug!(stage = ?self.stage, "applier drained");
    }

    fn apply(&self, entry: &PathEntry) -> crate::error::RolerResult<RolePathMap> {
        let backend = self.backends.for_path(&entry.path)?;
        backend.set_roles(entry, &self.desired, &self.options)
    }
}
