//! Traverse-permission backfill
//!
//! Users granted a role inside a project tree still need execute permission
//! on every directory between the filesystem root and the tree, or they
//! cannot reach it. The propagator sits between the two application stages:
//! it forwards stage-one results to the reporter, collects the ancestor
//! directories that need traverse permission, and feeds them to stage two
//! once stage one has drained.
//!
//! Ancestors are collected for the walk root, for the pre-resolution target
//! when it was a symlink, and for every applied path that falls outside the
//! target's own project tree (symlink expansions). The set is deduplicated,
//! and paths that already received full roles in stage one are excluded so
//! backfill never narrows a permission granted moments earlier.

use crate::acl::RolePathMap;
use crate::cancel::CancelFlag;
use crate::walker::{EntryType, PathEntry};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Stage-one consumer that resolves the traverse target set.
pub struct Propagator {
    /// Project storage base, e.g. `/project`
    base: PathBuf,
    /// Resolved walk root
    root: PathBuf,
    /// Target path as given, before symlink resolution
    root_sym: PathBuf,
}

impl Propagator {
    /// Build a propagator for one run.
    #[must_use]
    pub fn new(base: PathBuf, root: PathBuf, root_sym: PathBuf) -> Self {
        Self {
            base,
            root,
            root_sym,
        }
    }

    /// Top-level project directory containing `path`, when under the base.
    ///
    /// `/project/3010000.01/raw/x` with base `/project` resolves to
    /// `/project/3010000.01`.
    fn project_of(&self, path: &Path) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.base).ok()?;
        let first = rest.components().next()?;
        Some(self.base.join(first))
    }

    /// Whether `path` lives in the same project tree as the walk root.
    ///
    /// Everything under the root is same-project even when the root sits
    /// outside the base; the root's own chain covers reachability there.
    /// Other paths outside the base come from symlink expansion and need
    /// their own ancestor chains.
    fn same_project(&self, path: &Path) -> bool {
        if path.starts_with(&self.root) {
            return true;
        }
        match (self.project_of(path), self.project_of(&self.root)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Ancestors needing traverse so that `path` becomes reachable.
    ///
    /// Runs from just below the filesystem root down to, but not including,
    /// the path's project boundary. Paths inside the boundary never get a
    /// traverse-only update; the project-level roles already cover them.
    /// Outside the base there is no boundary and the chain stops just above
    /// the path itself.
    fn chain_for(&self, path: &Path) -> Vec<PathBuf> {
        match self.project_of(path) {
            Some(boundary) => ancestor_chain(&boundary),
            None => ancestor_chain(path),
        }
    }

    /// Spawn the propagator thread.
    ///
    /// Every update from `updates` is forwarded to `report`. When the
    /// stage-one stream closes, the collected ancestor directories are sent
    /// into `traverse` and that channel closes, releasing stage two.
    #[must_use]
    pub fn spawn(
        self,
        updates: Receiver<RolePathMap>,
        report: Sender<RolePathMap>,
        traverse: Sender<PathEntry>,
        cancel: CancelFlag,
    ) -> Option<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("propagator".to_string())
            .spawn(move || self.run(&updates, &report, &traverse, &cancel))
            .map_err(|e| warn!(error = %e, "failed to spawn propagator thread"))
            .ok()
    }

    fn run(
        &self,
        updates: &Receiver<RolePathMap>,
        report: &Sender<RolePathMap>,
        traverse: &Sender<PathEntry>,
        cancel: &CancelFlag,
    ) {
        let mut candidates: HashSet<PathBuf> = HashSet::new();
        // Stage-one paths outside the root's project tree; these got full
        // roles already and must not be narrowed to traverse-only.
        let mut applied_outside: HashSet<PathBuf> = HashSet::new();

        for update in updates {
            if cancel.is_cancelled() {
                break;
            }
            if !self.same_project(&update.path) {
                candidates.extend(self.chain_for(&update.path));
                applied_outside.insert(update.path.clone());
            }
            if report.send(update).is_err() {
                break;
            }
        }

        candidates.extend(self.chain_for(&self.root));
        if self.root_sym != self.root {
            candidates.extend(self.chain_for(&self.root_sym));
        }

        let mut targets: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|p| !applied_outside.contains(p) && *p != self.root)
            .collect();
        targets.sort();
        debug!(count = targets.len(), "traverse targets resolved");

        for path in targets {
            if cancel.is_cancelled() {
                break;
            }
            if traverse.send(PathEntry::new(path, EntryType::Dir)).is_err() {
                break;
            }
        }
        // traverse sender drops here, closing stage two's input
    }
}

/// Proper ancestors of `path`, excluding the filesystem root and the path
/// itself.
fn ancestor_chain(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .filter(|p| *p != Path::new("/") && !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect()
}
