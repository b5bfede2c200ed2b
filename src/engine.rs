//! Run orchestration
//!
//! Wires one role-setting run together: the nothing-to-do pre-check, the
//! tree lock, the enumerator, both application stages, the traverse
//! propagator between them, and the report drain. The main thread owns the
//! drain; everything upstream runs on its own threads connected by bounded
//! channels, so a slow backend applies backpressure all the way to the
//! enumerator.

use crate::acl::posix::SetOptions;
use crate::acl::roler::Backends;
use crate::acl::{self, RoleMap, RolePathMap};
use crate::cancel::CancelFlag;
use crate::context::Target;
use crate::error::{Error, Result};
use crate::lock::LockGuard;
use crate::pipeline::{Applier, Stage};
use crate::progress::Reporter;
use crate::stats::{RunStats, RunSummary};
use crate::traverse::Propagator;
use crate::walker::spawn_walk;
use crossbeam_channel::Sender;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Parameters of one role-setting run.
#[derive(Debug, Clone)]
pub struct SetRequest {
    /// Requested role bindings
    pub roles: RoleMap,
    /// Union of all requested users, the traverse user set
    pub traverse_users: BTreeSet<String>,
    /// Storage base directory, e.g. `/project`
    pub base: PathBuf,
    /// Backfill traverse permission on ancestor directories
    pub propagate: bool,
    /// Apply even when the pre-check finds every binding in place
    pub force: bool,
    /// Expand symlinks during enumeration
    pub follow_links: bool,
    /// Worker threads per application stage
    pub threads: usize,
    /// Replace per-path output with a counter
    pub silent: bool,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The pipeline drained; counters are final
    Completed(RunSummary),
    /// Every requested binding was already in place
    NothingToDo,
}

/// Execute one role-setting run against `target`.
///
/// # Errors
///
/// Fatal setup failures ([`Error::UnknownUser`], [`Error::RootRoles`],
/// [`Error::LockHeld`]) abort before any mutation. [`Error::Interrupted`]
/// reports a run stopped by a termination signal; partially applied state
/// is left in place, rerunning converges it.
pub fn run_set(
    target: &Target,
    request: &SetRequest,
    backends: &Backends,
    cancel: &CancelFlag,
) -> Result<RunOutcome> {
    backends
        .validate_users(request.traverse_users.iter().map(String::as_str))
        .map_err(|e| match e {
            crate::error::RolerError::UnknownUser { user } => Error::UnknownUser { user },
            other => Error::RootRoles {
                path: target.root.clone(),
                source: other,
            },
        })?;

    if !request.force && roles_already_in_place(target, request, backends)? {
        warn!("all roles in place, nothing to do");
        return Ok(RunOutcome::NothingToDo);
    }

    // Only directory trees are locked; a single file is one atomic update.
    let _lock = if target.is_dir {
        Some(LockGuard::acquire(&target.root)?)
    } else {
        None
    };

    let stats = Arc::new(RunStats::new());
    let capacity = request.threads * 4;

    let entries = spawn_walk(
        target.root.clone(),
        request.follow_links,
        capacity,
        cancel.clone(),
    );

    let (update_tx, update_rx) = crossbeam_channel::bounded::<RolePathMap>(capacity);
    let (report_tx, report_rx) = crossbeam_channel::bounded::<RolePathMap>(capacity);

    let stage_one = Applier {
        desired: request.roles.clone(),
        options: SetOptions {
            propagate_default: true,
            exact: false,
        },
        backends: backends.clone(),
        stage: Stage::Roles,
    };
    let mut handles = stage_one.spawn(request.threads, &entries, &update_tx, &stats, cancel);
    drop(update_tx);

    handles.extend(spawn_backfill(
        target, request, backends, cancel, &stats, update_rx, &report_tx, capacity,
    ));
    drop(report_tx);

    // Drain on the main thread; the stream closes once every stage exits.
    let reporter = Reporter::new(request.silent);
    let mut count = 0_u64;
    for update in report_rx {
        count += 1;
        reporter.applied(&update, count);
    }
    for handle in handles {
        if handle.join().is_err() {
            warn!("pipeline thread panicked");
        }
    }

    if let Some(signal) = cancel.signal() {
        reporter.clear();
        return Err(Error::Interrupted { signal });
    }

    let summary = stats.summary();
    reporter.finish(&summary);
    info!(
        paths = summary.paths_found,
        applied = summary.roles_applied,
        traverse = summary.traverse_applied,
        errors = summary.errors,
        "run complete"
    );
    Ok(RunOutcome::Completed(summary))
}

/// Wire the stage boundary after role application.
///
/// With propagation enabled this is the propagator plus the traverse-only
/// application stage; without it, a forwarder that pipes stage-one updates
/// straight to the reporter.
#[allow(clippy::too_many_arguments)]
fn spawn_backfill(
    target: &Target,
    request: &SetRequest,
    backends: &Backends,
    cancel: &CancelFlag,
    stats: &Arc<RunStats>,
    update_rx: crossbeam_channel::Receiver<RolePathMap>,
    report_tx: &Sender<RolePathMap>,
    capacity: usize,
) -> Vec<JoinHandle<()>> {
    if !request.propagate || request.traverse_users.is_empty() {
        let report_tx = report_tx.clone();
        return std::thread::Builder::new()
            .name("forwarder".to_string())
            .spawn(move || {
                for update in update_rx {
                    if report_tx.send(update).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| warn!(error = %e, "failed to spawn forwarder thread"))
            .into_iter()
            .collect();
    }

    let (traverse_tx, traverse_rx) = crossbeam_channel::bounded(capacity);
    let propagator = Propagator::new(
        request.base.clone(),
        target.root.clone(),
        target.root_sym.clone(),
    );
    let mut handles: Vec<JoinHandle<()>> = propagator
        .spawn(update_rx, report_tx.clone(), traverse_tx, cancel.clone())
        .into_iter()
        .collect();

    let stage_two = Applier {
        desired: acl::traverse_map(&request.traverse_users),
        options: SetOptions::default(),
        backends: backends.clone(),
        stage: Stage::Traverse,
    };
    handles.extend(stage_two.spawn(request.threads, &traverse_rx, report_tx, stats, cancel));
    handles
}

/// Pre-check: does the target root already carry every requested binding?
fn roles_already_in_place(
    target: &Target,
    request: &SetRequest,
    backends: &Backends,
) -> Result<bool> {
    let backend = backends
        .for_path(&target.root)
        .map_err(|_| Error::NoBackend {
            path: target.root.clone(),
        })?;
    let entry = crate::walker::PathEntry::new(
        target.root.clone(),
        if target.is_dir {
            crate::walker::EntryType::Dir
        } else {
            crate::walker::EntryType::File
        },
    );
    let current = backend.get_roles(&entry).map_err(|source| Error::RootRoles {
        path: target.root.clone(),
        source,
    })?;
    Ok(acl::roles_satisfied(&current, &request.roles))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::acl::roler::MemoryRoler;
    use crate::acl::Role;
    use crate::context::resolve_target;
    use crate::lock::LOCK_FILE_NAME;
    use tempfile::TempDir;

    fn request(roles: RoleMap, users: BTreeSet<String>, base: &std::path::Path) -> SetRequest {
        SetRequest {
            roles,
            traverse_users: users,
            base: base.to_path_buf(),
            propagate: true,
            force: false,
            follow_links: false,
            threads: 2,
            silent: true,
        }
    }

    fn spec(users: &[(&str, Role)]) -> (RoleMap, BTreeSet<String>) {
        let mut roles = RoleMap::new();
        let mut union = BTreeSet::new();
        for (user, role) in users {
            roles
                .entry(*role)
                .or_default()
                .insert((*user).to_string());
            union.insert((*user).to_string());
        }
        (roles, union)
    }

    /// base/3010000.01/{raw/{a.dat,b.dat}, doc}
    fn project_tree() -> (TempDir, Target) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("3010000.01");
        std::fs::create_dir_all(root.join("raw")).unwrap();
        std::fs::create_dir(root.join("doc")).unwrap();
        std::fs::write(root.join("raw/a.dat"), b"a").unwrap();
        std::fs::write(root.join("raw/b.dat"), b"b").unwrap();
        let target = resolve_target("3010000.01", tmp.path(), "").unwrap();
        (tmp, target)
    }

    #[test]
    fn run_applies_roles_everywhere_and_traverse_on_ancestors() {
        let (tmp, target) = project_tree();
        let (roles, users) = spec(&[("alice", Role::Contributor), ("bob", Role::Viewer)]);
        let store = MemoryRoler::new();
        let backends = Backends::memory(store.clone());

        let outcome = run_set(
            &target,
            &request(roles, users, tmp.path()),
            &backends,
            &CancelFlag::new(),
        )
        .unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        // root + raw + doc + 2 files
        assert_eq!(summary.paths_found, 5);
        assert_eq!(summary.roles_applied, 5);
        assert_eq!(summary.errors, 0);

        let at_root = store.roles_at(&target.root).unwrap();
        assert!(at_root[&Role::Contributor].contains("alice"));
        assert!(at_root[&Role::Viewer].contains("bob"));

        // Ancestors of the project get traverse only.
        let base_roles = store.roles_at(tmp.path()).unwrap();
        assert!(base_roles[&Role::Traverse].contains("alice"));
        assert!(base_roles[&Role::Traverse].contains("bob"));
        assert!(!base_roles.contains_key(&Role::Contributor));
        assert_eq!(summary.traverse_applied, store.write_count() - 5);
    }

    #[test]
    fn second_run_is_nothing_to_do_without_force() {
        let (tmp, target) = project_tree();
        let (roles, users) = spec(&[("alice", Role::Manager)]);
        let store = MemoryRoler::new();
        let backends = Backends::memory(store.clone());
        let req = request(roles, users, tmp.path());

        run_set(&target, &req, &backends, &CancelFlag::new()).unwrap();
        let writes_after_first = store.write_count();

        let outcome = run_set(&target, &req, &backends, &CancelFlag::new()).unwrap();
        assert_eq!(outcome, RunOutcome::NothingToDo);
        assert_eq!(store.write_count(), writes_after_first);

        let forced = SetRequest { force: true, ..req };
        let outcome = run_set(&target, &forced, &backends, &CancelFlag::new()).unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert!(store.write_count() > writes_after_first);
    }

    #[test]
    fn cancelled_run_reports_interrupted_and_releases_lock() {
        let (tmp, target) = project_tree();
        let (roles, users) = spec(&[("alice", Role::Viewer)]);
        let backends = Backends::memory(MemoryRoler::new());
        let cancel = CancelFlag::new();
        cancel.trigger(libc::SIGTERM);

        let err = run_set(&target, &request(roles, users, tmp.path()), &backends, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted { signal } if signal == libc::SIGTERM));
        assert!(!target.root.join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn propagation_can_be_disabled() {
        let (tmp, target) = project_tree();
        let (roles, users) = spec(&[("alice", Role::Viewer)]);
        let store = MemoryRoler::new();
        let backends = Backends::memory(store.clone());

        let mut req = request(roles, users, tmp.path());
        req.propagate = false;
        let outcome = run_set(&target, &req, &backends, &CancelFlag::new()).unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.traverse_applied, 0);
        assert!(store.roles_at(tmp.path()).is_none());
    }

    #[test]
    fn single_file_target_is_not_locked() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("solo.dat");
        std::fs::write(&file, b"x").unwrap();
        let target = resolve_target(file.to_str().unwrap(), tmp.path(), "").unwrap();

        let (roles, users) = spec(&[("bob", Role::Writer)]);
        let store = MemoryRoler::new();
        let backends = Backends::memory(store.clone());
        let outcome = run_set(
            &target,
            &request(roles, users, tmp.path()),
            &backends,
            &CancelFlag::new(),
        )
        .unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert!(store.roles_at(&target.root).is_some());
    }

    #[test]
    fn held_lock_aborts_the_run() {
        let (tmp, target) = project_tree();
        let _held = LockGuard::acquire(&target.root).unwrap();

        let (roles, users) = spec(&[("alice", Role::Viewer)]);
        let backends = Backends::memory(MemoryRoler::new());
        let err = run_set(
            &target,
            &request(roles, users, tmp.path()),
            &backends,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::LockHeld { .. }));
    }
}
