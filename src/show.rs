//! Project membership overview
//!
//! Scans the top level of the storage base and reports, per project, the
//! role a given user holds there. Only the project roots are consulted;
//! role state inside a project mirrors its root by construction.

use crate::acl::roler::Backends;
use crate::acl::Role;
use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::walker::{EntryType, PathEntry};
use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One membership found by [`run_show`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Membership {
    /// Project directory name under the base
    pub project: String,
    /// Role the user holds there
    pub role: Role,
}

/// List the projects under `base` where `user` holds a role.
///
/// Memberships are returned sorted by project name. `System` entries are
/// backend bookkeeping and never reported.
///
/// # Errors
///
/// [`Error::RootNotFound`] when the base cannot be listed;
/// [`Error::Interrupted`] when a termination signal arrives mid-scan.
/// Unreadable individual projects are logged and skipped.
pub fn run_show(
    user: &str,
    base: &Path,
    threads: usize,
    backends: &Backends,
    cancel: &CancelFlag,
) -> Result<Vec<Membership>> {
    let (dir_tx, dir_rx) = crossbeam_channel::bounded::<PathBuf>(threads * 2);
    let (member_tx, member_rx) = crossbeam_channel::unbounded::<Membership>();

    let handles: Vec<_> = (0..threads)
        .filter_map(|index| {
            let dir_rx = dir_rx.clone();
            let member_tx = member_tx.clone();
            let backends = backends.clone();
            let cancel = cancel.clone();
            let user = user.to_string();
            std::thread::Builder::new()
                .name(format!("show-{index}"))
                .spawn(move || scan_projects(&user, &dir_rx, &member_tx, &backends, &cancel))
                .map_err(|e| warn!(error = %e, "failed to spawn scan thread"))
                .ok()
        })
        .collect();
    drop(member_tx);

    let listing = std::fs::read_dir(base).map_err(|_| Error::RootNotFound {
        path: base.to_path_buf(),
    })?;
    for entry in listing.flatten() {
        if cancel.is_cancelled() {
            break;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir && dir_tx.send(entry.path()).is_err() {
            break;
        }
    }
    drop(dir_tx);

    let mut memberships: Vec<Membership> = member_rx.iter().collect();
    for handle in handles {
        if handle.join().is_err() {
            warn!("scan thread panicked");
        }
    }

    if let Some(signal) = cancel.signal() {
        return Err(Error::Interrupted { signal });
    }

    memberships.sort();
    memberships.dedup();
    Ok(memberships)
}

fn scan_projects(
    user: &str,
    dirs: &Receiver<PathBuf>,
    members: &Sender<Membership>,
    backends: &Backends,
    cancel: &CancelFlag,
) {
    for dir in dirs {
        if cancel.is_cancelled() {
            break;
        }
        let Some(project) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let entry = PathEntry::new(dir.clone(), EntryType::Dir);
        let roles = match backends.for_path(&dir).and_then(|b| b.get_roles(&entry)) {
            Ok(roles) => roles,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "cannot read roles");
                continue;
            }
        };
        for (role, users) in &roles {
            if *role == Role::System || !users.contains(user) {
                continue;
            }
            if members
                .send(Membership {
                    project: project.clone(),
                    role: *role,
                })
                .is_err()
            {
                return;
            }
        }
    }
}
