//! Backend selection and dispatch for role storage.
//!
//! Each supported storage system implements role reads and writes behind
//! the [`Backend`] enum. Resolution is per path, so a single run can in
//! principle touch trees served by different backends.

use crate::acl::posix::{PosixRoler, SetOptions};
use crate::acl::{RoleMap, RolePathMap};
use crate::error::{RolerError, RolerResult};
use crate::walker::PathEntry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A role storage backend bound to one path family.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Local POSIX ACLs via extended attributes
    Posix(PosixRoler),
    /// In-memory role store for dry runs and tests
    Memory(MemoryRoler),
}

impl Backend {
    /// Read the current role state of `entry`.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`RolerError`].
    pub fn get_roles(&self, entry: &PathEntry) -> RolerResult<RoleMap> {
        match self {
            Backend::Posix(roler) => roler.get_roles(entry),
            Backend::Memory(roler) => roler.get_roles(entry),
        }
    }

    /// Apply `desired` to `entry`, returning the resulting role state.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`RolerError`].
    pub fn set_roles(
        &self,
        entry: &PathEntry,
        desired: &RoleMap,
        options: &SetOptions,
    ) -> RolerResult<RolePathMap> {
        match self {
            Backend::Posix(roler) => roler.set_roles(entry, desired, options),
            Backend::Memory(roler) => roler.set_roles(entry, desired, options),
        }
    }
}

/// Per-path backend resolver handed to every pipeline stage.
#[derive(Debug, Clone)]
pub struct Backends {
    memory: Option<MemoryRoler>,
}

impl Backends {
    /// Resolver for a live run: POSIX ACLs on every path.
    #[must_use]
    pub fn live() -> Self {
        Self { memory: None }
    }

    /// Resolver routing every path to one shared in-memory store.
    #[must_use]
    pub fn memory(store: MemoryRoler) -> Self {
        Self {
            memory: Some(store),
        }
    }

    /// Check up front that every requested user can be resolved.
    ///
    /// The in-memory store keys on bare identifiers and accepts anything;
    /// the POSIX backend needs a uid per user, and failing one bad name at
    /// startup beats failing it once per enumerated path.
    ///
    /// # Errors
    ///
    /// [`RolerError::UnknownUser`] for the first unresolvable identifier.
    pub fn validate_users<'a, I>(&self, users: I) -> RolerResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.memory.is_some() {
            return Ok(());
        }
        for user in users {
            if crate::userdb::uid_for_name(user).is_none() {
                return Err(RolerError::UnknownUser {
                    user: user.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the backend serving `path`.
    ///
    /// # Errors
    ///
    /// [`RolerError::Unsupported`] when no backend can serve the path. The
    /// current backends together cover every local path, so this only fires
    /// for future backends with narrower path families.
    pub fn for_path(&self, path: &Path) -> RolerResult<Backend> {
        if let Some(store) = &self.memory {
            return Ok(Backend::Memory(store.clone()));
        }
        if path.is_absolute() {
            Ok(Backend::Posix(PosixRoler))
        } else {
            Err(RolerError::Unsupported {
                path: path.to_path_buf(),
            })
        }
    }
}

/// In-memory role store.
///
/// Clones share one map, so the resolver can hand a copy to every worker.
/// Mutations are counted, which lets tests assert that a short-circuited
/// run performed no writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoler {
    store: Arc<DashMap<PathBuf, RoleMap>>,
    writes: Arc<AtomicU64>,
}

impl MemoryRoler {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_roles` calls performed so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Stored role state for `path`, if any writes reached it.
    #[must_use]
    pub fn roles_at(&self, path: &Path) -> Option<RoleMap> {
        self.store.get(path).map(|r| r.clone())
    }

    fn get_roles(&self, entry: &PathEntry) -> RolerResult<RoleMap> {
        Ok(self
            .store
            .get(&entry.path)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    fn set_roles(
        &self,
        entry: &PathEntry,
        desired: &RoleMap,
        options: &SetOptions,
    ) -> RolerResult<RolePathMap> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.store.entry(entry.path.clone()).or_default();
        if options.exact {
            slot.clear();
        }
        for (role, users) in desired {
            slot.entry(*role).or_default().extend(users.iter().cloned());
        }
        Ok(RolePathMap {
            path: entry.path.clone(),
            roles: slot.clone(),
        })
    }
}
