//! POSIX-ACL-backed role storage
//!
//! Role state lives in the `system.posix_acl_access` extended attribute,
//! using the kernel's version-2 wire format: a 4-byte header followed by
//! 8-byte entries of `{tag: u16, perm: u16, id: u32}`, little-endian on all
//! supported targets (native-endian here, matching the kernel interface).
//!
//! Roles are encoded as named-user entries with distinct permission
//! triples: manager `rwx`, contributor `rw-`, writer `-w-`, viewer `r--`,
//! traverse `--x`. A named entry holding any other triple is reported under
//! [`Role::System`] and never rewritten. Owner, owning-group, other, and
//! mask entries are backend bookkeeping and never surface in a [`RoleMap`].

use crate::acl::{Role, RoleMap, RolePathMap};
use crate::error::{RolerError, RolerResult};
use crate::userdb;
use crate::walker::PathEntry;
use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Access ACL attribute name.
pub const XATTR_ACL_ACCESS: &str = "system.posix_acl_access";
/// Default (inheritance) ACL attribute name, directories only.
pub const XATTR_ACL_DEFAULT: &str = "system.posix_acl_default";

const ACL_EA_VERSION: u32 = 0x0002;

const ACL_USER_OBJ: u16 = 0x01;
const ACL_USER: u16 = 0x02;
const ACL_GROUP_OBJ: u16 = 0x04;
const ACL_GROUP: u16 = 0x08;
const ACL_MASK: u16 = 0x10;
const ACL_OTHER: u16 = 0x20;

const ACL_UNDEFINED_ID: u32 = u32::MAX;

const PERM_READ: u16 = 0x04;
const PERM_WRITE: u16 = 0x02;
const PERM_EXEC: u16 = 0x01;

const ENTRY_SIZE: usize = 8;
const HEADER_SIZE: usize = 4;

/// One decoded ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclEntry {
    /// Entry tag (`ACL_USER_OBJ`, `ACL_USER`, ...)
    pub tag: u16,
    /// Permission triple, `rwx` in the low three bits
    pub perm: u16,
    /// uid/gid for named entries, `ACL_UNDEFINED_ID` otherwise
    pub id: u32,
}

/// Permission triple encoding a role, if the role is storable.
const fn role_perm(role: Role) -> Option<u16> {
    match role {
        Role::Manager => Some(PERM_READ | PERM_WRITE | PERM_EXEC),
        Role::Contributor => Some(PERM_READ | PERM_WRITE),
        Role::Writer => Some(PERM_WRITE),
        Role::Viewer => Some(PERM_READ),
        Role::Traverse => Some(PERM_EXEC),
        Role::System => None,
    }
}

/// Role represented by a stored permission triple.
const fn perm_role(perm: u16) -> Role {
    match perm & 0x07 {
        p if p == PERM_READ | PERM_WRITE | PERM_EXEC => Role::Manager,
        p if p == PERM_READ | PERM_WRITE => Role::Contributor,
        p if p == PERM_WRITE => Role::Writer,
        p if p == PERM_READ => Role::Viewer,
        p if p == PERM_EXEC => Role::Traverse,
        _ => Role::System,
    }
}

/// Decode a `system.posix_acl_*` attribute value.
pub(crate) fn decode_acl(buf: &[u8]) -> Result<Vec<AclEntry>, String> {
    if buf.len() < HEADER_SIZE || (buf.len() - HEADER_SIZE) % ENTRY_SIZE != 0 {
        return Err(format!("malformed ACL attribute of {} bytes", buf.len()));
    }
    let version = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if version != ACL_EA_VERSION {
        return Err(format!("unsupported ACL version {version}"));
    }
    let mut entries = Vec::with_capacity((buf.len() - HEADER_SIZE) / ENTRY_SIZE);
    for chunk in buf[HEADER_SIZE..].chunks_exact(ENTRY_SIZE) {
        entries.push(AclEntry {
            tag: u16::from_ne_bytes([chunk[0], chunk[1]]),
            perm: u16::from_ne_bytes([chunk[2], chunk[3]]),
            id: u32::from_ne_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
        });
    }
    Ok(entries)
}

/// Encode entries into the attribute wire format.
pub(crate) fn encode_acl(entries: &[AclEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + entries.len() * ENTRY_SIZE);
    buf.extend_from_slice(&ACL_EA_VERSION.to_ne_bytes());
    for entry in entries {
        buf.extend_from_slice(&entry.tag.to_ne_bytes());
        buf.extend_from_slice(&entry.perm.to_ne_bytes());
        buf.extend_from_slice(&entry.id.to_ne_bytes());
    }
    buf
}

/// Synthesize the three mandatory entries from classic mode bits.
///
/// Used when a path has no ACL attribute yet.
pub(crate) fn base_entries(mode: u32) -> Vec<AclEntry> {
    #[allow(clippy::cast_possible_truncation)]
    let triple = |shift: u32| ((mode >> shift) & 0x07) as u16;
    vec![
        AclEntry {
            tag: ACL_USER_OBJ,
            perm: triple(6),
            id: ACL_UNDEFINED_ID,
        },
        AclEntry {
            tag: ACL_GROUP_OBJ,
            perm: triple(3),
            id: ACL_UNDEFINED_ID,
        },
        AclEntry {
            tag: ACL_OTHER,
            perm: triple(0),
            id: ACL_UNDEFINED_ID,
        },
    ]
}

/// Merge a requested role map into existing entries.
///
/// Union semantics: each requested user's named entry is created or
/// rewritten to the requested role's triple; nothing else changes. With
/// `exact`, all previously role-mapped named-user entries are dropped
/// first (entries reported as `System` survive either way).
fn merge_roles(entries: &mut Vec<AclEntry>, desired: &RoleMap, exact: bool) -> RolerResult<()> {
    if exact {
        entries.retain(|e| e.tag != ACL_USER || perm_role(e.perm) == Role::System);
    }
    for (role, users) in desired {
        let Some(perm) = role_perm(*role) else {
            continue; // System is never written
        };
        for user in users {
            let uid = userdb::uid_for_name(user).ok_or_else(|| RolerError::UnknownUser {
                user: user.clone(),
            })?;
            match entries.iter_mut().find(|e| e.tag == ACL_USER && e.id == uid) {
                Some(entry) => entry.perm = perm,
                None => entries.push(AclEntry {
                    tag: ACL_USER,
                    perm,
                    id: uid,
                }),
            }
        }
    }
    recompute_mask(entries);
    entries.sort_by_key(|e| (e.tag, e.id));
    Ok(())
}

/// Recompute (or insert) the mask entry required alongside named entries.
///
/// The mask is the union of all named-user, named-group, and owning-group
/// permissions, per the POSIX.1e effective-rights rule.
fn recompute_mask(entries: &mut Vec<AclEntry>) {
    let has_named = entries
        .iter()
        .any(|e| e.tag == ACL_USER || e.tag == ACL_GROUP);
    if !has_named {
        entries.retain(|e| e.tag != ACL_MASK);
        return;
    }
    let mask = entries
        .iter()
        .filter(|e| matches!(e.tag, ACL_USER | ACL_GROUP | ACL_GROUP_OBJ))
        .fold(0_u16, |acc, e| acc | e.perm);
    match entries.iter_mut().find(|e| e.tag == ACL_MASK) {
        Some(entry) => entry.perm = mask,
        None => entries.push(AclEntry {
            tag: ACL_MASK,
            perm: mask,
            id: ACL_UNDEFINED_ID,
        }),
    }
}

/// Project the named-user entries back into a role map.
fn roles_from_entries(entries: &[AclEntry]) -> RoleMap {
    let mut roles = RoleMap::new();
    for entry in entries.iter().filter(|e| e.tag == ACL_USER) {
        let role = perm_role(entry.perm);
        roles
            .entry(role)
            .or_insert_with(BTreeSet::new)
            .insert(userdb::name_for_uid(entry.id));
    }
    roles
}

/// Options controlling one `set_roles` application.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Mirror the named entries into the directory default ACL so new
    /// children inherit them.
    pub propagate_default: bool,
    /// Replace existing role entries instead of the additive union.
    pub exact: bool,
}

/// Role backend over local POSIX ACLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixRoler;

impl PosixRoler {
    /// Read the role state currently applied at `entry`.
    ///
    /// # Errors
    ///
    /// [`RolerError::NotFound`] when the path vanished,
    /// [`RolerError::Unsupported`] on filesystems without xattr ACLs,
    /// [`RolerError::Backend`] otherwise.
    pub fn get_roles(&self, entry: &PathEntry) -> RolerResult<RoleMap> {
        match read_xattr(&entry.path, XATTR_ACL_ACCESS)? {
            Some(buf) => {
                let entries = decode_acl(&buf).map_err(|reason| RolerError::Backend {
                    path: entry.path.clone(),
                    reason,
                })?;
                Ok(roles_from_entries(&entries))
            }
            // No ACL attribute: mode-only permissions, no named roles.
            None => {
                // Still surface NotFound for vanished paths.
                if entry.path.symlink_metadata().is_err() {
                    return Err(RolerError::NotFound {
                        path: entry.path.clone(),
                    });
                }
                Ok(RoleMap::new())
            }
        }
    }

    /// Apply `desired` on `entry` and return the resulting full role state.
    ///
    /// Roles absent from `desired` are untouched; requested users are
    /// united with (or, with [`SetOptions::exact`], substituted for) the
    /// existing ones.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::get_roles`], plus
    /// [`RolerError::UnknownUser`] for unresolvable identifiers.
    pub fn set_roles(
        &self,
        entry: &PathEntry,
        desired: &RoleMap,
        options: &SetOptions,
    ) -> RolerResult<RolePathMap> {
        let mut entries = match read_xattr(&entry.path, XATTR_ACL_ACCESS)? {
            Some(buf) => decode_acl(&buf).map_err(|reason| RolerError::Backend {
                path: entry.path.clone(),
                reason,
            })?,
            None => {
                let meta = std::fs::metadata(&entry.path).map_err(|_| RolerError::NotFound {
                    path: entry.path.clone(),
                })?;
                base_entries(meta.permissions().mode())
            }
        };

        merge_roles(&mut entries, desired, options.exact)?;
        write_xattr(&entry.path, XATTR_ACL_ACCESS, &encode_acl(&entries))?;

        if options.propagate_default && entry.is_dir() {
            write_xattr(&entry.path, XATTR_ACL_DEFAULT, &encode_acl(&entries))?;
        }

        Ok(RolePathMap {
            path: entry.path.clone(),
            roles: roles_from_entries(&entries),
        })
    }
}

fn c_path(path: &Path) -> RolerResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| RolerError::Backend {
        path: path.to_path_buf(),
        reason: "path contains interior NUL".to_string(),
    })
}

/// Fetch an extended attribute, `None` when it is not set.
fn read_xattr(path: &Path, name: &str) -> RolerResult<Option<Vec<u8>>> {
    let c_path = c_path(path)?;
    let c_name = CString::new(name).map_err(|_| RolerError::Backend {
        path: path.to_path_buf(),
        reason: "bad attribute name".to_string(),
    })?;

    // Size query, then the actual fetch; the attribute may grow in between,
    // in which case ERANGE surfaces as a backend failure and the entry is
    // retried on the next invocation.
    let size = unsafe { libc::getxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0) };
    if size < 0 {
        let errno = last_errno();
        return if errno == libc::ENODATA {
            Ok(None)
        } else {
            Err(RolerError::from_errno(path, errno))
        };
    }
    #[allow(clippy::cast_sign_loss)]
    let mut buf = vec![0_u8; size as usize];
    let read = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr().cast::<libc::c_void>(),
            buf.len(),
        )
    };
    if read < 0 {
        return Err(RolerError::from_errno(path, last_errno()));
    }
    #[allow(clippy::cast_sign_loss)]
    buf.truncate(read as usize);
    Ok(Some(buf))
}

fn write_xattr(path: &Path, name: &str, value: &[u8]) -> RolerResult<()> {
    let c_path = c_path(path)?;
    let c_name = CString::new(name).map_err(|_| RolerError::Backend {
        path: path.to_path_buf(),
        reason: "bad attribute name".to_string(),
    })?;
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast::<libc::c_void>(),
            value.len(),
            0,
        )
    };
    if rc < 0 {
        return Err(RolerError::from_errno(path, last_errno()));
    }
    Ok(())
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::walker::EntryType;

    fn named(uid: u32, perm: u16) -> AclEntry {
        AclEntry {
            tag: ACL_USER,
            perm,
            id: uid,
        }
    }

    #[test]
    fn codec_round_trips() {
        let entries = vec![
            AclEntry {
                tag: ACL_USER_OBJ,
                perm: 7,
                id: ACL_UNDEFINED_ID,
            },
            named(1000, 6),
            AclEntry {
                tag: ACL_GROUP_OBJ,
                perm: 5,
                id: ACL_UNDEFINED_ID,
            },
            AclEntry {
                tag: ACL_MASK,
                perm: 7,
                id: ACL_UNDEFINED_ID,
            },
            AclEntry {
                tag: ACL_OTHER,
                perm: 0,
                id: ACL_UNDEFINED_ID,
            },
        ];
        assert_eq!(decode_acl(&encode_acl(&entries)).unwrap(), entries);
    }

    #[test]
    fn decode_rejects_bad_version_and_size() {
        assert!(decode_acl(&[1, 0, 0, 0]).is_err());
        assert!(decode_acl(&[2, 0, 0, 0, 1]).is_err());
        assert!(decode_acl(&[]).is_err());
    }

    #[test]
    fn base_entries_mirror_mode_bits() {
        let entries = base_entries(0o750);
        assert_eq!(entries[0].perm, 0b111);
        assert_eq!(entries[1].perm, 0b101);
        assert_eq!(entries[2].perm, 0b000);
    }

    #[test]
    fn role_perm_mapping_is_invertible() {
        for role in Role::ASSIGNABLE {
            let perm = role_perm(role).unwrap();
            assert_eq!(perm_role(perm), role);
        }
        assert_eq!(perm_role(role_perm(Role::Traverse).unwrap()), Role::Traverse);
    }

    #[test]
    fn unmapped_triples_report_as_system() {
        assert_eq!(perm_role(0b101), Role::System);
        assert_eq!(perm_role(0b011), Role::System);
        assert_eq!(perm_role(0), Role::System);
    }

    #[test]
    fn merge_is_additive_union() {
        let mut entries = base_entries(0o755);
        entries.push(named(1000, role_perm(Role::Viewer).unwrap()));

        let mut desired = RoleMap::new();
        desired.insert(
            Role::Contributor,
            ["2000".to_string()].into_iter().collect(),
        );
        merge_roles(&mut entries, &desired, false).unwrap();

        // Existing viewer preserved, new contributor added.
        assert!(entries.contains(&named(1000, role_perm(Role::Viewer).unwrap())));
        assert!(entries.contains(&named(2000, role_perm(Role::Contributor).unwrap())));
    }

    #[test]
    fn merge_rewrites_requested_users_role() {
        let mut entries = base_entries(0o755);
        entries.push(named(1000, role_perm(Role::Viewer).unwrap()));

        let mut desired = RoleMap::new();
        desired.insert(Role::Manager, ["1000".to_string()].into_iter().collect());
        merge_roles(&mut entries, &desired, false).unwrap();

        let entry = entries
            .iter()
            .find(|e| e.tag == ACL_USER && e.id == 1000)
            .unwrap();
        assert_eq!(perm_role(entry.perm), Role::Manager);
    }

    #[test]
    fn exact_merge_drops_unrequested_role_entries() {
        let mut entries = base_entries(0o755);
        entries.push(named(1000, role_perm(Role::Viewer).unwrap()));
        entries.push(named(1001, 0b101)); // System-mapped, must survive

        let mut desired = RoleMap::new();
        desired.insert(Role::Writer, ["2000".to_string()].into_iter().collect());
        merge_roles(&mut entries, &desired, true).unwrap();

        assert!(!entries.iter().any(|e| e.tag == ACL_USER && e.id == 1000));
        assert!(entries.iter().any(|e| e.tag == ACL_USER && e.id == 1001));
        assert!(entries.iter().any(|e| e.tag == ACL_USER && e.id == 2000));
    }

    #[test]
    fn mask_is_union_of_named_and_group_perms() {
        let mut entries = base_entries(0o740);
        entries.push(named(1000, 0b001));
        recompute_mask(&mut entries);
        let mask = entries.iter().find(|e| e.tag == ACL_MASK).unwrap();
        // group-obj r-- | named --x
        assert_eq!(mask.perm, 0b101);
    }

    #[test]
    fn mask_removed_when_no_named_entries_remain() {
        let mut entries = base_entries(0o755);
        entries.push(AclEntry {
            tag: ACL_MASK,
            perm: 7,
            id: ACL_UNDEFINED_ID,
        });
        recompute_mask(&mut entries);
        assert!(!entries.iter().any(|e| e.tag == ACL_MASK));
    }

    #[test]
    fn merge_sorts_entries_canonically() {
        let mut entries = base_entries(0o755);
        let mut desired = RoleMap::new();
        desired.insert(
            Role::Viewer,
            ["3000".to_string(), "1000".to_string()]
                .into_iter()
                .collect(),
        );
        merge_roles(&mut entries, &desired, false).unwrap();
        let tags: Vec<u16> = entries.iter().map(|e| e.tag).collect();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        assert_eq!(tags, sorted);
    }

    #[test]
    fn set_and_get_round_trip_on_real_filesystem() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("proj");
        std::fs::create_dir(&dir).unwrap();
        let entry = PathEntry::new(dir, EntryType::Dir);

        let mut desired = RoleMap::new();
        desired.insert(
            Role::Contributor,
            ["41000".to_string()].into_iter().collect(),
        );

        let roler = PosixRoler;
        let applied = match roler.set_roles(&entry, &desired, &SetOptions::default()) {
            Ok(applied) => applied,
            // tmpdir may sit on a filesystem without ACL xattrs
            Err(RolerError::Unsupported { .. }) => return,
            Err(e) => panic!("unexpected backend failure: {e}"),
        };
        assert!(applied.roles[&Role::Contributor].contains("41000"));

        let now = roler.get_roles(&entry).unwrap();
        assert_eq!(now, applied.roles);
    }

    #[test]
    fn get_roles_on_missing_path_is_not_found() {
        let entry = PathEntry::new("/nonexistent/prjacl".into(), EntryType::File);
        let err = PosixRoler.get_roles(&entry).unwrap_err();
        assert!(matches!(
            err,
            RolerError::NotFound { .. } | RolerError::Backend { .. }
        ));
    }
}
