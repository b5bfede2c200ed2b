//! Role model: the role enumeration, role→users maps, and role
//! specification parsing/validation.
//!
//! A [`RoleMap`] expresses which users are *requested* for which roles in
//! one operation. Absence of a role key means "no change requested for that
//! role", never "clear the role".

pub mod posix;
pub mod roler;

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

/// A named capability level granted to a set of users on a path.
///
/// `Traverse` is derived from the requested roles, never requested
/// explicitly. `System` is reserved for backend-internal bookkeeping and is
/// never user-assignable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Full control over the project tree
    Manager,
    /// Read and write access
    Contributor,
    /// Write-only drop-box access
    Writer,
    /// Read-only access
    Viewer,
    /// Pass-through permission on ancestor directories
    Traverse,
    /// Backend bookkeeping entries (mask, unmapped permissions)
    System,
}

impl Role {
    /// All roles a caller may request explicitly.
    pub const ASSIGNABLE: [Role; 4] = [
        Role::Manager,
        Role::Contributor,
        Role::Writer,
        Role::Viewer,
    ];

    /// Lowercase role name as used in CLI output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Contributor => "contributor",
            Role::Writer => "writer",
            Role::Viewer => "viewer",
            Role::Traverse => "traverse",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from role to the set of user identifiers holding it.
///
/// Ordered maps keep reporting output deterministic.
pub type RoleMap = BTreeMap<Role, BTreeSet<String>>;

/// The post-application role state of one path.
///
/// Emitted by the role application stage for every successfully updated
/// entry; drives both reporting and the traverse propagator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePathMap {
    /// Absolute path the roles were applied to
    pub path: PathBuf,
    /// Full role state of the path after application
    pub roles: RoleMap,
}

/// Render a role map as `role=user1,user2 ...` for log lines.
#[must_use]
pub fn format_roles(roles: &RoleMap) -> String {
    let mut parts = Vec::with_capacity(roles.len());
    for (role, users) in roles {
        let list: Vec<&str> = users.iter().map(String::as_str).collect();
        parts.push(format!("{}={}", role, list.join(",")));
    }
    parts.join(" ")
}

/// Parse and validate per-role user lists into a requested [`RoleMap`].
///
/// `specs` pairs each assignable role with its comma-separated user list
/// from the command line (empty strings mean "not requested"). Returns the
/// requested map plus the union of all requested users, which becomes the
/// traverse user set.
///
/// # Errors
///
/// - [`Error::SelfAssignment`] when `operator` appears as a target user
/// - [`Error::DuplicateUser`] when a user appears under two roles
/// - [`Error::ReservedRole`] when a non-assignable role carries users
pub fn parse_role_spec(
    specs: &[(Role, &str)],
    operator: &str,
) -> Result<(RoleMap, BTreeSet<String>)> {
    let mut roles = RoleMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut union = BTreeSet::new();

    for (role, spec) in specs {
        let users: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .collect();
        if users.is_empty() {
            continue;
        }
        if !Role::ASSIGNABLE.contains(role) {
            return Err(Error::ReservedRole {
                role: role.to_string(),
            });
        }

        let entry = roles.entry(*role).or_default();
        for user in users {
            if user == operator {
                return Err(Error::SelfAssignment {
                    user: user.to_string(),
                });
            }
            if !seen.insert(user.to_string()) {
                return Err(Error::DuplicateUser {
                    user: user.to_string(),
                });
            }
            entry.insert(user.to_string());
            union.insert(user.to_string());
        }
    }

    Ok((roles, union))
}

/// Build the traverse-only role map from the union of requested users.
#[must_use]
pub fn traverse_map(users: &BTreeSet<String>) -> RoleMap {
    let mut map = RoleMap::new();
    if !users.is_empty() {
        map.insert(Role::Traverse, users.clone());
    }
    map
}

/// Check whether every requested binding already holds in `current`.
///
/// Drives the "nothing to do" short-circuit before any mutation.
#[must_use]
pub fn roles_satisfied(current: &RoleMap, requested: &RoleMap) -> bool {
    requested.iter().all(|(role, users)| {
        current
            .get(role)
            .is_some_and(|have| users.is_subset(have))
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rstest::rstest;

    fn spec<'a>(
        manager: &'a str,
        contributor: &'a str,
        viewer: &'a str,
    ) -> Vec<(Role, &'a str)> {
        vec![
            (Role::Manager, manager),
            (Role::Contributor, contributor),
            (Role::Viewer, viewer),
        ]
    }

    #[test]
    fn parses_users_into_roles_and_union() {
        let (roles, union) = parse_role_spec(&spec("honlee", "edwger,alice", ""), "op").unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles[&Role::Manager].contains("honlee"));
        assert!(roles[&Role::Contributor].contains("alice"));
        assert!(!roles.contains_key(&Role::Viewer));
        assert_eq!(union.len(), 3);
    }

    #[rstest]
    #[case("op", "", "")]
    #[case("", "x,op", "")]
    #[case("", "", "op")]
    fn rejects_operator_as_target(
        #[case] manager: &str,
        #[case] contributor: &str,
        #[case] viewer: &str,
    ) {
        let err = parse_role_spec(&spec(manager, contributor, viewer), "op").unwrap_err();
        assert!(matches!(err, Error::SelfAssignment { user } if user == "op"));
    }

    #[rstest]
    #[case("alice", "alice", "")]
    #[case("", "bob", "bob")]
    #[case("carol,carol", "", "")]
    fn rejects_duplicate_users(
        #[case] manager: &str,
        #[case] contributor: &str,
        #[case] viewer: &str,
    ) {
        let err = parse_role_spec(&spec(manager, contributor, viewer), "op").unwrap_err();
        assert!(matches!(err, Error::DuplicateUser { .. }));
    }

    #[test]
    fn rejects_traverse_requests() {
        let err = parse_role_spec(&[(Role::Traverse, "alice")], "op").unwrap_err();
        assert!(matches!(err, Error::ReservedRole { .. }));
    }

    #[test]
    fn empty_and_whitespace_lists_are_not_requests() {
        let (roles, union) = parse_role_spec(&spec("", " , ", ""), "op").unwrap();
        assert!(roles.is_empty());
        assert!(union.is_empty());
    }

    #[test]
    fn satisfied_when_requested_subset_of_current() {
        let (requested, _) = parse_role_spec(&spec("", "alice", ""), "op").unwrap();
        let mut current = RoleMap::new();
        current.insert(
            Role::Contributor,
            ["alice", "bob"].iter().map(|s| (*s).to_string()).collect(),
        );
        assert!(roles_satisfied(&current, &requested));

        let (more, _) = parse_role_spec(&spec("carol", "alice", ""), "op").unwrap();
        assert!(!roles_satisfied(&current, &more));
    }

    #[test]
    fn traverse_map_carries_union() {
        let users: BTreeSet<String> = ["a", "b"].iter().map(|s| (*s).to_string()).collect();
        let map = traverse_map(&users);
        assert_eq!(map[&Role::Traverse].len(), 2);
        assert!(traverse_map(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn format_is_deterministic() {
        let mut roles = RoleMap::new();
        roles.insert(Role::Viewer, ["bob".to_string()].into_iter().collect());
        roles.insert(
            Role::Contributor,
            ["alice".to_string()].into_iter().collect(),
        );
        assert_eq!(format_roles(&roles), "contributor=alice viewer=bob");
    }
}
