//! Shared helpers for integration tests

use prjacl::acl::{Role, RoleMap};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build a project tree under a fresh storage base.
///
/// Layout: `<base>/<project>/{raw/{s1,s2}, doc}` with two data files in
/// each session directory. Returns the base tempdir and the project root.
#[allow(dead_code)]
pub fn project_tree(project: &str) -> (TempDir, PathBuf) {
    let base = TempDir::new().expect("tempdir");
    let root = base.path().join(project);
    for session in ["raw/s1", "raw/s2"] {
        let dir = root.join(session);
        std::fs::create_dir_all(&dir).expect("create session dir");
        std::fs::write(dir.join("data1.dat"), b"1").expect("write data");
        std::fs::write(dir.join("data2.dat"), b"2").expect("write data");
    }
    std::fs::create_dir(root.join("doc")).expect("create doc dir");
    (base, root)
}

/// Requested role map plus the traverse user union for one binding.
#[allow(dead_code)]
pub fn single_binding(role: Role, user: &str) -> (RoleMap, BTreeSet<String>) {
    let mut roles = RoleMap::new();
    roles.insert(role, BTreeSet::from([user.to_string()]));
    (roles, BTreeSet::from([user.to_string()]))
}

/// All paths in a tree, root included, via an independent implementation.
#[allow(dead_code)]
pub fn walkdir_paths(root: &Path, follow_links: bool) -> BTreeSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .collect()
}
