//! Target resolution
//!
//! Turns the positional argument into the pair of paths a run operates on:
//! the path as given (made absolute) and its fully resolved form. An
//! argument starting with at least seven digits is treated as a project
//! number and anchored under the storage base; anything else is taken as a
//! plain path.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Digits required before an argument is read as a project number.
const PROJECT_NUMBER_DIGITS: usize = 7;

/// The resolved operation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Fully resolved path the run walks
    pub root: PathBuf,
    /// Absolute path as given, before symlink resolution
    pub root_sym: PathBuf,
    /// Whether the resolved root is a directory
    pub is_dir: bool,
}

/// Whether `arg` names a project by number rather than by path.
fn is_project_number(arg: &str) -> bool {
    arg.len() >= PROJECT_NUMBER_DIGITS
        && arg
            .bytes()
            .take(PROJECT_NUMBER_DIGITS)
            .all(|b| b.is_ascii_digit())
}

/// Resolve the positional argument into a [`Target`].
///
/// `sub_path` narrows a project-number target to a subdirectory; it is
/// ignored for plain path arguments, which already carry any subdirectory.
///
/// # Errors
///
/// [`Error::RootNotFound`] when the named path does not exist or cannot be
/// resolved.
pub fn resolve_target(arg: &str, base: &Path, sub_path: &str) -> Result<Target> {
    let given = if is_project_number(arg) {
        base.join(arg).join(sub_path)
    } else {
        absolutize(Path::new(arg))?
    };

    let root = given
        .canonicalize()
        .map_err(|_| Error::RootNotFound { path: given.clone() })?;
    let is_dir = root
        .metadata()
        .map_err(|_| Error::RootNotFound { path: root.clone() })?
        .is_dir();

    Ok(Target {
        root,
        root_sym: given,
        is_dir,
    })
}

/// Make a path absolute without resolving symlinks.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
