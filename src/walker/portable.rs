//! Portable enumeration fallback for platforms without `getdents64`.
//!
//! Same emission contract as the fast path, at the cost of one metadata
//! call per entry. Symlinked directories are expanded in place when
//! link-following is enabled, though entries keep their link-side paths.

use super::{EntryType, PathEntry, Walker};
use crate::lock::LOCK_FILE_NAME;
use crossbeam_channel::Sender;
use std::ffi::OsStr;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

pub(super) fn walk_dir(walker: &Walker, dir: &Path, tx: &Sender<PathEntry>) {
    for dent in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(walker.follow_links)
    {
        if walker.cancel.is_cancelled() {
            return;
        }
        let dent = match dent {
            Ok(dent) => dent,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "directory read failed, skipping entry");
                continue;
            }
        };
        // The run's own lock file lives inside the root; never emit it.
        if dent.file_name() == OsStr::new(LOCK_FILE_NAME) {
            continue;
        }
        let file_type = if dent.file_type().is_dir() {
            EntryType::Dir
        } else if dent.file_type().is_file() {
            EntryType::File
        } else {
            EntryType::Unknown
        };
        if tx
            .send(PathEntry::new(dent.into_path(), file_type))
            .is_err()
        {
            return;
        }
    }
}
