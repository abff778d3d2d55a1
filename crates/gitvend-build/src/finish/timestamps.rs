use std::path::Path;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::{ErrorKind, StageError};

/// Set atime and mtime of everything under `root` (root included) to
/// `epoch`. Symlinks are stamped themselves, never their targets.
///
/// Returns how many entries carried a different mtime; a second run
/// returns 0. Access times are rewritten unconditionally since walking a
/// directory may bump its atime.
pub fn normalize_timestamps(root: &Path, epoch: i64) -> Result<usize, StageError> {
    let stamp = FileTime::from_unix_time(epoch, 0);
    let mut changed = 0;

    for entry in WalkDir::new(root).contents_first(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            StageError::Io {
                kind: ErrorKind::BundleFinish,
                action: "failed to walk",
                path,
                source: e.into(),
            }
        })?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| StageError::Io {
            kind: ErrorKind::BundleFinish,
            action: "failed to stat",
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        if FileTime::from_last_modification_time(&metadata) != stamp {
            changed += 1;
        }

        let result = if entry.path_is_symlink() {
            filetime::set_symlink_file_times(path, stamp, stamp)
        } else {
            filetime::set_file_times(path, stamp, stamp)
        };
        result.map_err(StageError::io(ErrorKind::BundleFinish, "failed to stamp", path))?;
    }

    Ok(changed)
}
