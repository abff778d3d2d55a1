use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{ErrorKind, StageError};
use crate::finish::timestamps::normalize_timestamps;

/// Copies a finished bundle to its final location.
///
/// The copy is assembled in a sibling directory and swapped in only once it
/// is complete, so a failed publish leaves any previous output untouched.
/// File modes and symlinks are carried over and the copy is re-stamped with
/// `epoch`.
pub fn publish(bundle_root: &Path, output: &Path, epoch: i64) -> Result<PathBuf, StageError> {
    check_disjoint(bundle_root, output)?;

    let previous = match fs::symlink_metadata(output) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(StageError::io(ErrorKind::Workspace, "failed to stat", output)(e)),
    };
    if previous.as_ref().is_some_and(|m| !m.is_dir()) {
        return Err(StageError::InvalidPath {
            path: output.to_path_buf(),
            reason: "output exists and is not a directory",
        });
    }

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(StageError::io(ErrorKind::Workspace, "failed to create", parent))?;
    let staged = sibling_dir(parent, "publish")?;

    let files = copy_tree(bundle_root, staged.path())?;
    normalize_timestamps(staged.path(), epoch)?;

    if previous.is_some() {
        replace_dir(staged.path(), output, parent)?;
    } else {
        fs::rename(staged.path(), output)
            .map_err(StageError::io(ErrorKind::Workspace, "failed to move into", output))?;
    }

    info!(output = %output.display(), files, "bundle published");
    Ok(output.to_path_buf())
}

fn sibling_dir(parent: &Path, purpose: &str) -> Result<TempDir, StageError> {
    tempfile::Builder::new()
        .prefix(&format!(".gitvend-{purpose}-"))
        .tempdir_in(parent)
        .map_err(StageError::io(ErrorKind::Workspace, "failed to create temp dir in", parent))
}

/// Swap `staged` in for the existing `output` directory. The old contents are
/// moved aside first and restored if the swap fails.
fn replace_dir(staged: &Path, output: &Path, parent: &Path) -> Result<(), StageError> {
    let backup = sibling_dir(parent, "previous")?;
    fs::rename(output, backup.path())
        .map_err(StageError::io(ErrorKind::Workspace, "failed to move aside", output))?;

    if let Err(e) = fs::rename(staged, output) {
        if let Err(restore) = fs::rename(backup.path(), output) {
            warn!(path = %output.display(), error = %restore, "failed to restore previous output");
        }
        return Err(StageError::io(ErrorKind::Workspace, "failed to move into", output)(e));
    }

    if let Err(e) = backup.close() {
        warn!(path = %parent.display(), error = %e, "failed to remove previous output");
    }
    Ok(())
}

/// Copy the contents of `src_root` into the existing directory `dst_root`.
/// Returns the number of regular files copied.
fn copy_tree(src_root: &Path, dst_root: &Path) -> Result<usize, StageError> {
    let mut files = 0usize;
    for entry in WalkDir::new(src_root).sort_by_file_name() {
        let entry = entry.map_err(|e| StageError::Io {
            kind: ErrorKind::Workspace,
            action: "failed to walk",
            path: src_root.to_path_buf(),
            source: e.into(),
        })?;
        let src = entry.path();
        let relative = src.strip_prefix(src_root).map_err(|_| StageError::InvalidPath {
            path: src.to_path_buf(),
            reason: "entry escaped the bundle root",
        })?;
        let dst = dst_root.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dst)
                .map_err(StageError::io(ErrorKind::Workspace, "failed to create", &dst))?;
            let mode = entry
                .metadata()
                .map_err(|e| StageError::Io {
                    kind: ErrorKind::Workspace,
                    action: "failed to stat",
                    path: src.to_path_buf(),
                    source: e.into(),
                })?
                .permissions()
                .mode();
            fs::set_permissions(&dst, fs::Permissions::from_mode(mode))
                .map_err(StageError::io(ErrorKind::Workspace, "failed to chmod", &dst))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(src)
                .map_err(StageError::io(ErrorKind::Workspace, "failed to read link", src))?;
            symlink(&target, &dst)
                .map_err(StageError::io(ErrorKind::Workspace, "failed to link", &dst))?;
        } else {
            // fs::copy carries the permission bits along
            fs::copy(src, &dst)
                .map_err(StageError::io(ErrorKind::Workspace, "failed to copy", src))?;
            files += 1;
        }
    }
    Ok(files)
}

fn check_disjoint(bundle_root: &Path, output: &Path) -> Result<(), StageError> {
    let absolute = |path: &Path| {
        std::path::absolute(path)
            .map_err(StageError::io(ErrorKind::Workspace, "failed to resolve", path))
    };
    let bundle = absolute(bundle_root)?;
    let out = absolute(output)?;

    if out.starts_with(&bundle) || bundle.starts_with(&out) {
        return Err(StageError::InvalidPath {
            path: output.to_path_buf(),
            reason: "output overlaps the staged bundle",
        });
    }
    Ok(())
}
