use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{ErrorKind, StageError};

fn validate(relative: &str) -> Result<&Path, StageError> {
    let path = Path::new(relative);
    if path.is_absolute() {
        return Err(StageError::InvalidPath {
            path: path.to_path_buf(),
            reason: "prune paths must be relative to the bundle root",
        });
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(StageError::InvalidPath {
            path: path.to_path_buf(),
            reason: "prune paths must not contain '..'",
        });
    }
    Ok(path)
}

/// Delete each configured path under `root` when present. Returns the paths
/// actually removed.
pub fn prune(root: &Path, paths: &[String]) -> Result<Vec<PathBuf>, StageError> {
    let mut removed = Vec::new();

    for relative in paths {
        let target = root.join(validate(relative)?);
        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(StageError::Io {
                    kind: ErrorKind::BundleFinish,
                    action: "failed to stat",
                    path: target,
                    source: e,
                });
            }
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        result.map_err(StageError::io(ErrorKind::BundleFinish, "failed to remove", &target))?;
        debug!(path = %target.display(), "pruned");
        removed.push(target);
    }

    Ok(removed)
}
