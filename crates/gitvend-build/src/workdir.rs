use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{ErrorKind, StageError};

/// The directory a run owns for downloads, sources, and staging.
///
/// A provisioned directory is deleted when dropped; a caller-provided one is
/// left in place.
#[derive(Debug)]
pub enum WorkDir {
    Provisioned(TempDir),
    Existing(PathBuf),
}

impl WorkDir {
    /// A fresh throwaway directory under the system temp location.
    pub fn provision() -> Result<Self, StageError> {
        let dir = tempfile::Builder::new()
            .prefix("gitvend-")
            .tempdir()
            .map_err(StageError::io(
                ErrorKind::Workspace,
                "failed to provision",
                &std::env::temp_dir(),
            ))?;
        info!(path = %dir.path().display(), "provisioned working directory");
        Ok(Self::Provisioned(dir))
    }

    /// Use `path`, creating it if needed.
    pub fn existing(path: &Path) -> Result<Self, StageError> {
        if path.exists() && !path.is_dir() {
            return Err(StageError::InvalidPath {
                path: path.to_path_buf(),
                reason: "working directory is not a directory",
            });
        }
        fs::create_dir_all(path)
            .map_err(StageError::io(ErrorKind::Workspace, "failed to create", path))?;
        debug!(path = %path.display(), "using caller-provided working directory");
        Ok(Self::Existing(path.to_path_buf()))
    }

    /// `existing(path)` when a path is given, `provision()` otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self, StageError> {
        match path {
            Some(path) => Self::existing(path),
            None => Self::provision(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Provisioned(dir) => dir.path(),
            Self::Existing(path) => path,
        }
    }

    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned(_))
    }
}
