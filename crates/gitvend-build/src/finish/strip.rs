use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use gitvend_core::BuildEnv;
use gitvend_runner::{CommandSpec, ProcessRunner, Step, StepRunner};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{ErrorKind, StageError};
use crate::stages::quote_path;

/// Enough bytes for `infer` to recognise an ELF header.
const ELF_PROBE_LEN: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMode {
    /// `--strip-all`, for executables.
    All,
    /// `--strip-unneeded`, for shared objects.
    Unneeded,
}

impl StripMode {
    fn flag(self) -> &'static str {
        match self {
            Self::All => "--strip-all",
            Self::Unneeded => "--strip-unneeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripTarget {
    pub path: PathBuf,
    pub mode: StripMode,
}

/// Whether the file content starts with an ELF header.
pub fn is_elf(path: &Path) -> Result<bool, StageError> {
    let file = fs::File::open(path)
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to open", path))?;
    let mut head = Vec::with_capacity(ELF_PROBE_LEN as usize);
    file.take(ELF_PROBE_LEN)
        .read_to_end(&mut head)
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to read", path))?;
    Ok(infer::app::is_elf(&head))
}

fn is_shared_object(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().contains(".so"))
}

/// Regular ELF files under `root` that are executable or named like a
/// shared object, in sorted traversal order.
pub fn strip_targets(root: &Path) -> Result<Vec<StripTarget>, StageError> {
    let mut targets = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| StageError::Io {
            kind: ErrorKind::BundleFinish,
            action: "failed to walk",
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let mode = entry
            .metadata()
            .map_err(|e| StageError::Io {
                kind: ErrorKind::BundleFinish,
                action: "failed to stat",
                path: path.to_path_buf(),
                source: e.into(),
            })?
            .permissions()
            .mode();

        let shared = is_shared_object(path);
        let executable = mode & 0o111 != 0;
        if !(shared || executable) || !is_elf(path)? {
            continue;
        }

        targets.push(StripTarget {
            path: path.to_path_buf(),
            mode: if shared {
                StripMode::Unneeded
            } else {
                StripMode::All
            },
        });
    }

    Ok(targets)
}

pub fn strip_step(target: &StripTarget, cwd: &Path, env: &BuildEnv) -> Step<ErrorKind> {
    Step::new(
        format!("strip {}", target.path.display()),
        CommandSpec::new(
            format!(
                "strip --preserve-dates {} {}",
                target.mode.flag(),
                quote_path(&target.path)
            ),
            cwd,
            env,
        ),
        ErrorKind::BundleFinish,
    )
}

/// Strip every ELF target under `root`. Returns the number of files stripped.
pub async fn strip_bundle<R: ProcessRunner>(
    steps: &StepRunner<R>,
    root: &Path,
    env: &BuildEnv,
    cancel: &CancellationToken,
) -> Result<usize, StageError> {
    let targets = strip_targets(root)?;
    for target in &targets {
        steps.run(&strip_step(target, root, env), cancel).await?;
    }
    Ok(targets.len())
}
