//! Turns the raw `make install` output into a self-contained bundle.
//!
//! ```text
//! staging/
//!   1. helper      ── git-remote-https present and executable
//!   2. libraries   ── ldd → usr/lib/ (system libraries skipped)
//!   3. timestamps  ── every entry → SOURCE_DATE_EPOCH
//!   4. strip       ── ELF executables and shared objects
//!   5. prune       ── docs, locales, GUI tools
//!   6. launcher    ── ./git
//!   7. timestamps  ── again, for the launcher and pruned parents
//! ```

pub mod helper;
pub mod launcher;
pub mod libs;
pub mod prune;
pub mod strip;
pub mod timestamps;

use std::path::{Path, PathBuf};

use gitvend_core::{BuildEnv, BundleConfig, BundleLayout, VersionTag};
use gitvend_runner::{ProcessRunner, StepRunner};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use helper::HelperOrigin;

use crate::error::{ErrorKind, StageError};

/// A finished bundle, ready for verification.
///
/// `git-remote-https` is present and executable in every value of this type.
#[derive(Debug, Clone)]
pub struct StagedBundle {
    pub tag: VersionTag,
    pub layout: BundleLayout,
    pub helper: HelperOrigin,
    /// Names of the shared libraries copied into `usr/lib`.
    pub libraries: Vec<String>,
}

impl StagedBundle {
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn launcher(&self) -> PathBuf {
        self.layout.launcher()
    }
}

/// Runs the finishing sub-steps in their required order.
pub struct Finisher<'a, R: ProcessRunner> {
    steps: &'a StepRunner<R>,
    bundle: &'a BundleConfig,
    epoch: i64,
}

impl<'a, R: ProcessRunner> Finisher<'a, R> {
    pub fn new(steps: &'a StepRunner<R>, bundle: &'a BundleConfig, epoch: i64) -> Self {
        Self {
            steps,
            bundle,
            epoch,
        }
    }

    pub async fn finish(
        &self,
        layout: &BundleLayout,
        tag: &VersionTag,
        source_dir: &Path,
        env: &BuildEnv,
        cancel: &CancellationToken,
    ) -> Result<StagedBundle, StageError> {
        let binary = layout.binary();
        if !binary.is_file() {
            return Err(StageError::MissingArtifact {
                kind: ErrorKind::Install,
                after: "make install",
                path: binary,
            });
        }

        let helper = helper::ensure_https_helper(layout, source_dir)?;
        info!(origin = ?helper, "https transport helper in place");

        let libraries = libs::collect_libraries(
            self.steps,
            layout,
            &self.bundle.system_libraries,
            env,
            cancel,
        )
        .await?;
        info!(count = libraries.len(), "shared libraries bundled");

        let stamped = timestamps::normalize_timestamps(layout.root(), self.epoch)?;
        info!(entries = stamped, "timestamps normalized");

        let stripped = strip::strip_bundle(self.steps, layout.root(), env, cancel).await?;
        info!(files = stripped, "stripped");

        let pruned = prune::prune(layout.root(), &self.bundle.prune)?;
        info!(paths = pruned.len(), "pruned");

        let launcher = launcher::write_launcher(layout)?;
        info!(launcher = %launcher.display(), "launcher written");

        timestamps::normalize_timestamps(layout.root(), self.epoch)?;

        Ok(StagedBundle {
            tag: tag.clone(),
            layout: layout.clone(),
            helper,
            libraries,
        })
    }
}
