use std::fs;
use std::path::Path;

use gitvend_core::{BuildEnv, VersionTag};
use gitvend_runner::{CommandSpec, ProcessRunner, Step, StepRunner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ErrorKind, StageError};
use crate::stages::{quote, quote_path};

/// Variables that keep the verification clone from prompting or picking up
/// host-wide git configuration.
const CLONE_ENV: &[(&str, &str)] = &[("GIT_TERMINAL_PROMPT", "0"), ("GIT_CONFIG_NOSYSTEM", "1")];

/// What a successful verification observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// First line of `git --version`.
    pub version_line: String,
    pub clone_url: String,
}

/// Exercises a bundle through its launcher.
pub struct Verifier<'a, R: ProcessRunner> {
    steps: &'a StepRunner<R>,
    repository_url: &'a str,
}

impl<'a, R: ProcessRunner> Verifier<'a, R> {
    pub fn new(steps: &'a StepRunner<R>, repository_url: &'a str) -> Self {
        Self {
            steps,
            repository_url,
        }
    }

    pub fn version_step(&self, launcher: &Path, cwd: &Path, env: &BuildEnv) -> Step<ErrorKind> {
        Step::new(
            "git --version",
            CommandSpec::new(format!("{} --version", quote_path(launcher)), cwd, env),
            ErrorKind::Verification,
        )
    }

    pub fn clone_step(
        &self,
        launcher: &Path,
        clone_dir: &Path,
        cwd: &Path,
        env: &BuildEnv,
    ) -> Step<ErrorKind> {
        let env = env.with(CLONE_ENV.iter().copied());
        Step::new(
            "verification clone",
            CommandSpec::new(
                format!(
                    "{} clone --depth 1 {} {}",
                    quote_path(launcher),
                    quote(self.repository_url),
                    quote_path(clone_dir)
                ),
                cwd,
                &env,
            ),
            ErrorKind::Verification,
        )
    }

    /// Check the reported version, then clone over HTTPS into `clone_dir`.
    /// The clone is removed again whether or not the check passed.
    pub async fn verify(
        &self,
        launcher: &Path,
        tag: &VersionTag,
        clone_dir: &Path,
        env: &BuildEnv,
        cancel: &CancellationToken,
    ) -> Result<VerifyReport, StageError> {
        let cwd = launcher.parent().unwrap_or(Path::new("/"));
        if !launcher.is_file() {
            return Err(StageError::MissingArtifact {
                kind: ErrorKind::Verification,
                after: "bundle finishing",
                path: launcher.to_path_buf(),
            });
        }

        let output = self
            .steps
            .run(&self.version_step(launcher, cwd, env), cancel)
            .await?;
        let version_line = output.stdout.lines().next().unwrap_or_default().trim().to_owned();
        if !reports_version(&version_line, tag.version()) {
            return Err(StageError::Verification {
                detail: format!(
                    "expected version {} but the launcher reported {version_line:?}",
                    tag.version()
                ),
            });
        }
        info!(version = %version_line, "launcher reports expected version");

        remove_clone(clone_dir)?;
        let result = self.clone_and_check(launcher, clone_dir, cwd, env, cancel).await;
        if let Err(e) = remove_clone(clone_dir) {
            warn!(path = %clone_dir.display(), error = %e, "failed to remove verification clone");
        }
        result?;

        info!(url = %self.repository_url, "verification clone succeeded");
        Ok(VerifyReport {
            version_line,
            clone_url: self.repository_url.to_owned(),
        })
    }

    async fn clone_and_check(
        &self,
        launcher: &Path,
        clone_dir: &Path,
        cwd: &Path,
        env: &BuildEnv,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        self.steps
            .run(&self.clone_step(launcher, clone_dir, cwd, env), cancel)
            .await?;

        let mut entries = fs::read_dir(clone_dir).map_err(|e| StageError::Verification {
            detail: format!("clone destination {} unreadable: {e}", clone_dir.display()),
        })?;
        if entries.next().is_none() {
            return Err(StageError::Verification {
                detail: format!("clone destination {} is empty", clone_dir.display()),
            });
        }
        Ok(())
    }
}

/// Whether a `git --version` line names exactly `version`.
///
/// The version token must equal `version` or extend it with a non-numeric
/// dotted suffix (`2.45.0.windows.1`), so `2.4` does not match `2.45.0` or
/// `2.4.1`.
pub fn reports_version(version_line: &str, version: &str) -> bool {
    let Some(reported) = version_line.strip_prefix("git version ") else {
        return false;
    };
    let token = reported.split_whitespace().next().unwrap_or_default();
    match token.strip_prefix(version) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .and_then(|suffix| suffix.chars().next())
            .is_some_and(|c| !c.is_ascii_digit()),
        None => false,
    }
}

fn remove_clone(clone_dir: &Path) -> Result<(), StageError> {
    if !clone_dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(clone_dir).map_err(StageError::io(
        ErrorKind::Verification,
        "failed to remove",
        clone_dir,
    ))
}

