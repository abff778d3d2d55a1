use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gitvend_core::{BuildContext, BuildEnv, Repository, VendConfig, VersionTag};
use gitvend_runner::{ProcessRunner, StepRunner};
use gitvend_upstream::{Upstream, resolve_latest_stable};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ErrorKind, PipelineError, Stage, StageError};
use crate::finish::{Finisher, StagedBundle};
use crate::publish::publish;
use crate::stages;
use crate::verify::{Verifier, VerifyReport};

/// Per-invocation overrides layered over [`VendConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Build this tag instead of resolving the latest stable one.
    pub tag: Option<VersionTag>,
    pub jobs: Option<usize>,
    pub skip_host_deps: bool,
    /// Where to publish; `dist/git-{version}` when unset.
    pub output: Option<PathBuf>,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub bundle: StagedBundle,
    pub verification: VerifyReport,
    pub published: PathBuf,
    /// Stages run, in order.
    pub stages: Vec<Stage>,
}

pub fn default_output_dir(tag: &VersionTag) -> PathBuf {
    PathBuf::from("dist").join(format!("git-{}", tag.version()))
}

/// Drives one build from tag resolution to a published bundle.
pub struct Pipeline<R: ProcessRunner, U: Upstream> {
    config: VendConfig,
    options: PipelineOptions,
    steps: StepRunner<R>,
    upstream: U,
}

impl<R: ProcessRunner, U: Upstream> Pipeline<R, U> {
    pub fn new(config: VendConfig, options: PipelineOptions, runner: R, upstream: U) -> Self {
        Self {
            config,
            options,
            steps: StepRunner::new(runner),
            upstream,
        }
    }

    pub fn config(&self) -> &VendConfig {
        &self.config
    }

    /// Run every stage inside `work_dir`.
    ///
    /// On failure the staging directory is removed before the error is
    /// returned, so no half-finished bundle survives.
    pub async fn run(
        &self,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, PipelineError> {
        let repository = Repository::from_str(&self.config.upstream.repository)
            .map_err(|e| PipelineError::new(Stage::ResolveVersion, StageError::Config { source: e }))?;

        let tag = match &self.options.tag {
            Some(tag) => {
                info!(tag = %tag, "using pinned tag");
                tag.clone()
            }
            None => {
                checkpoint(Stage::ResolveVersion, cancel)?;
                resolve_latest_stable(&self.upstream, &repository, cancel)
                    .await
                    .map_err(|e| {
                        PipelineError::new(Stage::ResolveVersion, StageError::Resolve { source: e })
                    })?
            }
        };

        let ctx = BuildContext::new(work_dir, repository, tag);
        let result = self.run_stages(&ctx, cancel).await;
        if let Err(e) = &result {
            warn!(stage = %e.stage, kind = ?e.kind(), "pipeline failed");
            remove_staging(&ctx.staging_dir);
        }
        result
    }

    async fn run_stages(
        &self,
        ctx: &BuildContext,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, PipelineError> {
        let config = &self.config;
        let epoch = config.reproducibility.source_date_epoch;
        let mut completed = vec![Stage::ResolveVersion];

        // Fetch
        checkpoint(Stage::Fetch, cancel)?;
        let url = ctx
            .tag
            .archive_url(&config.upstream.archive_base, &ctx.repository);
        self.upstream
            .download(&url, &ctx.archive_path, cancel)
            .await
            .map_err(|e| PipelineError::new(Stage::Fetch, StageError::Download { source: e }))?;
        completed.push(Stage::Fetch);

        // Host packages
        if config.host.install && !self.options.skip_host_deps {
            checkpoint(Stage::PrepareHost, cancel)?;
            let steps = stages::host_steps(&config.host, &ctx.work_dir);
            self.steps
                .run_all(&steps, cancel)
                .await
                .map_err(at(Stage::PrepareHost))?;
            completed.push(Stage::PrepareHost);
        } else {
            info!("skipping host dependency installation");
        }

        let env = BuildEnv::new(&config.reproducibility, &ctx.source_dir);

        // Extract
        checkpoint(Stage::Extract, cancel)?;
        remove_stale(&ctx.source_dir, ErrorKind::Extraction).map_err(at(Stage::Extract))?;
        self.steps
            .run_all(&stages::extract_steps(ctx, epoch, &env), cancel)
            .await
            .map_err(at(Stage::Extract))?;
        if !ctx.source_dir.is_dir() {
            return Err(PipelineError::new(
                Stage::Extract,
                StageError::MissingArtifact {
                    kind: ErrorKind::Extraction,
                    after: "extraction",
                    path: ctx.source_dir.clone(),
                },
            ));
        }
        completed.push(Stage::Extract);

        // Configure
        checkpoint(Stage::Configure, cancel)?;
        self.steps
            .run_all(&stages::configure_steps(ctx, &config.build, &env), cancel)
            .await
            .map_err(at(Stage::Configure))?;
        completed.push(Stage::Configure);

        // Compile and install
        checkpoint(Stage::Compile, cancel)?;
        remove_stale(&ctx.staging_dir, ErrorKind::Install).map_err(at(Stage::Compile))?;
        let jobs = self.jobs();
        info!(jobs, "compiling");
        self.steps
            .run_all(&stages::compile_steps(ctx, &config.build, &env, jobs), cancel)
            .await
            .map_err(at(Stage::Compile))?;
        completed.push(Stage::Compile);

        // Finish
        checkpoint(Stage::Finish, cancel)?;
        let layout = ctx.layout(&config.build.prefix);
        let bundle = Finisher::new(&self.steps, &config.bundle, epoch)
            .finish(&layout, &ctx.tag, &ctx.source_dir, &env, cancel)
            .await
            .map_err(at(Stage::Finish))?;
        completed.push(Stage::Finish);

        // Verify
        checkpoint(Stage::Verify, cancel)?;
        let verification = Verifier::new(&self.steps, &config.verify.repository_url)
            .verify(&bundle.launcher(), &ctx.tag, &ctx.verify_dir(), &env, cancel)
            .await
            .map_err(at(Stage::Verify))?;
        completed.push(Stage::Verify);

        // Publish
        checkpoint(Stage::Publish, cancel)?;
        let output = self
            .options
            .output
            .clone()
            .unwrap_or_else(|| default_output_dir(&ctx.tag));
        let published = publish(bundle.root(), &output, epoch).map_err(at(Stage::Publish))?;
        completed.push(Stage::Publish);

        info!(tag = %ctx.tag, output = %published.display(), "build complete");
        Ok(BuildOutcome {
            bundle,
            verification,
            published,
            stages: completed,
        })
    }

    fn jobs(&self) -> usize {
        if let Some(jobs) = self.options.jobs.or(self.config.build.jobs) {
            return jobs.max(1);
        }
        match std::thread::available_parallelism() {
            Ok(n) => n.get(),
            Err(e) => {
                warn!(error = %e, "cannot determine available parallelism, using 1 job");
                1
            }
        }
    }
}

fn at<E: Into<StageError>>(stage: Stage) -> impl FnOnce(E) -> PipelineError {
    move |e| PipelineError::new(stage, e.into())
}

fn checkpoint(stage: Stage, cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::new(stage, StageError::Cancelled));
    }
    info!(stage = %stage, "stage started");
    Ok(())
}

fn remove_stale(dir: &Path, kind: ErrorKind) -> Result<(), StageError> {
    if !dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(dir).map_err(StageError::io(kind, "failed to remove stale", dir))
}

fn remove_staging(staging: &Path) {
    if !staging.exists() {
        return;
    }
    match fs::remove_dir_all(staging) {
        Ok(()) => info!(path = %staging.display(), "removed staging directory"),
        Err(e) => warn!(path = %staging.display(), error = %e, "failed to remove staging directory"),
    }
}
