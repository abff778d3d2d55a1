use std::path::PathBuf;

use gitvend_build::{Pipeline, PipelineOptions, WorkDir};
use gitvend_core::VersionTag;
use gitvend_runner::ShellRunner;
use gitvend_upstream::HttpUpstream;
use tokio_util::sync::CancellationToken;

pub struct BuildArgs {
    pub config: Option<PathBuf>,
    pub tag: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub skip_host_deps: bool,
}

/// Execute the full build pipeline.
pub async fn build(args: BuildArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let tag = args.tag.as_deref().map(VersionTag::new).transpose()?;

    let work = WorkDir::resolve(args.work_dir.as_deref())?;
    let upstream = HttpUpstream::new(&config.upstream)?;
    let options = PipelineOptions {
        tag,
        jobs: args.jobs,
        skip_host_deps: args.skip_host_deps,
        output: args.output,
    };

    let pipeline = Pipeline::new(config, options, ShellRunner::new(), upstream);
    let outcome = match pipeline.run(work.path(), cancel).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => anyhow::bail!("build cancelled during {}", e.stage),
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("Built {}", outcome.bundle.tag);
    println!("  {}", outcome.verification.version_line);
    if !outcome.bundle.libraries.is_empty() {
        println!("  bundled: {}", outcome.bundle.libraries.join(", "));
    }
    println!("Bundle: {}", outcome.published.display());

    Ok(())
}
