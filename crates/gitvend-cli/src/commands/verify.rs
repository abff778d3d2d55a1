use std::path::Path;

use gitvend_build::Verifier;
use gitvend_core::{BuildEnv, BundleLayout};
use gitvend_runner::{ShellRunner, StepRunner};
use tokio_util::sync::CancellationToken;

/// Run the verifier against an already-built bundle.
pub async fn verify(
    bundle: &Path,
    config: Option<&Path>,
    tag: Option<&str>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let tag = super::pick_tag(&config, tag, cancel).await?;

    let layout = BundleLayout::new(bundle, &config.build.prefix);
    let scratch = tempfile::Builder::new().prefix("gitvend-verify-").tempdir()?;
    let env = BuildEnv::new(&config.reproducibility, bundle);

    let steps = StepRunner::new(ShellRunner::new());
    let report = Verifier::new(&steps, &config.verify.repository_url)
        .verify(
            &layout.launcher(),
            &tag,
            &scratch.path().join("clone"),
            &env,
            cancel,
        )
        .await?;

    println!("{}", report.version_line);
    println!("Cloned {} through {}", report.clone_url, layout.launcher().display());
    Ok(())
}
