mod build;
mod resolve;
mod verify;

use std::path::Path;

use gitvend_core::{Repository, VendConfig, VersionTag};
use gitvend_upstream::{HttpUpstream, resolve_latest_stable};
use tokio_util::sync::CancellationToken;

pub use build::{BuildArgs, build};
pub use resolve::resolve;
pub use verify::verify;

/// `--config` when given, otherwise `./gitvend.toml` or defaults.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<VendConfig> {
    let config = match path {
        Some(path) => VendConfig::load_file(path)?,
        None => VendConfig::load(Path::new("."))?,
    };
    Ok(config)
}

/// The pinned tag when given, otherwise the latest stable upstream tag.
pub(crate) async fn pick_tag(
    config: &VendConfig,
    pinned: Option<&str>,
    cancel: &CancellationToken,
) -> anyhow::Result<VersionTag> {
    if let Some(tag) = pinned {
        return Ok(VersionTag::new(tag)?);
    }
    let repository: Repository = config.upstream.repository.parse()?;
    let upstream = HttpUpstream::new(&config.upstream)?;
    Ok(resolve_latest_stable(&upstream, &repository, cancel).await?)
}
