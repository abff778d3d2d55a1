use std::path::Path;

use tokio_util::sync::CancellationToken;

/// Print the latest stable tag of the configured repository.
pub async fn resolve(config: Option<&Path>, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let tag = super::pick_tag(&config, None, cancel).await?;
    println!("{tag}");
    Ok(())
}
