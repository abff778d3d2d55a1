use gitvend_core::{Repository, VersionTag};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{Tag, Upstream};
use crate::error::UpstreamError;

const PRERELEASE_MARKERS: &[&str] = &["-rc", "-beta", "-alpha"];

/// Whether a tag name carries a pre-release marker (case-insensitive).
pub fn is_prerelease(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PRERELEASE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// First stable tag in upstream order.
pub fn latest_stable_tag(tags: &[Tag]) -> Option<&Tag> {
    tags.iter().find(|tag| !is_prerelease(&tag.name))
}

/// List the repository's tags and return the latest stable one.
pub async fn resolve_latest_stable<U: Upstream>(
    upstream: &U,
    repository: &Repository,
    cancel: &CancellationToken,
) -> Result<VersionTag, ResolveError> {
    let tags = upstream
        .list_tags(repository, cancel)
        .await
        .map_err(|e| ResolveError::Fetch { source: e })?;

    let tag = latest_stable_tag(&tags).ok_or_else(|| ResolveError::NoStableVersionFound {
        repository: repository.to_string(),
        candidates: tags.len(),
    })?;

    let tag = VersionTag::new(&tag.name).map_err(|e| ResolveError::InvalidTag { source: e })?;
    info!(repository = %repository, tag = %tag, "resolved latest stable tag");
    Ok(tag)
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no stable version found for {repository} ({candidates} tag(s) inspected)")]
    NoStableVersionFound {
        repository: String,
        candidates: usize,
    },

    #[error("failed to list upstream tags")]
    Fetch { source: UpstreamError },

    #[error("upstream returned an unusable tag")]
    InvalidTag { source: gitvend_core::Error },
}

impl ResolveError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { source } => source.is_transient(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Fetch { source } => source.is_cancelled(),
            _ => false,
        }
    }
}
