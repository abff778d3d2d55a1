use std::path::Path;

use gitvend_core::{Repository, UpstreamConfig};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::UpstreamError;

/// One entry of the upstream tag listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

/// Abstraction over the upstream source host for testability.
///
/// Production code uses [`HttpUpstream`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait Upstream: Send + Sync {
    /// List tags, newest first, in the order the host returns them.
    async fn list_tags(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tag>, UpstreamError>;

    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, UpstreamError>;
}

impl<T: Upstream> Upstream for &T {
    async fn list_tags(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tag>, UpstreamError> {
        (**self).list_tags(repository, cancel).await
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, UpstreamError> {
        (**self).download(url, dest, cancel).await
    }
}

/// GitHub-compatible upstream over HTTPS.
pub struct HttpUpstream {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl HttpUpstream {
    /// The API token, if any, is read once from `config.token_env`.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let token = std::env::var_os(&config.token_env)
            .and_then(|value| value.to_str().map(str::to_owned))
            .filter(|value| !value.is_empty());

        Self::with_token(config, token)
    }

    pub fn with_token(config: &UpstreamConfig, token: Option<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| UpstreamError::ClientBuild { source: e })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            token,
        })
    }

    fn tags_url(&self, repository: &Repository) -> String {
        format!(
            "{base}/repos/{owner}/{name}/tags?per_page=100",
            base = self.api_base,
            owner = repository.owner,
            name = repository.name,
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, UpstreamError> {
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| UpstreamError::Request {
            url: url.to_owned(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn fetch_tags(&self, url: &str) -> Result<Vec<Tag>, UpstreamError> {
        let response = self.get(url).await?;
        response
            .json::<Vec<Tag>>()
            .await
            .map_err(|e| UpstreamError::Decode {
                url: url.to_owned(),
                source: e,
            })
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, UpstreamError> {
        let mut response = self.get(url).await?;

        let write_err = |e: std::io::Error| UpstreamError::Write {
            path: dest.to_path_buf(),
            source: e,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(write_err)?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| UpstreamError::Request {
            url: url.to_owned(),
            source: e,
        })? {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        if written == 0 {
            return Err(UpstreamError::EmptyDownload {
                url: url.to_owned(),
            });
        }

        Ok(written)
    }
}

impl Upstream for HttpUpstream {
    async fn list_tags(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tag>, UpstreamError> {
        let url = self.tags_url(repository);
        debug!(url = %url, "listing tags");

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpstreamError::Cancelled { url: url.clone() }),
            tags = self.fetch_tags(&url) => tags,
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, UpstreamError> {
        info!(url = %url, dest = %dest.display(), "downloading");

        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpstreamError::Cancelled { url: url.to_owned() }),
            written = self.fetch_to_file(url, dest) => written,
        }?;

        info!(bytes = written, "download complete");
        Ok(written)
    }
}
