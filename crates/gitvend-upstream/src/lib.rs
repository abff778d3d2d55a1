//! Upstream access for gitvend: listing release tags, picking the latest
//! stable one, and downloading source archives.

pub mod client;
pub mod error;
pub mod resolve;

pub use client::{HttpUpstream, Tag, Upstream};
pub use error::UpstreamError;
pub use resolve::{ResolveError, is_prerelease, latest_stable_tag, resolve_latest_stable};
