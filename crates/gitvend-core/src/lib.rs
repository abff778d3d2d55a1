//! Core types and configuration for gitvend.
//!
//! This crate defines the `gitvend.toml` schema ([`VendConfig`]), the
//! per-run build context ([`BuildContext`], [`VersionTag`]), the staged
//! bundle layout ([`BundleLayout`]), the reproducible environment overlay
//! ([`BuildEnv`]), and shared error types.

pub mod config;
pub mod context;
pub mod env;
pub mod error;

pub use config::{
    BuildConfig, BundleConfig, HostConfig, ReproducibilityConfig, UpstreamConfig, VendConfig,
    VerifyConfig,
};
pub use context::{BuildContext, BundleLayout, Repository, VersionTag};
pub use env::BuildEnv;
pub use error::{Error, Result};
