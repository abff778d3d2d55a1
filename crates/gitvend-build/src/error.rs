use std::fmt;
use std::path::{Path, PathBuf};

use gitvend_runner::StepError;
use gitvend_upstream::{ResolveError, UpstreamError};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveVersion,
    Fetch,
    PrepareHost,
    Extract,
    Configure,
    Compile,
    Finish,
    Verify,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveVersion => "version resolution",
            Self::Fetch => "source fetch",
            Self::PrepareHost => "host preparation",
            Self::Extract => "source extraction",
            Self::Configure => "configure",
            Self::Compile => "compile/install",
            Self::Finish => "bundle finishing",
            Self::Verify => "verification",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Failure taxonomy shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidConfig,
    Workspace,
    VersionResolution,
    Download,
    HostDependencyInstall,
    Extraction,
    Configuration,
    Compile,
    Install,
    MissingTransportHelper,
    BundleFinish,
    Verification,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("invalid configuration")]
    Config { source: gitvend_core::Error },

    #[error(transparent)]
    Resolve { source: ResolveError },

    #[error("download failed")]
    Download { source: UpstreamError },

    #[error(transparent)]
    Step { source: StepError<ErrorKind> },

    #[error("{action} {path}")]
    Io {
        kind: ErrorKind,
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("expected {path} to exist after {after}")]
    MissingArtifact {
        kind: ErrorKind,
        after: &'static str,
        path: PathBuf,
    },

    #[error(
        "no HTTPS transport helper in {}; looked for {}",
        helper_dir.display(),
        format_paths(searched)
    )]
    MissingTransportHelper {
        helper_dir: PathBuf,
        searched: Vec<PathBuf>,
    },

    #[error("{binary} links {library}, which could not be resolved")]
    UnresolvedLibrary { binary: PathBuf, library: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("bundle verification failed: {detail}")]
    Verification { detail: String },

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    /// `map_err` adapter for filesystem failures on `path`.
    pub fn io(
        kind: ErrorKind,
        action: &'static str,
        path: &Path,
    ) -> impl FnOnce(std::io::Error) -> Self + use<> {
        let path = path.to_path_buf();
        move |source| Self::Io {
            kind,
            action,
            path,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::InvalidConfig,
            Self::Resolve { source } if source.is_cancelled() => ErrorKind::Cancelled,
            Self::Resolve { .. } => ErrorKind::VersionResolution,
            Self::Download { source } if source.is_cancelled() => ErrorKind::Cancelled,
            Self::Download { .. } => ErrorKind::Download,
            Self::Step { source } if source.is_cancelled() => ErrorKind::Cancelled,
            Self::Step { source } => source.failure,
            Self::Io { kind, .. } | Self::MissingArtifact { kind, .. } => *kind,
            Self::MissingTransportHelper { .. } => ErrorKind::MissingTransportHelper,
            Self::UnresolvedLibrary { .. } => ErrorKind::BundleFinish,
            Self::InvalidPath { .. } => ErrorKind::InvalidConfig,
            Self::Verification { .. } => ErrorKind::Verification,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Resolve { source } => source.is_transient(),
            Self::Download { source } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StepError<ErrorKind>> for StageError {
    fn from(source: StepError<ErrorKind>) -> Self {
        Self::Step { source }
    }
}

/// A stage failure tagged with the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: Stage,
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: StageError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Network trouble that a later whole-pipeline retry could clear.
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        "(nothing)".to_owned()
    } else {
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
