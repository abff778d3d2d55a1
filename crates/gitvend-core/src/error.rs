use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid repository coordinates {value:?}: expected `owner/name`")]
    InvalidRepository { value: String },

    #[error("invalid version tag {value:?}: {reason}")]
    InvalidTag { value: String, reason: &'static str },
}
