use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for every public operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(#[from] crate::backend::BackendError),

    #[error("manifest parse error at line {line}: {reason} ({text:?})")]
    ManifestParse { line: usize, text: String, reason: String },

    #[error("destination path is not a directory: {0}")]
    DestinationPathNotDirectory(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("one or more queued operations failed: {0}")]
    QueueFailed(String),

    #[error("a previous operation has failed; refusing further work")]
    OperationHasFailed,

    #[error("feature not implemented: {0}")]
    FeatureNotImplemented(&'static str),

    #[error("required option missing: {0}")]
    RequiredOptionMissing(&'static str),

    #[error("unknown backend URI scheme: {0}")]
    UnknownBackendScheme(String),

    #[error("manifest name must not contain '.': {0}")]
    InvalidManifestName(String),
}

pub type Result<T> = std::result::Result<T, Error>;
