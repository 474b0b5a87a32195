//! Error types for the corpus preparation pipeline.
//!
//! Every variant except [`Error::Io`] is fatal at startup: the binary logs
//! it and exits non-zero. Per-file ingestion failures never surface here;
//! they are logged and skipped inside the ingestor.

use std::path::PathBuf;

/// Errors raised while resolving settings or preparing the corpus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A setting is missing, malformed, or outside its allowed range.
    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },

    /// The config file (or dotenv/secret file) could not be read or parsed.
    #[error("failed to load config file {path:?}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    /// The configured data root does not exist.
    #[error("data directory not found: {0:?}")]
    DataDirectoryNotFound(PathBuf),

    /// Discovery and filtering left nothing to ingest.
    #[error("no valid files found after filtering ({scanned} files scanned under {root:?})")]
    NoCandidateFiles { root: PathBuf, scanned: usize },

    /// Every filtered file failed to open.
    #[error("failed to load any files ({attempted} attempted)")]
    NoReadableSource { attempted: usize },

    /// The merger was handed zero sources.
    #[error("corpus is empty: at least one content source is required")]
    EmptyCorpus,

    /// Two sources share an identity key. Never expected under correct
    /// operation; indicates a discovery bug or a racing filesystem.
    #[error("source key {key} is shared by {first:?} and {second:?}")]
    DuplicateSourceKey {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// An exclusion pattern could not be compiled.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: msg.into(),
        }
    }

    pub fn config_file(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::ConfigFile {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
