use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors surfaced by the package list store, the manifest store,
/// version parsing and the installer.
///
/// None of these are retried internally; they propagate to the caller as is.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Input file is missing, unreadable or does not match the expected XML shape.
    #[error("Failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    /// Filesystem failure while writing a file or preparing a destination.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Version string is not a dotted numeric version.
    #[error("Invalid version '{input}': {reason}")]
    Format { input: String, reason: String },
    /// Archive is corrupt or in an unsupported format.
    #[error("Archive error in {}: {message}", .path.display())]
    Archive { path: PathBuf, message: String },
    /// Remote package location could not be fetched.
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },
    /// `config.toml` exists but can't be read or parsed.
    #[error("Configuration: {0}")]
    Config(String),
}

impl UpdateError {
    pub(crate) fn parse<P: Into<PathBuf>, M: ToString>(path: P, message: M) -> Self {
        UpdateError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        UpdateError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive<P: Into<PathBuf>, M: ToString>(path: P, message: M) -> Self {
        UpdateError::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Returns `true` for [`UpdateError::Parse`].
    pub fn is_parse(&self) -> bool {
        matches!(self, UpdateError::Parse { .. })
    }

    /// Returns `true` for [`UpdateError::Io`].
    pub fn is_io(&self) -> bool {
        matches!(self, UpdateError::Io { .. })
    }

    /// Returns `true` for [`UpdateError::Format`].
    pub fn is_format(&self) -> bool {
        matches!(self, UpdateError::Format { .. })
    }
}
