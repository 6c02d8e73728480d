//! Error types for attachment resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors scoped to a single attachment.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// File absent on the remote store.
    #[error("Remote file not found: {path}")]
    NotFound { path: PathBuf },

    /// Failed to create the per-ticket staging directory.
    #[error("Failed to create staging directory: {path}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy bytes from the remote store.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// HTTP request timed out.
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    /// Could not reach the inline image host.
    #[error("Connection failed for {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Any other request or body streaming failure.
    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    /// Failed to write a downloaded file.
    #[error("Failed to write {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SFTP session or transfer failure other than a missing file.
    #[error("SFTP transfer of {path} failed: {message}")]
    RemoteStore { path: PathBuf, message: String },

    /// Attachment name cannot be used as a file name.
    #[error("Invalid attachment name: {0:?}")]
    InvalidName(String),
}

impl AttachmentError {
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }

    /// Whether the failure is transient and worth retrying.
    ///
    /// Timeouts, connection errors and 5xx responses are transient; 4xx
    /// responses and local I/O failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the file simply does not exist at its source.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
