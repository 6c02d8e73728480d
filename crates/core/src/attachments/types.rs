//! Attachment resolution types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where an attachment's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentOrigin {
    RemoteStore,
    InlineHttp,
}

/// Upload state of a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum UploadOutcome {
    Pending,
    Uploaded,
    Failed(String),
}

/// A file staged locally and waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Staged file on local disk.
    pub path: PathBuf,
    pub origin: AttachmentOrigin,
    /// Name the file must carry on the issue.
    pub file_name: String,
    pub outcome: UploadOutcome,
}

impl ResolvedAttachment {
    pub fn new(path: PathBuf, origin: AttachmentOrigin, file_name: impl Into<String>) -> Self {
        Self {
            path,
            origin,
            file_name: file_name.into(),
            outcome: UploadOutcome::Pending,
        }
    }
}

/// An attachment that could not be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAttachment {
    pub file_name: String,
    pub origin: AttachmentOrigin,
    pub reason: String,
}

/// Result of resolving every attachment of one ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub staged: Vec<ResolvedAttachment>,
    pub skipped: Vec<SkippedAttachment>,
}

impl ResolveReport {
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}
