//! Types for issue tracker operations.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur talking to the issue tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to read attachment {path}: {message}")]
    AttachmentRead { path: String, message: String },
}

/// Fields of an issue to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    /// Project key.
    pub project: String,
    pub summary: String,
    /// Issue type name.
    pub issue_type: String,
    /// Priority name.
    pub priority: String,
    pub labels: Vec<String>,
    pub description: String,
}

/// A created issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub key: String,
}

/// Workflow transition available on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Destination status name.
    pub to_status: Option<String>,
    /// Destination status category key (`new`, `indeterminate`, `done`).
    pub to_category: Option<String>,
}

impl Transition {
    /// Whether the transition ends in the done status category.
    pub fn is_done(&self) -> bool {
        self.to_category.as_deref() == Some("done")
    }
}

/// Issue tracker backend.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Verify the service is reachable and the credentials are accepted.
    async fn check_connection(&self) -> Result<(), TrackerError>;

    /// Create an issue.
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, TrackerError>;

    /// Replace an issue's description.
    async fn update_description(&self, key: &str, description: &str) -> Result<(), TrackerError>;

    /// Post a comment on an issue.
    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError>;

    /// Upload a local file as an attachment named `file_name`.
    async fn add_attachment(
        &self,
        key: &str,
        path: &Path,
        file_name: &str,
    ) -> Result<(), TrackerError>;

    /// Filenames of the attachments currently on an issue.
    async fn attachment_names(&self, key: &str) -> Result<Vec<String>, TrackerError>;

    /// Transitions currently offered for an issue.
    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>, TrackerError>;

    /// Apply a transition.
    async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<(), TrackerError>;

    /// Find a transition into the done category from the project's
    /// workflow metadata for `issue_type`.
    async fn discover_done_transition(
        &self,
        project: &str,
        issue_type: &str,
    ) -> Result<Option<Transition>, TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_is_done() {
        let mut t = Transition {
            id: "31".to_string(),
            name: "Done".to_string(),
            to_status: Some("Done".to_string()),
            to_category: Some("done".to_string()),
        };
        assert!(t.is_done());

        t.to_category = Some("indeterminate".to_string());
        assert!(!t.is_done());

        t.to_category = None;
        assert!(!t.is_done());
    }
}
