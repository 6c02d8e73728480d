//! Types for the issue orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachments::{AttachmentError, SkippedAttachment};
use crate::source::RepositoryError;
use crate::tracker::TrackerError;

/// State of one ticket's migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobState {
    /// Description composed, nothing sent yet.
    Built,
    /// Issue exists with a placeholder description.
    Created,
    /// Nothing to upload.
    NoAttachments,
    /// Files staged locally.
    AttachmentsResolved,
    /// Upload pool drained.
    Uploaded,
    /// Full description written.
    DescriptionFinalized,
    /// Done transition applied.
    Transitioned,
    Done,
    Failed(String),
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Built => "built",
            JobState::Created => "created",
            JobState::NoAttachments => "no_attachments",
            JobState::AttachmentsResolved => "attachments_resolved",
            JobState::Uploaded => "uploaded",
            JobState::DescriptionFinalized => "description_finalized",
            JobState::Transitioned => "transitioned",
            JobState::Done => "done",
            JobState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed(_))
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Done, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Built, Created)
            | (Created, NoAttachments)
            | (Created, AttachmentsResolved)
            | (NoAttachments, DescriptionFinalized)
            | (AttachmentsResolved, Uploaded)
            | (Uploaded, DescriptionFinalized)
            | (DescriptionFinalized, Transitioned)
            | (Transitioned, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Ephemeral unit of work for one ticket, owned by a single worker.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    pub ticket_number: String,
    pub issue_key: Option<String>,
    pub state: JobState,
}

impl MigrationJob {
    pub fn new(ticket_number: impl Into<String>) -> Self {
        Self {
            ticket_number: ticket_number.into(),
            issue_key: None,
            state: JobState::Built,
        }
    }

    /// Move to `next`, rejecting changes the state machine does not allow.
    pub fn advance(&mut self, next: JobState) -> Result<(), MigrationError> {
        if !self.state.can_transition_to(&next) {
            return Err(MigrationError::InvalidState {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(
            ticket = %self.ticket_number,
            from = self.state.as_str(),
            to = next.as_str(),
            "Job state changed"
        );
        self.state = next;
        Ok(())
    }

    /// Convert into a failure, remembering the last state reached.
    pub fn fail(self, error: MigrationError) -> TicketFailure {
        TicketFailure {
            ticket_number: self.ticket_number,
            issue_key: self.issue_key,
            last_state: self.state,
            error,
        }
    }
}

/// Errors that fail one ticket's migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("ticket has no messages")]
    NoMessages,

    #[error("failed to load source data: {0}")]
    Source(#[from] RepositoryError),

    #[error("failed to stage attachments: {0}")]
    Staging(#[from] AttachmentError),

    #[error("{step} failed: {source}")]
    Tracker {
        step: &'static str,
        #[source]
        source: TrackerError,
    },

    #[error("no done transition offered (available: {})", .offered.join(", "))]
    NoDoneTransition { offered: Vec<String> },

    #[error("attachment uploads failed: {}", .files.join(", "))]
    UploadsFailed { files: Vec<String> },

    #[error("invalid state change from {from} to {to}")]
    InvalidState { from: String, to: String },
}

impl MigrationError {
    pub(crate) fn tracker(step: &'static str) -> impl FnOnce(TrackerError) -> Self {
        move |source| MigrationError::Tracker { step, source }
    }
}

/// A ticket that did not reach `Done`.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TicketFailure {
    pub ticket_number: String,
    /// Issue left behind, if one was created.
    pub issue_key: Option<String>,
    /// Last state reached before failing.
    pub last_state: JobState,
    #[source]
    pub error: MigrationError,
}

impl TicketFailure {
    pub fn new(ticket_number: impl Into<String>, error: MigrationError) -> Self {
        Self {
            ticket_number: ticket_number.into(),
            issue_key: None,
            last_state: JobState::Built,
            error,
        }
    }

    /// One-line reason for the skip ledger.
    pub fn ledger_reason(&self) -> String {
        match &self.issue_key {
            Some(key) => format!(
                "{} (issue {} left in state {})",
                self.error,
                key,
                self.last_state.as_str()
            ),
            None => self.error.to_string(),
        }
    }
}

/// Outcome of a ticket that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub ticket_number: String,
    pub issue_key: String,
    /// Files uploaded to the issue.
    pub uploaded: Vec<String>,
    /// Files staged but rejected by the tracker.
    pub failed_uploads: Vec<String>,
    /// Files that could not be staged.
    pub skipped: Vec<SkippedAttachment>,
    /// Inline image placeholders whose file never reached the issue.
    pub unresolved_inline: Vec<String>,
    /// Uploaded files not listed on the issue when read back.
    pub unverified: Vec<String>,
    /// Follow-up comments carrying description overflow.
    pub overflow_comments: usize,
    /// Transition applied to close the issue.
    pub transition_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_paths_allowed() {
        let with_files = [
            JobState::Built,
            JobState::Created,
            JobState::AttachmentsResolved,
            JobState::Uploaded,
            JobState::DescriptionFinalized,
            JobState::Transitioned,
            JobState::Done,
        ];
        for pair in with_files.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(JobState::Created.can_transition_to(&JobState::NoAttachments));
        assert!(JobState::NoAttachments.can_transition_to(&JobState::DescriptionFinalized));
    }

    #[test]
    fn test_skips_and_terminal_states_rejected() {
        assert!(!JobState::Built.can_transition_to(&JobState::Done));
        assert!(!JobState::Created.can_transition_to(&JobState::Transitioned));
        assert!(!JobState::NoAttachments.can_transition_to(&JobState::Uploaded));
        assert!(!JobState::Done.can_transition_to(&JobState::Failed("x".into())));
        assert!(!JobState::Failed("x".into()).can_transition_to(&JobState::Built));
    }

    #[test]
    fn test_failed_reachable_from_any_open_state() {
        for state in [
            JobState::Built,
            JobState::Created,
            JobState::NoAttachments,
            JobState::AttachmentsResolved,
            JobState::Uploaded,
            JobState::DescriptionFinalized,
            JobState::Transitioned,
        ] {
            assert!(state.can_transition_to(&JobState::Failed("boom".into())));
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_job_advance_and_fail() {
        let mut job = MigrationJob::new("100");
        job.advance(JobState::Created).unwrap();
        job.issue_key = Some("SUP-1".to_string());

        let err = job.advance(JobState::Done).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidState { .. }));
        assert_eq!(job.state, JobState::Created);

        let failure = job.fail(MigrationError::NoDoneTransition { offered: vec![] });
        assert_eq!(failure.issue_key.as_deref(), Some("SUP-1"));
        assert_eq!(failure.last_state, JobState::Created);
    }

    #[test]
    fn test_ledger_reason() {
        let mut failure = TicketFailure::new("100", MigrationError::NoMessages);
        assert_eq!(failure.ledger_reason(), "ticket has no messages");

        failure.issue_key = Some("SUP-4".to_string());
        failure.last_state = JobState::DescriptionFinalized;
        failure.error = MigrationError::UploadsFailed {
            files: vec!["a.png".to_string(), "b.pdf".to_string()],
        };
        assert_eq!(
            failure.ledger_reason(),
            "attachment uploads failed: a.png, b.pdf (issue SUP-4 left in state description_finalized)"
        );
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::Failed("boom".into())).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"boom"}"#);
        let json = serde_json::to_string(&JobState::Done).unwrap();
        assert_eq!(json, r#"{"state":"done"}"#);
    }
}
