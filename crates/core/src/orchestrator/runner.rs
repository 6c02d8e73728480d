//! Per-ticket migration driver.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::attachments::{AttachmentResolver, ResolvedAttachment, UploadOutcome};
use crate::config::{PriorityMap, UploadFailurePolicy};
use crate::conversation::{
    compose_description, issue_summary, placeholder_description, split_for_field, UrlRewrite,
};
use crate::source::{AttachmentMeta, Message, Ticket};
use crate::tracker::{IssueTracker, NewIssue};

use super::{
    JobState, MigrationError, MigrationJob, MigrationReport, OrchestratorConfig, TicketFailure,
};

/// Drives one ticket from composed description to a closed issue.
///
/// Holds only read-only state, so one instance serves every worker.
pub struct IssueOrchestrator {
    tracker: Arc<dyn IssueTracker>,
    resolver: AttachmentResolver,
    config: OrchestratorConfig,
    priorities: PriorityMap,
    rewrite: Option<UrlRewrite>,
    done_transition_id: String,
}

impl IssueOrchestrator {
    /// `done_transition_id` is the run-wide terminal transition, resolved
    /// before any ticket starts.
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        resolver: AttachmentResolver,
        config: OrchestratorConfig,
        priorities: PriorityMap,
        done_transition_id: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            resolver,
            config,
            priorities,
            rewrite: None,
            done_transition_id: done_transition_id.into(),
        }
    }

    /// Rewrite legacy inline image URLs and turn them into attachments.
    pub fn with_url_rewrite(mut self, rewrite: UrlRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Migrate one ticket. Every failure is returned, never propagated as a panic.
    pub async fn migrate(
        &self,
        ticket: &Ticket,
        messages: &[Message],
        attachments: &[AttachmentMeta],
    ) -> Result<MigrationReport, TicketFailure> {
        let mut job = MigrationJob::new(&ticket.number);
        match self.run(&mut job, ticket, messages, attachments).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let failure = job.fail(e);
                error!(
                    ticket = %failure.ticket_number,
                    issue = failure.issue_key.as_deref().unwrap_or("-"),
                    state = failure.last_state.as_str(),
                    error = %failure.error,
                    "Ticket migration failed"
                );
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        job: &mut MigrationJob,
        ticket: &Ticket,
        messages: &[Message],
        attachments: &[AttachmentMeta],
    ) -> Result<MigrationReport, MigrationError> {
        if messages.is_empty() {
            return Err(MigrationError::NoMessages);
        }
        let composed = compose_description(ticket, messages, attachments, self.rewrite.as_ref());

        let new_issue = NewIssue {
            project: self.config.project.clone(),
            summary: issue_summary(ticket),
            issue_type: self.config.issue_type.clone(),
            priority: self.priorities.label_for(ticket.priority_tier).to_string(),
            labels: vec![self.config.marker_label.clone()],
            description: placeholder_description(ticket),
        };
        let issue = self
            .tracker
            .create_issue(&new_issue)
            .await
            .map_err(MigrationError::tracker("create issue"))?;
        job.issue_key = Some(issue.key.clone());
        job.advance(JobState::Created)?;
        info!(ticket = %ticket.number, issue = %issue.key, "Created issue");

        let resolved = self
            .resolver
            .resolve(ticket.id, attachments, &composed.inline_urls)
            .await?;
        let skipped = resolved.skipped;

        let mut uploaded = Vec::new();
        let mut failed_uploads = Vec::new();
        let mut unverified = Vec::new();
        // With nothing staged the description still goes through
        // finalize_description below and is split to the field limit.
        if resolved.staged.is_empty() {
            job.advance(JobState::NoAttachments)?;
        } else {
            job.advance(JobState::AttachmentsResolved)?;
            for attachment in self.upload_all(&issue.key, resolved.staged).await {
                match attachment.outcome {
                    UploadOutcome::Uploaded => uploaded.push(attachment.file_name),
                    _ => failed_uploads.push(attachment.file_name),
                }
            }
            job.advance(JobState::Uploaded)?;

            if self.config.verify_uploads && !uploaded.is_empty() {
                unverified = self.verify_uploads(&issue.key, &uploaded).await;
            }
        }

        let unresolved_inline: Vec<String> = composed
            .inline_attachments
            .iter()
            .filter(|name| !uploaded.contains(name))
            .cloned()
            .collect();
        if !unresolved_inline.is_empty() {
            warn!(
                ticket = %ticket.number,
                issue = %issue.key,
                files = ?unresolved_inline,
                "Inline images referenced in the description were not attached"
            );
        }

        let overflow_comments = self.finalize_description(&issue.key, &composed.text).await?;
        job.advance(JobState::DescriptionFinalized)?;

        if !failed_uploads.is_empty()
            && self.config.upload_failure_policy == UploadFailurePolicy::BlockTransition
        {
            return Err(MigrationError::UploadsFailed {
                files: failed_uploads,
            });
        }

        let transition_id = self.resolve_transition(&issue.key).await?;
        self.tracker
            .transition_issue(&issue.key, &transition_id)
            .await
            .map_err(MigrationError::tracker("transition issue"))?;
        job.advance(JobState::Transitioned)?;
        job.advance(JobState::Done)?;

        info!(
            ticket = %ticket.number,
            issue = %issue.key,
            uploaded = uploaded.len(),
            failed_uploads = failed_uploads.len(),
            skipped = skipped.len(),
            "Migrated ticket"
        );

        Ok(MigrationReport {
            ticket_number: ticket.number.clone(),
            issue_key: issue.key,
            uploaded,
            failed_uploads,
            skipped,
            unresolved_inline,
            unverified,
            overflow_comments,
            transition_id,
        })
    }

    /// Upload staged files through a pool of `max_parallel_uploads`.
    ///
    /// Each failure is recorded on its attachment and never stops the others.
    async fn upload_all(
        &self,
        key: &str,
        staged: Vec<ResolvedAttachment>,
    ) -> Vec<ResolvedAttachment> {
        let width = self.config.max_parallel_uploads.max(1);
        stream::iter(staged)
            .map(|mut attachment| async move {
                match self
                    .tracker
                    .add_attachment(key, &attachment.path, &attachment.file_name)
                    .await
                {
                    Ok(()) => {
                        info!(issue = %key, file = %attachment.file_name, "Uploaded attachment");
                        attachment.outcome = UploadOutcome::Uploaded;
                    }
                    Err(e) => {
                        warn!(issue = %key, file = %attachment.file_name, error = %e, "Upload failed");
                        attachment.outcome = UploadOutcome::Failed(e.to_string());
                    }
                }
                attachment
            })
            .buffered(width)
            .collect()
            .await
    }

    /// Names among `uploaded` that the issue does not list. Only logged.
    async fn verify_uploads(&self, key: &str, uploaded: &[String]) -> Vec<String> {
        match self.tracker.attachment_names(key).await {
            Ok(names) => {
                let present: HashSet<&str> = names.iter().map(String::as_str).collect();
                let missing: Vec<String> = uploaded
                    .iter()
                    .filter(|name| !present.contains(name.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    debug!(issue = %key, count = uploaded.len(), "All attachments verified");
                } else {
                    warn!(issue = %key, missing = ?missing, "Uploaded attachments not listed on issue");
                }
                missing
            }
            Err(e) => {
                warn!(issue = %key, error = %e, "Could not verify attachments");
                Vec::new()
            }
        }
    }

    /// Write the description, posting anything past the field limit as
    /// comments. Returns the number of comments posted.
    async fn finalize_description(&self, key: &str, text: &str) -> Result<usize, MigrationError> {
        let chunks = split_for_field(text, self.config.max_field_chars);
        self.tracker
            .update_description(key, &chunks.description)
            .await
            .map_err(MigrationError::tracker("update description"))?;

        for chunk in &chunks.overflow {
            self.tracker
                .add_comment(key, chunk)
                .await
                .map_err(MigrationError::tracker("post overflow comment"))?;
        }
        if !chunks.overflow.is_empty() {
            warn!(
                issue = %key,
                chars = text.chars().count(),
                comments = chunks.overflow.len(),
                "Description too long, split into follow-up comments"
            );
        }
        Ok(chunks.overflow.len())
    }

    /// The run-wide done transition if the issue offers it, else any other
    /// offered transition into the done category.
    async fn resolve_transition(&self, key: &str) -> Result<String, MigrationError> {
        let offered = self
            .tracker
            .list_transitions(key)
            .await
            .map_err(MigrationError::tracker("list transitions"))?;

        if offered.iter().any(|t| t.id == self.done_transition_id) {
            return Ok(self.done_transition_id.clone());
        }
        if let Some(alternative) = offered.iter().find(|t| t.is_done()) {
            warn!(
                issue = %key,
                configured = %self.done_transition_id,
                using = %alternative.id,
                name = %alternative.name,
                "Done transition not offered, using another done transition"
            );
            return Ok(alternative.id.clone());
        }
        Err(MigrationError::NoDoneTransition {
            offered: offered
                .into_iter()
                .map(|t| format!("{} ({})", t.name, t.id))
                .collect(),
        })
    }
}
