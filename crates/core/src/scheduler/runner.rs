//! Bounded worker pool over tickets.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ledger::{LedgerEntry, LedgerHandle};
use crate::orchestrator::IssueOrchestrator;
use crate::source::{Message, Ticket, TicketRepository};

use super::{MigrationProgress, RunSummary, SchedulerConfig};

/// Runs the orchestrator over every ticket, at most
/// `max_parallel_tickets` at a time.
///
/// A ticket that fails, or whose worker panics, is recorded in the skip
/// ledger and never stops its siblings. Cancelling the token stops new
/// tickets from starting; tickets already running finish.
pub struct MigrationScheduler {
    repository: Arc<dyn TicketRepository>,
    orchestrator: Arc<IssueOrchestrator>,
    ledger: LedgerHandle,
    config: SchedulerConfig,
    progress: Arc<MigrationProgress>,
    ledger_path: Option<PathBuf>,
}

impl MigrationScheduler {
    pub fn new(
        repository: Arc<dyn TicketRepository>,
        orchestrator: Arc<IssueOrchestrator>,
        ledger: LedgerHandle,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            ledger,
            config,
            progress: Arc::new(MigrationProgress::default()),
            ledger_path: None,
        }
    }

    /// Ledger location reported in the run summary.
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    /// Live counters for the current run.
    pub fn progress(&self) -> Arc<MigrationProgress> {
        Arc::clone(&self.progress)
    }

    /// Migrate `tickets` and wait for every started ticket to finish.
    pub async fn run(&self, tickets: Vec<Ticket>, cancel: CancellationToken) -> RunSummary {
        let total = tickets.len();
        self.progress.start(total);
        info!(
            total,
            width = self.config.max_parallel_tickets,
            "Starting migration"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tickets.max(1)));
        let mut workers = JoinSet::new();
        let mut cancelled = false;

        'batches: for batch in tickets.chunks(self.config.message_batch_size.max(1)) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut messages = match self.load_batch(batch).await {
                Some(messages) => messages,
                None => continue,
            };

            for ticket in batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'batches;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break 'batches;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'batches,
                    },
                };

                let ticket = ticket.clone();
                let ticket_messages = messages.remove(&ticket.id).unwrap_or_default();
                let worker = TicketWorker {
                    repository: Arc::clone(&self.repository),
                    orchestrator: Arc::clone(&self.orchestrator),
                    ledger: self.ledger.clone(),
                    progress: Arc::clone(&self.progress),
                };
                workers.spawn(async move {
                    let _permit = permit;
                    worker.process(ticket, ticket_messages).await
                });
            }
        }

        if cancelled {
            warn!("Cancellation requested, waiting for running tickets to finish");
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Ticket worker did not complete: {}", e);
            }
        }

        let completed = self.progress.completed();
        let failed = self.progress.failed();
        let summary = RunSummary {
            total,
            migrated: completed - failed,
            failed,
            not_started: total - completed,
            ledger_path: self.ledger_path.clone(),
        };
        info!(
            total = summary.total,
            migrated = summary.migrated,
            failed = summary.failed,
            not_started = summary.not_started,
            "Migration finished"
        );
        summary
    }

    /// Messages for one batch. A failed query fails every ticket in it.
    async fn load_batch(&self, batch: &[Ticket]) -> Option<HashMap<i64, Vec<Message>>> {
        let ids: Vec<i64> = batch.iter().map(|t| t.id).collect();
        match self.repository.load_messages(&ids).await {
            Ok(messages) => Some(messages),
            Err(e) => {
                error!(tickets = batch.len(), "Failed to load messages: {}", e);
                let reason = format!("failed to load messages: {}", e);
                for ticket in batch {
                    self.ledger
                        .record(LedgerEntry::new(&ticket.number, reason.as_str()))
                        .await;
                    let done = self.progress.finish(false);
                    info!(ticket = %ticket.number, "Progress {}/{}", done, self.progress.total());
                }
                None
            }
        }
    }
}

/// Everything one spawned ticket task needs.
struct TicketWorker {
    repository: Arc<dyn TicketRepository>,
    orchestrator: Arc<IssueOrchestrator>,
    ledger: LedgerHandle,
    progress: Arc<MigrationProgress>,
}

impl TicketWorker {
    async fn process(self, ticket: Ticket, messages: Vec<Message>) {
        let outcome = AssertUnwindSafe(self.migrate(&ticket, &messages))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err("worker panicked".to_string()));

        let success = match outcome {
            Ok(issue_key) => {
                info!(ticket = %ticket.number, issue = %issue_key, "Ticket migrated");
                true
            }
            Err(reason) => {
                error!(ticket = %ticket.number, "Ticket not migrated: {}", reason);
                self.ledger
                    .record(LedgerEntry::new(&ticket.number, reason))
                    .await;
                false
            }
        };

        let done = self.progress.finish(success);
        info!(ticket = %ticket.number, "Progress {}/{}", done, self.progress.total());
    }

    async fn migrate(&self, ticket: &Ticket, messages: &[Message]) -> Result<String, String> {
        let attachments = self
            .repository
            .load_attachment_meta(ticket.id)
            .await
            .map_err(|e| format!("failed to load attachment metadata: {}", e))?;

        self.orchestrator
            .migrate(ticket, messages, &attachments)
            .await
            .map(|report| report.issue_key)
            .map_err(|failure| failure.ledger_reason())
    }
}
