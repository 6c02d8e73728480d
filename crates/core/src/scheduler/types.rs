//! Scheduler types.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MigrationConfig;
use crate::source::RepositoryError;
use crate::tracker::TrackerError;

/// Errors that abort the whole run before any ticket is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("source database unavailable: {0}")]
    Source(#[from] RepositoryError),

    #[error("issue tracker unreachable: {0}")]
    TrackerUnreachable(#[source] TrackerError),

    #[error("could not read workflow metadata: {0}")]
    WorkflowMetadata(#[source] TrackerError),

    #[error("no transition into a done status for project {project}, issue type {issue_type}")]
    NoDoneTransition { project: String, issue_type: String },
}

/// Widths and batch sizes for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Tickets migrated at once.
    pub max_parallel_tickets: usize,
    /// Tickets per message query.
    pub message_batch_size: usize,
}

impl From<&MigrationConfig> for SchedulerConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            max_parallel_tickets: config.max_parallel_tickets,
            message_batch_size: config.message_batch_size,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_tickets: 10,
            message_batch_size: 500,
        }
    }
}

/// Counters readable while a run is in flight.
#[derive(Debug, Default)]
pub struct MigrationProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl MigrationProgress {
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Tickets finished, successfully or not. Never decreases during a run.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    /// Count one finished ticket and return the new completed count.
    pub(crate) fn finish(&self, success: bool) -> usize {
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Final tally of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub migrated: usize,
    pub failed: usize,
    /// Tickets never started because the run was cancelled.
    pub not_started: usize,
    /// Skip ledger holding the failures.
    pub ledger_path: Option<PathBuf>,
}
