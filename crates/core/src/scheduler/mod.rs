//! Concurrency scheduler.
//!
//! Startup checks run first; a failure there aborts the run before any
//! ticket is touched. [`MigrationScheduler`] then drives the orchestrator
//! over every ticket with a bounded worker pool.

mod runner;
mod startup;
mod types;

pub use runner::MigrationScheduler;
pub use startup::{check_tracker, load_tickets, resolve_done_transition};
pub use types::{MigrationProgress, RunError, RunSummary, SchedulerConfig};
