//! Issue orchestrator.
//!
//! Moves one ticket through its migration states:
//! `Built -> Created -> {NoAttachments | AttachmentsResolved -> Uploaded}
//! -> DescriptionFinalized -> Transitioned -> Done`, with `Failed` reachable
//! from any open state. The issue is created with a placeholder first so it
//! exists before slow attachment work begins.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::IssueOrchestrator;
pub use types::{JobState, MigrationError, MigrationJob, MigrationReport, TicketFailure};
