//! Checks that must pass before any ticket is processed.

use tracing::info;

use crate::config::TrackerConfig;
use crate::source::{Ticket, TicketFilter, TicketRepository};
use crate::tracker::IssueTracker;

use super::RunError;

/// Load the tickets to migrate. Failure aborts the run.
pub async fn load_tickets(
    repository: &dyn TicketRepository,
    filter: &TicketFilter,
) -> Result<Vec<Ticket>, RunError> {
    let tickets = repository.list_tickets(filter).await?;
    info!(count = tickets.len(), number = ?filter.number, "Loaded tickets");
    Ok(tickets)
}

/// Confirm the tracker answers with the configured credentials.
pub async fn check_tracker(tracker: &dyn IssueTracker) -> Result<(), RunError> {
    tracker
        .check_connection()
        .await
        .map_err(RunError::TrackerUnreachable)?;
    info!(backend = tracker.name(), "Issue tracker reachable");
    Ok(())
}

/// The configured done transition, or one found in workflow metadata.
pub async fn resolve_done_transition(
    tracker: &dyn IssueTracker,
    config: &TrackerConfig,
) -> Result<String, RunError> {
    if let Some(id) = &config.done_transition_id {
        info!(transition = %id, "Using configured done transition");
        return Ok(id.clone());
    }

    let discovered = tracker
        .discover_done_transition(&config.project, &config.issue_type)
        .await
        .map_err(RunError::WorkflowMetadata)?;
    match discovered {
        Some(transition) => {
            info!(
                transition = %transition.id,
                name = %transition.name,
                "Discovered done transition"
            );
            Ok(transition.id)
        }
        None => Err(RunError::NoDoneTransition {
            project: config.project.clone(),
            issue_type: config.issue_type.clone(),
        }),
    }
}
