//! Repository trait and shared types.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use super::{AttachmentMeta, Message, Ticket};

/// Error type for source database access.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The database could not be reached.
    #[error("source database connection failed: {0}")]
    Connection(String),

    /// A query failed.
    #[error("source query failed: {0}")]
    Query(String),

    /// A row could not be mapped to a record.
    #[error("invalid source row: {0}")]
    InvalidRow(String),
}

/// Filter for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Restrict to the ticket with this public number.
    pub number: Option<String>,
}

impl TicketFilter {
    /// All tickets.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the ticket with the given public number.
    pub fn with_number(number: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
        }
    }
}

/// Read-only access to helpdesk tickets.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Tickets matching `filter`, ordered by internal id.
    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError>;

    /// Messages for all of `ticket_ids` in a single query, grouped by ticket id.
    ///
    /// Each group is ordered by timestamp ascending. Tickets without messages
    /// are absent from the map.
    async fn load_messages(
        &self,
        ticket_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Message>>, RepositoryError>;

    /// Attachment metadata for one ticket.
    async fn load_attachment_meta(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<AttachmentMeta>, RepositoryError>;
}

/// Group rows already sorted by (ticket, timestamp) without reordering them.
pub(crate) fn group_messages(messages: Vec<Message>) -> HashMap<i64, Vec<Message>> {
    let mut grouped: HashMap<i64, Vec<Message>> = HashMap::new();
    for message in messages {
        grouped.entry(message.ticket_id).or_default().push(message);
    }
    grouped
}

/// `?, ?, ?` for an `IN (...)` list.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
