//! Source helpdesk records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::RepositoryError;

/// A helpdesk ticket as stored in the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Internal primary key.
    pub id: i64,
    /// Number shown to customers and agents.
    pub number: String,
    pub subject: Option<String>,
    /// Small integer priority tier; mapped to a tracker label.
    pub priority_tier: Option<i64>,
    pub status_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Resolved display name of the submitter.
    pub submitter_name: String,
}

impl Ticket {
    /// Subject, or `Ticket <number>` when the source row has none.
    pub fn display_subject(&self) -> String {
        match self.subject.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("Ticket {}", self.number),
        }
    }
}

/// Who can see a message in the source helpdesk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Internal,
}

impl Visibility {
    /// Source `ticket_message.type` column: 1 is an internal note.
    pub fn from_message_type(message_type: i64) -> Self {
        if message_type == 1 {
            Visibility::Internal
        } else {
            Visibility::Public
        }
    }
}

/// One entry in a ticket's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub ticket_id: i64,
    pub created_at: DateTime<Utc>,
    pub author: String,
    /// Rich-text (HTML) body.
    pub body: String,
    pub visibility: Visibility,
}

/// Metadata of a file attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub ticket_id: i64,
    /// Content hash; also the file's name on the remote store.
    pub upload_hash: String,
    pub original_name: String,
}

/// Convert a Unix timestamp column into a UTC datetime.
pub(crate) fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, RepositoryError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| RepositoryError::InvalidRow(format!("timestamp out of range: {}", ts)))
}
