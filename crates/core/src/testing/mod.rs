//! Testing utilities and mock implementations.
//!
//! [`MockIssueTracker`] stands in for the issue tracker; [`fixtures`]
//! builds source records and an in-memory source database, so a full
//! migration can run without any external service.
//!
//! # Example
//!
//! ```rust,ignore
//! use deskmigrate_core::testing::{fixtures::SourceDbBuilder, MockIssueTracker};
//!
//! let repo = SourceDbBuilder::new()
//!     .user(1, "Ada", "Lovelace", "ada@example.com")
//!     .ticket(10, "100", Some("Login Error"), Some(1), 1_700_000_000, Some(1))
//!     .message(10, 1_700_000_000, Some(1), "<p>Help</p>", 0)
//!     .build()?;
//! let tracker = MockIssueTracker::new();
//! ```

mod mock_tracker;

pub use mock_tracker::{done_transition, MockIssue, MockIssueTracker};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::{params, Connection};

    use crate::source::{
        AttachmentMeta, Message, RepositoryError, SqliteTicketRepository, Ticket, Visibility,
        SOURCE_SCHEMA,
    };

    /// 2024-03-05 09:30:00 UTC, the base time of fixture records.
    pub fn base_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_631_000, 0)
            .single()
            .unwrap_or_default()
    }

    /// Create a test ticket with reasonable defaults.
    pub fn ticket(id: i64, number: &str, subject: &str) -> Ticket {
        Ticket {
            id,
            number: number.to_string(),
            subject: Some(subject.to_string()),
            priority_tier: Some(2),
            status_id: Some(1),
            created_at: base_time(),
            submitter_name: "Ada Lovelace".to_string(),
        }
    }

    /// Create a public message `minutes` after the base time.
    pub fn message(ticket_id: i64, minutes: i64, author: &str, body: &str) -> Message {
        Message {
            ticket_id,
            created_at: base_time() + chrono::Duration::minutes(minutes),
            author: author.to_string(),
            body: body.to_string(),
            visibility: Visibility::Public,
        }
    }

    /// Create an internal note `minutes` after the base time.
    pub fn internal_note(ticket_id: i64, minutes: i64, author: &str, body: &str) -> Message {
        Message {
            visibility: Visibility::Internal,
            ..message(ticket_id, minutes, author, body)
        }
    }

    /// Create attachment metadata.
    pub fn attachment(ticket_id: i64, upload_hash: &str, original_name: &str) -> AttachmentMeta {
        AttachmentMeta {
            ticket_id,
            upload_hash: upload_hash.to_string(),
            original_name: original_name.to_string(),
        }
    }

    enum Row {
        User(i64, String, String, String),
        Ticket(i64, String, Option<String>, Option<i64>, i64, Option<i64>),
        Message(i64, i64, Option<i64>, String, i64),
        Attachment(i64, String, String),
    }

    /// Builds an in-memory source database with the helpdesk schema.
    #[derive(Default)]
    pub struct SourceDbBuilder {
        rows: Vec<Row>,
    }

    impl SourceDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, id: i64, firstname: &str, lastname: &str, email: &str) -> Self {
            self.rows.push(Row::User(
                id,
                firstname.to_string(),
                lastname.to_string(),
                email.to_string(),
            ));
            self
        }

        /// Add a ticket; `created_at` is a Unix timestamp.
        pub fn ticket(
            mut self,
            id: i64,
            number: &str,
            subject: Option<&str>,
            priority_id: Option<i64>,
            created_at: i64,
            user_id: Option<i64>,
        ) -> Self {
            self.rows.push(Row::Ticket(
                id,
                number.to_string(),
                subject.map(str::to_string),
                priority_id,
                created_at,
                user_id,
            ));
            self
        }

        /// Add a message; `message_type` 1 marks an internal note.
        pub fn message(
            mut self,
            ticket_id: i64,
            created_at: i64,
            user_id: Option<i64>,
            text: &str,
            message_type: i64,
        ) -> Self {
            self.rows.push(Row::Message(
                ticket_id,
                created_at,
                user_id,
                text.to_string(),
                message_type,
            ));
            self
        }

        pub fn attachment(mut self, ticket_id: i64, upload_hash: &str, original_name: &str) -> Self {
            self.rows.push(Row::Attachment(
                ticket_id,
                upload_hash.to_string(),
                original_name.to_string(),
            ));
            self
        }

        /// Create the schema, insert every row and wrap it in a repository.
        pub fn build(self) -> Result<SqliteTicketRepository, RepositoryError> {
            let conn = Connection::open_in_memory()
                .map_err(|e| RepositoryError::Connection(e.to_string()))?;
            conn.execute_batch(SOURCE_SCHEMA)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            for row in self.rows {
                let result = match row {
                    Row::User(id, first, last, email) => conn.execute(
                        r#"INSERT INTO "user" (id, firstname, lastname, email) VALUES (?1, ?2, ?3, ?4)"#,
                        params![id, first, last, email],
                    ),
                    Row::Ticket(id, number, subject, priority, created_at, user_id) => conn.execute(
                        "INSERT INTO ticket (id, number, subject, priority_id, status_id, created_at, user_id)
                         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                        params![id, number, subject, priority, created_at, user_id],
                    ),
                    Row::Message(ticket_id, created_at, user_id, text, message_type) => conn.execute(
                        "INSERT INTO ticket_message (ticket_id, created_at, user_id, text, type)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![ticket_id, created_at, user_id, text, message_type],
                    ),
                    Row::Attachment(ticket_id, hash, name) => conn.execute(
                        "INSERT INTO ticket_attachment (ticket_id, upload_hash, original_name)
                         VALUES (?1, ?2, ?3)",
                        params![ticket_id, hash, name],
                    ),
                };
                result.map_err(|e| RepositoryError::Query(e.to_string()))?;
            }

            Ok(SqliteTicketRepository::from_connection(conn))
        }
    }
}
