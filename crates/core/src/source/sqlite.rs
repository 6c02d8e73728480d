//! SQLite-backed source repository.
//!
//! Reads a SQLite copy of the helpdesk schema. Also used by tests, which
//! create the schema with [`SOURCE_SCHEMA`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};

use super::repository::{group_messages, placeholders};
use super::types::unix_to_utc;
use super::{
    AttachmentMeta, Message, RepositoryError, Ticket, TicketFilter, TicketRepository, Visibility,
};

/// Helpdesk tables read by the migration.
pub const SOURCE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "user" (
    id INTEGER PRIMARY KEY,
    firstname TEXT,
    lastname TEXT,
    email TEXT
);

CREATE TABLE IF NOT EXISTS ticket (
    id INTEGER PRIMARY KEY,
    number TEXT NOT NULL,
    subject TEXT,
    priority_id INTEGER,
    status_id INTEGER,
    created_at INTEGER NOT NULL,
    user_id INTEGER
);

CREATE TABLE IF NOT EXISTS ticket_message (
    id INTEGER PRIMARY KEY,
    ticket_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    user_id INTEGER,
    user_name TEXT,
    text TEXT,
    type INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ticket_attachment (
    id INTEGER PRIMARY KEY,
    ticket_id INTEGER NOT NULL,
    upload_hash TEXT NOT NULL,
    original_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ticket_message_ticket ON ticket_message(ticket_id, created_at);
CREATE INDEX IF NOT EXISTS idx_ticket_attachment_ticket ON ticket_attachment(ticket_id);
"#;

const TICKET_COLUMNS: &str = r#"
    SELECT
        t.id,
        CAST(t.number AS TEXT),
        t.subject,
        t.priority_id,
        t.status_id,
        t.created_at,
        COALESCE(
            NULLIF(TRIM(COALESCE(u.firstname, '') || ' ' || COALESCE(u.lastname, '')), ''),
            NULLIF(TRIM(u.email), '')
        )
    FROM ticket AS t
    LEFT JOIN "user" AS u ON t.user_id = u.id
"#;

/// SQLite-backed ticket repository.
pub struct SqliteTicketRepository {
    conn: Mutex<Connection>,
}

impl SqliteTicketRepository {
    /// Open an existing database read-only.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already opened connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Connection("connection lock poisoned".to_string()))
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<TicketRow> {
        Ok(TicketRow {
            id: row.get(0)?,
            number: row.get(1)?,
            subject: row.get(2)?,
            priority_tier: row.get(3)?,
            status_id: row.get(4)?,
            created_at: row.get(5)?,
            submitter_name: row.get(6)?,
        })
    }
}

/// Raw ticket columns before timestamp conversion.
struct TicketRow {
    id: i64,
    number: String,
    subject: Option<String>,
    priority_tier: Option<i64>,
    status_id: Option<i64>,
    created_at: i64,
    submitter_name: Option<String>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            number: row.number,
            subject: row.subject,
            priority_tier: row.priority_tier,
            status_id: row.status_id,
            created_at: unix_to_utc(row.created_at)?,
            submitter_name: row
                .submitter_name
                .unwrap_or_else(|| "Unknown User".to_string()),
        })
    }
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError> {
        let conn = self.lock()?;

        let mut sql = TICKET_COLUMNS.to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(number) = &filter.number {
            sql.push_str(" WHERE CAST(t.number AS TEXT) = ?");
            args.push(number.clone());
        }
        sql.push_str(" ORDER BY t.id");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_ticket)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut tickets = Vec::new();
        for row in rows {
            let row = row.map_err(|e| RepositoryError::Query(e.to_string()))?;
            tickets.push(Ticket::try_from(row)?);
        }
        Ok(tickets)
    }

    async fn load_messages(
        &self,
        ticket_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Message>>, RepositoryError> {
        if ticket_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.lock()?;

        let sql = format!(
            r#"
            SELECT
                tm.ticket_id,
                tm.created_at,
                COALESCE(
                    NULLIF(TRIM(COALESCE(u.firstname, '') || ' ' || COALESCE(u.lastname, '')), ''),
                    NULLIF(TRIM(tm.user_name), ''),
                    NULLIF(TRIM(u.email), ''),
                    'Unknown'
                ),
                COALESCE(tm.text, ''),
                tm.type
            FROM ticket_message AS tm
            LEFT JOIN "user" AS u ON tm.user_id = u.id
            WHERE tm.ticket_id IN ({})
            ORDER BY tm.ticket_id, tm.created_at, tm.id
            "#,
            placeholders(ticket_ids.len())
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(ticket_ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows {
            let (ticket_id, ts, author, body, message_type) =
                row.map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(Message {
                ticket_id,
                created_at: unix_to_utc(ts)?,
                author,
                body,
                visibility: Visibility::from_message_type(message_type),
            });
        }
        Ok(group_messages(messages))
    }

    async fn load_attachment_meta(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<AttachmentMeta>, RepositoryError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT upload_hash, original_name FROM ticket_attachment WHERE ticket_id = ? ORDER BY id",
            )
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok(AttachmentMeta {
                    ticket_id,
                    upload_hash: row.get(0)?,
                    original_name: row.get(1)?,
                })
            })
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }
}
