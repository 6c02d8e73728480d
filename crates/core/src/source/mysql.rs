//! MySQL-backed source repository for the live helpdesk database.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;

use super::repository::{group_messages, placeholders};
use super::types::unix_to_utc;
use super::{
    AttachmentMeta, Message, RepositoryError, Ticket, TicketFilter, TicketRepository, Visibility,
};

const TICKET_QUERY: &str = r#"
    SELECT
        CAST(t.id AS SIGNED) AS id,
        CAST(t.number AS CHAR) AS number,
        t.subject AS subject,
        CAST(t.priority_id AS SIGNED) AS priority_id,
        CAST(t.status_id AS SIGNED) AS status_id,
        CAST(t.created_at AS SIGNED) AS created_at,
        COALESCE(
            NULLIF(TRIM(CONCAT_WS(' ', u.firstname, u.lastname)), ''),
            NULLIF(TRIM(u.email), '')
        ) AS submitter_name
    FROM ticket AS t
    LEFT JOIN `user` AS u ON t.user_id = u.id
"#;

/// How long a worker waits for a pooled connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Ticket repository over a pooled MySQL connection.
#[derive(Clone)]
pub struct MySqlTicketRepository {
    pool: MySqlPool,
}

impl MySqlTicketRepository {
    /// Connect with a pool of `max_connections`, sized to the ticket worker pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_ticket(row: &MySqlRow) -> Result<Ticket, RepositoryError> {
        Ok(Ticket {
            id: get(row, "id")?,
            number: get(row, "number")?,
            subject: get(row, "subject")?,
            priority_tier: get(row, "priority_id")?,
            status_id: get(row, "status_id")?,
            created_at: unix_to_utc(get(row, "created_at")?)?,
            submitter_name: get::<Option<String>>(row, "submitter_name")?
                .unwrap_or_else(|| "Unknown User".to_string()),
        })
    }

    fn row_to_message(row: &MySqlRow) -> Result<Message, RepositoryError> {
        Ok(Message {
            ticket_id: get(row, "ticket_id")?,
            created_at: unix_to_utc(get(row, "ts")?)?,
            author: get(row, "user_name")?,
            body: get::<Option<String>>(row, "body")?.unwrap_or_default(),
            visibility: Visibility::from_message_type(
                get::<Option<i64>>(row, "msg_type")?.unwrap_or(0),
            ),
        })
    }
}

fn get<'r, T>(row: &'r MySqlRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(column)
        .map_err(|e| RepositoryError::InvalidRow(format!("{}: {}", column, e)))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            RepositoryError::Connection(e.to_string())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

#[async_trait]
impl TicketRepository for MySqlTicketRepository {
    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError> {
        let mut sql = TICKET_QUERY.to_string();
        if filter.number.is_some() {
            sql.push_str(" WHERE t.number = ?");
        }
        sql.push_str(" ORDER BY t.id");

        let mut query = sqlx::query(&sql);
        if let Some(number) = &filter.number {
            query = query.bind(number);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(query_error)?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    async fn load_messages(
        &self,
        ticket_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Message>>, RepositoryError> {
        if ticket_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT
                CAST(tm.ticket_id AS SIGNED) AS ticket_id,
                CAST(tm.created_at AS SIGNED) AS ts,
                COALESCE(
                    NULLIF(TRIM(CONCAT_WS(' ', u.firstname, u.lastname)), ''),
                    NULLIF(TRIM(tm.user_name), ''),
                    NULLIF(TRIM(u.email), ''),
                    'Unknown'
                ) AS user_name,
                tm.text AS body,
                CAST(tm.type AS SIGNED) AS msg_type
            FROM ticket_message AS tm
            LEFT JOIN `user` AS u ON tm.user_id = u.id
            WHERE tm.ticket_id IN ({})
            ORDER BY tm.ticket_id, tm.created_at, tm.id
            "#,
            placeholders(ticket_ids.len())
        );

        let mut query = sqlx::query(&sql);
        for id in ticket_ids {
            query = query.bind(*id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(query_error)?;
        let messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(group_messages(messages))
    }

    async fn load_attachment_meta(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<AttachmentMeta>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT upload_hash, original_name FROM ticket_attachment WHERE ticket_id = ? ORDER BY id",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(AttachmentMeta {
                    ticket_id,
                    upload_hash: get(row, "upload_hash")?,
                    original_name: get(row, "original_name")?,
                })
            })
            .collect()
    }
}
