//! Read access to the source helpdesk database.
//!
//! Tickets, their message threads and attachment metadata are loaded
//! through the [`TicketRepository`] trait. Message threads are fetched in
//! batches so a run never issues one query per ticket.

mod mysql;
mod repository;
mod sqlite;
mod types;

pub use mysql::MySqlTicketRepository;
pub use repository::{RepositoryError, TicketFilter, TicketRepository};
pub use sqlite::{SqliteTicketRepository, SOURCE_SCHEMA};
pub use types::{AttachmentMeta, Message, Ticket, Visibility};
