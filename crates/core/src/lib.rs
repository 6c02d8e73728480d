pub mod attachments;
pub mod config;
pub mod conversation;
pub mod ledger;
pub mod orchestrator;
pub mod scheduler;
pub mod source;
pub mod testing;
pub mod tracker;

pub use attachments::{
    AttachmentError, AttachmentResolver, FsRemoteStore, InlineFetcher, RemoteFileStore,
    SftpRemoteStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, PriorityMap,
    SanitizedConfig, SourceBackend,
};
pub use conversation::UrlRewrite;
pub use ledger::{create_ledger, FileLedgerStore, LedgerHandle, LedgerStore};
pub use orchestrator::{IssueOrchestrator, MigrationReport, OrchestratorConfig, TicketFailure};
pub use scheduler::{
    check_tracker, load_tickets, resolve_done_transition, MigrationScheduler, RunError,
    RunSummary, SchedulerConfig,
};
pub use source::{
    MySqlTicketRepository, SqliteTicketRepository, TicketFilter, TicketRepository,
};
pub use tracker::{IssueTracker, JiraClient, TrackerError};
