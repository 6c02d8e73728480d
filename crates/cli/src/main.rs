use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deskmigrate_core::{
    check_tracker, create_ledger, load_config, load_tickets, resolve_done_transition,
    validate_config, AttachmentResolver, Config, FileLedgerStore, FsRemoteStore, InlineFetcher,
    IssueOrchestrator, IssueTracker, JiraClient, LedgerStore, MigrationScheduler,
    MySqlTicketRepository, OrchestratorConfig, PriorityMap, SanitizedConfig, SchedulerConfig,
    SftpRemoteStore, SourceBackend, SqliteTicketRepository, TicketFilter, TicketRepository,
    UrlRewrite,
};

/// Buffer size for the skip ledger channel
const LEDGER_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "deskmigrate", about = "Migrate helpdesk tickets into Jira", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "DESKMIGRATE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Migrate only the ticket with this public number.
    #[arg(long)]
    ticket: Option<String>,

    /// Do not fetch attachments from the remote file store.
    #[arg(long)]
    no_remote_attachments: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(args.log_format);

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run(args: Cli) -> Result<()> {
    info!("Loading configuration from {:?}", args.config);
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    validate_config(&config).context("Configuration validation failed")?;
    let sanitized = SanitizedConfig::from(&config);
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Configuration loaded"
    );

    let repository = open_repository(&config).await?;
    let tracker: Arc<dyn IssueTracker> =
        Arc::new(JiraClient::new(&config.tracker).context("Failed to create Jira client")?);

    // Run-fatal checks, before any ticket is touched
    let filter = match &args.ticket {
        Some(number) => TicketFilter::with_number(number.clone()),
        None => TicketFilter::all(),
    };
    let tickets = load_tickets(repository.as_ref(), &filter).await?;
    check_tracker(tracker.as_ref()).await?;
    let done_transition_id = resolve_done_transition(tracker.as_ref(), &config.tracker).await?;

    if tickets.is_empty() {
        warn!("No tickets to migrate");
    }

    let orchestrator = build_orchestrator(&config, &args, tracker, done_transition_id)?;

    let store = Arc::new(
        FileLedgerStore::in_dir(&config.migration.ledger_dir, Utc::now())
            .context("Failed to open skip ledger")?,
    );
    let ledger_path = store.location().to_path_buf();
    info!("Skipped tickets will be recorded in {:?}", ledger_path);
    let (ledger, ledger_writer) = create_ledger(store, LEDGER_BUFFER_SIZE);
    let writer_handle = tokio::spawn(ledger_writer.run());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing tickets already in progress");
            signal_token.cancel();
        }
    });

    let scheduler = MigrationScheduler::new(
        repository,
        Arc::new(orchestrator),
        ledger,
        SchedulerConfig::from(&config.migration),
    )
    .with_ledger_path(&ledger_path);
    let summary = scheduler.run(tickets, cancel).await;

    // Close the ledger channel and wait for the last lines to land
    drop(scheduler);
    match writer_handle.await {
        Ok(written) => info!("Skip ledger closed ({} entries)", written),
        Err(e) => error!("Skip ledger writer failed: {}", e),
    }

    println!(
        "Processed {} of {} tickets: {} migrated, {} failed, {} not started",
        summary.migrated + summary.failed,
        summary.total,
        summary.migrated,
        summary.failed,
        summary.not_started
    );
    if summary.failed > 0 {
        println!("Failed tickets are listed in {}", ledger_path.display());
    }

    Ok(())
}

async fn open_repository(config: &Config) -> Result<Arc<dyn TicketRepository>> {
    match config.source.backend {
        SourceBackend::Mysql => {
            let url = config
                .source
                .url
                .as_deref()
                .context("source.url is required for the mysql backend")?;
            let width = u32::try_from(config.migration.max_parallel_tickets).unwrap_or(u32::MAX);
            let repository = MySqlTicketRepository::connect(url, width)
                .await
                .context("Failed to connect to the source database")?;
            info!("Connected to MySQL source (pool size {})", width);
            Ok(Arc::new(repository))
        }
        SourceBackend::Sqlite => {
            let path = config
                .source
                .path
                .as_deref()
                .context("source.path is required for the sqlite backend")?;
            let repository = SqliteTicketRepository::open(path)
                .with_context(|| format!("Failed to open source database {:?}", path))?;
            info!("Opened SQLite source {:?}", path);
            Ok(Arc::new(repository))
        }
    }
}

fn build_orchestrator(
    config: &Config,
    args: &Cli,
    tracker: Arc<dyn IssueTracker>,
    done_transition_id: String,
) -> Result<IssueOrchestrator> {
    let mut resolver = AttachmentResolver::new(&config.attachments.local_root);

    match (remote_base(config, args), &config.attachments.sftp) {
        (Some(base), Some(sftp)) => {
            info!("Fetching attachments from {}:{:?} over SFTP", sftp.host, base);
            resolver =
                resolver.with_remote_store(Arc::new(SftpRemoteStore::new(sftp.clone(), base)));
        }
        (Some(base), None) => {
            info!("Fetching attachments from {:?}", base);
            resolver = resolver.with_remote_store(Arc::new(FsRemoteStore::new(base)));
        }
        (None, _) => info!("Remote attachments disabled"),
    }

    let mut rewrite = None;
    if let Some(inline) = &config.inline_images {
        let fetcher =
            InlineFetcher::from_config(inline).context("Failed to create inline image client")?;
        resolver = resolver.with_inline_fetcher(fetcher);
        rewrite = Some(UrlRewrite::new(
            inline.legacy_base_url.as_str(),
            inline.new_base_url.as_str(),
        ));
        info!(
            "Rewriting inline images from {} to {}",
            inline.legacy_base_url, inline.new_base_url
        );
    }

    let priorities =
        PriorityMap::from_config(&config.priority).context("Invalid priority table")?;
    let orchestrator = IssueOrchestrator::new(
        tracker,
        resolver,
        OrchestratorConfig::from_config(config),
        priorities,
        done_transition_id,
    );

    Ok(match rewrite {
        Some(rewrite) => orchestrator.with_url_rewrite(rewrite),
        None => orchestrator,
    })
}

fn remote_base<'a>(config: &'a Config, args: &Cli) -> Option<&'a Path> {
    if args.no_remote_attachments || !config.attachments.enabled {
        return None;
    }
    config.attachments.remote_base.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["deskmigrate"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.ticket.is_none());
        assert!(!cli.no_remote_attachments);
    }

    #[test]
    fn test_single_ticket_without_remote_attachments() {
        let cli = Cli::try_parse_from([
            "deskmigrate",
            "--config",
            "/etc/deskmigrate.toml",
            "--ticket",
            "100234",
            "--no-remote-attachments",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/deskmigrate.toml"));
        assert_eq!(cli.ticket.as_deref(), Some("100234"));
        assert!(cli.no_remote_attachments);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["deskmigrate", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_remote_base_honours_flag_and_config() {
        let config = deskmigrate_core::load_config_from_str(
            r#"
            [source]
            backend = "sqlite"
            path = "dump.db"

            [tracker]
            url = "https://jira.example.com"
            user = "migrator@example.com"
            api_token = "secret"
            project = "SUP"
            issue_type = "Task"

            [attachments]
            remote_base = "/mnt/supportpal/uploads"
            "#,
        )
        .unwrap();

        let args = Cli::try_parse_from(["deskmigrate"]).unwrap();
        assert_eq!(
            remote_base(&config, &args),
            Some(Path::new("/mnt/supportpal/uploads"))
        );

        let args = Cli::try_parse_from(["deskmigrate", "--no-remote-attachments"]).unwrap();
        assert_eq!(remote_base(&config, &args), None);
    }
}
