//! Migration lifecycle integration tests.
//!
//! These tests run the scheduler end to end against an in-memory source
//! database, a filesystem remote store, a local HTTP server serving inline
//! images and the mock issue tracker:
//! - Issue contents (summary, priority, description segments)
//! - Description overflow into comments
//! - Skip ledger entries for failed tickets
//! - Attachment staging from both origins
//! - Graceful cancellation

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use deskmigrate_core::{
    conversation::ENTRY_SEPARATOR,
    create_ledger, load_tickets,
    testing::{fixtures::SourceDbBuilder, MockIssueTracker},
    AttachmentResolver, FileLedgerStore, FsRemoteStore, InlineFetcher, IssueOrchestrator,
    LedgerStore, MigrationScheduler, OrchestratorConfig, PriorityMap, RunSummary,
    SchedulerConfig, SqliteTicketRepository, TicketFilter, UrlRewrite,
};

/// 2024-03-05 10:00:00 UTC
const CREATED_AT: i64 = 1_709_632_800;

/// Serves `/files/{hash}` with the hash as body; `gone` answers 404.
async fn serve_inline_images() -> SocketAddr {
    async fn file(UrlPath(hash): UrlPath<String>) -> Result<Vec<u8>, StatusCode> {
        if hash == "gone" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(format!("image {}", hash).into_bytes())
    }

    let app = Router::new().route("/files/{hash}", get(file));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct TestHarness {
    tracker: Arc<MockIssueTracker>,
    remote: TempDir,
    local: TempDir,
    ledger_dir: TempDir,
    config: OrchestratorConfig,
    scheduler_config: SchedulerConfig,
    inline_base: Option<String>,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            tracker: Arc::new(MockIssueTracker::new()),
            remote: TempDir::new().unwrap(),
            local: TempDir::new().unwrap(),
            ledger_dir: TempDir::new().unwrap(),
            config: OrchestratorConfig::default(),
            scheduler_config: SchedulerConfig {
                max_parallel_tickets: 4,
                message_batch_size: 2,
            },
            inline_base: None,
        }
    }

    async fn with_inline_server(mut self) -> Self {
        let addr = serve_inline_images().await;
        self.inline_base = Some(format!("http://{}", addr));
        self
    }

    fn remote_file(&self, hash: &str, contents: &[u8]) {
        std::fs::write(self.remote.path().join(hash), contents).unwrap();
    }

    fn orchestrator(&self) -> IssueOrchestrator {
        let mut resolver = AttachmentResolver::new(self.local.path())
            .with_remote_store(Arc::new(FsRemoteStore::new(self.remote.path())));
        if self.inline_base.is_some() {
            resolver = resolver.with_inline_fetcher(InlineFetcher::with_client(
                reqwest::Client::new(),
                1,
                Duration::from_millis(1),
            ));
        }

        let priorities = PriorityMap::new(
            HashMap::from([
                (1, "High".to_string()),
                (2, "Medium".to_string()),
                (3, "Low".to_string()),
            ]),
            "Medium",
        );
        let orchestrator = IssueOrchestrator::new(
            self.tracker.clone(),
            resolver,
            self.config.clone(),
            priorities,
            "31",
        );
        match &self.inline_base {
            Some(base) => orchestrator.with_url_rewrite(UrlRewrite::new("https://old.example", base)),
            None => orchestrator,
        }
    }

    /// Run every ticket in `repo`, returning the summary and ledger lines.
    async fn run(
        &self,
        repo: SqliteTicketRepository,
        cancel: CancellationToken,
    ) -> (RunSummary, Vec<String>) {
        self.run_with(repo, cancel, |_| {}).await
    }

    async fn run_with(
        &self,
        repo: SqliteTicketRepository,
        cancel: CancellationToken,
        observe: impl FnOnce(&MigrationScheduler),
    ) -> (RunSummary, Vec<String>) {
        let repo = Arc::new(repo);
        let tickets = load_tickets(repo.as_ref(), &TicketFilter::all())
            .await
            .unwrap();

        let started = Utc.timestamp_opt(CREATED_AT, 0).unwrap();
        let store = Arc::new(FileLedgerStore::in_dir(self.ledger_dir.path(), started).unwrap());
        let ledger_path = store.location().to_path_buf();
        let (ledger, writer) = create_ledger(store, 100);
        let writer: JoinHandle<usize> = tokio::spawn(writer.run());

        let scheduler = MigrationScheduler::new(
            repo,
            Arc::new(self.orchestrator()),
            ledger,
            self.scheduler_config,
        )
        .with_ledger_path(&ledger_path);
        observe(&scheduler);
        let summary = scheduler.run(tickets, cancel).await;
        drop(scheduler);
        writer.await.unwrap();

        (summary, read_ledger(&ledger_path))
    }
}

fn read_ledger(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_public_and_internal_messages_become_one_issue() {
    let harness = TestHarness::new();
    let repo = SourceDbBuilder::new()
        .user(1, "Ada", "Lovelace", "ada@example.com")
        .user(2, "Grace", "Hopper", "grace@example.com")
        .ticket(10, "100", Some("Login Error"), Some(1), CREATED_AT, Some(1))
        .message(10, CREATED_AT, Some(1), "<p>I cannot log in</p>", 0)
        .message(10, CREATED_AT + 300, Some(2), "<p>Checked the <b>auth</b> logs</p>", 1)
        .build()
        .unwrap();

    let (summary, ledger) = harness.run(repo, CancellationToken::new()).await;

    assert_eq!(summary.migrated, 1);
    assert_eq!(summary.failed, 0);
    assert!(ledger.is_empty());

    let issue = harness.tracker.issue_for_ticket("100").await.unwrap();
    assert_eq!(issue.created.summary, "[100] Login Error (Created: 2024-03-05)");
    assert_eq!(issue.created.priority, "High");
    assert!(issue.created.labels.contains(&"supportpal-migration".to_string()));
    assert!(issue.is_done());

    let segments: Vec<&str> = issue.description.split(ENTRY_SEPARATOR).collect();
    assert_eq!(segments.len(), 3, "submitter block plus two messages");
    assert!(segments[0].contains("Ada Lovelace"));
    assert!(segments[1].starts_with("*Originally created by Ada Lovelace on 2024-03-05 10:00:00 UTC*"));
    assert!(segments[1].contains("I cannot log in"));
    assert!(segments[2].contains("Internal Note"));
    assert!(segments[2].contains("*Commented by Grace Hopper on 2024-03-05 10:05:00 UTC*"));
    assert!(segments[2].contains("Checked the auth logs"));
}

#[tokio::test]
async fn test_long_description_is_split_into_comments() {
    let mut harness = TestHarness::new();
    harness.config.max_field_chars = 1000;
    let body = "é".repeat(2500);
    let repo = SourceDbBuilder::new()
        .ticket(10, "100", Some("Huge"), Some(2), CREATED_AT, None)
        .message(10, CREATED_AT, None, &body, 0)
        .build()
        .unwrap();

    let (summary, _) = harness.run(repo, CancellationToken::new()).await;
    assert_eq!(summary.migrated, 1);

    let issue = harness.tracker.issue_for_ticket("100").await.unwrap();
    assert_eq!(issue.description.chars().count(), 1000);
    assert!(!issue.comments.is_empty());
    assert!(issue.comments.iter().all(|c| c.chars().count() <= 1000));

    let full: String = std::iter::once(issue.description.as_str())
        .chain(issue.comments.iter().map(String::as_str))
        .collect();
    assert!(full.ends_with(&body));
    assert!(full.starts_with("{panel:title=Submitter"));
}

#[tokio::test]
async fn test_failed_tickets_recorded_in_ledger() {
    let harness = TestHarness::new();
    harness.tracker.fail_create_for("102").await;
    let repo = SourceDbBuilder::new()
        .ticket(1, "100", Some("fine"), Some(1), CREATED_AT, None)
        .message(1, CREATED_AT, None, "<p>ok</p>", 0)
        .ticket(2, "101", Some("empty"), Some(1), CREATED_AT, None)
        .ticket(3, "102", Some("rejected"), Some(1), CREATED_AT, None)
        .message(3, CREATED_AT, None, "<p>ok</p>", 0)
        .ticket(4, "103", Some("fine too"), Some(1), CREATED_AT, None)
        .message(4, CREATED_AT, None, "<p>ok</p>", 0)
        .build()
        .unwrap();

    let (summary, mut ledger) = harness.run(repo, CancellationToken::new()).await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.migrated, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.not_started, 0);
    assert_eq!(harness.tracker.issue_count().await, 2);
    assert!(harness.tracker.issue_for_ticket("101").await.is_none());

    ledger.sort();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0], "101\tticket has no messages");
    assert!(ledger[1].starts_with("102\tcreate issue failed"));
    assert_eq!(ledger.iter().filter(|l| l.starts_with("101\t")).count(), 1);
}

#[tokio::test]
async fn test_missing_attachment_does_not_block_ticket() {
    let harness = TestHarness::new();
    harness.remote_file("hash-log", b"log contents");
    let repo = SourceDbBuilder::new()
        .ticket(10, "100", Some("Files"), Some(3), CREATED_AT, None)
        .message(10, CREATED_AT, None, "<p>see attached</p>", 0)
        .attachment(10, "hash-log", "server.log")
        .attachment(10, "hash-gone", "trace.txt")
        .build()
        .unwrap();

    let (summary, ledger) = harness.run(repo, CancellationToken::new()).await;
    assert_eq!(summary.migrated, 1);
    assert!(ledger.is_empty());

    let issue = harness.tracker.issue_for_ticket("100").await.unwrap();
    assert_eq!(issue.created.priority, "Low");
    assert_eq!(issue.attachments, vec![("server.log".to_string(), 12)]);
    assert!(issue.is_done());
}

#[tokio::test]
async fn test_inline_image_rewritten_fetched_and_uploaded() {
    let harness = TestHarness::new().with_inline_server().await;
    harness.remote_file("abc123", b"stale copy");
    let repo = SourceDbBuilder::new()
        .ticket(10, "100", Some("Screenshot"), Some(1), CREATED_AT, None)
        .message(
            10,
            CREATED_AT,
            None,
            r#"<p>Look:</p><img src="https://old.example/files/abc123">"#,
            0,
        )
        .attachment(10, "abc123", "screenshot.png")
        .build()
        .unwrap();

    let (summary, _) = harness.run(repo, CancellationToken::new()).await;
    assert_eq!(summary.migrated, 1);

    let issue = harness.tracker.issue_for_ticket("100").await.unwrap();
    assert!(issue.description.contains("!screenshot.png!"));
    assert!(!issue.description.contains("old.example"));
    assert_eq!(issue.attachment_names(), vec!["screenshot.png".to_string()]);
    // Served by the inline host, not copied from the remote store.
    assert_eq!(issue.attachments[0].1, "image abc123".len() as u64);

    let staged = harness.local.path().join("10").join("screenshot.png");
    assert_eq!(std::fs::read(staged).unwrap(), b"image abc123");
}

#[tokio::test]
async fn test_unavailable_inline_image_keeps_placeholder() {
    let harness = TestHarness::new().with_inline_server().await;
    let repo = SourceDbBuilder::new()
        .ticket(10, "100", Some("Broken image"), Some(1), CREATED_AT, None)
        .message(
            10,
            CREATED_AT,
            None,
            r#"<img src="https://old.example/files/gone">"#,
            0,
        )
        .build()
        .unwrap();

    let (summary, ledger) = harness.run(repo, CancellationToken::new()).await;
    assert_eq!(summary.migrated, 1);
    assert!(ledger.is_empty());

    let issue = harness.tracker.issue_for_ticket("100").await.unwrap();
    assert!(issue.description.contains("!gone!"));
    assert!(issue.attachments.is_empty());
}

#[tokio::test]
async fn test_cancellation_drains_started_tickets() {
    let mut harness = TestHarness::new();
    harness.scheduler_config = SchedulerConfig {
        max_parallel_tickets: 1,
        message_batch_size: 500,
    };
    harness.tracker.set_delay(Duration::from_millis(20)).await;

    let mut builder = SourceDbBuilder::new();
    for id in 1..=8 {
        builder = builder
            .ticket(id, &(100 + id).to_string(), Some("queued"), Some(1), CREATED_AT, None)
            .message(id, CREATED_AT, None, "<p>hi</p>", 0);
    }
    let repo = builder.build().unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let (summary, ledger) = harness
        .run_with(repo, cancel, move |scheduler| {
            let progress = scheduler.progress();
            tokio::spawn(async move {
                while progress.completed() == 0 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                trigger.cancel();
            });
        })
        .await;

    assert!(summary.migrated >= 1);
    assert!(summary.not_started >= 1);
    assert_eq!(summary.migrated + summary.failed + summary.not_started, 8);
    assert!(ledger.is_empty());

    let issues = harness.tracker.issues().await;
    assert_eq!(issues.len(), summary.migrated);
    assert!(issues.iter().all(|issue| issue.is_done()));
}
