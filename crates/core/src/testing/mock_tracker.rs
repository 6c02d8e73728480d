//! Mock issue tracker for testing.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::tracker::{IssueRef, IssueTracker, NewIssue, TrackerError, Transition};

/// An issue as recorded by the mock.
#[derive(Debug, Clone)]
pub struct MockIssue {
    pub key: String,
    /// Fields sent at creation.
    pub created: NewIssue,
    /// Current description.
    pub description: String,
    /// Every description written after creation, in order.
    pub description_updates: Vec<String>,
    pub comments: Vec<String>,
    /// Uploaded attachment names with their byte size.
    pub attachments: Vec<(String, u64)>,
    /// Applied transition ids.
    pub transitions: Vec<String>,
}

impl MockIssue {
    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_done(&self) -> bool {
        !self.transitions.is_empty()
    }
}

/// Mock implementation of the IssueTracker trait.
///
/// Provides controllable behavior for testing:
/// - Records every issue, description update, comment, upload and transition
/// - Fails creation, uploads or transitions on demand
/// - Configurable transition list and workflow metadata
/// - Optional per-call delay to keep tickets in flight
#[derive(Debug)]
pub struct MockIssueTracker {
    issues: Arc<RwLock<Vec<MockIssue>>>,
    next_id: AtomicU64,
    offered_transitions: Arc<RwLock<Vec<Transition>>>,
    meta_done_transition: Arc<RwLock<Option<Transition>>>,
    reachable: Arc<RwLock<bool>>,
    fail_create_numbers: Arc<RwLock<HashSet<String>>>,
    fail_upload_names: Arc<RwLock<HashSet<String>>>,
    fail_transition: Arc<RwLock<bool>>,
    fail_attachment_listing: Arc<RwLock<bool>>,
    /// Names returned by `attachment_names` in place of the recorded ones.
    listed_attachments_override: Arc<RwLock<Option<Vec<String>>>>,
    delay: Arc<RwLock<Duration>>,
    calls: Arc<RwLock<HashMap<&'static str, usize>>>,
}

impl Default for MockIssueTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The done transition the mock offers and advertises by default.
pub fn done_transition() -> Transition {
    Transition {
        id: "31".to_string(),
        name: "Done".to_string(),
        to_status: Some("Done".to_string()),
        to_category: Some("done".to_string()),
    }
}

fn start_transition() -> Transition {
    Transition {
        id: "11".to_string(),
        name: "Start Progress".to_string(),
        to_status: Some("In Progress".to_string()),
        to_category: Some("indeterminate".to_string()),
    }
}

impl MockIssueTracker {
    /// Create a reachable mock offering "Start Progress" and "Done".
    pub fn new() -> Self {
        Self {
            issues: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            offered_transitions: Arc::new(RwLock::new(vec![
                start_transition(),
                done_transition(),
            ])),
            meta_done_transition: Arc::new(RwLock::new(Some(done_transition()))),
            reachable: Arc::new(RwLock::new(true)),
            fail_create_numbers: Arc::new(RwLock::new(HashSet::new())),
            fail_upload_names: Arc::new(RwLock::new(HashSet::new())),
            fail_transition: Arc::new(RwLock::new(false)),
            fail_attachment_listing: Arc::new(RwLock::new(false)),
            listed_attachments_override: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// All issues created so far, in creation order.
    pub async fn issues(&self) -> Vec<MockIssue> {
        self.issues.read().await.clone()
    }

    /// Issue created for a ticket number, matched on the `[number]` summary prefix.
    pub async fn issue_for_ticket(&self, number: &str) -> Option<MockIssue> {
        let prefix = format!("[{}]", number);
        self.issues
            .read()
            .await
            .iter()
            .find(|i| i.created.summary.starts_with(&prefix))
            .cloned()
    }

    pub async fn issue_count(&self) -> usize {
        self.issues.read().await.len()
    }

    /// Number of calls made to a trait method, by method name.
    pub async fn call_count(&self, method: &str) -> usize {
        self.calls.read().await.get(method).copied().unwrap_or(0)
    }

    /// Make `check_connection` fail.
    pub async fn set_reachable(&self, reachable: bool) {
        *self.reachable.write().await = reachable;
    }

    /// Transitions returned by `list_transitions` for every issue.
    pub async fn set_offered_transitions(&self, transitions: Vec<Transition>) {
        *self.offered_transitions.write().await = transitions;
    }

    /// Done transition found in workflow metadata, if any.
    pub async fn set_meta_done_transition(&self, transition: Option<Transition>) {
        *self.meta_done_transition.write().await = transition;
    }

    /// Fail issue creation for the given ticket number.
    pub async fn fail_create_for(&self, number: &str) {
        self.fail_create_numbers
            .write()
            .await
            .insert(format!("[{}]", number));
    }

    /// Fail every upload of a file with this name.
    pub async fn fail_upload_named(&self, name: &str) {
        self.fail_upload_names.write().await.insert(name.to_string());
    }

    /// Make `transition_issue` fail.
    pub async fn set_fail_transition(&self, fail: bool) {
        *self.fail_transition.write().await = fail;
    }

    /// Make `attachment_names` fail.
    pub async fn set_fail_attachment_listing(&self, fail: bool) {
        *self.fail_attachment_listing.write().await = fail;
    }

    /// Report these names from `attachment_names` regardless of uploads.
    pub async fn set_listed_attachments(&self, names: Vec<String>) {
        *self.listed_attachments_override.write().await = Some(names);
    }

    /// Delay applied to every call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    async fn enter(&self, method: &'static str) {
        *self.calls.write().await.entry(method).or_insert(0) += 1;
        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn with_issue<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut MockIssue) -> T,
    ) -> Result<T, TrackerError> {
        let mut issues = self.issues.write().await;
        let issue = issues
            .iter_mut()
            .find(|i| i.key == key)
            .ok_or_else(|| TrackerError::NotFound(format!("Issue {} does not exist", key)))?;
        Ok(f(issue))
    }
}

#[async_trait]
impl IssueTracker for MockIssueTracker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_connection(&self) -> Result<(), TrackerError> {
        self.enter("check_connection").await;
        if *self.reachable.read().await {
            Ok(())
        } else {
            Err(TrackerError::ConnectionFailed(
                "mock tracker unreachable".to_string(),
            ))
        }
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, TrackerError> {
        self.enter("create_issue").await;
        let failing = self
            .fail_create_numbers
            .read()
            .await
            .iter()
            .any(|prefix| issue.summary.starts_with(prefix.as_str()));
        if failing {
            return Err(TrackerError::ApiError {
                status: 400,
                message: "priority: invalid".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}-{}", issue.project, id);
        self.issues.write().await.push(MockIssue {
            key: key.clone(),
            created: issue.clone(),
            description: issue.description.clone(),
            description_updates: Vec::new(),
            comments: Vec::new(),
            attachments: Vec::new(),
            transitions: Vec::new(),
        });
        Ok(IssueRef {
            id: id.to_string(),
            key,
        })
    }

    async fn update_description(&self, key: &str, description: &str) -> Result<(), TrackerError> {
        self.enter("update_description").await;
        self.with_issue(key, |issue| {
            issue.description = description.to_string();
            issue.description_updates.push(description.to_string());
        })
        .await
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        self.enter("add_comment").await;
        self.with_issue(key, |issue| issue.comments.push(body.to_string()))
            .await
    }

    async fn add_attachment(
        &self,
        key: &str,
        path: &Path,
        file_name: &str,
    ) -> Result<(), TrackerError> {
        self.enter("add_attachment").await;
        if self.fail_upload_names.read().await.contains(file_name) {
            return Err(TrackerError::ApiError {
                status: 500,
                message: format!("upload of {} rejected", file_name),
            });
        }
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| TrackerError::AttachmentRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .len();
        self.with_issue(key, |issue| {
            issue.attachments.push((file_name.to_string(), size))
        })
        .await
    }

    async fn attachment_names(&self, key: &str) -> Result<Vec<String>, TrackerError> {
        self.enter("attachment_names").await;
        if *self.fail_attachment_listing.read().await {
            return Err(TrackerError::Timeout);
        }
        if let Some(names) = self.listed_attachments_override.read().await.clone() {
            return Ok(names);
        }
        self.with_issue(key, |issue| issue.attachment_names()).await
    }

    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>, TrackerError> {
        self.enter("list_transitions").await;
        self.with_issue(key, |_| ()).await?;
        Ok(self.offered_transitions.read().await.clone())
    }

    async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<(), TrackerError> {
        self.enter("transition_issue").await;
        if *self.fail_transition.read().await {
            return Err(TrackerError::ApiError {
                status: 400,
                message: "transition not allowed".to_string(),
            });
        }
        self.with_issue(key, |issue| issue.transitions.push(transition_id.to_string()))
            .await
    }

    async fn discover_done_transition(
        &self,
        _project: &str,
        _issue_type: &str,
    ) -> Result<Option<Transition>, TrackerError> {
        self.enter("discover_done_transition").await;
        Ok(self.meta_done_transition.read().await.clone())
    }
}
