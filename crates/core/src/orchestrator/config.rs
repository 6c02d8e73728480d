//! Orchestrator configuration.

use crate::config::{Config, UploadFailurePolicy};

/// Per-ticket settings for the issue orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Project key issues are created in.
    pub project: String,
    pub issue_type: String,
    /// Label added to every migrated issue.
    pub marker_label: String,
    /// Largest description (in characters) the tracker accepts.
    pub max_field_chars: usize,
    /// Width of the per-ticket upload pool.
    pub max_parallel_uploads: usize,
    pub upload_failure_policy: UploadFailurePolicy,
    /// Read back attachment names after uploading.
    pub verify_uploads: bool,
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            project: config.tracker.project.clone(),
            issue_type: config.tracker.issue_type.clone(),
            marker_label: config.tracker.marker_label.clone(),
            max_field_chars: config.tracker.max_field_chars,
            max_parallel_uploads: config.attachments.max_parallel_uploads,
            upload_failure_policy: config.attachments.upload_failure_policy,
            verify_uploads: config.attachments.verify_uploads,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project: "SUP".to_string(),
            issue_type: "Task".to_string(),
            marker_label: "supportpal-migration".to_string(),
            max_field_chars: 32_767,
            max_parallel_uploads: 5,
            upload_failure_policy: UploadFailurePolicy::AllowPartial,
            verify_uploads: false,
        }
    }
}
