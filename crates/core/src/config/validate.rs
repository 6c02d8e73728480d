use super::{
    types::{Config, SourceBackend},
    ConfigError, PriorityMap,
};

/// Validate configuration
/// Currently validates:
/// - Source connection matches the selected backend
/// - Tracker endpoint, credentials, project and issue type are set
/// - Pool widths and size limits are non-zero
/// - Remote store base is set when remote attachments are enabled
/// - SFTP access has a host, a user and a credential
/// - Inline image base URLs are both set
/// - Priority tiers parse as integers
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.source.backend {
        SourceBackend::Mysql => {
            if config.source.url.as_deref().map_or(true, str::is_empty) {
                return Err(invalid("source.url is required for the mysql backend"));
            }
        }
        SourceBackend::Sqlite => {
            if config.source.path.is_none() {
                return Err(invalid("source.path is required for the sqlite backend"));
            }
        }
    }

    let tracker = &config.tracker;
    for (name, value) in [
        ("tracker.url", &tracker.url),
        ("tracker.user", &tracker.user),
        ("tracker.api_token", &tracker.api_token),
        ("tracker.project", &tracker.project),
        ("tracker.issue_type", &tracker.issue_type),
        ("tracker.marker_label", &tracker.marker_label),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(&format!("{} cannot be empty", name)));
        }
    }
    if !tracker.url.starts_with("http://") && !tracker.url.starts_with("https://") {
        return Err(invalid("tracker.url must be an http(s) URL"));
    }
    if tracker.max_field_chars == 0 {
        return Err(invalid("tracker.max_field_chars cannot be 0"));
    }
    if tracker.timeout_secs == 0 {
        return Err(invalid("tracker.timeout_secs cannot be 0"));
    }
    if matches!(tracker.done_transition_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(invalid("tracker.done_transition_id cannot be empty when set"));
    }

    if config.attachments.max_parallel_uploads == 0 {
        return Err(invalid("attachments.max_parallel_uploads cannot be 0"));
    }
    if config.attachments.enabled && config.attachments.remote_base.is_none() {
        return Err(invalid(
            "attachments.remote_base is required when attachments are enabled",
        ));
    }

    if let Some(sftp) = &config.attachments.sftp {
        if sftp.host.trim().is_empty() || sftp.user.trim().is_empty() {
            return Err(invalid("attachments.sftp.host and attachments.sftp.user are required"));
        }
        if sftp.password.is_none() && sftp.private_key.is_none() {
            return Err(invalid(
                "attachments.sftp needs either a password or a private_key",
            ));
        }
        if sftp.timeout_secs == 0 {
            return Err(invalid("attachments.sftp.timeout_secs cannot be 0"));
        }
        if config.attachments.remote_base.is_none() {
            return Err(invalid("attachments.sftp needs attachments.remote_base"));
        }
    }

    if let Some(inline) = &config.inline_images {
        if inline.legacy_base_url.is_empty() || inline.new_base_url.is_empty() {
            return Err(invalid(
                "inline_images.legacy_base_url and inline_images.new_base_url must both be set",
            ));
        }
        if inline.timeout_secs == 0 {
            return Err(invalid("inline_images.timeout_secs cannot be 0"));
        }
    }

    if config.migration.max_parallel_tickets == 0 {
        return Err(invalid("migration.max_parallel_tickets cannot be 0"));
    }
    if config.migration.message_batch_size == 0 {
        return Err(invalid("migration.message_batch_size cannot be 0"));
    }

    PriorityMap::from_config(&config.priority)?;

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}
