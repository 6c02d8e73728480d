//! Jira REST API (v2) client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::TrackerConfig;

use super::{IssueRef, IssueTracker, NewIssue, Transition, TrackerError};

/// Jira client authenticating with HTTP basic auth (user + API token).
pub struct JiraClient {
    client: Client,
    base_url: String,
    user: String,
    api_token: String,
}

impl JiraClient {
    /// Create a new Jira client. Certificate validation stays enabled.
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| TrackerError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2{}", self.base_url, path)
    }

    fn issue_url(&self, key: &str, suffix: &str) -> String {
        self.url(&format!("/issue/{}{}", urlencoding::encode(key), suffix))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.user, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TrackerError> {
        let response = self.authed(request).send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Timeout
            } else if e.is_connect() {
                TrackerError::ConnectionFailed(e.to_string())
            } else {
                TrackerError::InvalidResponse(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        Err(match status.as_u16() {
            401 | 403 => TrackerError::AuthenticationFailed(message),
            404 => TrackerError::NotFound(message),
            code => TrackerError::ApiError {
                status: code,
                message,
            },
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, TrackerError> {
        response
            .json::<T>()
            .await
            .map_err(|e| TrackerError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    fn name(&self) -> &str {
        "jira"
    }

    async fn check_connection(&self) -> Result<(), TrackerError> {
        let response = self.send(self.client.get(self.url("/myself"))).await?;
        let me: Myself = Self::json(response).await?;
        debug!(user = ?me.display_name, "Connected to Jira");
        Ok(())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, TrackerError> {
        let body = json!({
            "fields": {
                "project": { "key": issue.project },
                "summary": issue.summary,
                "issuetype": { "name": issue.issue_type },
                "priority": { "name": issue.priority },
                "labels": issue.labels,
                "description": issue.description,
            }
        });
        let response = self
            .send(self.client.post(self.url("/issue")).json(&body))
            .await?;
        let created: CreatedIssue = Self::json(response).await?;
        Ok(IssueRef {
            id: created.id,
            key: created.key,
        })
    }

    async fn update_description(&self, key: &str, description: &str) -> Result<(), TrackerError> {
        let body = json!({ "fields": { "description": description } });
        self.send(self.client.put(self.issue_url(key, "")).json(&body))
            .await?;
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        let payload = json!({ "body": body });
        self.send(
            self.client
                .post(self.issue_url(key, "/comment"))
                .json(&payload),
        )
        .await?;
        Ok(())
    }

    async fn add_attachment(
        &self,
        key: &str,
        path: &Path,
        file_name: &str,
    ) -> Result<(), TrackerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TrackerError::AttachmentRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        self.send(
            self.client
                .post(self.issue_url(key, "/attachments"))
                .header("X-Atlassian-Token", "no-check")
                .multipart(form),
        )
        .await?;
        Ok(())
    }

    async fn attachment_names(&self, key: &str) -> Result<Vec<String>, TrackerError> {
        let response = self
            .send(
                self.client
                    .get(self.issue_url(key, ""))
                    .query(&[("fields", "attachment")]),
            )
            .await?;
        let issue: IssueAttachments = Self::json(response).await?;
        Ok(issue
            .fields
            .attachment
            .into_iter()
            .map(|a| a.filename)
            .collect())
    }

    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>, TrackerError> {
        let response = self
            .send(self.client.get(self.issue_url(key, "/transitions")))
            .await?;
        let list: TransitionList = Self::json(response).await?;
        Ok(list.transitions.into_iter().map(Transition::from).collect())
    }

    async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<(), TrackerError> {
        let body = json!({ "transition": { "id": transition_id } });
        self.send(
            self.client
                .post(self.issue_url(key, "/transitions"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn discover_done_transition(
        &self,
        project: &str,
        issue_type: &str,
    ) -> Result<Option<Transition>, TrackerError> {
        let response = self
            .send(self.client.get(self.url("/issue/createmeta")).query(&[
                ("projectKeys", project),
                ("issuetypeNames", issue_type),
                ("expand", "projects.issuetypes.transitions"),
            ]))
            .await?;
        let meta: CreateMeta = Self::json(response).await?;
        done_transition_from_meta(meta)
    }
}

/// Pick the first done-category transition of the first issue type.
fn done_transition_from_meta(meta: CreateMeta) -> Result<Option<Transition>, TrackerError> {
    let project = meta.projects.into_iter().next().ok_or_else(|| {
        TrackerError::InvalidResponse("no projects in createmeta response".to_string())
    })?;
    let issue_type = project.issuetypes.into_iter().next().ok_or_else(|| {
        TrackerError::InvalidResponse("no issue types in createmeta response".to_string())
    })?;
    Ok(issue_type
        .transitions
        .into_iter()
        .map(Transition::from)
        .find(Transition::is_done))
}

/// Condense a Jira error body into one line.
fn error_message(body: &str) -> String {
    if let Ok(errors) = serde_json::from_str::<ErrorBody>(body) {
        let mut parts = errors.error_messages;
        parts.extend(
            errors
                .errors
                .into_iter()
                .map(|(field, msg)| format!("{}: {}", field, msg)),
        );
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }
    body.chars().take(200).collect()
}

#[derive(Debug, Deserialize)]
struct Myself {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct IssueAttachments {
    fields: AttachmentFields,
}

#[derive(Debug, Deserialize)]
struct AttachmentFields {
    #[serde(default)]
    attachment: Vec<AttachmentDto>,
}

#[derive(Debug, Deserialize)]
struct AttachmentDto {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct TransitionList {
    #[serde(default)]
    transitions: Vec<TransitionDto>,
}

#[derive(Debug, Deserialize)]
struct TransitionDto {
    id: String,
    #[serde(default)]
    name: String,
    to: Option<StatusDto>,
}

#[derive(Debug, Deserialize)]
struct StatusDto {
    name: Option<String>,
    #[serde(rename = "statusCategory")]
    status_category: Option<CategoryDto>,
}

#[derive(Debug, Deserialize)]
struct CategoryDto {
    key: String,
}

impl From<TransitionDto> for Transition {
    fn from(dto: TransitionDto) -> Self {
        let (to_status, to_category) = match dto.to {
            Some(to) => (to.name, to.status_category.map(|c| c.key)),
            None => (None, None),
        };
        Transition {
            id: dto.id,
            name: dto.name,
            to_status,
            to_category,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateMeta {
    #[serde(default)]
    projects: Vec<ProjectMeta>,
}

#[derive(Debug, Deserialize)]
struct ProjectMeta {
    #[serde(default)]
    issuetypes: Vec<IssueTypeMeta>,
}

#[derive(Debug, Deserialize)]
struct IssueTypeMeta {
    #[serde(default)]
    transitions: Vec<TransitionDto>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: std::collections::BTreeMap<String, String>,
}
