//! Target issue tracker.
//!
//! The [`IssueTracker`] trait covers the calls a migration needs: issue
//! creation, description and comment updates, attachment upload and
//! workflow transitions. [`JiraClient`] implements it over the Jira REST API.

mod jira;
mod types;

pub use jira::JiraClient;
pub use types::*;
