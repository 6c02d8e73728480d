//! Full issue description assembled from a ticket's conversation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::attachments::assign_file_names;
use crate::source::{AttachmentMeta, Message, Ticket, Visibility};

use super::transformer::{transform_body, UrlRewrite};

/// Separator placed between the submitter block and each message.
pub const ENTRY_SEPARATOR: &str = "\n\n----\n\n";

const SUBMITTER_PANEL: &str = "{panel:title=Submitter|bgColor=#EAE6FF}";
const INTERNAL_PANEL: &str = "{panel:title=Internal Note|bgColor=#DEEBFF}";
const PANEL_END: &str = "{panel}";

/// Description text plus the inline images it references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedDescription {
    pub text: String,
    /// Filenames of inline images referenced by placeholders.
    pub inline_attachments: BTreeSet<String>,
    /// Filename to download URL for each inline image.
    pub inline_urls: BTreeMap<String, String>,
}

/// Build the issue description for `ticket` from its ordered messages.
pub fn compose_description(
    ticket: &Ticket,
    messages: &[Message],
    attachments: &[AttachmentMeta],
    rewrite: Option<&UrlRewrite>,
) -> ComposedDescription {
    let hash_to_name = assign_file_names(attachments);

    let mut composed = ComposedDescription::default();
    let mut parts = Vec::with_capacity(messages.len() + 1);
    parts.push(format!(
        "{}\nSubmitted by: *{}*\n{}",
        SUBMITTER_PANEL, ticket.submitter_name, PANEL_END
    ));

    for (i, message) in messages.iter().enumerate() {
        let body = transform_body(&message.body, &hash_to_name, rewrite);
        composed.inline_attachments.extend(body.inline_attachments);
        composed.inline_urls.extend(body.inline_urls);

        let verb = if i == 0 { "Originally created" } else { "Commented" };
        let header = format!(
            "*{} by {} on {}*",
            verb,
            message.author,
            format_timestamp(&message.created_at)
        );

        let entry = match message.visibility {
            Visibility::Internal => format!(
                "{}\n{}\n\n{}\n{}",
                INTERNAL_PANEL, header, body.text, PANEL_END
            ),
            Visibility::Public => format!("{}\n\n{}", header, body.text),
        };
        parts.push(entry);
    }

    composed.text = parts.join(ENTRY_SEPARATOR);
    composed
}

/// `[<number>] <subject> (Created: <YYYY-MM-DD>)`
pub fn issue_summary(ticket: &Ticket) -> String {
    format!(
        "[{}] {} (Created: {})",
        ticket.number,
        ticket.display_subject(),
        ticket.created_at.format("%Y-%m-%d")
    )
}

/// Description set on the issue before attachments are resolved.
pub fn placeholder_description(ticket: &Ticket) -> String {
    format!("Migration placeholder for ticket {}", ticket.number)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
