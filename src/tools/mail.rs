// Mail tools

use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::json;

use super::format::{recipient, recipient_list, truncate_chars, yes_no};
use super::{count_in, require, tool, Access};
use crate::error::{ApiError, Result};
use crate::graph::{GraphClient, NewMessage};

const PREVIEW_CHARS: usize = 120;

fn default_folder() -> String {
    "inbox".to_string()
}

fn default_top() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ListEmailsArgs {
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_top")]
    pub top: i64,
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReadEmailArgs {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchEmailsArgs {
    pub query: String,
    #[serde(default = "default_top")]
    pub top: i64,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailArgs {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub html: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplyEmailArgs {
    pub message_id: String,
    pub comment: String,
}

pub(crate) fn definitions() -> Vec<Tool> {
    vec![
        tool(
            "ms365_list_emails",
            "List emails from a mail folder (default: inbox). Returns subject, sender, date, and preview.",
            json!({
                "type": "object",
                "properties": {
                    "folder": {"type": "string", "default": "inbox", "description": "Mail folder to read from: 'inbox', 'sentitems', 'drafts', 'deleteditems', or a folder ID."},
                    "top": {"type": "integer", "default": 10, "minimum": 1, "maximum": 50, "description": "Number of emails to return (1-50)."},
                    "skip": {"type": "integer", "default": 0, "minimum": 0, "description": "Number of emails to skip for pagination."},
                    "unread_only": {"type": "boolean", "default": false, "description": "If true, return only unread emails."}
                }
            }),
            Access::ReadOnly,
        ),
        tool(
            "ms365_read_email",
            "Read the full content of an email message by its ID.",
            json!({
                "type": "object",
                "properties": {
                    "message_id": {"type": "string", "description": "The email message ID (from ms365_list_emails or ms365_search_emails)."}
                },
                "required": ["message_id"]
            }),
            Access::ReadOnly,
        ),
        tool(
            "ms365_search_emails",
            "Search emails across all folders by keyword.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query (searches subject, body, sender, etc.)."},
                    "top": {"type": "integer", "default": 10, "minimum": 1, "maximum": 25, "description": "Max results to return (1-25)."}
                },
                "required": ["query"]
            }),
            Access::ReadOnly,
        ),
        tool(
            "ms365_send_email",
            "Send an email from your Microsoft 365 account.",
            json!({
                "type": "object",
                "properties": {
                    "to": {"type": "array", "items": {"type": "string"}, "description": "List of recipient email addresses."},
                    "subject": {"type": "string", "description": "Email subject line."},
                    "body": {"type": "string", "description": "Email body content."},
                    "cc": {"type": "array", "items": {"type": "string"}, "description": "Optional CC recipients."},
                    "html": {"type": "boolean", "default": false, "description": "If true, body is treated as HTML."}
                },
                "required": ["to", "subject", "body"]
            }),
            Access::Write,
        ),
        tool(
            "ms365_reply_email",
            "Reply to an email message.",
            json!({
                "type": "object",
                "properties": {
                    "message_id": {"type": "string", "description": "The ID of the message to reply to."},
                    "comment": {"type": "string", "description": "Reply text content."}
                },
                "required": ["message_id", "comment"]
            }),
            Access::Write,
        ),
        tool(
            "ms365_list_mail_folders",
            "List all mail folders with message counts.",
            json!({"type": "object", "properties": {}}),
            Access::ReadOnly,
        ),
    ]
}

pub async fn list_emails(graph: &GraphClient, args: ListEmailsArgs) -> Result<String> {
    let top = count_in(args.top, 1..=50, "'top' must be between 1 and 50.")?;
    if args.skip < 0 {
        return Err(ApiError::validation("'skip' must be >= 0."));
    }
    let skip = count_in(args.skip, 0..=u32::MAX, "'skip' is too large.")?;

    let filter = args.unread_only.then_some("isRead eq false");
    let page = graph.list_messages(&args.folder, top, skip, filter).await?;
    if page.value.is_empty() {
        return Ok("No emails found.".to_string());
    }

    let mut lines = vec![format!(
        "**Showing {} email(s) from '{}':**\n",
        page.value.len(),
        args.folder
    )];
    for msg in &page.value {
        let unread = if msg.is_read.unwrap_or(false) { "" } else { " 🔵" };
        let attachment = if msg.has_attachments.unwrap_or(false) { " 📎" } else { "" };
        lines.push(format!(
            "- **{}**{}{}\n  From: {}\n  Date: {}\n  Preview: {}...\n  ID: `{}`\n",
            msg.subject.as_deref().unwrap_or(""),
            unread,
            attachment,
            recipient(msg.from.as_ref(), "Unknown"),
            msg.received_date_time.as_deref().unwrap_or(""),
            truncate_chars(msg.body_preview.as_deref().unwrap_or(""), PREVIEW_CHARS),
            msg.id
        ));
    }

    if let Some(total) = page.count.filter(|t| *t > 0) {
        lines.push(format!(
            "\n_Total: {} | Showing {}–{}_",
            total,
            u64::from(skip) + 1,
            u64::from(skip) + page.value.len() as u64
        ));
    }
    Ok(lines.join("\n"))
}

pub async fn read_email(graph: &GraphClient, args: ReadEmailArgs) -> Result<String> {
    let message_id = require(&args.message_id, "message_id is required.")?;
    let msg = graph.get_message(message_id).await?;

    let body = msg.body.unwrap_or_default();
    let content = body.content.unwrap_or_else(|| "No body".to_string());
    let cc_list = recipient_list(msg.cc_recipients.as_deref());

    let mut lines = vec![
        format!("# {}\n", msg.subject.as_deref().unwrap_or("")),
        format!("**From:** {}", recipient(msg.from.as_ref(), "Unknown")),
        format!("**To:** {}", recipient_list(msg.to_recipients.as_deref())),
    ];
    if !cc_list.is_empty() {
        lines.push(format!("**CC:** {}", cc_list));
    }
    lines.push(format!(
        "**Date:** {}",
        msg.received_date_time.as_deref().unwrap_or("")
    ));
    lines.push(format!("**Read:** {}", yes_no(msg.is_read)));
    lines.push(format!("**Attachments:** {}", yes_no(msg.has_attachments)));
    lines.push("\n---\n".to_string());

    if body.content_type.as_deref() == Some("html") {
        lines.push(format!("_(HTML email — showing raw HTML)_\n\n{}", content));
    } else {
        lines.push(content);
    }
    Ok(lines.join("\n"))
}

pub async fn search_emails(graph: &GraphClient, args: SearchEmailsArgs) -> Result<String> {
    let query = require(&args.query, "query is required.")?;
    let top = count_in(args.top, 1..=25, "'top' must be between 1 and 25.")?;

    let page = graph.search_messages(&args.query, top).await?;
    if page.value.is_empty() {
        return Ok(format!("No emails found matching '{}'.", query));
    }

    let mut lines = vec![format!(
        "**Found {} email(s) matching '{}':**\n",
        page.value.len(),
        args.query
    )];
    for msg in &page.value {
        lines.push(format!(
            "- **{}**\n  From: {} | Date: {}\n  Preview: {}...\n  ID: `{}`\n",
            msg.subject.as_deref().unwrap_or(""),
            recipient(msg.from.as_ref(), "Unknown"),
            msg.received_date_time.as_deref().unwrap_or(""),
            truncate_chars(msg.body_preview.as_deref().unwrap_or(""), PREVIEW_CHARS),
            msg.id
        ));
    }
    Ok(lines.join("\n"))
}

pub async fn send_email(graph: &GraphClient, args: SendEmailArgs) -> Result<String> {
    if args.to.is_empty() {
        return Err(ApiError::validation(
            "At least one recipient is required in 'to' field.",
        ));
    }
    require(&args.subject, "'subject' is required.")?;

    let to_list = args.to.join(", ");
    let subject = args.subject.clone();
    graph
        .send_message(NewMessage {
            to: args.to,
            subject: args.subject,
            body: args.body,
            cc: args.cc.unwrap_or_default(),
            html: args.html,
        })
        .await?;

    Ok(format!(
        "Email sent successfully to {} with subject '{}'.",
        to_list, subject
    ))
}

pub async fn reply_email(graph: &GraphClient, args: ReplyEmailArgs) -> Result<String> {
    let message_id = require(&args.message_id, "message_id is required.")?;
    require(&args.comment, "comment is required.")?;

    graph.reply_to_message(message_id, &args.comment).await?;
    Ok("Reply sent successfully.".to_string())
}

pub async fn list_mail_folders(graph: &GraphClient) -> Result<String> {
    let page = graph.list_mail_folders().await?;
    if page.value.is_empty() {
        return Ok("No mail folders found.".to_string());
    }

    let mut lines = vec!["**Mail Folders:**\n".to_string()];
    for folder in &page.value {
        let unread = folder.unread_item_count.unwrap_or(0);
        let unread_str = if unread > 0 {
            format!(" ({} unread)", unread)
        } else {
            String::new()
        };
        lines.push(format!(
            "- **{}** — {} messages{} | ID: `{}`",
            folder.display_name.as_deref().unwrap_or(""),
            folder.total_item_count.unwrap_or(0),
            unread_str,
            folder.id
        ));
    }
    Ok(lines.join("\n"))
}
