// Mail endpoints

use serde_json::Value;

use super::client::GraphClient;
use super::models::{
    Collection, ItemBody, MailFolder, Message, OutgoingMessage, Recipient, ReplyRequest,
    SendMailRequest,
};
use crate::error::Result;

const SUMMARY_FIELDS: &str =
    "id,subject,from,toRecipients,receivedDateTime,isRead,bodyPreview,hasAttachments";
const DETAIL_FIELDS: &str =
    "id,subject,from,toRecipients,ccRecipients,receivedDateTime,isRead,body,hasAttachments";

/// New message to send from the signed-in mailbox
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub cc: Vec<String>,
    pub html: bool,
}

impl GraphClient {
    /// Newest first from `folder` (well-known name or folder id)
    pub async fn list_messages(
        &self,
        folder: &str,
        top: u32,
        skip: u32,
        filter: Option<&str>,
    ) -> Result<Collection<Message>> {
        let mut query = vec![
            ("$top", top.to_string()),
            ("$skip", skip.to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
            ("$select", SUMMARY_FIELDS.to_string()),
        ];
        if let Some(filter) = filter {
            query.push(("$filter", filter.to_string()));
        }
        self.get(&["me", "mailFolders", folder, "messages"], &query)
            .await
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message> {
        self.get(
            &["me", "messages", message_id],
            &[("$select", DETAIL_FIELDS.to_string())],
        )
        .await
    }

    /// Full-text search across all folders
    pub async fn search_messages(&self, search: &str, top: u32) -> Result<Collection<Message>> {
        self.get(
            &["me", "messages"],
            &[
                ("$search", format!("\"{}\"", search)),
                ("$top", top.to_string()),
                ("$select", SUMMARY_FIELDS.to_string()),
            ],
        )
        .await
    }

    pub async fn send_message(&self, message: NewMessage) -> Result<Value> {
        let to_recipients = message.to.into_iter().map(Recipient::address).collect();
        let cc_recipients = if message.cc.is_empty() {
            None
        } else {
            Some(message.cc.into_iter().map(Recipient::address).collect())
        };

        let request = SendMailRequest {
            message: OutgoingMessage {
                subject: message.subject,
                body: ItemBody {
                    content_type: Some(if message.html { "HTML" } else { "Text" }.to_string()),
                    content: Some(message.body),
                },
                to_recipients,
                cc_recipients,
            },
        };
        self.post(&["me", "sendMail"], &request).await
    }

    pub async fn reply_to_message(&self, message_id: &str, comment: &str) -> Result<Value> {
        let request = ReplyRequest {
            comment: comment.to_string(),
        };
        self.post(&["me", "messages", message_id, "reply"], &request)
            .await
    }

    pub async fn list_mail_folders(&self) -> Result<Collection<MailFolder>> {
        self.get(
            &["me", "mailFolders"],
            &[(
                "$select",
                "id,displayName,totalItemCount,unreadItemCount".to_string(),
            )],
        )
        .await
    }
}
