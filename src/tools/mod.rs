// Tool layer
// Microsoft 365 tools exposed to the assistant: argument checks, Graph calls, markdown output

mod calendar;
mod format;
mod mail;
mod profile;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::TokenHolder;
use crate::error::{ApiError, Result};
use crate::graph::GraphClient;

/// What a tool does to the mailbox; drives the MCP behaviour hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    ReadOnly,
    /// Sends something on the user's behalf; repeating it repeats the effect
    Write,
}

impl Access {
    fn annotations(self) -> ToolAnnotations {
        let read_only = self == Access::ReadOnly;
        ToolAnnotations {
            title: None,
            read_only_hint: Some(read_only),
            destructive_hint: Some(false),
            idempotent_hint: Some(read_only),
            open_world_hint: Some(true),
        }
    }
}

/// Build a tool definition; `schema` must be a JSON object
pub(crate) fn tool(
    name: &'static str,
    description: &'static str,
    schema: Value,
    access: Access,
) -> Tool {
    let input_schema: JsonObject = match schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema: Arc::new(input_schema),
        output_schema: None,
        annotations: Some(access.annotations()),
        icons: None,
    }
}

/// Failures that happen before a tool runs
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Dispatches tool calls. The token is obtained through the shared holder
/// before any tool runs.
pub struct ToolRegistry {
    tokens: Arc<TokenHolder>,
    graph: Arc<GraphClient>,
}

impl ToolRegistry {
    pub fn new(tokens: Arc<TokenHolder>, graph: Arc<GraphClient>) -> Self {
        Self { tokens, graph }
    }

    pub fn definitions(&self) -> Vec<Tool> {
        let mut tools = mail::definitions();
        tools.extend(calendar::definitions());
        tools.extend(profile::definitions());
        tools
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
    ) -> std::result::Result<CallToolResult, ToolError> {
        tracing::info!(tool = name, "Tool call");

        let graph = self.graph.as_ref();
        let result = match name {
            "ms365_list_emails" => {
                let args = parse(name, arguments)?;
                self.authorized(mail::list_emails(graph, args)).await
            }
            "ms365_read_email" => {
                let args = parse(name, arguments)?;
                self.authorized(mail::read_email(graph, args)).await
            }
            "ms365_search_emails" => {
                let args = parse(name, arguments)?;
                self.authorized(mail::search_emails(graph, args)).await
            }
            "ms365_send_email" => {
                let args = parse(name, arguments)?;
                self.authorized(mail::send_email(graph, args)).await
            }
            "ms365_reply_email" => {
                let args = parse(name, arguments)?;
                self.authorized(mail::reply_email(graph, args)).await
            }
            "ms365_list_mail_folders" => self.authorized(mail::list_mail_folders(graph)).await,
            "ms365_list_events" => {
                let args = parse(name, arguments)?;
                self.authorized(calendar::list_events(graph, args)).await
            }
            "ms365_get_event" => {
                let args = parse(name, arguments)?;
                self.authorized(calendar::get_event(graph, args)).await
            }
            "ms365_list_calendars" => self.authorized(calendar::list_calendars(graph)).await,
            "ms365_find_free_time" => {
                let args = parse(name, arguments)?;
                self.authorized(calendar::find_free_time(graph, args)).await
            }
            "ms365_get_profile" => self.authorized(profile::get_profile(graph)).await,
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };

        Ok(match result {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(e) => {
                tracing::warn!(tool = name, "Tool failed: {}", e);
                CallToolResult::error(vec![Content::text(e.user_message())])
            }
        })
    }

    /// Obtain the token first, then run the handler
    async fn authorized<F>(&self, handler: F) -> Result<String>
    where
        F: std::future::Future<Output = Result<String>>,
    {
        self.tokens.get().await?;
        handler.await
    }
}

/// Deserialize tool arguments; a missing `arguments` object counts as empty
fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> std::result::Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Convert a count argument to the Graph query type, rejecting anything outside `range`
pub(crate) fn count_in(value: i64, range: RangeInclusive<u32>, message: &str) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| range.contains(v))
        .ok_or_else(|| ApiError::validation(message))
}

/// Reject blank required strings with the given message
pub(crate) fn require<'a>(value: &'a str, message: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        Err(ApiError::validation(message))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSource;
    use crate::error::AuthError;
    use crate::graph::test_support::graph_for;
    use async_trait::async_trait;
    use serde_json::json;

    struct Refusing;

    #[async_trait]
    impl TokenSource for Refusing {
        async fn acquire(&self) -> std::result::Result<String, AuthError> {
            Err(AuthError::Acquisition("user_cancelled".to_string()))
        }
    }

    /// Text of the single content item and the error flag
    fn rendered(result: &CallToolResult) -> (String, bool) {
        let value = serde_json::to_value(result).unwrap();
        let text = value["content"][0]["text"].as_str().unwrap().to_string();
        (text, value["isError"] == true)
    }

    fn registry(server: &mockito::ServerGuard) -> ToolRegistry {
        let graph = graph_for(server);
        let tokens = Arc::new(TokenHolder::new(Arc::new(
            crate::graph::test_support::StaticToken("test-token"),
        )));
        ToolRegistry::new(tokens, Arc::new(graph))
    }

    #[tokio::test]
    async fn test_definitions_cover_all_tools() {
        let server = mockito::Server::new_async().await;
        let defs = registry(&server).definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_ref()).collect();
        assert_eq!(
            names,
            vec![
                "ms365_list_emails",
                "ms365_read_email",
                "ms365_search_emails",
                "ms365_send_email",
                "ms365_reply_email",
                "ms365_list_mail_folders",
                "ms365_list_events",
                "ms365_get_event",
                "ms365_list_calendars",
                "ms365_find_free_time",
                "ms365_get_profile",
            ]
        );
        let send = serde_json::to_value(&defs[3]).unwrap();
        assert_eq!(send["annotations"]["readOnlyHint"], false);
        assert_eq!(send["annotations"]["idempotentHint"], false);
        let list = serde_json::to_value(&defs[0]).unwrap();
        assert_eq!(list["annotations"]["readOnlyHint"], true);
        assert_eq!(list["annotations"]["openWorldHint"], true);
        assert_eq!(send["inputSchema"]["required"], json!(["to", "subject", "body"]));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = mockito::Server::new_async().await;
        let err = registry(&server)
            .call("ms365_delete_everything", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let server = mockito::Server::new_async().await;
        let err = registry(&server)
            .call("ms365_list_emails", json!({"top": "many"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_graph_errors_become_error_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/messages/gone")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let output = registry(&server)
            .call("ms365_read_email", json!({"message_id": "gone"}))
            .await
            .unwrap();
        assert_eq!(
            rendered(&output),
            (
                "Error: Resource not found. Please verify the ID.".to_string(),
                true
            )
        );
    }

    #[tokio::test]
    async fn test_token_failure_is_reported_before_validation() {
        let server = mockito::Server::new_async().await;
        let graph = Arc::new(graph_for(&server));
        let tokens = Arc::new(TokenHolder::new(Arc::new(Refusing)));
        let registry = ToolRegistry::new(tokens, graph);

        let output = registry
            .call("ms365_list_emails", json!({"top": 999}))
            .await
            .unwrap();
        assert_eq!(
            rendered(&output),
            (
                "Error: Failed to acquire token: user_cancelled".to_string(),
                true
            )
        );
    }

    #[test]
    fn test_count_in_rejects_values_that_do_not_fit() {
        assert_eq!(count_in(25, 1..=50, "bad").unwrap(), 25);
        assert!(count_in(0, 1..=50, "bad").is_err());
        assert!(count_in(-3, 1..=50, "bad").is_err());
        let err = count_in(i64::from(u32::MAX) + 1, 0..=u32::MAX, "too big").unwrap_err();
        assert_eq!(err.user_message(), "Error: too big");
    }

    #[tokio::test]
    async fn test_null_arguments_use_defaults() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/mailFolders/inbox/messages")
            .match_query(mockito::Matcher::UrlEncoded("$top".into(), "10".into()))
            .with_status(200)
            .with_body(r#"{"value":[]}"#)
            .create_async()
            .await;

        let output = registry(&server)
            .call("ms365_list_emails", Value::Null)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(rendered(&output), ("No emails found.".to_string(), false));
    }
}
