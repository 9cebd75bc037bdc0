// JSON-RPC request handling for the MCP methods this server speaks

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorCode, ErrorData, Implementation, InitializeResult,
    ListToolsResult, ProtocolVersion, ServerCapabilities,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::tools::{ToolError, ToolRegistry};

pub const SERVER_NAME: &str = "ms365_mcp";

/// Protocol revisions this server accepts, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

// ==================================================================================================
// JSON-RPC errors
// ==================================================================================================

pub(crate) fn parse_error(detail: impl Into<String>) -> ErrorData {
    ErrorData::new(ErrorCode::PARSE_ERROR, "Parse error", Some(json!(detail.into())))
}

fn invalid_request(detail: &str) -> ErrorData {
    ErrorData::new(ErrorCode::INVALID_REQUEST, "Invalid Request", Some(json!(detail)))
}

fn method_not_found(method: &str) -> ErrorData {
    ErrorData::new(ErrorCode::METHOD_NOT_FOUND, "Method not found", Some(json!(method)))
}

fn invalid_params(detail: impl Into<String>) -> ErrorData {
    ErrorData::new(ErrorCode::INVALID_PARAMS, "Invalid params", Some(json!(detail.into())))
}

fn internal_error(detail: impl Into<String>) -> ErrorData {
    ErrorData::new(ErrorCode::INTERNAL_ERROR, "Internal error", Some(json!(detail.into())))
}

impl From<ToolError> for ErrorData {
    fn from(e: ToolError) -> Self {
        invalid_params(e.to_string())
    }
}

/// Full error response envelope
pub(crate) fn error_response(id: Value, error: ErrorData) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": error,
        "id": id,
    })
}

fn to_result<T: Serialize>(result: T) -> Result<Value, ErrorData> {
    serde_json::to_value(result).map_err(|e| internal_error(e.to_string()))
}

// ==================================================================================================
// Handler
// ==================================================================================================

/// Only the requested revision is read from `initialize`; clients differ in
/// which of the other fields they send.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
}

/// Maps JSON-RPC requests onto the tool registry
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
}

impl McpHandler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Handle one decoded message. Returns `None` for notifications.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let Some(id) = request.get("id").cloned() else {
            let method = request.get("method").and_then(Value::as_str).unwrap_or("");
            tracing::debug!(method, "Notification received");
            return None;
        };

        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return Some(error_response(id, invalid_request("missing 'method'")));
        };
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        tracing::debug!(method, "Handling JSON-RPC request");

        let result = match method {
            "initialize" => self.initialize(params).and_then(to_result),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(self.list_tools()),
            "tools/call" => self.call_tool(params).await.and_then(to_result),
            other => Err(method_not_found(other)),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => {
                tracing::warn!(method, code = error.code.0, "Request failed: {}", error.message);
                error_response(id, error)
            }
        })
    }

    fn initialize(&self, params: Value) -> Result<InitializeResult, ErrorData> {
        let params: InitializeParams = match params {
            Value::Null => InitializeParams::default(),
            other => serde_json::from_value(other).map_err(|e| invalid_params(e.to_string()))?,
        };

        let requested = params.protocol_version.as_deref();
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
        tracing::info!(
            requested = requested.unwrap_or("none"),
            negotiated = version,
            "MCP session initialized"
        );

        Ok(InitializeResult {
            protocol_version: protocol_version(version),
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: None,
        })
    }

    fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.tools.definitions(),
            next_cursor: None,
        }
    }

    async fn call_tool(&self, params: Value) -> Result<CallToolResult, ErrorData> {
        let params: CallToolRequestParam =
            serde_json::from_value(params).map_err(|e| invalid_params(e.to_string()))?;

        let arguments = params.arguments.map(Value::Object).unwrap_or(Value::Null);
        Ok(self.tools.call(&params.name, arguments).await?)
    }
}

/// Revision string as the protocol model type; unknown strings are kept verbatim
fn protocol_version(version: &str) -> ProtocolVersion {
    serde_json::from_value(json!(version)).unwrap_or(ProtocolVersion::LATEST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenHolder;
    use crate::graph::test_support::{graph_for, StaticToken};

    async fn handler() -> (McpHandler, mockito::ServerGuard) {
        let server = mockito::Server::new_async().await;
        let tokens = Arc::new(TokenHolder::new(Arc::new(StaticToken("test-token"))));
        let graph = Arc::new(graph_for(&server));
        let registry = Arc::new(ToolRegistry::new(tokens, graph));
        (McpHandler::new(registry), server)
    }

    #[tokio::test]
    async fn test_initialize_echoes_supported_version() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "inspector", "version": "0.1.0"}
                }
            }))
            .await
            .unwrap();

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["result"]["serverInfo"]["name"], "ms365_mcp");
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert_eq!(
            response["result"]["serverInfo"]["version"],
            env!("CARGO_PKG_VERSION")
        );
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_latest() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": "a",
                "method": "initialize",
                "params": {"protocolVersion": "1999-01-01"}
            }))
            .await
            .unwrap();
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], 7);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 11);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool_is_invalid_params() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "ms365_nope", "arguments": {}}
            }))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_tools_call_with_non_object_arguments() {
        let (handler, _server) = handler().await;
        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "ms365_get_profile", "arguments": "everything"}
            }))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["message"], "Invalid params");
    }

    #[tokio::test]
    async fn test_tools_call_wraps_text_content() {
        let (handler, mut server) = handler().await;
        server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"displayName":"Adele Vance","mail":"adele@contoso.com"}"#)
            .create_async()
            .await;

        let response = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "ms365_get_profile"}
            }))
            .await
            .unwrap();

        let result = &response["result"];
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("- **Email:** adele@contoso.com"));
    }
}
