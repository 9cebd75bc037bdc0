// Newline-delimited JSON-RPC over stdio

use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::server::{error_response, parse_error, McpHandler};

/// Stdio transport for the MCP server.
/// stdout carries protocol messages only; all logging goes to stderr.
pub struct StdioTransport {
    handler: McpHandler,
}

impl StdioTransport {
    pub fn new(handler: McpHandler) -> Self {
        Self { handler }
    }

    /// Serve stdin/stdout until stdin is closed
    pub async fn run(&self) -> io::Result<()> {
        tracing::info!("Starting stdio transport");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve any line-oriented reader/writer pair until the reader hits EOF
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let reader_task = tokio::spawn(async move {
            let mut reader = reader;
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::debug!("EOF reached on input");
                        break;
                    }
                    Ok(_) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading input: {}", e);
                        break;
                    }
                }
            }
        });

        while let Some(line) = rx.recv().await {
            if let Some(response) = self.process_line(&line).await {
                write_message(&mut writer, &response).await?;
            }
        }

        if let Err(e) = reader_task.await {
            tracing::error!("Input reader task failed: {}", e);
        }
        tracing::info!("Stdio transport closed");
        Ok(())
    }

    async fn process_line(&self, line: &str) -> Option<Value> {
        tracing::trace!("Processing line: {}", line.trim_end());

        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handler.handle_request(request).await,
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC request: {}", e);
                Some(error_response(Value::Null, parse_error(e.to_string())))
            }
        }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> io::Result<()> {
    let encoded = serde_json::to_string(message)?;
    writer.write_all(encoded.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    tracing::trace!("Sent response: {}", encoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenHolder;
    use crate::graph::test_support::{graph_for, StaticToken};
    use crate::tools::ToolRegistry;
    use std::sync::Arc;

    async fn transport() -> (StdioTransport, mockito::ServerGuard) {
        let server = mockito::Server::new_async().await;
        let tokens = Arc::new(TokenHolder::new(Arc::new(StaticToken("test-token"))));
        let registry = Arc::new(ToolRegistry::new(tokens, Arc::new(graph_for(&server))));
        (StdioTransport::new(McpHandler::new(registry)), server)
    }

    fn responses(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_per_request_line() {
        let (transport, _server) = transport().await;
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut output = Vec::new();
        transport
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let responses = responses(&output);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"], serde_json::json!({}));
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_unparsable_line_yields_parse_error() {
        let (transport, _server) = transport().await;
        let input = "{not json\n";
        let mut output = Vec::new();
        transport
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let responses = responses(&output);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["error"]["message"], "Parse error");
        assert!(responses[0]["id"].is_null());
    }
}
