// MCP module
// JSON-RPC 2.0 handler and stdio transport

mod server;
mod transport;

pub use server::{McpHandler, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS};
pub use transport::StdioTransport;
