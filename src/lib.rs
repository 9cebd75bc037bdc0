// MS365 MCP - Library root for testing

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod mcp;
pub mod tools;
