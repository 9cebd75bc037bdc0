// Error handling module
// Defines the authentication error taxonomy and the tool-facing error type

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while obtaining an access token
#[derive(Error, Debug)]
pub enum AuthError {
    /// Client or tenant identifier missing; reported before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The persisted credential blob could not be read or written
    #[error("Token cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted credential blob is not a valid cache document
    #[error("Token cache is corrupt: {0}")]
    CacheFormat(#[from] serde_json::Error),

    /// Neither silent nor interactive acquisition produced a token
    #[error("Failed to acquire token: {0}")]
    Acquisition(String),

    /// Transport failure talking to the identity provider
    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The loopback redirect could not be served or was malformed
    #[error("Login callback failed: {0}")]
    Callback(String),
}

/// Errors surfaced by tool handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Token acquisition failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Non-2xx response from Microsoft Graph
    #[error("Microsoft Graph API error: {status} - {message}")]
    GraphApi { status: u16, message: String },

    /// Tool argument validation error
    #[error("{0}")]
    Validation(String),

    /// Network failure talking to Microsoft Graph
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Render the error as the text returned to the assistant
    pub fn user_message(&self) -> String {
        match self {
            ApiError::GraphApi { status, message } => match status {
                401 => "Error: Authentication expired. Please restart the MCP server to re-authenticate."
                    .to_string(),
                403 => "Error: Permission denied. Check the app's API permissions in Azure AD."
                    .to_string(),
                404 => "Error: Resource not found. Please verify the ID.".to_string(),
                429 => "Error: Rate limited by Microsoft. Please wait a moment and retry."
                    .to_string(),
                _ => {
                    let snippet: String = message.chars().take(200).collect();
                    format!(
                        "Error: Microsoft Graph API returned status {}: {}",
                        status, snippet
                    )
                }
            },
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                format!("Error: {}", err)
            }
            other => format!("Error: {}", other),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }
}

/// Result type alias for tool operations
pub type Result<T> = std::result::Result<T, ApiError>;
