use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use url::Url;

use crate::error::AuthError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Microsoft 365 MCP server - mail and calendar tools over Microsoft Graph
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Application (client) ID of the Azure AD app registration
    #[arg(long, env = "MS_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Directory (tenant) ID the app is registered in
    #[arg(long, env = "MS_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Path of the persisted token cache
    #[arg(long, env = "MS365_TOKEN_CACHE")]
    pub token_cache: Option<String>,

    /// Identity platform host
    #[arg(long, env = "MS365_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    pub authority_host: String,

    /// Microsoft Graph base URL
    #[arg(long, env = "MS365_GRAPH_BASE_URL", default_value = DEFAULT_GRAPH_BASE_URL)]
    pub graph_base_url: String,

    /// Loopback port for the sign-in redirect (0 = any free port)
    #[arg(long, env = "MS365_REDIRECT_PORT", default_value = "0")]
    pub redirect_port: u16,

    /// Give up on browser sign-in after this many seconds (default: wait indefinitely)
    #[arg(long, env = "MS365_INTERACTIVE_TIMEOUT")]
    pub interactive_timeout: Option<u64>,

    /// Print the sign-in URL instead of opening a browser
    #[arg(long, env = "MS365_NO_BROWSER")]
    pub no_browser: bool,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Azure AD app registration
    pub client_id: String,
    pub tenant_id: String,

    // Token cache
    pub token_cache_path: PathBuf,

    // Endpoints
    pub authority_host: String,
    pub graph_base_url: String,

    // Interactive sign-in
    pub redirect_port: u16,
    pub interactive_timeout: Option<u64>,
    pub open_browser: bool,

    // HTTP client
    pub http_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Build the configuration from parsed arguments.
    /// Missing client or tenant id is a configuration error.
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let client_id = non_blank(args.client_id);
        let tenant_id = non_blank(args.tenant_id);

        let (client_id, tenant_id) = match (client_id, tenant_id) {
            (Some(client_id), Some(tenant_id)) => (client_id, tenant_id),
            _ => {
                return Err(AuthError::Configuration(
                    "MS_CLIENT_ID and MS_TENANT_ID environment variables are required."
                        .to_string(),
                )
                .into())
            }
        };

        let mut config = Config::for_tenant(client_id, tenant_id);
        if let Some(path) = args.token_cache {
            config.token_cache_path = expand_tilde(&path);
        }
        config.authority_host = args.authority_host;
        config.graph_base_url = args.graph_base_url;
        config.redirect_port = args.redirect_port;
        config.interactive_timeout = args.interactive_timeout;
        config.open_browser = !args.no_browser;
        config.http_timeout = args.http_timeout;
        config.log_level = args.log_level;

        Ok(config)
    }

    /// Defaults for the given app registration
    pub fn for_tenant(client_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Config {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            token_cache_path: default_token_cache_path(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            redirect_port: 0,
            interactive_timeout: None,
            open_browser: true,
            http_timeout: 30,
            log_level: "info".to_string(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.authority_host)
            .with_context(|| format!("MS365_AUTHORITY_HOST is not a URL: {}", self.authority_host))?;
        Url::parse(&self.graph_base_url)
            .with_context(|| format!("MS365_GRAPH_BASE_URL is not a URL: {}", self.graph_base_url))?;

        if self.http_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than 0");
        }
        if self.interactive_timeout == Some(0) {
            anyhow::bail!("MS365_INTERACTIVE_TIMEOUT must be greater than 0 when set");
        }

        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `<config dir>/ms365-mcp/token_cache.json`, falling back to the working directory
fn default_token_cache_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ms365-mcp"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("token_cache.json")
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
