use anyhow::{Context, Result};
use std::sync::Arc;

use ms365_mcp::auth::{TokenAuthority, TokenHolder};
use ms365_mcp::config::Config;
use ms365_mcp::graph::GraphClient;
use ms365_mcp::mcp::{McpHandler, StdioTransport};
use ms365_mcp::tools::ToolRegistry;

#[tokio::main]
async fn main() {
    // Logging is not up yet, so configuration errors go straight to stderr
    let config = match Config::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    // stdout belongs to the JSON-RPC stream
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

async fn run(config: Config) -> Result<()> {
    tracing::info!("🚀 MS365 MCP server starting...");
    tracing::info!("Tenant: {}", config.tenant_id);
    tracing::info!("Token cache: {}", config.token_cache_path.display());

    let authority =
        TokenAuthority::from_config(&config).context("Failed to initialize authentication")?;
    let tokens = Arc::new(TokenHolder::new(Arc::new(authority)));

    // Sign in before serving so the first tool call never blocks on a browser
    tracing::info!("Initializing authentication...");
    let token = tokens.get().await.context("Authentication failed")?;
    tracing::info!(
        "✅ Authentication successful (token: {}...)",
        token.chars().take(12).collect::<String>()
    );

    let graph = Arc::new(GraphClient::new(
        tokens.clone(),
        &config.graph_base_url,
        config.http_timeout,
    )?);
    let registry = Arc::new(ToolRegistry::new(tokens, graph));
    tracing::info!("✅ Registered {} tools", registry.definitions().len());

    let transport = StdioTransport::new(McpHandler::new(registry));

    tokio::select! {
        result = transport.run() => result.context("stdio transport failed")?,
        _ = shutdown_signal() => tracing::info!("Shutdown signal received"),
    }

    tracing::info!("👋 Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
