//! nb-mcp-server: MCP server for notebook sessions
//!
//! Transports:
//!   nb-mcp-server                              # stdio
//!   nb-mcp-server --http 0.0.0.0:3001          # HTTP
//!   nb-mcp-server --http 0.0.0.0:3001 --stdio  # both
//!
//! Sessions can be opened at startup:
//!   nb-mcp-server --session ./analysis --session ./etl --language python
//!
//! A `pyproject.toml` found in a session directory becomes that session's
//! project configuration.

use anyhow::{Context, Result};
use clap::Parser;
use nb_core::{InMemorySessionStore, Language, NewSession, SessionStore};
use nb_mcp::{
    config::Settings,
    transport::{HttpTransport, StdioTransport, Transport},
    McpServer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROJECT_CONFIG_FILE: &str = "pyproject.toml";

#[derive(Parser)]
#[command(name = "nb-mcp-server")]
#[command(about = "MCP server for notebook sessions")]
struct Cli {
    /// Run stdio transport (default if no HTTP address is given)
    #[arg(long)]
    stdio: bool,

    /// Run HTTP transport on specified address
    #[arg(long, value_name = "ADDR")]
    http: Option<String>,

    /// Settings file (defaults to ./nb-mcp.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Open a session rooted at this directory (repeatable)
    #[arg(long = "session", value_name = "DIR")]
    sessions: Vec<PathBuf>,

    /// Language of sessions opened with --session
    #[arg(long, default_value = "python")]
    language: Language,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Server name override
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the stdio transport keeps stdout to itself
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let mut config = settings.server_config();
    if cli.name.is_some() {
        config.name = cli.name;
    }

    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    for dir in &cli.sessions {
        let params = session_params(dir, cli.language).await?;
        let session = store.open_session(params).await?;
        info!(session = %session.id(), dir = %dir.display(), "Opened startup session");
    }

    let server = McpServer::create(config, store)?;

    let http_addr = cli.http.or(settings.http.bind_addr);
    let run_stdio = cli.stdio || http_addr.is_none();

    let result = run_transports(server.clone(), run_stdio, http_addr, settings.http.cors).await;
    server.close().await;
    result
}

/// Build the parameters for a session opened from the command line
async fn session_params(dir: &Path, language: Language) -> Result<NewSession> {
    let meta = tokio::fs::metadata(dir)
        .await
        .with_context(|| format!("Session directory {} is not accessible", dir.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let mut params = NewSession::new(dir, language);
    match tokio::fs::read_to_string(dir.join(PROJECT_CONFIG_FILE)).await {
        Ok(text) => params = params.with_project_config(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Could not read project config"),
    }
    Ok(params)
}

async fn run_transports(
    server: Arc<McpServer>,
    run_stdio: bool,
    http_addr: Option<String>,
    cors: bool,
) -> Result<()> {
    let mut handles = Vec::new();

    if let Some(addr) = http_addr {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            let transport = HttpTransport::new(addr);
            let transport = if cors { transport } else { transport.without_cors() };
            transport.serve(server).await
        }));
    }

    // Run stdio in main task if enabled (blocks until stdin closes)
    if run_stdio {
        StdioTransport::new().serve(server).await?;
    } else {
        for handle in handles {
            handle.await??;
        }
    }

    Ok(())
}
