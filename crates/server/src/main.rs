//! folio-mcp server entry point.
//!
//! Loads configuration, opens the metadata database and both content stores,
//! then serves MCP on stdio. Logging goes to stderr to avoid interfering with
//! the JSON-RPC protocol on stdout.

use anyhow::{Context, Result};
use folio_core::AppConfig;
use folio_pipeline::Folio;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let folio = Folio::open(config).await.context("failed to open folio stores")?;

    tracing::info!("Starting folio-mcp server on stdio transport");

    let handler = handler::FolioServer::new(folio);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
