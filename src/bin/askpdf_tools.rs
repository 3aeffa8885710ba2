//! Tool server entrypoint (stdio transport).
//!
//! Reads newline-framed JSON-RPC requests from stdin and writes responses to stdout.
//! All logging goes to stderr and the log file; stdout carries nothing but responses.
//! This mode is spawned by the proxy and also works standalone for AI-assistant
//! integrations.
use std::sync::Arc;

use anyhow::{Context, Result};
use askpdf::completion::HttpCompletionClient;
use askpdf::processing::RetrievalService;
use askpdf::tools::{ToolPolicy, ToolServer, serve};
use askpdf::{config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    let app_config = config::get_config();
    logging::init_tracing(logging::LogTarget::Stderr, &app_config.logs_dir());
    tracing::info!(server = %app_config.server_name, "Tool server starting");

    let retrieval = Arc::new(RetrievalService::from_config());
    let completion = Arc::new(HttpCompletionClient::from_config());
    let server = Arc::new(ToolServer::new(
        retrieval,
        completion,
        ToolPolicy::from_config(),
    ));

    serve(server, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("tool server terminated unexpectedly")?;
    Ok(())
}
