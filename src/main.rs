use std::sync::Arc;

use anyhow::Context;
use askpdf::{config, logging, metrics::ServiceMetrics, proxy};
use clap::Parser;
use tokio::net::TcpListener;

/// HTTP proxy for askpdf: supervises the tool server and serves the browser API.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Port to listen on (overrides SERVER_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Working directory for uploads, cache, and logs (overrides WORKDIR).
    #[arg(long)]
    workdir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // SAFETY: no other threads are running this early in main.
    unsafe {
        if let Some(port) = cli.port {
            std::env::set_var("SERVER_PORT", port.to_string());
        }
        if let Some(workdir) = &cli.workdir {
            std::env::set_var("WORKDIR", workdir);
        }
    }

    config::init_config();
    let config = config::get_config();
    logging::init_tracing(logging::LogTarget::Stdout, &config.logs_dir());
    std::fs::create_dir_all(config.uploads_dir()).context("failed to create uploads dir")?;
    std::fs::create_dir_all(config.cache_dir()).context("failed to create cache dir")?;

    let metrics = Arc::new(ServiceMetrics::new());
    let supervisor = proxy::Supervisor::start(Arc::clone(&metrics))
        .await
        .map_err(|fault| anyhow::anyhow!("failed to start tool server: {fault}"))?;

    let state = Arc::new(proxy::AppState {
        tools: supervisor.clone(),
        handles: Arc::new(proxy::HandleRegistry::new(config.uploads_dir())),
        metrics,
    });
    let app = proxy::create_router(
        state,
        proxy::RouterConfig {
            max_upload_bytes: config.max_upload_bytes,
            allowed_origins: config.allowed_origins.clone(),
        },
    );

    let (listener, port) = bind_listener().await.context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    supervisor.shutdown().await;
    if supervisor.is_permanently_failed() {
        tracing::error!("Exiting after unrecoverable tool-server failure");
        std::process::exit(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8100..=8199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8100-8199",
    ))
}
