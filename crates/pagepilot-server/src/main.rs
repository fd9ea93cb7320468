//! PagePilot server binary.

use clap::Parser;
use pagepilot_server::{http, rpc, AppConfig, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Operational-knowledge retrieval server.
#[derive(Debug, Parser)]
#[command(name = "pagepilot", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Serve the stream-RPC transport on stdin/stdout instead of HTTP.
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));
    // The stdio transport owns stdout; logs must go to stderr either way.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::build(config).await?;
    state.start_background().await;

    if args.stdio {
        rpc::run_stdio(state.clone()).await?;
    } else {
        let addr: SocketAddr = format!(
            "{}:{}",
            state.config.server.host, state.config.server.port
        )
        .parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "pagepilot listening");

        let app = http::router(state.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    let grace = Duration::from_secs(state.config.server.shutdown_grace_seconds);
    tracing::info!(grace_seconds = grace.as_secs(), "draining and shutting down");
    if tokio::time::timeout(grace, state.shutdown()).await.is_err() {
        tracing::warn!("shutdown grace period elapsed before cleanup finished");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
