//! unaryad - Unarya orchestrator daemon
//!
//! Serves `StartPipeline`, background runs and run snapshots over HTTP,
//! coordinating the collector, parser, AI and security services configured
//! in the environment.

mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use unarya_core::metrics::METRICS;
use unarya_core::telemetry::init_tracing;
use unarya_core::{OrchestratorConfig, VERSION};
use unarya_pipeline::{stage_clients, Orchestrator};

#[derive(Parser)]
#[command(name = "unaryad")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Unarya pipeline orchestrator daemon", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (overrides ORCHESTRATOR_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(args.json, level);

    let mut config =
        OrchestratorConfig::from_env().context("invalid orchestrator configuration")?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    info!(
        collector = %config.collector_url,
        parser = %config.parser_url,
        ai = %config.ai_url,
        security = %config.security_url,
        max_retries = config.retry.max_retries,
        "stage endpoints configured"
    );

    let clients = stage_clients(&config).context("failed to build stage clients")?;
    let orchestrator = Arc::new(Orchestrator::with_config(clients, &config));
    let shutdown = CancellationToken::new();
    let app = server::router(server::AppState::new(orchestrator.clone(), shutdown.clone()));

    let addr = format!("{}:{}", args.host, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    info!(addr = %addr, version = VERSION, "orchestrator service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator, shutdown))
        .await
        .context("server error")?;

    METRICS.flush();
    info!("orchestrator service stopped");
    Ok(())
}

async fn shutdown_signal(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    orchestrator.shutdown();
    shutdown.cancel();
}
