//! Lockstep Server
//!
//! Hosts one lockstep session over WebSocket and runs the reference
//! simulation kernel. Ctrl-C asks connected clients to leave.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Instrument};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use lockstep_server::{
    network::Host, HostConfig, LockstepSimulation, Simulation, PLAYERS_MAX, VERSION,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, overriding the configuration file
    #[clap(short, long)]
    bind: Option<SocketAddr>,
    /// Log filter such as `info` or `lockstep_server=debug`, overriding `RUST_LOG`
    #[clap(short, long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    // Initialize logging
    let filter = match &args.log {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?,
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    config.validate()?;

    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session_id);

    serve(config).instrument(span).await
}

/// Run one session and report its outcome.
async fn serve(config: HostConfig) -> anyhow::Result<()> {
    info!("Lockstep Server v{}", VERSION);
    info!(
        "Players: {}, Tick: {} ms",
        PLAYERS_MAX,
        LockstepSimulation::TICK_DURATION_MS
    );

    let host = Host::bind(config).await?;
    info!("Listening on {}", host.local_addr());

    let simulation = match host
        .run::<_, PLAYERS_MAX>(LockstepSimulation::new(), shutdown_signal())
        .await
    {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("Session failed: {}", e);
            return Err(e.into());
        }
    };

    info!("=== Session Results ===");
    info!("Ticks: {}", simulation.tick_count());
    info!("Final State Hash: {}", hex::encode(simulation.state_hash()));
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
