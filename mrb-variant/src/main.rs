//! Reference benchmark variant binary.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use mrb_common::{LogConfig, init_logging};
use mrb_probe::{DEFAULT_RUNTIME_ID, MetricsProbe, ProbeIdentity, mark_process_start};
use mrb_variant::VariantState;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mrb-variant")]
#[command(author, version, about = "Reference item service exposing the benchmark contract")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: std::net::IpAddr,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    mark_process_start();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let identity = ProbeIdentity::from_env(DEFAULT_RUNTIME_ID);
    let state = VariantState::new(MetricsProbe::for_process(identity));

    let addr = SocketAddr::new(cli.bind, cli.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    mrb_variant::serve(listener, state, shutdown_signal()).await?;
    Ok(())
}
