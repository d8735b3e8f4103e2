use anyhow::{Context, Result};
use clap::Parser;
use motion_sync::broker::{serve, LatestSlot};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "broker")]
#[command(about = "Single-slot location broker: keeps only the latest fix", long_about = None)]
struct Args {
    /// Port to serve on
    #[arg(long, default_value = "3001")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Location broker listening on http://{}", addr);

    tokio::select! {
        served = serve(listener, LatestSlot::new()) => served.context("Broker stopped")?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }
    Ok(())
}
