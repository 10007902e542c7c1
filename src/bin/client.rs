//! CLI entrypoint: parses flags, wires up logging, starts the engine, prints
//! a startup banner, and blocks until a shutdown signal arrives.

use clap::Parser;
use meshlink::client::Engine;
use meshlink::config::{Args, EngineConfig};
use meshlink::platform::HttpIpv6Probe;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(target_os = "windows")]
    let use_ansi = false;
    #[cfg(not(target_os = "windows"))]
    let use_ansi = true;

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_ansi(use_ansi)
            .with_line_number(true)
            .with_file(true)
            .finish(),
    )?;
    Ok(())
}

fn log_startup_banner(cfg: &EngineConfig) {
    println!("====================================");
    println!("  meshlink client starting");
    println!("====================================");
    println!("Server address: {}", cfg.server_addr);
    println!("Client identity: {}", cfg.identity);
    println!("Keepalive interval: {:?}", cfg.keepalive_interval);
    println!("------------------------------------");
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let cfg = match EngineConfig::resolve(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log_startup_banner(&cfg);

    let probe = Arc::new(HttpIpv6Probe::new());
    let engine = match Engine::start(cfg, probe).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to start engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("engine started, forwarding traffic");

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => tracing::error!("failed to listen for shutdown signal: {}", e),
    }

    engine.shutdown().await;
}
