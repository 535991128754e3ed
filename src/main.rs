// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! SiteWatch - real-time workplace safety monitoring
//!
//! Runs the camera and audio workers, persists every safety event and serves
//! the REST API plus the live dashboard WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sitewatch::{build_info, server, Config, Engine, NAME, VERSION};

/// SiteWatch - workplace safety monitoring
#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(version = VERSION)]
#[command(about = "Camera and audio safety monitoring with live dashboard streaming")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    host: Option<String>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for the database and CSV logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use simulated cameras and microphone
    #[arg(long)]
    demo: bool,

    /// Disable the camera worker
    #[arg(long)]
    no_camera: bool,

    /// Disable the audio worker
    #[arg(long)]
    no_audio: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the flags when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("{} v{} - workplace safety monitoring", NAME, build.version);
    info!("   {}/{}, features: {:?}", build.os, build.target, build.features);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    if args.demo {
        config.demo_mode = true;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config = config.with_data_dir(data_dir);
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, !args.no_camera, !args.no_audio))
}

async fn run(config: Config, camera: bool, audio: bool) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid server address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let mut engine = Engine::new(config)?.with_sensors(camera, audio);
    engine.start()?;

    info!("Press Ctrl+C to shutdown");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received, cleaning up...");
    };

    let served = server::serve(engine.app_state(), addr, shutdown).await;
    engine.shutdown().await?;
    served?;

    info!("{} shutdown complete", NAME);
    Ok(())
}
