//! Stub Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stub_server::server::{self, AppState};
use stub_server::{StubRegistry, StubServerConfig, UqlRegistry};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "stub-server",
    about = "Stub server - canned responses for service/method requests and UQL queries",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stub-server.yaml")]
    config: PathBuf,

    /// Address to bind (overrides the configuration file)
    #[arg(short, long)]
    bind_addr: Option<String>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// File or directory of stub definitions to preload
    #[arg(short, long)]
    stub_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate configuration and stubs, then exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        StubServerConfig::from_file(&args.config)?
    } else {
        info!("Using default configuration");
        StubServerConfig::default()
    };

    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(stub_path) = args.stub_path {
        config.stub_path = Some(stub_path);
    }

    let stubs = StubRegistry::new();
    let loaded = config.preload(&stubs)?;

    // Validate and exit if requested
    if args.validate {
        println!("Configuration is valid ({} stubs loaded)", loaded);
        return Ok(());
    }

    let uql = UqlRegistry::with_defaults();
    let state = AppState::new(stubs, uql, config.settings.clone());

    let listener = TcpListener::bind(config.server.address()).await?;
    info!(stubs = loaded, "Stub server ready");

    server::serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
