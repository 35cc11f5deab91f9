//! blued - Bluetooth management daemon.
//!
//! Wires the service core to a Stack Integration Library and serves the
//! RPC categories on the bus. Without a vendor SIL the daemon starts
//! with an empty adapter list and every adapter-scoped method reports
//! `adapterNotAvailable`.

mod transport;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use blued_service::{DaemonConfig, Service};
use blued_sil::{NullSil, Sil};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "blued", about = "Bluetooth management daemon", version)]
struct Cli {
    /// Path of the daemon configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve on the session bus instead of the system bus.
    #[arg(long)]
    session_bus: bool,

    /// Run against the scripted in-memory stack with the given adapter
    /// addresses instead of a vendor SIL.
    #[cfg(feature = "fake-sil")]
    #[arg(long = "fake-adapter")]
    fake_adapters: Vec<blued_common::Address>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> DaemonConfig {
    match &cli.config {
        Some(path) => match DaemonConfig::load(path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("Error: {error}");
                process::exit(1);
            }
        },
        None => DaemonConfig::default(),
    }
}

fn select_sil(cli: &Cli) -> Arc<dyn Sil> {
    #[cfg(feature = "fake-sil")]
    if !cli.fake_adapters.is_empty() {
        info!(adapters = cli.fake_adapters.len(), "using the scripted in-memory stack");
        return Arc::new(blued_sil::fake::FakeSil::new(&cli.fake_adapters));
    }
    let _ = cli;
    // Vendor stacks plug in by implementing blued_sil::Sil and being
    // selected here; with none linked the adapter list stays empty.
    warn!("no stack integration library configured, starting without adapters");
    Arc::new(NullSil)
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli);
    let sil = select_sil(&cli);

    let (handle, service_task) = Service::spawn(config, sil);

    let connection = match transport::serve(handle, cli.session_bus).await {
        Ok(connection) => connection,
        Err(error) => {
            eprintln!("Error: cannot serve on the bus: {error}");
            process::exit(1);
        }
    };

    info!("blued running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
        _ = service_task => warn!("service loop ended unexpectedly"),
    }
    drop(connection);
}
