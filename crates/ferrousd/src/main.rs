//! Ferrous Control daemon
//!
//! Serves the LAN remote-control endpoint and, unless `--no-panel`, a local
//! console panel that answers confirmations.

use anyhow::{Context, Result};
use clap::Parser;
use ferrousd::autostart::{AutostartRegistrar, DesktopEntryRegistrar};
use ferrousd::config::Config;
use ferrousd::network;
use ferrousd::panel::ControlPanel;
use ferrousd::platform::{PowerPlatform, SimulatedPlatform, SystemPlatform};
use ferrousd::server::{self, AppState};
use ferrousd::CommandDispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ferrousd")]
#[command(about = "Ferrous Control - remote shutdown and volume control over the LAN", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/ferrous/config.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port for the network endpoint
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Use the in-memory platform instead of real power/volume commands
    #[arg(long)]
    simulate: bool,

    /// Run headless, without the console panel
    #[arg(long)]
    no_panel: bool,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Ferrous Control v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    config.power.simulate |= cli.simulate;

    let platform: Arc<dyn PowerPlatform> = if config.power.simulate {
        Arc::new(SimulatedPlatform::new())
    } else {
        Arc::new(SystemPlatform::new())
    };
    info!("Platform: {}", platform.name());

    let dispatcher = Arc::new(CommandDispatcher::from_config(&config, platform));
    let address = if config.server.advertise {
        network::advertise(config.server.port)
    } else {
        network::AdvertisedAddress::unknown()
    };

    let (stop_tx, _) = watch::channel(false);

    // The panel keeps working when the endpoint cannot bind.
    let server_task = match server::bind(&config).await {
        Ok(listener) => {
            let state = Arc::new(AppState::new(
                Arc::clone(&dispatcher),
                config.clone(),
                address.clone(),
            ));
            let mut stop = stop_tx.subscribe();
            Some(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                };
                if let Err(e) = server::run(listener, state, shutdown).await {
                    error!("Network endpoint stopped: {}", e);
                }
            }))
        }
        Err(e) => {
            warn!("{}; remote control disabled", e);
            None
        }
    };

    if cli.no_panel {
        tokio::signal::ctrl_c().await?;
    } else {
        let autostart: Option<Arc<dyn AutostartRegistrar>> =
            match DesktopEntryRegistrar::for_current_user() {
                Ok(registrar) => Some(Arc::new(registrar)),
                Err(e) => {
                    warn!("Autostart unavailable: {}", e);
                    None
                }
            };
        let panel = ControlPanel::new(
            Arc::clone(&dispatcher),
            address,
            autostart,
            config.volume.step,
        );
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            result = panel.run(stdin, tokio::io::stdout()) => {
                result.context("control panel failed")?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                dispatcher.gate().dismiss();
            }
        }
    }

    info!("Shutting down gracefully");
    stop_tx.send_replace(true);
    if let Some(task) = server_task {
        if let Err(e) = task.await {
            error!("Network endpoint task failed: {}", e);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
