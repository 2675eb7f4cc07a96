//! Field link controller
//!
//! Opens the serial link to the peer, pushes the configured time servers
//! once and keeps the link healthy and the time synchronized until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: /dev/ttyUSB0 at 250000 baud
//! fieldlink
//!
//! # Config file with a device override
//! fieldlink --config fieldlink.json --device /dev/ttyS1 --log-level debug
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fieldlink::core::TracingSink;
use fieldlink::link::{Link, SerialLink};
use fieldlink::time::SystemClock;
use fieldlink::{Config, Controller};

/// Field link controller for the peer microcontroller
#[derive(Parser, Debug)]
#[command(name = "fieldlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,

    /// Skip pushing the configured time servers at start-up
    #[arg(long, default_value = "false")]
    no_push: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Config::load(path)?
        }
        None => Config::default(),
    };
    if let Some(device) = args.device {
        config.link.device = device;
    }
    if let Some(baud) = args.baud {
        config.link.baud_rate = baud;
    }
    config.validate()?;

    let mut link = SerialLink::new(&config.link);
    link.open()?;
    info!(
        device = %config.link.device,
        baud = config.link.baud_rate,
        "serial link open"
    );

    let mut controller = Controller::new(
        config,
        Box::new(link),
        Arc::new(SystemClock),
        Arc::new(TracingSink),
    )?;

    if !args.no_push {
        if let Err(e) = controller.push_servers() {
            warn!("time server push incomplete: {}", e);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    controller.run(shutdown_rx).await?;

    info!("{}", controller.format_link_status());
    info!("{}", controller.format_sync_stats());
    Ok(())
}
