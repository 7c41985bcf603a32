use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use usb_hotplug::logging::{init_logging, setup_panic_hook};
use usb_hotplug::{DeviceListener, HotplugFilter, ListenerConfig, MatchId};

/// USB hotplug watcher
///
/// Prints a line for every USB device that is plugged in or removed,
/// optionally restricted to one vendor and/or product.
#[derive(Parser)]
#[command(name = "hotplug-watch")]
#[command(version)]
#[command(about = "Watch USB devices being plugged and unplugged")]
struct Args {
    /// Vendor id to match, hex (e.g. 18d1)
    #[arg(long, value_parser = parse_hex_id)]
    vendor: Option<u16>,

    /// Product id to match, hex (e.g. 4ee7)
    #[arg(long, value_parser = parse_hex_id)]
    product: Option<u16>,

    /// Only report arrivals
    #[arg(long, conflicts_with = "left_only")]
    arrived_only: bool,

    /// Only report removals
    #[arg(long)]
    left_only: bool,

    /// Also report devices already attached at startup
    #[arg(long)]
    enumerate: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn filter(&self) -> HotplugFilter {
        HotplugFilter::new(
            !self.left_only,
            !self.arrived_only,
            MatchId::from(self.vendor),
            MatchId::from(self.product),
        )
    }
}

fn parse_hex_id(value: &str) -> Result<u16, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id '{}': {}", value, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ListenerConfig::load_from_file(path)
            .context(format!("Failed to load configuration from {}", path.display()))?,
        None => ListenerConfig::default(),
    };
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    if args.enumerate {
        config.enumerate_existing = true;
    }

    init_logging(&config.logging)?;
    setup_panic_hook();

    let listener = DeviceListener::with_config(config);
    let mut notifications = listener.subscribe();

    let filter = args.filter();
    info!("Watching for {} using {} backend", filter, listener.backend_name());
    listener.register(filter);

    if listener.state() != usb_hotplug::BackendState::Registered {
        warn!("Hotplug registration inactive; no devices will be reported");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            notification = notifications.recv() => {
                match notification {
                    Some(n) => println!(
                        "{:<8} {:04x}:{:04x} bus {:03} device {:03}",
                        n.state.to_string(),
                        n.device.vendor_id,
                        n.device.product_id,
                        n.device.bus_number,
                        n.device.address
                    ),
                    None => break,
                }
            }
        }
    }

    listener.shutdown();
    let stats = listener.stats();
    info!(
        "Delivered {} notifications ({} dropped)",
        stats.notifications, stats.dropped_notifications
    );

    Ok(())
}
