//! btroute demo binary.
//!
//! Runs the routing core against the in-memory simulated registry and walks
//! through the interesting scenarios: plain connect, transport switch,
//! retry exhaustion, and teardown. Listener callbacks are logged as they
//! fire.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use btroute::route::RouteActor;
use btroute::sim::{SimRegistry, TraceListener};
use btroute::{DeviceAddress, DeviceManager, RouteConfig, RouteHandle, Transport};

/// Bluetooth call-audio routing demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (optional; defaults apply when absent)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => RouteConfig::load(path).await?,
        None => RouteConfig::default(),
    };
    info!(?config, "Starting btroute demo");

    let registry = Arc::new(SimRegistry::new());
    let listener = Arc::new(TraceListener);
    let device_manager = Arc::new(DeviceManager::new(registry.clone()));
    let handle = RouteActor::spawn(device_manager, listener, config);

    run_walkthrough(&handle, &registry).await;

    handle.shutdown();
    info!("btroute demo complete");
    Ok(())
}

async fn run_walkthrough(handle: &RouteHandle, registry: &Arc<SimRegistry>) {
    let headset = DeviceAddress::from("AA:BB:CC:DD:EE:FF");
    let earbuds = DeviceAddress::from("11:22:33:44:55:66");

    info!("--- connect with nothing paired ---");
    handle.connect_bluetooth_audio(None);
    report(handle).await;

    info!("--- headset appears over hfp, route to it ---");
    handle.on_device_connected(headset.clone(), Transport::Hfp);
    handle.connect_bluetooth_audio(Some(headset.clone()));
    handle.on_audio_on(headset.clone());
    report(handle).await;

    info!("--- le audio earbuds appear, switch to them ---");
    registry.set_group(&earbuds, 1);
    registry.set_group_leader(1, &earbuds);
    handle.on_device_connected(earbuds.clone(), Transport::LeAudio);
    handle.connect_bluetooth_audio(Some(earbuds.clone()));
    handle.on_audio_on(earbuds.clone());
    report(handle).await;

    info!("--- stack rejects connects, watch bounded retries ---");
    handle.on_audio_lost(None);
    report(handle).await;
    registry.fail_next_connects(10);
    handle.connect_bluetooth_audio(Some(headset.clone()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    info!(
        connect_attempts = registry.connect_calls().len(),
        "retries exhausted"
    );
    report(handle).await;

    info!("--- reconnect and tear down ---");
    handle.connect_bluetooth_audio(Some(headset.clone()));
    handle.on_audio_on(headset.clone());
    handle.disconnect_bluetooth_audio();
    handle.on_audio_lost(Some(headset.clone()));
    report(handle).await;
}

async fn report(handle: &RouteHandle) {
    if let Some(snapshot) = handle.snapshot().await {
        info!(
            state = ?snapshot.state,
            devices = ?handle.connected_devices(),
            available = handle.is_bluetooth_available(),
            "route status"
        );
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
