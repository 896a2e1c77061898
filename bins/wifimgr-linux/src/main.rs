use std::path::Path;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifimgr_core::sim::{SimNetwork, SimScenario, SimulatedRadio};
use wifimgr_core::{FileCredentialStorage, ManagerConfig, SecurityMode};
use wifimgr_server::WifiManager;

const SCENARIO_FILE: &str = "sim-networks.json";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wifimgr_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wifimgr starting...");

    let radio = load_radio(Path::new(SCENARIO_FILE))?;

    // Unprivileged port; the device itself listens on 80.
    let config = ManagerConfig {
        portal_port: 8080,
        ..ManagerConfig::default()
    };
    let credentials = FileCredentialStorage::new(&config.credentials_path);
    tracing::info!("Credentials file: {}", credentials.path().display());

    let mut manager = WifiManager::new(radio.station(), radio.access_point(), credentials, config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down...");
    };

    match manager.acquire_connection_until(shutdown).await {
        Some(link) => {
            match (&link.ssid, &link.ip_info) {
                (Some(ssid), Some(ip)) => tracing::info!("Connected to {} ({})", ssid, ip),
                (Some(ssid), None) => tracing::info!("Connected to {}", ssid),
                (None, Some(ip)) => tracing::info!("Connected ({})", ip),
                (None, None) => tracing::info!("Connected"),
            }
            println!("Network OK");
            Ok(())
        }
        None => anyhow::bail!("Could not initialize the network connection."),
    }
}

/// Simulated radio from the scenario file, or a small built-in neighbourhood.
fn load_radio(path: &Path) -> anyhow::Result<SimulatedRadio> {
    if path.exists() {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let radio = SimulatedRadio::from_json(&json)
            .with_context(|| format!("Invalid scenario in {}", path.display()))?;
        tracing::info!("Loaded simulated networks from {}", path.display());
        return Ok(radio);
    }

    tracing::info!(
        "{} not found, using built-in networks (join \"home\" with secret \"secret1\")",
        path.display()
    );
    Ok(SimulatedRadio::from_scenario(SimScenario {
        association_polls: 10,
        networks: vec![
            SimNetwork::secured("home", -48, SecurityMode::Wpa2Psk, "secret1"),
            SimNetwork::open("guest", -35).unreachable(),
            SimNetwork::secured("neighbour", -71, SecurityMode::WpaWpa2Psk, "unknown"),
        ],
    }))
}
