//! btlinkd: hosts profile connection engines behind a local HTTP API.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use btlink_api::{ApiState, HostedService};
use btlink_core::config::BtlinkConfig;
use btlink_core::BondState;
use btlink_services::{AppMap, BondTable, HostedProfile, PolicyStore, ProfileService};

mod events;
mod simulator;

use simulator::{parse_peers, SimulatedController};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BtlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BtlinkConfig::load().context("failed to load config")?;
    tracing::info!(path = %BtlinkConfig::file_path().display(), "btlinkd starting");

    // Bonds
    let bonds = BondTable::new(config.simulator.auto_bond);
    for peer in parse_peers(&config.simulator.bonded, "bonded") {
        bonds.set(peer, BondState::Bonded);
    }
    if config.simulator.auto_bond {
        tracing::warn!("auto-bond enabled, every peer reads as bonded");
    }

    // Policies
    let policy = if config.policy.persist_path.as_os_str().is_empty() {
        PolicyStore::new()
    } else {
        tracing::info!(path = %config.policy.persist_path.display(), "policy persistence enabled");
        PolicyStore::with_persistence(config.policy.persist_path.clone())
    };

    // Profile services
    let mut services: Vec<Arc<HostedService>> = Vec::new();
    for name in &config.profiles.enabled {
        if services.iter().any(|s| s.name() == name.as_str()) {
            tracing::warn!(profile = %name, "profile listed twice, skipping");
            continue;
        }
        let Some(profile) = HostedProfile::new(name, bonds.clone()) else {
            tracing::warn!(profile = %name, "unknown profile, skipping");
            continue;
        };
        let controller = Arc::new(SimulatedController::from_config(&config.simulator));
        let service = ProfileService::start(
            Arc::new(profile),
            controller.clone(),
            policy.clone(),
            config.engine.clone(),
        );
        controller.attach(service.native_sink());
        services.push(Arc::new(service));
    }
    if services.is_empty() {
        anyhow::bail!("no known profile enabled in {}", BtlinkConfig::file_path().display());
    }
    tracing::info!(
        profiles = ?services.iter().map(|s| s.name()).collect::<Vec<_>>(),
        connect_timeout_ms = config.engine.connect_timeout_ms,
        "profiles started"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let apps = AppMap::new();
    let fan_out = events::spawn_fan_out(&services, &apps, &shutdown_tx);

    let state = ApiState {
        services: Arc::new(services.clone()),
        bonds,
        apps,
        started_at: Instant::now(),
        shutdown_tx: shutdown_tx.clone(),
    };
    let api_port = config.api.port;
    let mut api_task = tokio::spawn(async move { btlink_api::serve(state, api_port).await });

    // ── Wait for exit ────────────────────────────────────────────────────────
    let mut shutdown_rx = shutdown_tx.subscribe();

    let api_running = tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
            true
        }
        r = &mut api_task => {
            match r {
                Ok(Ok(())) => tracing::warn!("API server exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API task panicked"),
            }
            false
        }
    };
    let _ = shutdown_tx.send(());

    for service in &services {
        service.stop().await;
    }
    for task in fan_out {
        let _ = task.await;
    }
    if api_running {
        let _ = api_task.await;
    }
    tracing::info!("btlinkd stopped");

    Ok(())
}
