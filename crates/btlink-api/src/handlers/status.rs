//! /status, /dump, /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use btlink_core::{BondState, PeerAddress};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub profiles: Vec<ProfileStatus>,
    pub bonds: Vec<BondInfo>,
    pub subscribers: usize,
}

#[derive(Serialize)]
pub struct ProfileStatus {
    pub name: &'static str,
    pub running: bool,
    pub devices: usize,
    pub connected: Vec<PeerAddress>,
}

#[derive(Serialize)]
pub struct BondInfo {
    pub peer: PeerAddress,
    pub state: BondState,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let profiles = state
        .services
        .iter()
        .map(|service| ProfileStatus {
            name: service.name(),
            running: service.is_running(),
            devices: service.registry().len(),
            connected: service.connected_devices(),
        })
        .collect();

    let bonds = state
        .bonds
        .list()
        .into_iter()
        .map(|(peer, state)| BondInfo { peer, state })
        .collect();

    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        profiles,
        bonds,
        subscribers: state.apps.len(),
    })
}

// ── /dump ─────────────────────────────────────────────────────────────────────

/// Plain-text diagnostic dump of every profile and the subscriber map.
pub async fn handle_dump(State(state): State<ApiState>) -> String {
    let mut out = String::new();
    for service in state.services.iter() {
        out.push_str(&service.dump());
    }
    out.push_str("event subscribers:\n");
    out.push_str(&state.apps.dump());
    out
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
