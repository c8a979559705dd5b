//! /bond and /native handlers: drive what the controller would report.
//!
//! Bond changes fan out to every hosted profile. The /native routes inject
//! remote-initiated events through a service's native event sink, the same
//! path a real transport uses.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use btlink_core::{BondState, NativeConnectionState, PeerAddress};

use super::devices::CommandResponse;
use super::{parse_peer, ApiState};

// ── POST /bond/{addr} ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BondRequest {
    pub state: BondState,
}

#[derive(Serialize)]
pub struct BondResponse {
    pub peer: PeerAddress,
    pub state: BondState,
    pub profiles_notified: usize,
}

pub async fn handle_bond(
    State(state): State<ApiState>,
    Path(addr): Path<String>,
    Json(req): Json<BondRequest>,
) -> Result<Json<BondResponse>, (StatusCode, String)> {
    let peer = parse_peer(&addr)?;
    state.bonds.set(peer, req.state);
    for service in state.services.iter() {
        service.handle_bond_state_changed(peer, req.state);
    }
    for service in state.services.iter() {
        service.settle().await;
    }
    Ok(Json(BondResponse {
        peer,
        state: req.state,
        profiles_notified: state.services.len(),
    }))
}

// ── POST /native/{profile}/{addr}/incoming ────────────────────────────────────

/// The remote connects to us: Connecting then Connected.
pub async fn handle_native_incoming(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    let sink = service.native_sink();
    let accepted = sink.on_connection_state_changed(peer, NativeConnectionState::Connecting)
        && sink.on_connection_state_changed(peer, NativeConnectionState::Connected);
    service.settle().await;
    Ok(Json(CommandResponse {
        profile: service.name(),
        peer,
        accepted,
        state: service.connection_state(&peer),
    }))
}

// ── POST /native/{profile}/{addr}/drop ────────────────────────────────────────

/// The link is lost without a local request.
pub async fn handle_native_drop(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    let accepted = service
        .native_sink()
        .on_connection_state_changed(peer, NativeConnectionState::Disconnected);
    service.settle().await;
    Ok(Json(CommandResponse {
        profile: service.name(),
        peer,
        accepted,
        state: service.connection_state(&peer),
    }))
}

// ── POST /native/{profile}/{addr}/data ────────────────────────────────────────

#[derive(Deserialize)]
pub struct DataRequest {
    /// Hex-encoded payload.
    pub payload: String,
}

#[derive(Serialize)]
pub struct DataResponse {
    pub peer: PeerAddress,
    pub bytes: usize,
}

pub async fn handle_native_data(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
    Json(req): Json<DataRequest>,
) -> Result<Json<DataResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    let payload = hex::decode(&req.payload)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid hex".to_string()))?;
    let bytes = payload.len();
    service.native_sink().on_data(peer, payload.into());
    service.settle().await;
    Ok(Json(DataResponse { peer, bytes }))
}
