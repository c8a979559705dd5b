//! /profiles/{profile}/devices handlers: state queries and commands.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use btlink_core::{BondState, ConnectionPolicy, ConnectionState, PeerAddress};

use super::{parse_peer, ApiState, HostedService};

#[derive(Serialize)]
pub struct DeviceInfo {
    pub peer: PeerAddress,
    pub state: ConnectionState,
    pub policy: ConnectionPolicy,
    pub bond: BondState,
}

fn device_info(state: &ApiState, service: &HostedService, peer: PeerAddress) -> DeviceInfo {
    DeviceInfo {
        peer,
        state: service.connection_state(&peer),
        policy: service.connection_policy(&peer),
        bond: state.bonds.get(&peer),
    }
}

// ── GET /profiles/{profile}/devices ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct DevicesQuery {
    /// Comma-separated state filter, e.g. `connected,connecting`.
    pub state: Option<String>,
}

#[derive(Serialize)]
pub struct DevicesResponse {
    pub profile: &'static str,
    pub devices: Vec<DeviceInfo>,
    pub connected: Vec<PeerAddress>,
}

fn parse_states(filter: &str) -> Result<Vec<ConnectionState>, (StatusCode, String)> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            serde_json::from_value(serde_json::Value::String(s.to_string()))
                .map_err(|_| (StatusCode::BAD_REQUEST, format!("unknown state {s:?}")))
        })
        .collect()
}

pub async fn handle_devices(
    State(state): State<ApiState>,
    Path(profile): Path<String>,
    Query(query): Query<DevicesQuery>,
) -> Result<Json<DevicesResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peers = match query.state.as_deref() {
        Some(filter) => service.devices_matching_states(&parse_states(filter)?),
        None => service.devices().into_iter().map(|(peer, _)| peer).collect(),
    };
    let devices = peers
        .into_iter()
        .map(|peer| device_info(&state, service, peer))
        .collect();

    Ok(Json(DevicesResponse {
        profile: service.name(),
        devices,
        connected: service.connected_devices(),
    }))
}

// ── GET /profiles/{profile}/devices/{addr} ────────────────────────────────────

pub async fn handle_device(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
) -> Result<Json<DeviceInfo>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    Ok(Json(device_info(&state, service, peer)))
}

// ── POST /profiles/{profile}/devices/{addr}/connect|disconnect ────────────────

#[derive(Serialize)]
pub struct CommandResponse {
    pub profile: &'static str,
    pub peer: PeerAddress,
    /// Whether the request was taken. The outcome arrives as events.
    pub accepted: bool,
    /// State once the request has been processed.
    pub state: ConnectionState,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    let accepted = service.connect(peer);
    service.settle().await;
    Ok(Json(CommandResponse {
        profile: service.name(),
        peer,
        accepted,
        state: service.connection_state(&peer),
    }))
}

pub async fn handle_disconnect(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    let accepted = service.disconnect(peer);
    service.settle().await;
    Ok(Json(CommandResponse {
        profile: service.name(),
        peer,
        accepted,
        state: service.connection_state(&peer),
    }))
}

// ── POST /profiles/{profile}/devices/{addr}/policy ────────────────────────────

#[derive(Deserialize)]
pub struct PolicyRequest {
    pub policy: ConnectionPolicy,
}

pub async fn handle_policy(
    State(state): State<ApiState>,
    Path((profile, addr)): Path<(String, String)>,
    Json(req): Json<PolicyRequest>,
) -> Result<Json<DeviceInfo>, (StatusCode, String)> {
    let service = state.service(&profile)?;
    let peer = parse_peer(&addr)?;
    service.set_connection_policy(peer, req.policy);
    service.settle().await;
    Ok(Json(device_info(&state, service, peer)))
}
