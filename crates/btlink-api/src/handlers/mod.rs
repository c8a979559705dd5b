//! HTTP API handlers: the hosted profile services as JSON.

pub mod apps;
pub mod devices;
pub mod native;
pub mod status;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use btlink_core::{PeerAddress, StateChange};
use btlink_services::{AppMap, BondTable, ChannelCallback, HostedProfile, ProfileService};

pub type HostedService = ProfileService<HostedProfile>;

/// Callback held by each `/api/events` subscriber.
pub type EventCallback = ChannelCallback<StateChange>;

#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<Vec<Arc<HostedService>>>,
    pub bonds: BondTable,
    /// Event subscribers, removed automatically when their stream closes.
    pub apps: AppMap<EventCallback>,
    pub started_at: Instant,
    /// Shutdown broadcast sender, signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ApiState {
    fn service(&self, profile: &str) -> Result<&Arc<HostedService>, (StatusCode, String)> {
        self.services
            .iter()
            .find(|s| s.name() == profile)
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("profile {profile} is not hosted")))
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn parse_peer(text: &str) -> Result<PeerAddress, (StatusCode, String)> {
    text.parse()
        .map_err(|e: btlink_core::AddressError| (StatusCode::BAD_REQUEST, e.to_string()))
}

// Re-export handler functions for use in router setup.
pub use apps::{handle_apps, handle_events};
pub use devices::{
    handle_connect, handle_device, handle_devices, handle_disconnect, handle_policy,
};
pub use native::{handle_bond, handle_native_data, handle_native_drop, handle_native_incoming};
pub use status::{handle_dump, handle_shutdown, handle_status};
