//! Simulated controller: answers native requests after a fixed latency.
//!
//! One controller is built per hosted profile and answers only through that
//! profile's event sink. Peers listed as unreachable never answer a connect
//! request, so the engine's connect timeout is what ends the attempt.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use btlink_core::config::SimulatorConfig;
use btlink_core::{NativeConnectionState, PeerAddress};
use btlink_services::{GatewayError, NativeEventSink, NativeGateway};

pub struct SimulatedController {
    latency: Duration,
    unreachable: HashSet<PeerAddress>,
    sink: OnceLock<NativeEventSink>,
}

impl SimulatedController {
    pub fn new(latency: Duration, unreachable: impl IntoIterator<Item = PeerAddress>) -> Self {
        Self {
            latency,
            unreachable: unreachable.into_iter().collect(),
            sink: OnceLock::new(),
        }
    }

    /// Builds a controller from config, skipping malformed addresses.
    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_latency_ms),
            parse_peers(&config.unreachable, "unreachable"),
        )
    }

    /// Attach the sink of the service this controller answers for.
    pub fn attach(&self, sink: NativeEventSink) {
        if self.sink.set(sink).is_err() {
            tracing::warn!("simulated controller already attached");
        }
    }

    fn answer(&self, peer: PeerAddress, state: NativeConnectionState) -> Result<(), GatewayError> {
        let sink = self.sink.get().cloned().ok_or(GatewayError::NotReady)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GatewayError::NotReady)?;
        let latency = self.latency;
        runtime.spawn(async move {
            tokio::time::sleep(latency).await;
            sink.on_connection_state_changed(peer, state);
        });
        Ok(())
    }
}

impl NativeGateway for SimulatedController {
    fn request_connect(&self, peer: &PeerAddress) -> Result<(), GatewayError> {
        if self.unreachable.contains(peer) {
            tracing::debug!(peer = %peer, "simulated peer unreachable, no answer");
            return Ok(());
        }
        self.answer(*peer, NativeConnectionState::Connected)
    }

    fn request_disconnect(&self, peer: &PeerAddress) -> Result<(), GatewayError> {
        self.answer(*peer, NativeConnectionState::Disconnected)
    }
}

/// Parse configured addresses, warning on each one that does not parse.
pub fn parse_peers(entries: &[String], what: &str) -> Vec<PeerAddress> {
    entries
        .iter()
        .filter_map(|text| match text.parse() {
            Ok(peer) => Some(peer),
            Err(e) => {
                tracing::warn!(entry = %text, list = what, error = %e, "ignoring bad address");
                None
            }
        })
        .collect()
}
