//! Connection, bond and policy states shared by every profile.

use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

/// Engine-side connection state of one peer for one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Outgoing request issued, waiting for the native layer.
    Connecting,
    /// Remote-initiated connection accepted by policy, not yet complete.
    Incoming,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Connecting or Incoming: a connect timer is running.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Incoming)
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Connection state as reported by the native transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondState {
    #[default]
    None,
    Bonding,
    Bonded,
}

/// Per-peer, per-profile connection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPolicy {
    /// No rule stored; treated as permitted.
    #[default]
    Unknown,
    Allowed,
    Forbidden,
}

impl ConnectionPolicy {
    pub fn permits(self) -> bool {
        !matches!(self, Self::Forbidden)
    }
}

/// One observable state transition of one peer's machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub profile: &'static str,
    pub peer: PeerAddress,
    pub from: ConnectionState,
    pub to: ConnectionState,
}
