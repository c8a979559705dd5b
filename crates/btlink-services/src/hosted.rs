//! Table-driven profile hosted by the daemon.
//!
//! Every hosted profile shares one [`BondTable`] and keeps a small
//! [`LinkSession`] per connected peer. Profile payloads are not decoded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use btlink_core::{BondState, PeerAddress};

use crate::profile::Profile;

/// Profile names the daemon knows how to host.
pub const KNOWN_PROFILES: &[&str] = &["battery", "csip", "hap", "hid_host", "vcp"];

/// Bytes of the last payload kept for dumps.
const PAYLOAD_PREVIEW: usize = 16;

/// Bond state per peer, shared by all hosted profiles.
#[derive(Clone, Default)]
pub struct BondTable {
    bonds: Arc<DashMap<PeerAddress, BondState>>,
    auto_bond: Arc<AtomicBool>,
}

impl BondTable {
    /// With `auto_bond`, peers without an explicit entry read as Bonded.
    pub fn new(auto_bond: bool) -> Self {
        Self {
            bonds: Arc::new(DashMap::new()),
            auto_bond: Arc::new(AtomicBool::new(auto_bond)),
        }
    }

    pub fn get(&self, peer: &PeerAddress) -> BondState {
        match self.bonds.get(peer) {
            Some(entry) => *entry.value(),
            None if self.auto_bond.load(Ordering::Relaxed) => BondState::Bonded,
            None => BondState::None,
        }
    }

    pub fn set(&self, peer: PeerAddress, state: BondState) {
        self.bonds.insert(peer, state);
        tracing::info!(peer = %peer, bond = ?state, "bond state set");
    }

    pub fn list(&self) -> Vec<(PeerAddress, BondState)> {
        let mut bonds: Vec<_> = self
            .bonds
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        bonds.sort_by_key(|(peer, _)| *peer);
        bonds
    }
}

#[derive(Debug, Default)]
pub struct LinkSession {
    pub connected_since: Option<Instant>,
    pub indications: u64,
    pub bytes: u64,
    /// Hex of the first bytes of the last payload.
    pub last_payload: String,
}

pub struct HostedProfile {
    name: &'static str,
    bonds: BondTable,
}

impl HostedProfile {
    /// None if `name` is not in [`KNOWN_PROFILES`].
    pub fn new(name: &str, bonds: BondTable) -> Option<Self> {
        let name = KNOWN_PROFILES.iter().copied().find(|known| *known == name)?;
        Some(Self { name, bonds })
    }

    pub fn bonds(&self) -> &BondTable {
        &self.bonds
    }
}

impl Profile for HostedProfile {
    type Session = LinkSession;

    fn name(&self) -> &'static str {
        self.name
    }

    fn bond_state(&self, peer: &PeerAddress) -> BondState {
        self.bonds.get(peer)
    }

    fn on_connected(&self, _peer: &PeerAddress, session: &mut LinkSession) {
        session.connected_since = Some(Instant::now());
    }

    fn on_disconnected(&self, peer: &PeerAddress, session: &mut LinkSession) {
        if session.indications > 0 {
            tracing::debug!(profile = self.name, peer = %peer, indications = session.indications, bytes = session.bytes, "link closed");
        }
    }

    fn on_data(&self, peer: &PeerAddress, session: &mut LinkSession, payload: &[u8]) {
        session.indications += 1;
        session.bytes += payload.len() as u64;
        session.last_payload = hex::encode(&payload[..payload.len().min(PAYLOAD_PREVIEW)]);
        tracing::debug!(profile = self.name, peer = %peer, len = payload.len(), "indication");
    }
}
