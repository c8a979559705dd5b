//! Profile behaviour plugged into the generic engine.
//!
//! A profile supplies its name, bond lookup, an extra admission rule and a
//! per-peer session type. The engine owns everything else: states, timers,
//! broadcasts and registry lifetime.

use std::fmt::Debug;

use btlink_core::{BondState, PeerAddress, StateChange};

use crate::policy::PolicyStore;

/// Contract between a profile service and the profile-specific logic.
///
/// Hooks taking `&mut Self::Session` run on the worker with the registry
/// locked. They must not call back into the owning service.
pub trait Profile: Send + Sync + 'static {
    /// Per-peer data the engine stores but never inspects.
    type Session: Default + Debug + Send + 'static;

    /// Stable name used in logs, policy keys and broadcasts.
    fn name(&self) -> &'static str;

    fn bond_state(&self, peer: &PeerAddress) -> BondState;

    /// Profile-specific admission rule, checked after bond and policy.
    fn can_connect(&self, _peer: &PeerAddress) -> bool {
        true
    }

    /// Called after every broadcast transition, outside the registry lock.
    fn on_state_changed(&self, _change: &StateChange) {}

    fn on_connected(&self, _peer: &PeerAddress, _session: &mut Self::Session) {}

    /// Called on entry to Disconnected. The session is reset afterwards.
    fn on_disconnected(&self, _peer: &PeerAddress, _session: &mut Self::Session) {}

    /// Payload indicated by a connected peer.
    fn on_data(&self, _peer: &PeerAddress, _session: &mut Self::Session, _payload: &[u8]) {}
}

/// Admission check shared by outgoing and incoming paths: bonded, policy not
/// Forbidden, then the profile's own rule.
pub(crate) fn admits<P: Profile>(profile: &P, policy: &PolicyStore, peer: &PeerAddress) -> bool {
    let name = profile.name();
    let bond = profile.bond_state(peer);
    if bond != BondState::Bonded {
        tracing::info!(profile = name, peer = %peer, bond = ?bond, "cannot connect: not bonded");
        return false;
    }
    let rule = policy.get(name, peer);
    if !rule.permits() {
        tracing::info!(profile = name, peer = %peer, policy = ?rule, "cannot connect: policy");
        return false;
    }
    if !profile.can_connect(peer) {
        tracing::info!(profile = name, peer = %peer, "cannot connect: rejected by profile");
        return false;
    }
    true
}
