//! Peer registry: the sole owner of a profile's state machines.
//!
//! One mutex guards the map. Aggregate queries are computed from the live
//! map on every call. The worker holds the lock through a [`Machines`]
//! guard while a transition runs; public queries take it briefly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use btlink_core::{ConnectionState, PeerAddress};

use crate::error::EngineError;
use crate::machine::PeerStateMachine;
use crate::profile::Profile;

pub struct PeerRegistry<P: Profile> {
    machines: Mutex<HashMap<PeerAddress, PeerStateMachine<P>>>,
}

/// Locked view of the registry.
pub struct Machines<'a, P: Profile> {
    map: MutexGuard<'a, HashMap<PeerAddress, PeerStateMachine<P>>>,
}

impl<P: Profile> Default for PeerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Profile> PeerRegistry<P> {
    pub fn new() -> Self {
        Self {
            machines: Mutex::new(HashMap::new()),
        }
    }

    /// A panic on the worker must not wedge the public surface, so a
    /// poisoned lock is taken over as-is.
    pub fn lock(&self) -> Machines<'_, P> {
        Machines {
            map: self.machines.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Disconnected for peers without a machine.
    pub fn connection_state(&self, peer: &PeerAddress) -> ConnectionState {
        self.lock()
            .get(peer)
            .map(|m| m.state())
            .unwrap_or_default()
    }

    pub fn connected(&self) -> Vec<PeerAddress> {
        self.lock().connected()
    }

    pub fn matching_states(&self, states: &[ConnectionState]) -> Vec<PeerAddress> {
        self.lock().matching_states(states)
    }

    pub fn devices(&self) -> Vec<(PeerAddress, ConnectionState)> {
        self.lock().devices()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, P: Profile> Machines<'a, P> {
    pub fn get_or_create(&mut self, peer: PeerAddress) -> &mut PeerStateMachine<P> {
        self.map.entry(peer).or_insert_with(|| {
            tracing::debug!(peer = %peer, "creating state machine");
            PeerStateMachine::new(peer)
        })
    }

    pub fn get(&self, peer: &PeerAddress) -> Option<&PeerStateMachine<P>> {
        self.map.get(peer)
    }

    pub fn get_mut(&mut self, peer: &PeerAddress) -> Option<&mut PeerStateMachine<P>> {
        self.map.get_mut(peer)
    }

    /// Lookup by any key other than the address.
    pub fn find(&self, pred: impl Fn(&PeerStateMachine<P>) -> bool) -> Option<PeerAddress> {
        self.map.values().find(|m| pred(m)).map(|m| m.peer())
    }

    /// Remove a machine. Refused unless it is Disconnected.
    pub fn remove(&mut self, peer: &PeerAddress) -> Result<PeerStateMachine<P>, EngineError> {
        let state = match self.map.get(peer) {
            Some(machine) => machine.state(),
            None => return Err(EngineError::UnknownPeer(*peer)),
        };
        if state != ConnectionState::Disconnected {
            let err = EngineError::InvariantViolation { peer: *peer, state };
            tracing::error!(error = %err, "state machine removal refused");
            return Err(err);
        }
        tracing::debug!(peer = %peer, "removing state machine");
        self.map.remove(peer).ok_or(EngineError::UnknownPeer(*peer))
    }

    /// Bond to `peer` was lost: remove now if Disconnected. A live machine
    /// is kept; whether it goes is decided from the bond state at the time
    /// it reaches Disconnected. Returns true if removed now.
    pub fn handle_unbonded(&mut self, peer: &PeerAddress) -> bool {
        let Some(machine) = self.map.get(peer) else {
            return false;
        };
        if machine.state() == ConnectionState::Disconnected {
            return self.remove(peer).is_ok();
        }
        tracing::info!(peer = %peer, state = ?machine.state(), "unbonded while active, kept until disconnected");
        false
    }

    pub fn connected(&self) -> Vec<PeerAddress> {
        self.matching_states(&[ConnectionState::Connected])
    }

    pub fn matching_states(&self, states: &[ConnectionState]) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = self
            .map
            .values()
            .filter(|m| states.contains(&m.state()))
            .map(|m| m.peer())
            .collect();
        peers.sort();
        peers
    }

    pub fn devices(&self) -> Vec<(PeerAddress, ConnectionState)> {
        let mut devices: Vec<_> = self.map.values().map(|m| (m.peer(), m.state())).collect();
        devices.sort_by_key(|(peer, _)| *peer);
        devices
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerStateMachine<P>> {
        let mut machines: Vec<_> = self.map.values().collect();
        machines.sort_by_key(|m| m.peer());
        machines.into_iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerStateMachine<P>> {
        self.map.values_mut()
    }

    /// Empty the registry regardless of state; used at teardown.
    pub(crate) fn drain(&mut self) -> Vec<PeerStateMachine<P>> {
        self.map.drain().map(|(_, m)| m).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
