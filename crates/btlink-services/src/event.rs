//! Messages drained by a profile service's worker.

use tokio::sync::oneshot;

use btlink_core::{BondState, PeerAddress};

use crate::gateway::{NativeEvent, NativeEventKind};

/// Everything that can reach the worker queue.
#[derive(Debug)]
pub(crate) enum ServiceEvent {
    Connect(PeerAddress),
    Disconnect(PeerAddress),
    Native(NativeEvent),
    TimerFired { peer: PeerAddress, generation: u64 },
    BondStateChanged(PeerAddress, BondState),
    /// Answered once every earlier event has been processed.
    Barrier(oneshot::Sender<()>),
}

/// The subset a single peer's machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MachineEvent {
    Connect,
    Disconnect,
    Native(NativeEventKind),
    TimerFired(u64),
}
