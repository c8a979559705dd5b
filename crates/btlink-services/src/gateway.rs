//! Native gateway: the boundary to the controller stack.
//!
//! Requests go down through [`NativeGateway`] and never block: the outcome
//! arrives later as a [`NativeEvent`] delivered through a [`NativeEventSink`].
//! The sink is the single delivery point into a profile service's queue.

use bytes::Bytes;
use tokio::sync::mpsc;

use btlink_core::{NativeConnectionState, PeerAddress};

use crate::event::ServiceEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("native stack is not ready")]
    NotReady,
    #[error("native request rejected: {0}")]
    Rejected(String),
}

/// Fire-and-forget requests to the native layer.
///
/// An `Err` means the request could not even be issued. Implementations must
/// not call back into the owning service synchronously.
pub trait NativeGateway: Send + Sync + 'static {
    fn request_connect(&self, peer: &PeerAddress) -> Result<(), GatewayError>;

    /// Also used to reject an incoming connection and to cancel a pending one.
    fn request_disconnect(&self, peer: &PeerAddress) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEventKind {
    ConnectionStateChanged(NativeConnectionState),
    /// Profile payload indicated by the remote (notification, report, ...).
    Data(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub peer: PeerAddress,
    pub kind: NativeEventKind,
}

impl NativeEvent {
    /// Connect-type events may introduce a peer the registry has never seen.
    pub fn may_create_peer(&self) -> bool {
        matches!(
            self.kind,
            NativeEventKind::ConnectionStateChanged(
                NativeConnectionState::Connecting | NativeConnectionState::Connected
            )
        )
    }
}

/// Handle given to the native transport for reporting events.
#[derive(Clone)]
pub struct NativeEventSink {
    profile: &'static str,
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl NativeEventSink {
    pub(crate) fn new(profile: &'static str, tx: mpsc::UnboundedSender<ServiceEvent>) -> Self {
        Self { profile, tx }
    }

    pub fn profile(&self) -> &'static str {
        self.profile
    }

    pub fn on_connection_state_changed(&self, peer: PeerAddress, state: NativeConnectionState) -> bool {
        self.deliver(NativeEvent {
            peer,
            kind: NativeEventKind::ConnectionStateChanged(state),
        })
    }

    pub fn on_data(&self, peer: PeerAddress, payload: Bytes) -> bool {
        self.deliver(NativeEvent {
            peer,
            kind: NativeEventKind::Data(payload),
        })
    }

    /// Returns false once the service has stopped.
    pub fn deliver(&self, event: NativeEvent) -> bool {
        tracing::debug!(profile = self.profile, peer = %event.peer, kind = ?event.kind, "native event");
        if self.tx.send(ServiceEvent::Native(event)).is_err() {
            tracing::warn!(profile = self.profile, "service stopped, dropping native event");
            return false;
        }
        true
    }
}
