use btlink_core::{ConnectionState, PeerAddress};

use crate::gateway::GatewayError;

/// Engine failures. None of these reach a caller as a panic: the public
/// surface reports them as `false` or a default state and logs the detail.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("connection to {peer} rejected by policy for {profile}")]
    PolicyRejected {
        profile: &'static str,
        peer: PeerAddress,
    },
    #[error("no state machine for {0}")]
    UnknownPeer(PeerAddress),
    #[error("native request for {peer} failed: {source}")]
    NativeCallFailed {
        peer: PeerAddress,
        #[source]
        source: GatewayError,
    },
    #[error("refusing to remove {peer} while {state:?}")]
    InvariantViolation {
        peer: PeerAddress,
        state: ConnectionState,
    },
    #[error("service {0} has stopped")]
    Stopped(&'static str),
}
