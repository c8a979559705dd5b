//! btlink-core: peer identities, connection states and configuration.
//! All other btlink crates depend on this one.

pub mod address;
pub mod config;
pub mod state;

pub use address::{AddressError, AppUuid, PeerAddress};
pub use state::{BondState, ConnectionPolicy, ConnectionState, NativeConnectionState, StateChange};
