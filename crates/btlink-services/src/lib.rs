//! btlink-services: the per-peer profile connection engine.
//!
//! A [`ProfileService`] hosts one profile. It owns a [`PeerRegistry`] of
//! [`PeerStateMachine`]s, drives them from a single worker fed by the public
//! API, timers and the [`NativeEventSink`], and broadcasts every transition.
//! [`AppMap`] tracks local application registrations with liveness-watched
//! callbacks.

pub mod app_map;
pub mod error;
mod event;
pub mod gateway;
pub mod hosted;
pub mod liveness;
pub mod machine;
pub mod policy;
pub mod profile;
pub mod registry;
pub mod service;
pub mod stats;

pub use app_map::{AppContext, AppInfo, AppMap, AppMapError, Connection};
pub use error::EngineError;
pub use gateway::{GatewayError, NativeEvent, NativeEventKind, NativeEventSink, NativeGateway};
pub use hosted::{BondTable, HostedProfile, LinkSession, KNOWN_PROFILES};
pub use liveness::{ChannelCallback, DeathRecipient, LinkToken, LivenessError, RemoteCallback};
pub use machine::PeerStateMachine;
pub use policy::PolicyStore;
pub use profile::Profile;
pub use registry::{Machines, PeerRegistry};
pub use service::ProfileService;
pub use stats::{AppStats, StatsSnapshot};
