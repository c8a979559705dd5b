//! btlink integration test harness.
//!
//! Scenarios drive a real `ProfileService` on the tokio runtime against a
//! scripted controller. The controller records every native request and
//! answers only when the scenario says so, which lets each test decide
//! whether a peer is reachable, slow or silent.
//!
//!   cargo test --test integration

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::broadcast;

use btlink_core::config::EngineConfig;
use btlink_core::{BondState, ConnectionState, NativeConnectionState, PeerAddress, StateChange};
use btlink_services::{
    GatewayError, NativeEventSink, NativeGateway, PolicyStore, Profile, ProfileService,
};

mod apps;
mod incoming;
mod lifecycle;
mod outgoing;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const PEER_A: PeerAddress = PeerAddress::new([0xA0, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const PEER_B: PeerAddress = PeerAddress::new([0xB0, 0x00, 0x00, 0x00, 0x00, 0x02]);

/// How long a scenario waits for a broadcast before failing.
pub const EVENT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
}

/// Controller whose answers are scripted by the test.
#[derive(Default)]
pub struct ScriptedController {
    calls: Mutex<Vec<(Call, PeerAddress)>>,
    /// Answer requests immediately through the sink.
    auto_answer: AtomicBool,
    /// Refuse to issue requests at all.
    broken: AtomicBool,
    sink: OnceLock<NativeEventSink>,
}

impl ScriptedController {
    pub fn calls(&self, call: Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|(c, _)| *c == call).count()
    }

    pub fn set_auto_answer(&self, on: bool) {
        self.auto_answer.store(on, Ordering::SeqCst);
    }

    pub fn set_broken(&self, on: bool) {
        self.broken.store(on, Ordering::SeqCst);
    }

    /// Report a native state as the controller would.
    pub fn report(&self, peer: PeerAddress, state: NativeConnectionState) {
        let sink = self.sink.get().expect("controller attached");
        assert!(sink.on_connection_state_changed(peer, state));
    }

    pub fn report_data(&self, peer: PeerAddress, payload: &'static [u8]) {
        let sink = self.sink.get().expect("controller attached");
        assert!(sink.on_data(peer, bytes::Bytes::from_static(payload)));
    }

    fn request(&self, call: Call, peer: &PeerAddress) -> Result<(), GatewayError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("scripted failure".to_string()));
        }
        self.calls.lock().unwrap().push((call, *peer));
        if self.auto_answer.load(Ordering::SeqCst) {
            let state = match call {
                Call::Connect => NativeConnectionState::Connected,
                Call::Disconnect => NativeConnectionState::Disconnected,
            };
            self.report(*peer, state);
        }
        Ok(())
    }
}

impl NativeGateway for ScriptedController {
    fn request_connect(&self, peer: &PeerAddress) -> Result<(), GatewayError> {
        self.request(Call::Connect, peer)
    }

    fn request_disconnect(&self, peer: &PeerAddress) -> Result<(), GatewayError> {
        self.request(Call::Disconnect, peer)
    }
}

#[derive(Debug, Default)]
pub struct LinkLog {
    pub connects: u32,
    pub payloads: Vec<Vec<u8>>,
}

/// Profile with an editable bond table and a log of hook calls.
#[derive(Debug, Default)]
pub struct ScenarioProfile {
    bonded: Mutex<HashSet<PeerAddress>>,
    veto: AtomicBool,
    /// Block the worker in `on_state_changed` for this long.
    stall: Mutex<Option<Duration>>,
    pub observed: Mutex<Vec<StateChange>>,
    pub disconnected_logs: Mutex<Vec<(PeerAddress, u32, usize)>>,
}

impl ScenarioProfile {
    pub fn bond(&self, peer: PeerAddress) {
        self.bonded.lock().unwrap().insert(peer);
    }

    pub fn unbond(&self, peer: PeerAddress) {
        self.bonded.lock().unwrap().remove(&peer);
    }

    pub fn set_veto(&self, on: bool) {
        self.veto.store(on, Ordering::SeqCst);
    }

    pub fn stall_for(&self, duration: Duration) {
        *self.stall.lock().unwrap() = Some(duration);
    }
}

impl Profile for ScenarioProfile {
    type Session = LinkLog;

    fn name(&self) -> &'static str {
        "scenario"
    }

    fn bond_state(&self, peer: &PeerAddress) -> BondState {
        if self.bonded.lock().unwrap().contains(peer) {
            BondState::Bonded
        } else {
            BondState::None
        }
    }

    fn can_connect(&self, _peer: &PeerAddress) -> bool {
        !self.veto.load(Ordering::SeqCst)
    }

    fn on_state_changed(&self, change: &StateChange) {
        self.observed.lock().unwrap().push(*change);
        let stall = self.stall.lock().unwrap().take();
        if let Some(duration) = stall {
            std::thread::sleep(duration);
        }
    }

    fn on_connected(&self, _peer: &PeerAddress, session: &mut LinkLog) {
        session.connects += 1;
    }

    fn on_disconnected(&self, peer: &PeerAddress, session: &mut LinkLog) {
        self.disconnected_logs
            .lock()
            .unwrap()
            .push((*peer, session.connects, session.payloads.len()));
    }

    fn on_data(&self, _peer: &PeerAddress, session: &mut LinkLog, payload: &[u8]) {
        session.payloads.push(payload.to_vec());
    }
}

pub struct Scenario {
    pub service: ProfileService<ScenarioProfile>,
    pub controller: Arc<ScriptedController>,
    pub profile: Arc<ScenarioProfile>,
    pub changes: broadcast::Receiver<StateChange>,
}

/// Short timeouts so timer paths finish quickly.
pub fn fast_engine() -> EngineConfig {
    EngineConfig {
        connect_timeout_ms: 80,
        disconnect_timeout_ms: 80,
        shutdown_join_timeout_ms: 500,
    }
}

impl Scenario {
    /// PEER_A bonded, controller answering.
    pub fn start() -> Self {
        Self::with(fast_engine(), PolicyStore::new())
    }

    pub fn with(engine: EngineConfig, policy: PolicyStore) -> Self {
        let profile = Arc::new(ScenarioProfile::default());
        profile.bond(PEER_A);
        let controller = Arc::new(ScriptedController::default());
        controller.set_auto_answer(true);
        let service = ProfileService::start(profile.clone(), controller.clone(), policy, engine);
        let _ = controller.sink.set(service.native_sink());
        let changes = service.subscribe();
        Self {
            service,
            controller,
            profile,
            changes,
        }
    }

    pub async fn next_change(&mut self) -> StateChange {
        tokio::time::timeout(EVENT_WAIT, self.changes.recv())
            .await
            .expect("timed out waiting for a state change")
            .expect("change channel closed")
    }

    /// Wait for the next change and check its endpoints.
    pub async fn expect(&mut self, peer: PeerAddress, from: ConnectionState, to: ConnectionState) {
        let change = self.next_change().await;
        assert_eq!(
            (change.peer, change.from, change.to),
            (peer, from, to),
            "unexpected change {change:?}"
        );
        assert_eq!(change.profile, "scenario");
    }

    /// Settle the queue and assert nothing else was broadcast.
    pub async fn expect_quiet(&mut self) {
        self.service.settle().await;
        match self.changes.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            other => panic!("expected no broadcast, got {other:?}"),
        }
    }

    /// Bring PEER_A to Connected through a local connect.
    pub async fn connect_a(&mut self) {
        assert!(self.service.connect(PEER_A));
        self.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
        self.expect(PEER_A, ConnectionState::Connecting, ConnectionState::Connected).await;
    }
}
