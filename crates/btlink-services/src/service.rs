//! Profile service: the public surface of one profile.
//!
//! Public calls validate, touch the registry briefly and enqueue. A single
//! worker task drains the queue in order, drives the per-peer machines and
//! broadcasts every state change. Nothing here blocks on the worker except
//! `settle()` and `stop()`.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use btlink_core::config::EngineConfig;
use btlink_core::{BondState, ConnectionPolicy, ConnectionState, PeerAddress, StateChange};

use crate::error::EngineError;
use crate::event::{MachineEvent, ServiceEvent};
use crate::gateway::{NativeEventSink, NativeGateway};
use crate::machine::Env;
use crate::policy::PolicyStore;
use crate::profile::{admits, Profile};
use crate::registry::PeerRegistry;

/// Backlog a slow subscriber may fall behind before it starts losing changes.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub struct ProfileService<P: Profile> {
    profile: Arc<P>,
    registry: Arc<PeerRegistry<P>>,
    policy: PolicyStore,
    queue: mpsc::UnboundedSender<ServiceEvent>,
    changes: broadcast::Sender<StateChange>,
    shutdown: broadcast::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

impl<P: Profile> ProfileService<P> {
    /// Spawn the worker on the current runtime and return the façade.
    pub fn start(
        profile: Arc<P>,
        gateway: Arc<dyn NativeGateway>,
        policy: PolicyStore,
        config: EngineConfig,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let registry = Arc::new(PeerRegistry::new());
        let join_timeout = config.shutdown_join_timeout();

        let worker = Worker {
            profile: profile.clone(),
            gateway,
            policy: policy.clone(),
            registry: registry.clone(),
            timing: config,
            queue: queue.clone(),
            rx,
            changes: changes.clone(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(worker.run());
        tracing::info!(profile = profile.name(), "profile service started");

        Self {
            profile,
            registry,
            policy,
            queue,
            changes,
            shutdown,
            worker: Mutex::new(Some(handle)),
            join_timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        self.profile.name()
    }

    pub fn profile(&self) -> &Arc<P> {
        &self.profile
    }

    pub fn registry(&self) -> &PeerRegistry<P> {
        &self.registry
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Request a connection. False if the peer is not admitted or the
    /// service has stopped; otherwise the outcome arrives as broadcasts.
    pub fn connect(&self, peer: PeerAddress) -> bool {
        tracing::info!(profile = self.name(), peer = %peer, "connect requested");
        if !admits(&*self.profile, &self.policy, &peer) {
            return false;
        }
        if self.queue.is_closed() {
            tracing::warn!(error = %EngineError::Stopped(self.name()), "connect dropped");
            return false;
        }
        self.registry.lock().get_or_create(peer);
        self.enqueue(ServiceEvent::Connect(peer))
    }

    /// False for peers without a machine: there is nothing to disconnect.
    pub fn disconnect(&self, peer: PeerAddress) -> bool {
        tracing::info!(profile = self.name(), peer = %peer, "disconnect requested");
        if self.registry.lock().get(&peer).is_none() {
            tracing::debug!(error = %EngineError::UnknownPeer(peer), "disconnect ignored");
            return false;
        }
        self.enqueue(ServiceEvent::Disconnect(peer))
    }

    /// Persist the rule. Allowed connects, Forbidden disconnects.
    pub fn set_connection_policy(&self, peer: PeerAddress, policy: ConnectionPolicy) -> bool {
        self.policy.set(self.name(), peer, policy);
        match policy {
            ConnectionPolicy::Allowed => {
                self.connect(peer);
            }
            ConnectionPolicy::Forbidden => {
                self.disconnect(peer);
            }
            ConnectionPolicy::Unknown => {}
        }
        true
    }

    pub fn handle_bond_state_changed(&self, peer: PeerAddress, state: BondState) {
        self.enqueue(ServiceEvent::BondStateChanged(peer, state));
    }

    fn enqueue(&self, event: ServiceEvent) -> bool {
        if self.queue.send(event).is_err() {
            tracing::warn!(error = %EngineError::Stopped(self.name()), "event dropped");
            return false;
        }
        true
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn connection_state(&self, peer: &PeerAddress) -> ConnectionState {
        self.registry.connection_state(peer)
    }

    pub fn connected_devices(&self) -> Vec<PeerAddress> {
        self.registry.connected()
    }

    pub fn devices_matching_states(&self, states: &[ConnectionState]) -> Vec<PeerAddress> {
        self.registry.matching_states(states)
    }

    pub fn devices(&self) -> Vec<(PeerAddress, ConnectionState)> {
        self.registry.devices()
    }

    pub fn connection_policy(&self, peer: &PeerAddress) -> ConnectionPolicy {
        self.policy.get(self.name(), peer)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn native_sink(&self) -> NativeEventSink {
        NativeEventSink::new(self.name(), self.queue.clone())
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}:", self.name());
        {
            let machines = self.registry.lock();
            let _ = writeln!(out, "  state machines: {}", machines.len());
            for machine in machines.iter() {
                let _ = writeln!(
                    out,
                    "    {}  {:?} for {}s  timer: {}  deferred: {}  session: {:?}",
                    machine.peer(),
                    machine.state(),
                    machine.in_state_for().as_secs(),
                    if machine.timer_armed() { "armed" } else { "idle" },
                    machine.deferred_len(),
                    machine.session(),
                );
            }
        }
        let rules = self.policy.list(self.name());
        if !rules.is_empty() {
            let _ = writeln!(out, "  policies:");
            for (peer, policy) in rules {
                let _ = writeln!(out, "    {peer}  {policy:?}");
            }
        }
        out
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Resolves once every event queued before the call has been processed.
    pub async fn settle(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(ServiceEvent::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Force every peer to Disconnected and stop the worker. Waits at most
    /// the configured join timeout, then abandons the worker.
    pub async fn stop(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            tracing::debug!(profile = self.name(), "already stopped");
            return;
        };
        let _ = self.shutdown.send(());
        let abort = handle.abort_handle();
        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => tracing::info!(profile = self.name(), "profile service stopped"),
            Ok(Err(e)) => tracing::warn!(profile = self.name(), error = %e, "worker ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    profile = self.name(),
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "worker did not stop in time, abandoning it"
                );
                abort.abort();
            }
        }
    }
}

impl<P: Profile> Drop for ProfileService<P> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker<P: Profile> {
    profile: Arc<P>,
    gateway: Arc<dyn NativeGateway>,
    policy: PolicyStore,
    registry: Arc<PeerRegistry<P>>,
    timing: EngineConfig,
    /// Kept for timers, which enqueue their own expiry.
    queue: mpsc::UnboundedSender<ServiceEvent>,
    rx: mpsc::UnboundedReceiver<ServiceEvent>,
    changes: broadcast::Sender<StateChange>,
    shutdown: broadcast::Receiver<()>,
}

impl<P: Profile> Worker<P> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.process(event),
                    None => break,
                },
            }
        }
        self.teardown();
    }

    fn env(&self) -> Env<'_, P> {
        Env {
            profile: &*self.profile,
            gateway: &*self.gateway,
            policy: &self.policy,
            timing: &self.timing,
            queue: &self.queue,
            changes: Vec::new(),
        }
    }

    fn process(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::Barrier(done) => {
                let _ = done.send(());
            }
            ServiceEvent::BondStateChanged(peer, state) => self.on_bond_state_changed(peer, state),
            ServiceEvent::Connect(peer) => self.deliver(peer, MachineEvent::Connect, false),
            ServiceEvent::Disconnect(peer) => self.deliver(peer, MachineEvent::Disconnect, false),
            ServiceEvent::TimerFired { peer, generation } => {
                self.deliver(peer, MachineEvent::TimerFired(generation), false)
            }
            ServiceEvent::Native(event) => {
                let create = event.may_create_peer();
                self.deliver(event.peer, MachineEvent::Native(event.kind), create)
            }
        }
    }

    fn deliver(&self, peer: PeerAddress, event: MachineEvent, create: bool) {
        let changes = {
            let mut machines = self.registry.lock();
            let created = create && machines.get(&peer).is_none();
            let machine = if create {
                machines.get_or_create(peer)
            } else {
                match machines.get_mut(&peer) {
                    Some(machine) => machine,
                    None => {
                        tracing::warn!(error = %EngineError::UnknownPeer(peer), event = ?event, "event dropped");
                        return;
                    }
                }
            };

            let mut env = self.env();
            machine.handle(event, &mut env);

            let reached_disconnected = env
                .changes
                .iter()
                .any(|c| c.to == ConnectionState::Disconnected);
            let rejected = created && env.changes.is_empty();
            // Bond state is read now, not at unbond time: the peer may have
            // re-bonded while the link was up.
            let remove = machine.state() == ConnectionState::Disconnected
                && (rejected
                    || (reached_disconnected
                        && self.profile.bond_state(&peer) == BondState::None));
            if remove {
                tracing::debug!(profile = self.profile.name(), peer = %peer, "releasing state machine");
                let _ = machines.remove(&peer);
            }
            env.changes
        };
        self.publish(changes);
    }

    fn on_bond_state_changed(&self, peer: PeerAddress, state: BondState) {
        tracing::debug!(profile = self.profile.name(), peer = %peer, bond = ?state, "bond state changed");
        if state == BondState::None {
            self.registry.lock().handle_unbonded(&peer);
        }
    }

    fn publish(&self, changes: Vec<StateChange>) {
        for change in changes {
            self.profile.on_state_changed(&change);
            // No subscribers is not an error.
            let _ = self.changes.send(change);
        }
    }

    fn teardown(&self) {
        let changes = {
            let mut machines = self.registry.lock();
            let mut env = self.env();
            for machine in machines.iter_mut() {
                machine.shut_down(&mut env);
            }
            let released = machines.drain().len();
            tracing::info!(profile = self.profile.name(), released, "state machines released");
            env.changes
        };
        self.publish(changes);
    }
}
