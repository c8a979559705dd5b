//! Per-peer connection state machine.
//!
//! One machine per (profile, peer). It is driven only from the owning
//! service's worker, so transitions for a peer are strictly sequential.
//! Side effects are native requests, timers and the list of state changes
//! collected in [`Env`], which the worker broadcasts after releasing the
//! registry lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use btlink_core::config::EngineConfig;
use btlink_core::{ConnectionState, NativeConnectionState, PeerAddress, StateChange};

use crate::error::EngineError;
use crate::event::{MachineEvent, ServiceEvent};
use crate::gateway::{NativeEventKind, NativeGateway};
use crate::policy::PolicyStore;
use crate::profile::{admits, Profile};

/// Everything a transition may touch besides the machine itself.
pub(crate) struct Env<'a, P: Profile> {
    pub profile: &'a P,
    pub gateway: &'a dyn NativeGateway,
    pub policy: &'a PolicyStore,
    pub timing: &'a EngineConfig,
    pub queue: &'a mpsc::UnboundedSender<ServiceEvent>,
    pub changes: Vec<StateChange>,
}

impl<P: Profile> Env<'_, P> {
    fn admits(&self, peer: &PeerAddress) -> bool {
        admits(self.profile, self.policy, peer)
    }
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug)]
pub struct PeerStateMachine<P: Profile> {
    peer: PeerAddress,
    state: ConnectionState,
    /// Events postponed while Disconnecting.
    deferred: VecDeque<MachineEvent>,
    timer: Option<Timer>,
    next_generation: u64,
    last_change: Instant,
    session: P::Session,
}

impl<P: Profile> PeerStateMachine<P> {
    pub(crate) fn new(peer: PeerAddress) -> Self {
        Self {
            peer,
            state: ConnectionState::Disconnected,
            deferred: VecDeque::new(),
            timer: None,
            next_generation: 0,
            last_change: Instant::now(),
            session: P::Session::default(),
        }
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> &P::Session {
        &self.session
    }

    /// Time spent in the current state.
    pub fn in_state_for(&self) -> Duration {
        self.last_change.elapsed()
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Process one event, then replay deferred events once the machine has
    /// left Disconnecting.
    pub(crate) fn handle(&mut self, event: MachineEvent, env: &mut Env<'_, P>) {
        self.dispatch(event, env);
        while self.state != ConnectionState::Disconnecting {
            let Some(event) = self.deferred.pop_front() else {
                break;
            };
            tracing::debug!(peer = %self.peer, event = ?event, "replaying deferred event");
            self.dispatch(event, env);
        }
    }

    fn dispatch(&mut self, event: MachineEvent, env: &mut Env<'_, P>) {
        use ConnectionState as S;
        use NativeConnectionState as N;

        let native = |kind: &MachineEvent| match kind {
            MachineEvent::Native(NativeEventKind::ConnectionStateChanged(state)) => Some(*state),
            _ => None,
        };

        match (self.state, event) {
            (_, MachineEvent::TimerFired(generation)) => self.on_timer(generation, env),

            (_, MachineEvent::Native(NativeEventKind::Data(payload))) => {
                if self.state == S::Connected {
                    env.profile.on_data(&self.peer, &mut self.session, &payload);
                } else {
                    tracing::debug!(peer = %self.peer, state = ?self.state, len = payload.len(), "dropping data while not connected");
                }
            }

            (S::Disconnected, MachineEvent::Connect) => self.start_outgoing(env),
            (S::Disconnected, event) => match native(&event) {
                Some(N::Connecting) => self.accept_incoming(S::Incoming, env),
                Some(N::Connected) => self.accept_incoming(S::Connected, env),
                _ => tracing::debug!(peer = %self.peer, event = ?event, "ignored while disconnected"),
            },

            (S::Connecting | S::Incoming, MachineEvent::Connect) => {
                tracing::debug!(peer = %self.peer, state = ?self.state, "connect ignored, attempt in progress");
            }
            (S::Connecting | S::Incoming, MachineEvent::Disconnect) => {
                self.cancel_timer();
                self.begin_disconnect(env);
            }
            (S::Connecting | S::Incoming, event) => match native(&event) {
                Some(N::Connected) => {
                    self.cancel_timer();
                    self.transition(S::Connected, env);
                }
                Some(N::Disconnected) => {
                    self.cancel_timer();
                    self.transition(S::Disconnected, env);
                }
                _ => tracing::debug!(peer = %self.peer, state = ?self.state, event = ?event, "ignored while connecting"),
            },

            (S::Connected, MachineEvent::Connect) => {
                tracing::debug!(peer = %self.peer, "already connected");
            }
            (S::Connected, MachineEvent::Disconnect) => self.begin_disconnect(env),
            (S::Connected, event) => match native(&event) {
                Some(N::Disconnecting) => {
                    self.start_timer(env.timing.disconnect_timeout(), env);
                    self.transition(S::Disconnecting, env);
                }
                Some(N::Disconnected) => self.transition(S::Disconnected, env),
                _ => tracing::debug!(peer = %self.peer, event = ?event, "ignored while connected"),
            },

            (S::Disconnecting, MachineEvent::Connect) => {
                tracing::debug!(peer = %self.peer, "deferring connect until disconnected");
                self.deferred.push_back(MachineEvent::Connect);
            }
            (S::Disconnecting, event) => match native(&event) {
                Some(N::Disconnected) => {
                    self.cancel_timer();
                    self.transition(S::Disconnected, env);
                }
                Some(N::Connected) => {
                    self.cancel_timer();
                    self.transition(S::Connected, env);
                }
                Some(N::Connecting) => {
                    self.cancel_timer();
                    if env.admits(&self.peer) {
                        self.start_timer(env.timing.connect_timeout(), env);
                        self.transition(S::Incoming, env);
                    } else {
                        self.reject(env);
                        self.transition(S::Disconnected, env);
                    }
                }
                _ => tracing::debug!(peer = %self.peer, event = ?event, "ignored while disconnecting"),
            },
        }
    }

    fn start_outgoing(&mut self, env: &mut Env<'_, P>) {
        if !env.admits(&self.peer) {
            let err = EngineError::PolicyRejected {
                profile: env.profile.name(),
                peer: self.peer,
            };
            tracing::info!(error = %err, "connect not attempted");
            return;
        }
        if let Err(source) = env.gateway.request_connect(&self.peer) {
            let err = EngineError::NativeCallFailed {
                peer: self.peer,
                source,
            };
            tracing::warn!(error = %err, "connect request failed");
            return;
        }
        self.start_timer(env.timing.connect_timeout(), env);
        self.transition(ConnectionState::Connecting, env);
    }

    fn accept_incoming(&mut self, target: ConnectionState, env: &mut Env<'_, P>) {
        if !env.admits(&self.peer) {
            tracing::info!(peer = %self.peer, "rejecting incoming connection");
            self.reject(env);
            return;
        }
        if target == ConnectionState::Incoming {
            self.start_timer(env.timing.connect_timeout(), env);
        }
        self.transition(target, env);
    }

    fn begin_disconnect(&mut self, env: &mut Env<'_, P>) {
        match env.gateway.request_disconnect(&self.peer) {
            Ok(()) => {
                self.start_timer(env.timing.disconnect_timeout(), env);
                self.transition(ConnectionState::Disconnecting, env);
            }
            Err(source) => {
                let err = EngineError::NativeCallFailed {
                    peer: self.peer,
                    source,
                };
                tracing::warn!(error = %err, "disconnect request failed, reverting to disconnected");
                self.transition(ConnectionState::Disconnected, env);
            }
        }
    }

    fn reject(&self, env: &Env<'_, P>) {
        if let Err(e) = env.gateway.request_disconnect(&self.peer) {
            tracing::warn!(peer = %self.peer, error = %e, "failed to reject connection");
        }
    }

    fn on_timer(&mut self, generation: u64, env: &mut Env<'_, P>) {
        match &self.timer {
            Some(timer) if timer.generation == generation => {}
            _ => {
                tracing::debug!(peer = %self.peer, generation, "stale timer ignored");
                return;
            }
        }
        self.timer = None;
        match self.state {
            ConnectionState::Connecting | ConnectionState::Incoming => {
                tracing::warn!(peer = %self.peer, state = ?self.state, "connect timed out");
                self.reject(env);
                self.transition(ConnectionState::Disconnected, env);
            }
            ConnectionState::Disconnecting => {
                tracing::warn!(peer = %self.peer, "disconnect timed out, forcing disconnected");
                self.transition(ConnectionState::Disconnected, env);
            }
            state => tracing::debug!(peer = %self.peer, state = ?state, "timer fired in stable state"),
        }
    }

    /// Service teardown: cancel the timer and force Disconnected.
    pub(crate) fn shut_down(&mut self, env: &mut Env<'_, P>) {
        self.cancel_timer();
        self.deferred.clear();
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Disconnecting => self.transition(ConnectionState::Disconnected, env),
            _ => {
                self.reject(env);
                self.transition(ConnectionState::Disconnected, env);
            }
        }
    }

    fn transition(&mut self, to: ConnectionState, env: &mut Env<'_, P>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.last_change = Instant::now();
        tracing::info!(profile = env.profile.name(), peer = %self.peer, from = ?from, to = ?to, "connection state changed");

        match to {
            ConnectionState::Connected => env.profile.on_connected(&self.peer, &mut self.session),
            ConnectionState::Disconnected => {
                self.cancel_timer();
                env.profile.on_disconnected(&self.peer, &mut self.session);
                self.session = P::Session::default();
            }
            _ => {}
        }

        env.changes.push(StateChange {
            profile: env.profile.name(),
            peer: self.peer,
            from,
            to,
        });
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    fn start_timer(&mut self, after: Duration, env: &Env<'_, P>) {
        self.cancel_timer();
        let generation = self.next_generation;
        self.next_generation += 1;

        let queue = env.queue.clone();
        let peer = self.peer;
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = queue.send(ServiceEvent::TimerFired { peer, generation });
        });
        self.timer = Some(Timer {
            generation,
            handle: task.abort_handle(),
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

impl<P: Profile> Drop for PeerStateMachine<P> {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
