//! Liveness monitoring for remote callbacks.
//!
//! A registered application hands the engine a callback object. If the
//! process behind it goes away, the engine must learn about it and drop
//! the registration. [`RemoteCallback`] is that capability; the
//! [`ChannelCallback`] implementation treats a dropped receiver as death.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Runs once when the remote dies.
pub type DeathRecipient = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkToken(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LivenessError {
    #[error("remote is already dead")]
    AlreadyDead,
    #[error("no async runtime available to watch the remote")]
    NoRuntime,
}

pub trait RemoteCallback: Send + Sync + 'static {
    fn link_to_death(&self, recipient: DeathRecipient) -> Result<LinkToken, LivenessError>;

    /// Unknown or already-fired tokens are ignored.
    fn unlink_to_death(&self, token: LinkToken);

    fn is_alive(&self) -> bool;
}

/// Callback delivering values over a bounded channel.
pub struct ChannelCallback<T> {
    tx: mpsc::Sender<T>,
    watches: Mutex<HashMap<u64, AbortHandle>>,
    next_token: AtomicU64,
}

impl<T: Send + 'static> ChannelCallback<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx,
            watches: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Non-blocking send. A full queue drops the value: a slow subscriber
    /// must not stall the notifier.
    pub fn notify(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("callback queue full, dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<T: Send + 'static> RemoteCallback for ChannelCallback<T> {
    fn link_to_death(&self, recipient: DeathRecipient) -> Result<LinkToken, LivenessError> {
        if self.tx.is_closed() {
            return Err(LivenessError::AlreadyDead);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LivenessError::NoRuntime)?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let tx = self.tx.clone();
        let task = runtime.spawn(async move {
            tx.closed().await;
            recipient();
        });
        self.watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token, task.abort_handle());
        Ok(LinkToken(token))
    }

    fn unlink_to_death(&self, token: LinkToken) {
        let watch = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token.0);
        if let Some(handle) = watch {
            handle.abort();
        }
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl<T> Drop for ChannelCallback<T> {
    fn drop(&mut self) {
        let watches = self.watches.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in watches.drain() {
            handle.abort();
        }
    }
}
