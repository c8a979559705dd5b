//! Application map: local application registrations and their connections.
//!
//! Each registration carries a synthetic id, a caller-chosen uuid, a display
//! name, a liveness-monitored callback and usage statistics. If the remote
//! behind a callback dies, its registration is removed automatically. One
//! mutex covers the apps, the connection table and the removal history.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use serde::Serialize;

use btlink_core::{AppUuid, PeerAddress};

use crate::liveness::{LinkToken, LivenessError, RemoteCallback};
use crate::stats::{AppStats, StatsSnapshot};

/// Removed apps whose statistics stay visible in `dump()`.
pub const RECENT_HISTORY: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AppMapError {
    #[error("uuid {0} is already registered")]
    DuplicateUuid(AppUuid),
    #[error("cannot monitor callback: {0}")]
    Liveness(#[from] LivenessError),
}

pub struct AppContext<C> {
    pub id: u32,
    pub uuid: AppUuid,
    pub name: String,
    pub callback: Arc<C>,
    pub stats: AppStats,
    link: Option<LinkToken>,
}

impl<C> AppContext<C> {
    pub fn info(&self) -> AppInfo {
        AppInfo {
            id: self.id,
            uuid: self.uuid,
            name: self.name.clone(),
            linked: self.link.is_some(),
            stats: self.stats.snapshot(self.id, &self.name),
        }
    }
}

/// Cloned view of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub id: u32,
    pub uuid: AppUuid,
    pub name: String,
    pub linked: bool,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub conn_id: u16,
    pub peer: PeerAddress,
    pub app_id: u32,
    #[serde(skip)]
    pub started_at: Instant,
}

struct AppTable<C> {
    apps: Vec<AppContext<C>>,
    connections: Vec<Connection>,
    recent: VecDeque<StatsSnapshot>,
    next_id: u32,
}

pub struct AppMap<C: RemoteCallback> {
    inner: Arc<Mutex<AppTable<C>>>,
}

impl<C: RemoteCallback> Clone for AppMap<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: RemoteCallback> Default for AppMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RemoteCallback> AppMap<C> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppTable {
                apps: Vec::new(),
                connections: Vec::new(),
                recent: VecDeque::with_capacity(RECENT_HISTORY),
                next_id: 1,
            })),
        }
    }

    fn table(&self) -> MutexGuard<'_, AppTable<C>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Register an app and watch its callback. `name` falls back to
    /// "Unknown App (UID: n)".
    pub fn add(
        &self,
        uuid: AppUuid,
        name: Option<&str>,
        uid: u32,
        callback: Arc<C>,
    ) -> Result<u32, AppMapError> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown App (UID: {uid})"));

        let id = {
            let mut table = self.table();
            if table.apps.iter().any(|app| app.uuid == uuid) {
                return Err(AppMapError::DuplicateUuid(uuid));
            }
            let id = table.next_id;
            table.next_id += 1;
            table.apps.push(AppContext {
                id,
                uuid,
                name: name.clone(),
                callback: callback.clone(),
                stats: AppStats::new(),
                link: None,
            });
            id
        };

        let map = Arc::downgrade(&self.inner);
        let recipient = Box::new(move || on_remote_death(map, uuid));
        match callback.link_to_death(recipient) {
            Ok(token) => {
                let linked = self
                    .table()
                    .apps
                    .iter_mut()
                    .find(|app| app.id == id)
                    .map(|app| app.link = Some(token))
                    .is_some();
                if !linked {
                    // Died and was removed before the token could be stored.
                    callback.unlink_to_death(token);
                }
            }
            Err(e) => {
                tracing::warn!(app_id = id, uuid = %uuid, error = %e, "callback already gone, dropping registration");
                self.table().apps.retain(|app| app.id != id);
                return Err(e.into());
            }
        }

        tracing::info!(app_id = id, uuid = %uuid, name = %name, "app registered");
        Ok(id)
    }

    /// Idempotent. Unlinks the liveness watch, drops the app's connections
    /// and keeps its statistics in the removal history.
    pub fn remove(&self, id: u32) -> bool {
        let removed = {
            let mut table = self.table();
            let Some(pos) = table.apps.iter().position(|app| app.id == id) else {
                tracing::debug!(app_id = id, "remove: no such app");
                return false;
            };
            let app = table.apps.remove(pos);
            table.connections.retain(|c| c.app_id != id);
            if table.recent.len() == RECENT_HISTORY {
                table.recent.pop_front();
            }
            table.recent.push_back(app.stats.snapshot(app.id, &app.name));
            app
        };
        if let Some(token) = removed.link {
            removed.callback.unlink_to_death(token);
        }
        tracing::info!(app_id = id, uuid = %removed.uuid, "app unregistered");
        true
    }

    pub fn remove_by_uuid(&self, uuid: &AppUuid) -> bool {
        let id = self
            .table()
            .apps
            .iter()
            .find(|app| app.uuid == *uuid)
            .map(|app| app.id);
        match id {
            Some(id) => self.remove(id),
            None => {
                tracing::debug!(uuid = %uuid, "remove: no such app");
                false
            }
        }
    }

    /// Unregister everything, unlinking each callback.
    pub fn clear(&self) {
        let ids = self.ids();
        for id in ids {
            self.remove(id);
        }
    }

    /// Move an app to a new id, e.g. once the controller assigns one in
    /// place of the registration id. Refused if `new_id` is taken.
    pub fn rekey(&self, old_id: u32, new_id: u32) -> bool {
        let mut table = self.table();
        if old_id != new_id && table.apps.iter().any(|app| app.id == new_id) {
            tracing::error!(old_id, new_id, "rekey refused: id in use");
            return false;
        }
        let Some(app) = table.apps.iter_mut().find(|app| app.id == old_id) else {
            tracing::debug!(app_id = old_id, "rekey: no such app");
            return false;
        };
        app.id = new_id;
        for conn in table.connections.iter_mut().filter(|c| c.app_id == old_id) {
            conn.app_id = new_id;
        }
        if new_id >= table.next_id {
            table.next_id = new_id.saturating_add(1);
        }
        true
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    pub fn get_by_id(&self, id: u32) -> Option<AppInfo> {
        self.find(|app| app.id == id)
    }

    pub fn get_by_uuid(&self, uuid: &AppUuid) -> Option<AppInfo> {
        self.find(|app| app.uuid == *uuid)
    }

    pub fn get_by_name(&self, name: &str) -> Option<AppInfo> {
        self.find(|app| app.name == name)
    }

    pub fn find(&self, pred: impl Fn(&AppContext<C>) -> bool) -> Option<AppInfo> {
        self.table().apps.iter().find(|app| pred(app)).map(AppContext::info)
    }

    /// Run `f` on the app with `id` while the map is locked.
    pub fn with_app<R>(&self, id: u32, f: impl FnOnce(&mut AppContext<C>) -> R) -> Option<R> {
        self.table().apps.iter_mut().find(|app| app.id == id).map(f)
    }

    pub fn callback(&self, id: u32) -> Option<Arc<C>> {
        self.with_app(id, |app| app.callback.clone())
    }

    pub fn ids(&self) -> Vec<u32> {
        self.table().apps.iter().map(|app| app.id).collect()
    }

    pub fn apps(&self) -> Vec<AppInfo> {
        self.table().apps.iter().map(AppContext::info).collect()
    }

    pub fn len(&self) -> usize {
        self.table().apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` for every registered callback, outside the lock.
    pub fn for_each_callback(&self, mut f: impl FnMut(u32, &C)) {
        let callbacks: Vec<(u32, Arc<C>)> = self
            .table()
            .apps
            .iter()
            .map(|app| (app.id, app.callback.clone()))
            .collect();
        for (id, callback) in callbacks {
            f(id, &callback);
        }
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    pub fn record_start(&self, id: u32) -> bool {
        self.with_app(id, |app| app.stats.record_start()).is_some()
    }

    pub fn record_stop(&self, id: u32) -> bool {
        self.with_app(id, |app| app.stats.record_stop()).is_some()
    }

    pub fn stats(&self, id: u32) -> Option<StatsSnapshot> {
        self.with_app(id, |app| app.stats.snapshot(app.id, &app.name))
    }

    pub fn recently_removed(&self) -> Vec<StatsSnapshot> {
        self.table().recent.iter().cloned().collect()
    }

    // ── Connections ───────────────────────────────────────────────────────────

    /// Ignored (false) for unknown apps.
    pub fn add_connection(&self, app_id: u32, conn_id: u16, peer: PeerAddress) -> bool {
        let mut table = self.table();
        if !table.apps.iter().any(|app| app.id == app_id) {
            tracing::debug!(app_id, conn_id, "connection for unknown app ignored");
            return false;
        }
        table.connections.push(Connection {
            conn_id,
            peer,
            app_id,
            started_at: Instant::now(),
        });
        true
    }

    pub fn remove_connection(&self, app_id: u32, conn_id: u16) -> bool {
        let mut table = self.table();
        let before = table.connections.len();
        table
            .connections
            .retain(|c| !(c.app_id == app_id && c.conn_id == conn_id));
        table.connections.len() != before
    }

    pub fn app_by_conn_id(&self, conn_id: u16) -> Option<AppInfo> {
        let table = self.table();
        let app_id = table
            .connections
            .iter()
            .find(|c| c.conn_id == conn_id)?
            .app_id;
        table.apps.iter().find(|app| app.id == app_id).map(AppContext::info)
    }

    pub fn conn_id_by_peer(&self, app_id: u32, peer: &PeerAddress) -> Option<u16> {
        self.table()
            .connections
            .iter()
            .find(|c| c.app_id == app_id && c.peer == *peer)
            .map(|c| c.conn_id)
    }

    pub fn peer_by_conn_id(&self, conn_id: u16) -> Option<PeerAddress> {
        self.table()
            .connections
            .iter()
            .find(|c| c.conn_id == conn_id)
            .map(|c| c.peer)
    }

    pub fn connections_by_app(&self, app_id: u32) -> Vec<Connection> {
        self.table()
            .connections
            .iter()
            .filter(|c| c.app_id == app_id)
            .copied()
            .collect()
    }

    /// conn id → peer for every open connection.
    pub fn connected_map(&self) -> Vec<(u16, PeerAddress)> {
        self.table()
            .connections
            .iter()
            .map(|c| (c.conn_id, c.peer))
            .collect()
    }

    // ── Dump ──────────────────────────────────────────────────────────────────

    pub fn dump(&self) -> String {
        let table = self.table();
        let mut out = String::new();
        let _ = writeln!(out, "  Entries: {}", table.apps.len());
        for app in &table.apps {
            let _ = writeln!(
                out,
                "  {} uuid: {}{}",
                app.stats.snapshot(app.id, &app.name),
                app.uuid,
                if app.link.is_some() { "" } else { " (unlinked)" }
            );
            for conn in table.connections.iter().filter(|c| c.app_id == app.id) {
                let _ = writeln!(
                    out,
                    "    conn_id: {} peer: {} for {}s",
                    conn.conn_id,
                    conn.peer,
                    conn.started_at.elapsed().as_secs()
                );
            }
        }
        if !table.recent.is_empty() {
            let _ = writeln!(out, "  last {} removed:", table.recent.len());
            for snapshot in &table.recent {
                let _ = writeln!(out, "    {snapshot}");
            }
        }
        out
    }
}

/// Keyed by uuid: the id may change through `rekey`.
fn on_remote_death<C: RemoteCallback>(map: Weak<Mutex<AppTable<C>>>, uuid: AppUuid) {
    let Some(inner) = map.upgrade() else {
        return;
    };
    tracing::info!(uuid = %uuid, "remote died, removing registration");
    AppMap { inner }.remove_by_uuid(&uuid);
}
