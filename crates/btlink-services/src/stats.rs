//! Per-application usage statistics.

use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct AppStats {
    registered_at: Instant,
    last_activity: Instant,
    starts: u32,
    stops: u32,
    active_since: Option<Instant>,
    active_total: Duration,
}

/// Point-in-time copy for dumps and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub app_id: u32,
    pub name: String,
    pub starts: u32,
    pub stops: u32,
    pub active: bool,
    pub active_ms: u64,
    pub registered_secs: u64,
    pub idle_secs: u64,
}

impl Default for AppStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            registered_at: now,
            last_activity: now,
            starts: 0,
            stops: 0,
            active_since: None,
            active_total: Duration::ZERO,
        }
    }

    /// A start while already active counts but does not restart the clock.
    pub fn record_start(&mut self) {
        let now = Instant::now();
        self.starts += 1;
        self.last_activity = now;
        self.active_since.get_or_insert(now);
    }

    pub fn record_stop(&mut self) {
        let now = Instant::now();
        self.stops += 1;
        self.last_activity = now;
        if let Some(since) = self.active_since.take() {
            self.active_total += now.duration_since(since);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }

    /// Accumulated active time including the running interval.
    pub fn active_duration(&self) -> Duration {
        self.active_total
            + self
                .active_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }

    pub fn snapshot(&self, app_id: u32, name: &str) -> StatsSnapshot {
        StatsSnapshot {
            app_id,
            name: name.to_string(),
            starts: self.starts,
            stops: self.stops,
            active: self.is_active(),
            active_ms: self.active_duration().as_millis() as u64,
            registered_secs: self.registered_at.elapsed().as_secs(),
            idle_secs: self.last_activity.elapsed().as_secs(),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "app_id: {} | {} | starts: {} | stops: {} | active: {} ({} ms)",
            self.app_id, self.name, self.starts, self.stops, self.active, self.active_ms
        )
    }
}
