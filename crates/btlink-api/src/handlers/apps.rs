//! /apps and /events handlers.
//!
//! Every `/events` stream is an application registration. Its callback is a
//! channel whose receiver lives in the response stream, so a client that
//! goes away drops the receiver and the registration is removed by the
//! liveness watch.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use btlink_core::AppUuid;
use btlink_services::{AppInfo, StatsSnapshot};

use super::{ApiState, EventCallback};

/// Changes a subscriber may lag behind before they are dropped for it.
const EVENT_BACKLOG: usize = 64;

// ── GET /apps ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AppsResponse {
    pub apps: Vec<AppInfo>,
    pub recently_removed: Vec<StatsSnapshot>,
}

pub async fn handle_apps(State(state): State<ApiState>) -> Json<AppsResponse> {
    Json(AppsResponse {
        apps: state.apps.apps(),
        recently_removed: state.apps.recently_removed(),
    })
}

// ── GET /events ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EventsQuery {
    pub name: Option<String>,
    /// Caller-chosen uuid; random when absent.
    pub uuid: Option<String>,
}

pub async fn handle_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let uuid = match query.uuid.as_deref() {
        Some(text) => text
            .parse::<AppUuid>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        None => AppUuid::random(),
    };

    let (tx, rx) = mpsc::channel(EVENT_BACKLOG);
    let callback = Arc::new(EventCallback::new(tx));
    let app_id = state
        .apps
        .add(uuid, query.name.as_deref(), 0, callback)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    state.apps.record_start(app_id);
    tracing::info!(app_id, "event stream opened");

    let events = stream::unfold(rx, |mut rx| async move {
        let change = rx.recv().await?;
        let event = Event::default()
            .event("state")
            .json_data(change)
            .unwrap_or_else(|_| Event::default().event("error"));
        Some((Ok(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
