//! Fan-out of state changes to `/api/events` subscribers.

use tokio::sync::broadcast;

use btlink_api::{EventCallback, HostedService};
use btlink_core::StateChange;
use btlink_services::AppMap;

/// Forward every change of one service to all registered subscribers.
///
/// Returns when the service's change channel closes or on shutdown.
pub async fn forward_changes(
    mut changes: broadcast::Receiver<StateChange>,
    apps: AppMap<EventCallback>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            change = changes.recv() => match change {
                Ok(change) => {
                    apps.for_each_callback(|app_id, callback| {
                        if !callback.notify(change) {
                            tracing::debug!(app_id, "subscriber did not take change");
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event fan-out lagged, changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("event fan-out stopped");
}

/// Spawn one fan-out task per service.
pub fn spawn_fan_out(
    services: &[std::sync::Arc<HostedService>],
    apps: &AppMap<EventCallback>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    services
        .iter()
        .map(|service| {
            tokio::spawn(forward_changes(
                service.subscribe(),
                apps.clone(),
                shutdown.subscribe(),
            ))
        })
        .collect()
}
