//! Application map: registrations that follow their callback's liveness.

use crate::*;

use btlink_core::AppUuid;
use btlink_services::{AppMap, AppMapError, ChannelCallback};
use tokio::sync::mpsc;

type Callback = ChannelCallback<StateChange>;

fn callback() -> (Arc<Callback>, mpsc::Receiver<StateChange>) {
    let (tx, rx) = mpsc::channel(16);
    (Arc::new(ChannelCallback::new(tx)), rx)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn test_dead_callback_unregisters_app() {
    let apps: AppMap<Callback> = AppMap::new();
    let (cb, rx) = callback();
    let id = apps.add(AppUuid::random(), Some("scanner"), 1000, cb).unwrap();
    apps.record_start(id);
    apps.add_connection(id, 7, PEER_A);
    assert_eq!(apps.app_by_conn_id(7).map(|app| app.id), Some(id));

    drop(rx);
    wait_until(|| apps.is_empty()).await;

    assert!(apps.get_by_id(id).is_none());
    assert_eq!(apps.app_by_conn_id(7), None);
    let removed = apps.recently_removed();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].name, "scanner");
    assert_eq!(removed[0].starts, 1);
}

#[tokio::test]
async fn test_already_dead_callback_is_not_registered() {
    let apps: AppMap<Callback> = AppMap::new();
    let (cb, rx) = callback();
    drop(rx);

    let err = apps.add(AppUuid::random(), None, 1, cb).unwrap_err();
    assert!(matches!(err, AppMapError::Liveness(_)));
    assert!(apps.is_empty());
}

#[tokio::test]
async fn test_explicit_remove_unlinks() {
    let apps: AppMap<Callback> = AppMap::new();
    let (cb, _rx) = callback();
    let watch = cb.clone();
    let id = apps.add(AppUuid::random(), None, 42, cb).unwrap();
    assert_eq!(watch.watch_count(), 1);

    apps.remove(id);
    assert!(apps.is_empty());
    assert_eq!(watch.watch_count(), 0);
}

#[tokio::test]
async fn test_subscribers_follow_service_changes() {
    let mut s = Scenario::start();
    let apps: AppMap<Callback> = AppMap::new();
    let (cb, mut rx) = callback();
    apps.add(AppUuid::random(), Some("monitor"), 0, cb).unwrap();

    let mut changes = s.service.subscribe();
    let forward = {
        let apps = apps.clone();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                apps.for_each_callback(|_, cb| {
                    cb.notify(change);
                });
            }
        })
    };

    s.connect_a().await;
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.to, ConnectionState::Connecting);
    assert_eq!(second.to, ConnectionState::Connected);

    s.service.stop().await;
    drop(s);
    forward.await.unwrap();
}
