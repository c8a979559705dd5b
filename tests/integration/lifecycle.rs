//! Registry lifetime, bond loss, deferred requests and service shutdown.

use std::time::Instant;

use crate::*;

use btlink_core::BondState;
use btlink_services::EngineError;

#[tokio::test]
async fn test_remove_refused_unless_disconnected() {
    let mut s = Scenario::start();
    s.connect_a().await;

    let err = s.service.registry().lock().remove(&PEER_A).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvariantViolation {
            state: ConnectionState::Connected,
            ..
        }
    ));
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Connected);

    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    assert!(s.service.registry().lock().remove(&PEER_A).is_ok());
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_unbond_while_disconnected_removes_machine() {
    let mut s = Scenario::start();
    s.connect_a().await;
    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    assert_eq!(s.service.registry().len(), 1);

    s.profile.unbond(PEER_A);
    s.service.handle_bond_state_changed(PEER_A, BondState::None);
    s.expect_quiet().await;
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_unbond_while_connected_removes_after_disconnect() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.profile.unbond(PEER_A);
    s.service.handle_bond_state_changed(PEER_A, BondState::None);
    s.service.settle().await;
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Connected);

    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;
    s.service.settle().await;
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_rebond_while_connected_keeps_machine() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.profile.unbond(PEER_A);
    s.service.handle_bond_state_changed(PEER_A, BondState::None);
    s.profile.bond(PEER_A);
    s.service.handle_bond_state_changed(PEER_A, BondState::Bonded);
    s.service.settle().await;

    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;
    s.service.settle().await;
    assert_eq!(s.service.devices(), vec![(PEER_A, ConnectionState::Disconnected)]);
}

#[tokio::test]
async fn test_bonding_state_change_keeps_machine() {
    let mut s = Scenario::start();
    s.connect_a().await;
    s.service.handle_bond_state_changed(PEER_A, BondState::Bonding);
    s.expect_quiet().await;
    assert_eq!(s.service.registry().len(), 1);
}

#[tokio::test]
async fn test_connect_during_disconnecting_is_deferred() {
    let mut s = Scenario::start();
    s.controller.set_auto_answer(false);

    assert!(s.service.connect(PEER_A));
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    s.controller.report(PEER_A, NativeConnectionState::Connected);
    s.expect(PEER_A, ConnectionState::Connecting, ConnectionState::Connected).await;

    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;

    assert!(s.service.connect(PEER_A));
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Connect), 1);

    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    assert_eq!(s.controller.calls(Call::Connect), 2);
}

#[tokio::test]
async fn test_stop_forces_disconnected() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.service.stop().await;
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;

    assert!(!s.service.is_running());
    assert!(s.service.registry().is_empty());
    assert!(!s.service.connect(PEER_A));

    // Second stop is a no-op.
    s.service.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_bounded_when_worker_hangs() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.profile.stall_for(Duration::from_millis(1500));
    assert!(s.service.disconnect(PEER_A));
    // Give the worker time to enter the stalled hook.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    s.service.stop().await;
    let waited = started.elapsed();
    assert!(
        waited < Duration::from_millis(1200),
        "stop waited {waited:?}"
    );
}

#[tokio::test]
async fn test_sink_reports_stopped_service() {
    let s = Scenario::start();
    let sink = s.service.native_sink();
    s.service.stop().await;
    assert!(!sink.on_connection_state_changed(PEER_A, NativeConnectionState::Connected));
}

#[tokio::test]
async fn test_dump_lists_machines_and_policies() {
    let mut s = Scenario::start();
    s.connect_a().await;
    s.service
        .set_connection_policy(PEER_B, btlink_core::ConnectionPolicy::Forbidden);
    s.service.settle().await;

    let dump = s.service.dump();
    assert!(dump.starts_with("scenario:"));
    assert!(dump.contains("state machines: 1"));
    assert!(dump.contains(&PEER_A.to_string()));
    assert!(dump.contains("Connected"));
    assert!(dump.contains("Forbidden"));
}
