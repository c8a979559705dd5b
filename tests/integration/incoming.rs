//! Remote-initiated connections and link events reported by the controller.

use crate::*;

#[tokio::test]
async fn test_incoming_from_bonded_peer_is_accepted() {
    let mut s = Scenario::start();

    s.controller.report(PEER_A, NativeConnectionState::Connecting);
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Incoming).await;
    assert_eq!(
        s.service.devices_matching_states(&[ConnectionState::Incoming]),
        vec![PEER_A]
    );

    s.controller.report(PEER_A, NativeConnectionState::Connected);
    s.expect(PEER_A, ConnectionState::Incoming, ConnectionState::Connected).await;
    s.expect_quiet().await;

    assert_eq!(s.service.connected_devices(), vec![PEER_A]);
    assert_eq!(s.controller.calls(Call::Connect), 0);
}

#[tokio::test]
async fn test_incoming_from_unbonded_peer_is_rejected() {
    let mut s = Scenario::start();

    s.controller.report(PEER_B, NativeConnectionState::Connecting);
    s.expect_quiet().await;

    assert_eq!(s.controller.calls(Call::Disconnect), 1);
    assert_eq!(s.service.connection_state(&PEER_B), ConnectionState::Disconnected);
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_incoming_that_never_completes_times_out() {
    let mut s = Scenario::start();
    s.controller.set_auto_answer(false);

    s.controller.report(PEER_A, NativeConnectionState::Connecting);
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Incoming).await;
    s.expect(PEER_A, ConnectionState::Incoming, ConnectionState::Disconnected).await;
    assert_eq!(s.controller.calls(Call::Disconnect), 1);
}

#[tokio::test]
async fn test_direct_connected_report_skips_incoming() {
    let mut s = Scenario::start();

    s.controller.report(PEER_A, NativeConnectionState::Connected);
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connected).await;
    s.expect_quiet().await;
}

#[tokio::test]
async fn test_events_for_unknown_peer_are_dropped() {
    let mut s = Scenario::start();

    s.controller.report(PEER_B, NativeConnectionState::Disconnected);
    s.controller.report_data(PEER_B, b"\x01");
    s.expect_quiet().await;
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_remote_drop_disconnects() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Disconnect), 0);
}

#[tokio::test]
async fn test_remote_disconnecting_then_gone() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.controller.report(PEER_A, NativeConnectionState::Disconnecting);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn test_data_reaches_session_only_while_connected() {
    let mut s = Scenario::start();
    s.connect_a().await;

    s.controller.report_data(PEER_A, b"\x10\x20");
    s.controller.report_data(PEER_A, b"\x30");
    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;

    // Dropped: the machine is Disconnected.
    s.controller.report_data(PEER_A, b"\x40");
    s.expect_quiet().await;

    assert_eq!(
        s.profile.disconnected_logs.lock().unwrap().as_slice(),
        &[(PEER_A, 1, 2)]
    );

    // The session is fresh for the next link.
    s.connect_a().await;
    s.controller.report(PEER_A, NativeConnectionState::Disconnected);
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;
    assert_eq!(
        s.profile.disconnected_logs.lock().unwrap().last(),
        Some(&(PEER_A, 1, 0))
    );
}
