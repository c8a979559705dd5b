//! Locally initiated connects and disconnects.

use crate::*;

use btlink_core::ConnectionPolicy;

#[tokio::test]
async fn test_unknown_peer_reads_disconnected() {
    let mut s = Scenario::start();
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Disconnected);
    assert!(s.service.connected_devices().is_empty());
    assert!(s.service.devices().is_empty());
    assert!(s.service.devices_matching_states(&[ConnectionState::Disconnected]).is_empty());
    s.expect_quiet().await;
}

#[tokio::test]
async fn test_connect_then_disconnect() {
    let mut s = Scenario::start();
    s.connect_a().await;
    assert_eq!(s.service.connected_devices(), vec![PEER_A]);

    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    s.expect_quiet().await;

    assert_eq!(s.controller.calls(Call::Connect), 1);
    assert_eq!(s.controller.calls(Call::Disconnect), 1);
    assert_eq!(s.profile.observed.lock().unwrap().len(), 4);
    assert_eq!(
        s.profile.disconnected_logs.lock().unwrap().as_slice(),
        &[(PEER_A, 1, 0)]
    );
    // Still bonded, so the machine stays.
    assert_eq!(s.service.devices(), vec![(PEER_A, ConnectionState::Disconnected)]);
}

#[tokio::test]
async fn test_forbidden_policy_has_no_side_effects() {
    let policy = PolicyStore::new();
    policy.set("scenario", PEER_A, ConnectionPolicy::Forbidden);
    let mut s = Scenario::with(fast_engine(), policy);

    assert!(!s.service.connect(PEER_A));
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Connect), 0);
    assert!(s.service.registry().is_empty());
    assert_eq!(s.service.connection_policy(&PEER_A), ConnectionPolicy::Forbidden);
}

#[tokio::test]
async fn test_unbonded_peer_is_refused() {
    let mut s = Scenario::start();
    assert!(!s.service.connect(PEER_B));
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Connect), 0);
    assert!(s.service.registry().is_empty());
}

#[tokio::test]
async fn test_profile_veto_refuses_connect() {
    let mut s = Scenario::start();
    s.profile.set_veto(true);
    assert!(!s.service.connect(PEER_A));
    s.expect_quiet().await;

    s.profile.set_veto(false);
    s.connect_a().await;
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let mut s = Scenario::start();
    s.controller.set_auto_answer(false);

    assert!(s.service.connect(PEER_A));
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    s.expect(PEER_A, ConnectionState::Connecting, ConnectionState::Disconnected).await;
    s.expect_quiet().await;

    assert_eq!(s.controller.calls(Call::Connect), 1);
    assert_eq!(s.controller.calls(Call::Disconnect), 1);
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_answer_before_timeout_cancels_it() {
    let mut s = Scenario::start();
    s.controller.set_auto_answer(false);

    assert!(s.service.connect(PEER_A));
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    s.controller.report(PEER_A, NativeConnectionState::Connected);
    s.expect(PEER_A, ConnectionState::Connecting, ConnectionState::Connected).await;

    // Outlive the connect timeout: nothing more may happen.
    tokio::time::sleep(fast_engine().connect_timeout() * 2).await;
    s.expect_quiet().await;
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Connected);
    assert_eq!(s.controller.calls(Call::Disconnect), 0);
}

#[tokio::test]
async fn test_failed_connect_request_stays_disconnected() {
    let mut s = Scenario::start();
    s.controller.set_broken(true);

    assert!(s.service.connect(PEER_A));
    s.expect_quiet().await;
    assert_eq!(s.service.connection_state(&PEER_A), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_failed_disconnect_request_reverts_to_disconnected() {
    let mut s = Scenario::start();
    s.connect_a().await;
    s.controller.set_broken(true);

    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnected).await;
    s.expect_quiet().await;
}

#[tokio::test]
async fn test_repeated_connect_is_ignored() {
    let mut s = Scenario::start();
    s.connect_a().await;

    assert!(s.service.connect(PEER_A));
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Connect), 1);
}

#[tokio::test]
async fn test_disconnect_unknown_peer_returns_false() {
    let mut s = Scenario::start();
    assert!(!s.service.disconnect(PEER_B));
    s.expect_quiet().await;
    assert_eq!(s.controller.calls(Call::Disconnect), 0);
}

#[tokio::test]
async fn test_unanswered_disconnect_is_forced() {
    let mut s = Scenario::start();
    s.connect_a().await;
    s.controller.set_auto_answer(false);

    assert!(s.service.disconnect(PEER_A));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    s.expect_quiet().await;
}

#[tokio::test]
async fn test_policy_change_drives_connection() {
    let mut s = Scenario::start();

    assert!(s.service.set_connection_policy(PEER_A, ConnectionPolicy::Allowed));
    s.expect(PEER_A, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    s.expect(PEER_A, ConnectionState::Connecting, ConnectionState::Connected).await;

    assert!(s.service.set_connection_policy(PEER_A, ConnectionPolicy::Forbidden));
    s.expect(PEER_A, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_A, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    assert_eq!(s.service.connection_policy(&PEER_A), ConnectionPolicy::Forbidden);

    // Forbidden now blocks a plain connect too.
    assert!(!s.service.connect(PEER_A));
    s.expect_quiet().await;
}

#[tokio::test]
async fn test_two_peers_are_independent() {
    let mut s = Scenario::start();
    s.profile.bond(PEER_B);
    s.connect_a().await;

    assert!(s.service.connect(PEER_B));
    s.expect(PEER_B, ConnectionState::Disconnected, ConnectionState::Connecting).await;
    s.expect(PEER_B, ConnectionState::Connecting, ConnectionState::Connected).await;

    let mut connected = s.service.connected_devices();
    connected.sort();
    assert_eq!(connected, vec![PEER_A, PEER_B]);

    assert!(s.service.disconnect(PEER_B));
    s.expect(PEER_B, ConnectionState::Connected, ConnectionState::Disconnecting).await;
    s.expect(PEER_B, ConnectionState::Disconnecting, ConnectionState::Disconnected).await;
    assert_eq!(s.service.connected_devices(), vec![PEER_A]);
}
