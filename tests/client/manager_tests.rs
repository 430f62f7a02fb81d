//! Connection Manager Tests

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

use sync_gateway::client::{ClientConfig, ClientEvent, ConnectionManager, InboundKind, SendOutcome};
use sync_gateway::domain::value_objects::{ConnectionState, FailureReason};
use sync_gateway::shared::protocol::{Envelope, MessageType};

use crate::common::{collector, next_peer, recv_within, wait_for_state, MockConnector, MockPeer};

const ENDPOINT: &str = "ws://gateway.test/ws";

fn config() -> ClientConfig {
    ClientConfig::default().with_jitter(Duration::ZERO)
}

/// Connect and complete the handshake on the first peer.
async fn connected(
    manager: &ConnectionManager,
    peers: &mut tokio::sync::mpsc::UnboundedReceiver<MockPeer>,
) -> MockPeer {
    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(ENDPOINT, "secret-token").await }
    });

    let mut peer = next_peer(peers).await;
    assert_eq!(
        peer.recv_json().await,
        json!({"type": "AUTH", "payload": {"token": "secret-token"}})
    );
    peer.push(json!({"type": "AUTH_SUCCESS"}));

    assert!(connecting.await.unwrap().unwrap());
    assert_eq!(manager.state(), ConnectionState::Connected);
    peer
}

#[tokio::test(start_paused = true)]
async fn test_queued_messages_flush_in_order_after_auth() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector);

    for n in 1..=3 {
        let outcome = manager
            .send(&Envelope::new(MessageType::GameAction, json!({"n": n})))
            .unwrap();
        assert_eq!(outcome, SendOutcome::Queued);
    }
    assert_eq!(manager.pending_len(), 3);

    let mut peer = connected(&manager, &mut peers).await;

    for n in 1..=3 {
        assert_eq!(
            peer.recv_json().await,
            json!({"type": "GAME_ACTION", "payload": {"n": n}})
        );
    }
    assert_eq!(manager.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_connected_writes_exact_frame() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector);
    let mut peer = connected(&manager, &mut peers).await;

    let outcome = manager
        .send(&Envelope::new(MessageType::GameAction, json!({"a": 1})))
        .unwrap();

    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(peer.recv_text().await, r#"{"type":"GAME_ACTION","payload":{"a":1}}"#);
}

#[tokio::test(start_paused = true)]
async fn test_auth_timeout_is_terminal() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(ENDPOINT, "slow").await }
    });
    let mut peer = next_peer(&mut peers).await;
    peer.recv_json().await;

    let started = Instant::now();
    assert!(!connecting.await.unwrap().unwrap());
    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert_eq!(
        manager.state(),
        ConnectionState::Error {
            reason: FailureReason::AuthTimeout
        }
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.opens(), 1);
    assert!(peer.is_dropped().await);
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_is_not_retried() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(ENDPOINT, "bad").await }
    });
    let mut peer = next_peer(&mut peers).await;
    peer.recv_json().await;
    peer.push(json!({"type": "AUTH_ERROR", "payload": {"reason": "invalid_token"}}));

    assert!(!connecting.await.unwrap().unwrap());
    assert_eq!(
        manager.state(),
        ConnectionState::Error {
            reason: FailureReason::AuthRejected("invalid_token".into())
        }
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_max_reconnect_attempts_notifies_once() {
    let connector = MockConnector::refusing();
    let config = config()
        .with_base_delay(Duration::from_millis(10))
        .with_max_reconnect_attempts(2);
    let manager = ConnectionManager::with_connector(config, connector.clone());
    let mut events = manager.subscribe();

    assert!(!manager.connect(ENDPOINT, "token").await.unwrap());
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Initial attempt plus two retries
    assert_eq!(connector.opens(), 3);
    assert_eq!(
        manager.state(),
        ConnectionState::Error {
            reason: FailureReason::MaxReconnectAttempts
        }
    );

    let mut exhausted = 0;
    let mut reconnecting = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::MaxReconnectAttempts { attempts } => {
                assert_eq!(attempts, 2);
                exhausted += 1;
            }
            ClientEvent::StateChanged(ConnectionState::Reconnecting { attempt, max_attempts }) => {
                assert_eq!(max_attempts, 2);
                reconnecting.push(attempt);
            }
            _ => {}
        }
    }
    assert_eq!(exhausted, 1);
    assert_eq!(reconnecting, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_attempts() {
    let connector = MockConnector::refusing();
    let config = config()
        .with_base_delay(Duration::from_millis(100))
        .with_max_reconnect_attempts(3);
    let manager = ConnectionManager::with_connector(config, connector.clone());
    let mut state = manager.watch_state();

    let started = Instant::now();
    manager.connect(ENDPOINT, "token").await.unwrap();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Error { .. })).await;

    // 100 + 200 + 400 ms of backoff before the budget ran out
    assert!(started.elapsed() >= Duration::from_millis(700));
    assert_eq!(connector.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_transport_loss_reconnects_and_resets_budget() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let mut state = manager.watch_state();
    let peer = connected(&manager, &mut peers).await;

    peer.close();
    let reconnecting =
        wait_for_state(&mut state, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    assert_eq!(
        reconnecting,
        ConnectionState::Reconnecting {
            attempt: 1,
            max_attempts: 5
        }
    );

    // Messages sent while offline wait for the next handshake
    assert_eq!(
        manager
            .send(&Envelope::new(MessageType::TeamAction, json!({"teamId": "red"})))
            .unwrap(),
        SendOutcome::Queued
    );

    let mut second = next_peer(&mut peers).await;
    assert_eq!(second.recv_json().await["type"], "AUTH");
    second.push(json!({"type": "AUTH_SUCCESS"}));

    assert_eq!(second.recv_json().await["type"], "TEAM_ACTION");
    wait_for_state(&mut state, ConnectionState::is_connected).await;
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_force_reconnect() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let (handler, mut errors) = collector();
    manager.on(InboundKind::SysError, handler);
    let peer = connected(&manager, &mut peers).await;

    peer.push(json!({"type": "SYS_ERROR", "payload": {"message": "one"}}));
    peer.push(json!({"type": "ERROR", "payload": {"message": "two"}}));
    assert_eq!(recv_within(&mut errors, 5).await["message"], "one");
    assert_eq!(recv_within(&mut errors, 5).await["message"], "two");
    assert_eq!(manager.server_error_count(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);

    peer.push(json!({"type": "SYS_ERROR", "payload": {"message": "three"}}));
    assert_eq!(recv_within(&mut errors, 5).await["message"], "three");

    let mut second = next_peer(&mut peers).await;
    second.recv_json().await;
    second.push(json!({"type": "AUTH_SUCCESS"}));

    let mut state = manager.watch_state();
    wait_for_state(&mut state, ConnectionState::is_connected).await;
    assert_eq!(manager.server_error_count(), 0);
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_count_decays() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let (handler, mut errors) = collector();
    manager.on(InboundKind::SysError, handler);
    let peer = connected(&manager, &mut peers).await;

    peer.push(json!({"type": "SYS_ERROR", "payload": {"message": "one"}}));
    peer.push(json!({"type": "SYS_ERROR", "payload": {"message": "two"}}));
    recv_within(&mut errors, 5).await;
    recv_within(&mut errors, 5).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(manager.server_error_count(), 0);

    peer.push(json!({"type": "SYS_ERROR", "payload": {"message": "three"}}));
    recv_within(&mut errors, 5).await;
    assert_eq!(manager.server_error_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_are_answered() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector);
    let (handler, mut beats) = collector();
    manager.on(InboundKind::Heartbeat, handler);
    let mut peer = connected(&manager, &mut peers).await;

    peer.push(json!({"type": "HEARTBEAT"}));
    assert_eq!(peer.recv_json().await, json!({"type": "HEARTBEAT_ACK"}));
    recv_within(&mut beats, 5).await;

    peer.push(json!({"type": "SYS_PING"}));
    assert_eq!(peer.recv_json().await, json!({"type": "SYS_PONG"}));
}

#[tokio::test(start_paused = true)]
async fn test_updates_reach_handlers_including_aliases() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector);
    let (game, mut game_rx) = collector();
    let (rooms, mut room_rx) = collector();
    manager.on(InboundKind::GameStateUpdate, game);
    manager.on(InboundKind::RoomUpdate, rooms);
    let peer = connected(&manager, &mut peers).await;

    peer.push(json!({"type": "GAME_STATE_UPDATE", "payload": {"turn": 1}}));
    peer.push(json!({"type": "GAME_STATE", "payload": {"turn": 2}}));
    peer.push_raw("{not json");
    peer.push(json!({"type": "UNHEARD_OF"}));
    peer.push(json!({"type": "ROOM_UPDATE", "payload": {"action": "JOIN", "roomId": "lobby", "userId": "bob"}}));

    assert_eq!(recv_within(&mut game_rx, 5).await, json!({"turn": 1}));
    assert_eq!(recv_within(&mut game_rx, 5).await, json!({"turn": 2}));
    assert_eq!(recv_within(&mut room_rx, 5).await["userId"], "bob");
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_request_honors_delay() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let mut peer = connected(&manager, &mut peers).await;

    let requested = Instant::now();
    peer.push(json!({"type": "RECONNECT_REQUEST", "payload": {"delay": 2500}}));
    assert!(peer.is_dropped().await);

    let mut second = next_peer(&mut peers).await;
    assert!(requested.elapsed() >= Duration::from_millis(2500));
    assert_eq!(second.recv_json().await["type"], "AUTH");
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_cancels_everything() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let (handler, mut updates) = collector();
    manager.on(InboundKind::TeamUpdate, handler);
    let mut peer = connected(&manager, &mut peers).await;

    peer.close();
    let mut state = manager.watch_state();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    manager
        .send(&Envelope::bare(MessageType::HeartbeatAck))
        .unwrap();

    manager.cleanup();
    manager.cleanup();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.pending_len(), 0);
    assert!(peer.is_dropped().await);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.opens(), 1);
    assert!(updates.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_previous_socket() {
    let (connector, mut peers) = MockConnector::new();
    let manager = ConnectionManager::with_connector(config(), connector.clone());
    let mut first = connected(&manager, &mut peers).await;

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(ENDPOINT, "second-token").await }
    });
    let mut second = next_peer(&mut peers).await;
    assert!(first.is_dropped().await);

    // Late frames on the superseded link change nothing
    first.push(json!({"type": "AUTH_ERROR", "payload": {"reason": "stale"}}));
    assert_eq!(
        second.recv_json().await,
        json!({"type": "AUTH", "payload": {"token": "second-token"}})
    );
    second.push(json!({"type": "AUTH_SUCCESS"}));

    assert!(connecting.await.unwrap().unwrap());
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(connector.opens(), 2);
}
