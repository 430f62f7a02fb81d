//! Gateway Session Tests

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use sync_gateway::client::{
    ClientConfig, ConnectionManager, Connector, InboundKind, TransportEvent, WsConnector,
};
use sync_gateway::domain::value_objects::{ConnectionState, FailureReason, RoomId};
use sync_gateway::shared::protocol::{Envelope, MessageType};

use crate::common::{collector, recv_within, token_for, TestServer};

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

fn join(room: &str) -> Envelope {
    Envelope::new(MessageType::JoinRoom, json!({"roomId": room}))
}

#[tokio::test]
async fn test_client_authenticates_and_receives_initial_state() {
    let server = TestServer::spawn().await;
    let manager = ConnectionManager::new(ClientConfig::default());
    let (handler, mut states) = collector();
    manager.on(InboundKind::GameStateUpdate, handler);

    let authenticated = manager
        .connect(&server.ws_url(), &token_for("alice"))
        .await
        .unwrap();

    assert!(authenticated);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(recv_within(&mut states, 5).await, json!({}));
    assert_eq!(server.state.sessions.authenticated_count(), 1);

    manager.cleanup();
    eventually(|| server.state.sessions.connection_count() == 0).await;
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let server = TestServer::spawn().await;
    let manager = ConnectionManager::new(ClientConfig::default());

    let authenticated = manager.connect(&server.ws_url(), "not-a-jwt").await.unwrap();

    assert!(!authenticated);
    assert_eq!(
        manager.state(),
        ConnectionState::Error {
            reason: FailureReason::AuthRejected("invalid_token".into())
        }
    );
    eventually(|| server.state.sessions.connection_count() == 0).await;
}

#[tokio::test]
async fn test_game_action_updates_player_state() {
    let server = TestServer::spawn().await;
    let manager = ConnectionManager::new(ClientConfig::default());
    let (handler, mut states) = collector();
    manager.on(InboundKind::GameStateUpdate, handler);
    assert!(manager.connect(&server.ws_url(), &token_for("alice")).await.unwrap());
    recv_within(&mut states, 5).await;

    manager
        .send(&Envelope::new(MessageType::GameAction, json!({"score": 10})))
        .unwrap();

    assert_eq!(
        recv_within(&mut states, 5).await,
        json!({"userId": "alice", "state": {"score": 10}})
    );
}

#[tokio::test]
async fn test_room_members_share_environment_updates() {
    let server = TestServer::spawn().await;
    let lobby = RoomId::from("lobby");

    let alice = ConnectionManager::new(ClientConfig::default());
    let (alice_rooms, mut alice_room_rx) = collector();
    let (alice_env, mut alice_env_rx) = collector();
    alice.on(InboundKind::RoomUpdate, alice_rooms);
    alice.on(InboundKind::EnvImpactUpdate, alice_env);

    let bob = ConnectionManager::new(ClientConfig::default());
    let (bob_env, mut bob_env_rx) = collector();
    bob.on(InboundKind::EnvImpactUpdate, bob_env);

    assert!(alice.connect(&server.ws_url(), &token_for("alice")).await.unwrap());
    assert!(bob.connect(&server.ws_url(), &token_for("bob")).await.unwrap());

    alice.send(&join("lobby")).unwrap();
    eventually(|| server.state.rooms.room_members(&lobby).len() == 1).await;
    bob.send(&join("lobby")).unwrap();

    assert_eq!(
        recv_within(&mut alice_room_rx, 5).await,
        json!({"action": "JOIN", "roomId": "lobby", "userId": "bob"})
    );

    bob.send(&Envelope::new(MessageType::EnvAction, json!({"amount": 2.5})))
        .unwrap();

    let expected = json!({"userId": "bob", "impact": {"amount": 2.5, "total": 2.5}});
    assert_eq!(recv_within(&mut alice_env_rx, 5).await, expected);
    assert_eq!(recv_within(&mut bob_env_rx, 5).await, expected);

    bob.cleanup();
    assert_eq!(
        recv_within(&mut alice_room_rx, 5).await,
        json!({"action": "LEAVE", "roomId": "lobby", "userId": "bob"})
    );
    eventually(|| server.state.rooms.room_members(&lobby).len() == 1).await;
}

#[tokio::test]
async fn test_team_action_reaches_team() {
    let server = TestServer::spawn().await;
    let manager = ConnectionManager::new(ClientConfig::default());
    let (handler, mut teams) = collector();
    manager.on(InboundKind::TeamUpdate, handler);
    assert!(manager.connect(&server.ws_url(), &token_for("carol")).await.unwrap());

    manager
        .send(&Envelope::new(MessageType::TeamAction, json!({"teamId": "red"})))
        .unwrap();

    let update = recv_within(&mut teams, 5).await;
    assert_eq!(update["teamId"], "red");
    assert_eq!(update["members"], json!(["carol"]));
}

#[tokio::test]
async fn test_actions_before_auth_are_refused() {
    let server = TestServer::spawn().await;
    let mut link = WsConnector.open(&server.ws_url()).await.unwrap();

    async fn next_message(link: &mut sync_gateway::client::TransportLink) -> Value {
        let event = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .expect("timed out waiting for the gateway")
            .expect("link closed");
        match event {
            TransportEvent::Message(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected transport event: {:?}", other),
        }
    }

    link.outbound
        .send(json!({"type": "GAME_ACTION", "payload": {"score": 1}}).to_string())
        .unwrap();
    assert_eq!(
        next_message(&mut link).await,
        json!({"type": "SYS_ERROR", "payload": {"message": "unauthenticated", "reason": "unauthenticated"}})
    );

    link.outbound
        .send(json!({"type": "AUTH", "payload": {"token": token_for("dave")}}).to_string())
        .unwrap();
    assert_eq!(next_message(&mut link).await, json!({"type": "AUTH_SUCCESS"}));
}
