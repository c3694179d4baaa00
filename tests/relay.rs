use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use chess_relay_server::config::{ServerConfig, SessionConfig, Settings};
use chess_relay_server::websocket::RelayServer;
use chess_relay_server::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(Settings {
        environment: "test".to_string(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        },
        session: SessionConfig {
            allow_self_assignment: true,
        },
    });
    let server = Arc::new(RelayServer::new(state.coordinator.clone()));

    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            let server = server.clone();
            tokio::spawn(async move {
                server.handle_connection(stream, peer).await;
            });
        }
    });

    format!("ws://{}", addr)
}

/// Connect and consume the initial `connected` frame, returning the
/// connection id the server assigned.
async fn connect_client(server_url: &str) -> (WsClient, Value) {
    let (mut ws, _) = connect_async(server_url).await.unwrap();
    let frame = recv_frame(&mut ws).await;
    assert_eq!(frame["type"], "connected");
    let id = frame["payload"]["connectionId"].clone();
    assert!(id.is_string());
    (ws, id)
}

async fn recv_frame(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed unexpectedly")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn send_frame(ws: &mut WsClient, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_two_clients_pair_and_relay_moves() {
    let server_url = spawn_server().await;

    let (mut alice, alice_id) = connect_client(&server_url).await;
    let (mut bob, bob_id) = connect_client(&server_url).await;

    // First joiner sees an empty room
    send_frame(&mut alice, json!({"type": "join", "payload": "casual-1"})).await;
    let frame = recv_frame(&mut alice).await;
    assert_eq!(frame["type"], "color-assignment");
    assert_eq!(frame["payload"], json!({}));

    // Second join is announced to both members identically
    send_frame(&mut bob, json!({"type": "join", "payload": "casual-1"})).await;
    let frame_a = recv_frame(&mut alice).await;
    let frame_b = recv_frame(&mut bob).await;
    assert_eq!(frame_a, frame_b);

    send_frame(
        &mut alice,
        json!({"type": "set-color", "payload": {"roomId": "casual-1", "color": "white"}}),
    )
    .await;
    let frame_a = recv_frame(&mut alice).await;
    let frame_b = recv_frame(&mut bob).await;
    assert_eq!(frame_a["payload"]["white"], alice_id);
    assert_eq!(frame_b["payload"]["white"], alice_id);

    send_frame(
        &mut bob,
        json!({"type": "set-color", "payload": {"roomId": "casual-1", "color": "black"}}),
    )
    .await;
    let frame_a = recv_frame(&mut alice).await;
    assert_eq!(frame_a["payload"]["white"], alice_id);
    assert_eq!(frame_a["payload"]["black"], bob_id);
    recv_frame(&mut bob).await;

    // Moves reach the opponent verbatim
    let mv = json!({"from": "e2", "to": "e4"});
    send_frame(
        &mut alice,
        json!({"type": "move", "payload": {"roomId": "casual-1", "move": mv.clone()}}),
    )
    .await;
    let frame_b = recv_frame(&mut bob).await;
    assert_eq!(frame_b["type"], "opponent-move");
    assert_eq!(frame_b["payload"], mv);

    // ... and are not echoed back to the mover
    let echo = timeout(Duration::from_millis(200), alice.next()).await;
    assert!(echo.is_err(), "sender received an unexpected frame: {:?}", echo);
}

#[tokio::test]
async fn test_disconnect_releases_colors() {
    let server_url = spawn_server().await;

    let (mut alice, alice_id) = connect_client(&server_url).await;
    let (mut bob, bob_id) = connect_client(&server_url).await;

    send_frame(&mut alice, json!({"type": "join", "payload": "resign-1"})).await;
    send_frame(
        &mut alice,
        json!({"type": "set-color", "payload": {"roomId": "resign-1", "color": "white"}}),
    )
    .await;
    recv_frame(&mut alice).await;
    let frame = recv_frame(&mut alice).await;
    assert_eq!(frame["payload"]["white"], alice_id);

    send_frame(&mut bob, json!({"type": "join", "payload": "resign-1"})).await;
    send_frame(
        &mut bob,
        json!({"type": "set-color", "payload": {"roomId": "resign-1", "color": "black"}}),
    )
    .await;
    recv_frame(&mut alice).await;
    recv_frame(&mut alice).await;
    recv_frame(&mut bob).await;
    recv_frame(&mut bob).await;

    alice.close(None).await.unwrap();

    // The survivor hears the reconciled assignment with white released
    let frame = recv_frame(&mut bob).await;
    assert_eq!(frame["type"], "color-assignment");
    assert!(frame["payload"].get("white").is_none());
    assert_eq!(frame["payload"]["black"], bob_id);
}

#[tokio::test]
async fn test_malformed_events_are_dropped_without_killing_the_connection() {
    let server_url = spawn_server().await;

    let (mut alice, _alice_id) = connect_client(&server_url).await;

    // Out-of-set color
    send_frame(
        &mut alice,
        json!({"type": "set-color", "payload": {"roomId": "lint-1", "color": "green"}}),
    )
    .await;
    let frame = recv_frame(&mut alice).await;
    assert_eq!(frame["type"], "error");

    // Unknown event type
    send_frame(&mut alice, json!({"type": "castle", "payload": {}})).await;
    let frame = recv_frame(&mut alice).await;
    assert_eq!(frame["type"], "error");

    // The connection still works afterwards
    send_frame(&mut alice, json!({"type": "join", "payload": "lint-1"})).await;
    let frame = recv_frame(&mut alice).await;
    assert_eq!(frame["type"], "color-assignment");
    assert_eq!(frame["payload"], json!({}));
}
