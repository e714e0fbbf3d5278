//! End-to-end tests against a real server over `WebSocket` and HTTP.

use std::time::Duration;

use duel_core::{Command, PlayerId, Position, Role, ServerMessage, notices};
use duel_server::config::ServerConfig;
use duel_server::server::{DuelServer, ServerHandle};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);
const SECRET: &str = "integration-secret";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn token_for(user_id: i64) -> String {
    let claims = json!({ "userId": user_id, "exp": chrono::Utc::now().timestamp() + 3600 });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn boot_with(config: ServerConfig) -> ServerHandle {
    let config = ServerConfig {
        jwt_secret: Some(SecretString::from(SECRET.to_owned())),
        ..config
    };
    DuelServer::new(config).start().await.unwrap()
}

async fn boot_server() -> ServerHandle {
    boot_with(ServerConfig::default()).await
}

async fn connect(handle: &ServerHandle, user_id: i64) -> WsStream {
    let url = format!("ws://{}/ws?token={}", handle.addr, token_for(user_id));
    let (ws, _resp) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

/// Connect and consume the greeting.
async fn join_lobby(handle: &ServerHandle, user_id: i64) -> WsStream {
    let mut ws = connect(handle, user_id).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::notice(notices::CONNECTED));
    ws
}

/// Next application message, skipping control frames.
async fn recv(ws: &mut WsStream) -> ServerMessage {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return ServerMessage::from_json(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Wait for the hub to report a condition; commands are processed asynchronously.
async fn eventually(handle: &ServerHandle, check: impl Fn(&ServerHandle) -> bool) {
    timeout(TIMEOUT, async {
        while !check(handle) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn paired(handle: &ServerHandle) -> (WsStream, WsStream) {
    let mut red = join_lobby(handle, 1).await;
    let mut black = join_lobby(handle, 2).await;
    send(&mut red, json!({"type": 2})).await;
    assert_eq!(recv(&mut red).await, ServerMessage::notice(notices::WAITING));
    send(&mut black, json!({"type": 2})).await;
    assert_eq!(recv(&mut red).await, ServerMessage::Start { role: Role::Red });
    assert_eq!(recv(&mut black).await, ServerMessage::Start { role: Role::Black });
    (red, black)
}

#[tokio::test]
async fn two_players_match_and_exchange_moves() {
    let handle = boot_server().await;
    let (mut red, mut black) = paired(&handle).await;

    send(&mut red, json!({"type": 3, "from": {"x": 0, "y": 0}, "to": {"x": 0, "y": 1}})).await;
    assert_eq!(
        recv(&mut black).await,
        ServerMessage::Move {
            from: Position::new(0, 0),
            to: Position::new(0, 1),
        }
    );

    // Out of turn.
    send(&mut red, json!({"type": 3, "from": {"x": 0, "y": 1}, "to": {"x": 0, "y": 2}})).await;
    assert_eq!(recv(&mut red).await, ServerMessage::notice(notices::WAIT_FOR_OPPONENT));

    send(&mut black, json!({"type": 3, "from": {"x": 8, "y": 9}, "to": {"x": 8, "y": 8}})).await;
    assert_eq!(
        recv(&mut red).await,
        ServerMessage::Move {
            from: Position::new(8, 9),
            to: Position::new(8, 8),
        }
    );

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn give_up_ends_the_game_for_both() {
    let handle = boot_server().await;
    let (mut red, mut black) = paired(&handle).await;

    send(&mut black, json!({"type": 8})).await;
    let end = ServerMessage::End { winner: Role::Red };
    assert_eq!(recv(&mut red).await, end);
    assert_eq!(recv(&mut black).await, end);
    eventually(&handle, |h| h.hub().stats().rooms == 0).await;

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn disconnect_notifies_the_peer() {
    let handle = boot_server().await;
    let (red, mut black) = paired(&handle).await;

    drop(red);
    assert_eq!(recv(&mut black).await, ServerMessage::notice(notices::PEER_DISCONNECTED));
    eventually(&handle, |h| h.hub().stats().rooms == 0 && h.hub().stats().sessions == 1).await;

    // The survivor is back in the lobby and can queue again.
    send(&mut black, json!({"type": 2})).await;
    assert_eq!(recv(&mut black).await, ServerMessage::notice(notices::WAITING));

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn create_list_and_join_a_room() {
    let handle = boot_server().await;
    let http = reqwest::Client::new();
    let rooms_url = format!("http://{}/api/user/rooms", handle.addr);

    let mut host = join_lobby(&handle, 10).await;
    send(&mut host, json!({"type": 7})).await;
    let ServerMessage::Created { room_id } = recv(&mut host).await else {
        panic!("expected a create acknowledgement");
    };

    let listed: serde_json::Value = http.get(&rooms_url).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        listed,
        json!({"rooms": [{"id": room_id.get(), "current": {"id": 10}, "next": null}]})
    );

    let mut guest = join_lobby(&handle, 11).await;
    send(&mut guest, json!({"type": 6, "roomId": room_id.get()})).await;
    assert_eq!(recv(&mut guest).await, ServerMessage::Joined { room_id });
    assert_eq!(recv(&mut guest).await, ServerMessage::Start { role: Role::Black });
    assert_eq!(recv(&mut host).await, ServerMessage::Start { role: Role::Red });

    let listed: serde_json::Value = http.post(&rooms_url).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed, json!({"rooms": []}));

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn missing_or_bad_token_is_401() {
    let handle = boot_server().await;

    let resp = reqwest::get(format!("http://{}/ws", handle.addr)).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let url = format!("ws://{}/ws?token=not-a-jwt", handle.addr);
    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status().as_u16(), 401);
        }
        other => panic!("expected 401, got {other:?}"),
    }

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn duplicate_login_is_refused() {
    let handle = boot_server().await;
    let mut first = join_lobby(&handle, 5).await;

    let mut second = connect(&handle, 5).await;
    // Frames from the refused socket must never act on the live session.
    send(&mut second, json!({"type": 2})).await;
    send(&mut second, json!({"type": 7})).await;
    assert_eq!(recv(&mut second).await, ServerMessage::notice(notices::ALREADY_CONNECTED));
    let closed = timeout(TIMEOUT, async {
        loop {
            match second.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    // The first session is untouched.
    send(&mut first, json!({"type": 2})).await;
    assert_eq!(recv(&mut first).await, ServerMessage::notice(notices::WAITING));
    let stats = handle.hub().stats();
    assert_eq!((stats.sessions, stats.rooms, stats.waiting), (1, 0, 1));

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let handle = boot_server().await;
    let mut ws = join_lobby(&handle, 3).await;

    ws.send(Message::text("not json")).await.unwrap();
    send(&mut ws, json!({"type": 99})).await;
    send(&mut ws, json!({"type": 2})).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::notice(notices::WAITING));

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn hub_can_push_to_a_player() {
    let handle = boot_server().await;
    let mut ws = join_lobby(&handle, 4).await;

    let command = Command::SendMessage {
        target: PlayerId(4),
        message: ServerMessage::notice("maintenance at noon"),
    };
    handle.hub().bus().submit(command, &CancellationToken::new()).await.unwrap();
    assert_eq!(recv(&mut ws).await, ServerMessage::notice("maintenance at noon"));

    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn silent_peer_is_torn_down() {
    let handle = boot_with(ServerConfig {
        ping_interval_secs: 1,
        ping_timeout_secs: 2,
        ..ServerConfig::default()
    })
    .await;
    let (red, mut black) = paired(&handle).await;

    // `red` is never polled again, so it never answers pings.
    let notice = timeout(Duration::from_secs(10), recv(&mut black)).await.unwrap();
    assert_eq!(notice, ServerMessage::notice(notices::PEER_DISCONNECTED));
    eventually(&handle, |h| h.hub().stats().sessions == 1).await;

    drop(red);
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn health_reports_live_counts() {
    let handle = boot_server().await;
    let _ws = join_lobby(&handle, 8).await;

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", handle.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["connections"], 1);

    handle.shutdown(Some(TIMEOUT)).await;
}
