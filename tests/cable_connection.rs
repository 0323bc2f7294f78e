//! Conversation channel against a local ActionCable-speaking websocket server.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use regattaboard_chat::chat::{CableConnection, ChannelError, ChannelParams, ConnectionState, RealtimeChannel};

fn params() -> ChannelParams {
    ChannelParams {
        access_token: "secret".into(),
        conversation_id: "7".into(),
        sender_id: "1".into(),
    }
}

fn base(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{}/", addr)).unwrap()
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut requested = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        requested = req.uri().to_string();
        Ok(resp)
    })
    .await
    .unwrap();
    (ws, requested)
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

/// Sends the welcome, reads the subscribe command and answers with `reply`
/// (`confirm_subscription` or `reject_subscription`).
async fn subscribe(ws: &mut WebSocketStream<TcpStream>, reply: &str) -> (Value, String) {
    ws.send(text(json!({ "type": "welcome" }))).await.unwrap();
    let command = next_json(ws).await;
    let identifier = command["identifier"].as_str().unwrap().to_string();
    ws.send(text(json!({ "identifier": identifier, "type": reply })))
        .await
        .unwrap();
    (command, identifier)
}

#[tokio::test]
async fn test_subscribes_delivers_and_speaks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, requested) = accept(&listener).await;
        let (command, identifier) = subscribe(&mut ws, "confirm_subscription").await;
        ws.send(text(json!({ "type": "ping", "message": 1 }))).await.unwrap();
        ws.send(text(json!({
            "identifier": identifier,
            "message": { "participants": ["2", "3"], "sender": { "id": "2", "name": "Ann" }, "content": "not for you" }
        })))
        .await
        .unwrap();
        ws.send(text(json!({
            "identifier": identifier,
            "message": { "participants": [1, 2], "sender": { "id": 2, "name": "Ann" }, "content": "ahoy" }
        })))
        .await
        .unwrap();
        let speak = next_json(&mut ws).await;
        (requested, command, speak)
    });

    let (mut conn, mut inbound) = CableConnection::open(&base(addr), params()).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);

    let received = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.content, "ahoy");
    assert_eq!(received.sender.id, "2");

    conn.send("hello crew");
    let (requested, command, speak) = server.await.unwrap();

    assert_eq!(requested, "/cable?access_token=secret");
    assert_eq!(command["command"], "subscribe");
    let identifier: Value = serde_json::from_str(command["identifier"].as_str().unwrap()).unwrap();
    assert_eq!(
        identifier,
        json!({ "channel": "ConversationChannel", "conversation_id": "7", "sender": "1" })
    );

    assert_eq!(speak["command"], "message");
    let data: Value = serde_json::from_str(speak["data"].as_str().unwrap()).unwrap();
    assert_eq!(
        data,
        json!({ "conversation_id": "7", "message": "hello crew", "sender_id": "1", "action": "speak" })
    );

    conn.close();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    conn.close();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_rejected_subscription_fails_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        subscribe(&mut ws, "reject_subscription").await;
        let _ = ws.next().await;
    });

    let err = CableConnection::open(&base(addr), params()).await.err().unwrap();
    assert!(matches!(err, ChannelError::Rejected), "got {:?}", err);
}

#[tokio::test]
async fn test_server_drop_leaves_channel_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        subscribe(&mut ws, "confirm_subscription").await;
        let _ = ws.close(None).await;
    });

    let (conn, mut inbound) = CableConnection::open(&base(addr), params()).await.unwrap();
    let mut state = conn.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(inbound.recv().await.is_none());
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    // Sending on a dropped channel is silently ignored.
    conn.send("lost");
}
