/// Websocket tests
/// Chat session over a real socket against a local tungstenite server

extern crate bazaar_core;

use bazaar_core::chat::protocol::{encode_ack, ConversationId};
use bazaar_core::chat::{ClientEvent, ServerEvent, WsConnector};
use bazaar_core::{ChatContext, ChatSession, Config, SessionState};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Accept one client and play the chat server for it
async fn start_server() -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut seen = Vec::new();
        let mut history = Vec::new();

        while let Some(Ok(frame)) = ws.next().await {
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            let (event, ack) = ClientEvent::decode(&text).unwrap();
            seen.push(event.name().to_string());

            let mut replies = Vec::new();
            match event {
                ClientEvent::ResolveRoom(_) => {
                    let room = ServerEvent::RoomId(ConversationId::new("r1").unwrap());
                    replies.push(room.encode().unwrap());
                }
                ClientEvent::GetHistory(_) => {
                    replies.push(encode_ack(ack.unwrap(), json!(history)).unwrap());
                }
                ClientEvent::SendMessage(msg) => {
                    history.push(json!({
                        "_id": format!("m{}", history.len() + 1),
                        "sender": msg.sender,
                        "recipient": msg.recipient,
                        "roomId": msg.room_id.as_str(),
                        "message": msg.message,
                        "productTitle": msg.product_title,
                        "createdAt": "2023-03-01T10:15:00.000Z",
                    }));
                    replies.push(encode_ack(ack.unwrap(), json!({ "ok": true })).unwrap());
                    replies.push(ServerEvent::NewMessage(json!({})).encode().unwrap());
                }
            }
            for reply in replies {
                if ws.send(WsMessage::Text(reply)).await.is_err() {
                    return seen;
                }
            }
        }
        seen
    });

    (format!("ws://{}", addr), handle)
}

#[tokio::test]
async fn test_websocket_chat_roundtrip() {
    let (url, server) = start_server().await;
    let config = Config {
        socket_url: url,
        ack_timeout: Duration::from_secs(2),
        ..Config::default()
    };

    let connector = Arc::new(WsConnector::from_config(&config));
    let session = ChatSession::mount(connector, ChatContext::new("u1", "u2", "Widget"), &config);

    let mut states = session.states();
    timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == SessionState::HistoryLoaded),
    )
    .await
    .expect("history never loaded")
    .unwrap();
    drop(states);

    session.send("Hello over the wire").await.unwrap();
    let mut messages = session.messages();
    let snapshot = timeout(Duration::from_secs(5), messages.wait_for(|m| !m.is_empty()))
        .await
        .expect("message never arrived")
        .unwrap()
        .clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].body, "Hello over the wire");

    session.unmount().await;

    let seen = timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not see the close")
        .unwrap();
    assert_eq!(seen.first().map(String::as_str), Some("resolve-room"));
    assert!(seen.iter().any(|e| e == "send-message"));
}

#[tokio::test]
async fn test_websocket_connect_refused() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Config {
        socket_url: format!("ws://{}", addr),
        ..Config::default()
    };
    let session = ChatSession::mount(
        Arc::new(WsConnector::from_config(&config)),
        ChatContext::new("u1", "u2", "Widget"),
        &config,
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.state(), SessionState::Connecting);
    session.unmount().await;
}
