//! Gateway transport against a local WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huginn::{ReconnectConfig, RetryConfig, StreamEvent, WebSocketTransport};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Headers seen by the server, one entry per accepted connection.
#[derive(Debug)]
struct Handshake {
    authorization: Option<String>,
    last_message_id: Option<String>,
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Serve two connections: a full session, then one that closes right away.
async fn serve(listener: TcpListener, handshakes: mpsc::UnboundedSender<Handshake>) {
    for session in 0..2 {
        let (stream, _) = listener.accept().await.unwrap();
        let tx = handshakes.clone();
        let mut socket = accept_hdr_async(stream, move |request: &Request, response: Response| {
            let _ = tx.send(Handshake {
                authorization: header(request, "authorization"),
                last_message_id: header(request, "guilded-last-message-id"),
            });
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .unwrap();

        if session == 0 {
            let welcome = json!({
                "op": 1,
                "d": {
                    "heartbeatIntervalMs": 60000,
                    "lastMessageId": "welcome-0",
                    "user": { "id": "bot1", "name": "huginn" }
                }
            });
            socket.send(Message::Text(welcome.to_string())).await.unwrap();
            let event = json!({
                "op": 0,
                "t": "ChatMessageCreated",
                "s": "msg-1",
                "d": { "serverId": "s1", "message": { "id": "m1" } }
            });
            socket.send(Message::Text(event.to_string())).await.unwrap();
            socket.send(Message::Text("not json".into())).await.unwrap();
        }
        socket.close(None).await.ok();
    }
}

fn reconnect() -> ReconnectConfig {
    ReconnectConfig {
        max_attempts: Some(1),
        backoff: RetryConfig::new()
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(10)),
    }
}

#[tokio::test]
async fn session_yields_connected_data_disconnected_then_resumes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, mut handshakes) = mpsc::unbounded_channel();
    let server = tokio::spawn(serve(listener, tx));

    let mut stream = WebSocketTransport::new("secret")
        .url(url)
        .reconnect(reconnect())
        .spawn();

    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("transport stalled")
    {
        events.push(event);
    }
    server.await.unwrap();

    assert!(matches!(&events[0], StreamEvent::Connected(welcome) if welcome["user"]["id"] == "bot1"));
    match &events[1] {
        StreamEvent::Data { kind, payload } => {
            assert_eq!(kind, "ChatMessageCreated");
            assert_eq!(payload["message"]["id"], "m1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(&events[2], StreamEvent::Disconnected { .. }));
    assert_eq!(events.len(), 3, "failed reconnect emits no disconnect");

    let first = handshakes.recv().await.unwrap();
    assert_eq!(first.authorization.as_deref(), Some("Bearer secret"));
    assert!(first.last_message_id.is_none());
    let second = handshakes.recv().await.unwrap();
    assert_eq!(second.last_message_id.as_deref(), Some("msg-1"));
}

#[tokio::test]
async fn unreachable_gateway_ends_stream_after_limit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut stream = WebSocketTransport::new("secret")
        .url(url)
        .reconnect(reconnect())
        .spawn();

    let end = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("transport stalled");
    assert!(end.is_none());
}
