use super::*;
use crate::test_helpers::{accept_socket, message_frame};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

fn unreachable_target() -> SocketTarget {
    // Port 1 refuses connections on loopback, so the handshake fails fast.
    SocketTarget::new("ws://127.0.0.1:1/ws/chats/c1")
}

async fn recv_event(rx: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("socket event timed out")
        .expect("event channel closed unexpectedly")
}

// =============================================================
// Registry
// =============================================================

#[tokio::test]
async fn connect_with_is_idempotent_per_chat() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut registry = SocketRegistry::new();
    let mut opened = 0;

    for _ in 0..2 {
        registry.connect_with("c1", |serial| {
            opened += 1;
            ChatSocket::spawn("c1", serial, unreachable_target(), tx.clone(), CancellationToken::new())
        });
    }

    assert_eq!(opened, 1);
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("c1"));
    assert_eq!(registry.get("c1").map(ChatSocket::chat_id), Some("c1"));
}

#[tokio::test]
async fn connect_with_assigns_fresh_serials() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut registry = SocketRegistry::new();
    for chat_id in ["a", "b"] {
        assert!(registry.connect_with(chat_id, |serial| {
            ChatSocket::spawn(chat_id, serial, unreachable_target(), tx.clone(), CancellationToken::new())
        }));
    }
    let a = registry.get("a").unwrap().serial();
    let b = registry.get("b").unwrap().serial();
    assert_ne!(a, b);
}

#[tokio::test]
async fn remove_closed_ignores_stale_serial() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut registry = SocketRegistry::new();
    registry.connect_with("c1", |serial| {
        ChatSocket::spawn("c1", serial, unreachable_target(), tx.clone(), CancellationToken::new())
    });
    let serial = registry.get("c1").unwrap().serial();

    assert!(registry.is_current("c1", serial));
    assert!(!registry.is_current("c1", serial + 100));
    assert!(!registry.remove_closed("c1", serial + 100));
    assert!(registry.contains("c1"));
    assert!(registry.remove_closed("c1", serial));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn clear_drops_every_socket() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut registry = SocketRegistry::new();
    for chat_id in ["a", "b", "c"] {
        registry.connect_with(chat_id, |serial| {
            ChatSocket::spawn(chat_id, serial, unreachable_target(), tx.clone(), CancellationToken::new())
        });
    }
    let mut ids: Vec<_> = registry.chat_ids().map(str::to_owned).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);

    registry.clear();
    assert!(registry.is_empty());
}

// =============================================================
// Socket task
// =============================================================

#[tokio::test]
async fn failed_handshake_reports_closed_with_reason() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _socket = ChatSocket::spawn("c1", 7, unreachable_target(), tx, CancellationToken::new());

    match recv_event(&mut rx).await {
        SocketEvent::Closed { chat_id, serial, reason } => {
            assert_eq!(chat_id, "c1");
            assert_eq!(serial, 7);
            assert!(reason.is_some());
        }
        other => panic!("expected close event, got {other:?}"),
    }
}

#[tokio::test]
async fn dropping_socket_cancels_pending_handshake() {
    // Accepts TCP (via the backlog) but never answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut target = SocketTarget::new(format!("ws://{addr}/ws/chats/c9"));
    target.cookie = Some("session_id=s".into());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = ChatSocket::spawn("c9", 1, target, tx, CancellationToken::new());
    drop(socket);

    match recv_event(&mut rx).await {
        SocketEvent::Closed { chat_id, reason, .. } => {
            assert_eq!(chat_id, "c9");
            assert_eq!(reason, None);
        }
        other => panic!("expected close event, got {other:?}"),
    }
    drop(listener);
}

#[tokio::test]
async fn parent_token_cancels_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let target = SocketTarget::new(format!("ws://{addr}/ws/chats/c2"));

    let parent = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = ChatSocket::spawn("c2", 1, target, tx, parent.child_token());
    parent.cancel();

    assert!(matches!(recv_event(&mut rx).await, SocketEvent::Closed { reason: None, .. }));
    drop(socket);
    drop(listener);
}

#[tokio::test]
async fn unanswered_handshake_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut target = SocketTarget::new(format!("ws://{addr}/ws/chats/c4"));
    target.connect_timeout = Duration::from_millis(50);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _socket = ChatSocket::spawn("c4", 1, target, tx, CancellationToken::new());

    match recv_event(&mut rx).await {
        SocketEvent::Closed { reason: Some(reason), .. } => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected timed-out close, got {other:?}"),
    }
    drop(listener);
}

// =============================================================
// Live server
// =============================================================

fn expect_message(event: SocketEvent) -> ChatMessage {
    match event {
        SocketEvent::Message { chat_id, serial, message } => {
            assert_eq!(chat_id, "c1");
            assert_eq!(serial, 3);
            message
        }
        other => panic!("expected message event, got {other:?}"),
    }
}

#[tokio::test]
async fn live_socket_delivers_frames_and_sends_outbound() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(accept_socket(listener));

    let mut target = SocketTarget::new(format!("ws://{addr}/ws/chats/c1"));
    target.cookie = Some("session_id=s1".into());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = ChatSocket::spawn("c1", 3, target, tx, CancellationToken::new());

    let (cookie, mut server_ws) = server.await.unwrap();
    assert_eq!(cookie.as_deref(), Some("session_id=s1"));

    let plain = message_frame("m1", "2024-01-01T00:00:01Z");
    let wrapped = serde_json::to_string(&message_frame("m2", "2024-01-01T00:00:02Z")).unwrap();
    for frame in [plain, wrapped, "not a message".to_owned(), message_frame("m3", "2024-01-01T00:00:03Z")] {
        server_ws.send(Message::text(frame)).await.unwrap();
    }

    // The malformed frame is dropped and the socket keeps delivering.
    assert_eq!(expect_message(recv_event(&mut rx).await).message_id, "m1");
    assert_eq!(expect_message(recv_event(&mut rx).await).message_id, "m2");
    let third = expect_message(recv_event(&mut rx).await);
    assert_eq!(third.message_id, "m3");
    assert_eq!(third.sender_username.as_deref(), Some("ann"));
    assert!(!socket.is_finished());

    socket.send(&OutgoingMessage::text("c1", "hello")).unwrap();
    let sent = timeout(Duration::from_secs(5), server_ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = sent else { panic!("expected text frame, got {sent:?}") };
    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(value, serde_json::json!({ "type": "message", "chatId": "c1", "content": "hello" }));

    socket.shutdown().await;
    let closing = timeout(Duration::from_secs(5), server_ws.next()).await.unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_)))), "{closing:?}");
    assert!(matches!(recv_event(&mut rx).await, SocketEvent::Closed { serial: 3, reason: None, .. }));
}
