//! Per-chat WebSocket connections and the registry that owns them.
//!
//! DESIGN
//! ======
//! Each open chat gets one background task that owns the socket stream.
//! Inbound frames are decoded in the task and forwarded to the chat store as
//! `SocketEvent`s over a channel; the store applies them on its own task, so
//! all state mutation stays single-owner. Outbound frames travel the other
//! way through a per-socket queue.
//!
//! Connecting is non-blocking: `ChatSocket::spawn` returns immediately and
//! the handshake happens inside the task. A failed handshake surfaces as a
//! `Closed` event, exactly like a socket that was open and then dropped.
//!
//! The registry is a plain map with check-then-insert. It is only touched by
//! the task that owns the store. Every socket carries a serial number, and
//! events are tagged with it, so late events from a removed or replaced
//! socket can be told apart from its successor's.

#[cfg(test)]
#[path = "socket_test.rs"]
mod socket_test;

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::error::{ClientError, ws_error};
use crate::types::{ChatMessage, OutgoingMessage, parse_socket_frame};

/// Socket URL plus the cookie header to authenticate the upgrade request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketTarget {
    pub url: String,
    pub cookie: Option<String>,
    /// Limit on the TCP connect plus upgrade handshake.
    pub connect_timeout: Duration,
}

impl SocketTarget {
    /// Target without a cookie, using the default connect timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cookie: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Event delivered from a socket task to the chat store.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketEvent {
    Message { chat_id: String, serial: u64, message: ChatMessage },
    Closed { chat_id: String, serial: u64, reason: Option<String> },
}

// =============================================================================
// CHAT SOCKET
// =============================================================================

/// Handle to one chat's socket task. Dropping it stops the task.
pub struct ChatSocket {
    chat_id: String,
    serial: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatSocket {
    /// Start the socket task for `chat_id`. Must be called within a Tokio
    /// runtime.
    #[must_use]
    pub fn spawn(
        chat_id: &str,
        serial: u64,
        target: SocketTarget,
        events: mpsc::UnboundedSender<SocketEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            chat_id.to_owned(),
            serial,
            target,
            events,
            outbound_rx,
            cancel.clone(),
        ));
        Self { chat_id: chat_id.to_owned(), serial, outbound: Some(outbound_tx), cancel, task: Some(task) }
    }

    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// True once the task has exited (closed, failed, or cancelled).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Queue a frame for sending. Frames queued before the handshake
    /// completes are sent once it does.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoSocket`] if the task has already exited.
    pub fn send(&self, frame: &OutgoingMessage) -> Result<(), ClientError> {
        let text = serde_json::to_string(frame)?;
        self.outbound
            .as_ref()
            .ok_or_else(|| ClientError::NoSocket(self.chat_id.clone()))?
            .send(text)
            .map_err(|_| ClientError::NoSocket(self.chat_id.clone()))
    }

    /// Flush queued frames, send a close frame, and wait for the task.
    pub async fn shutdown(mut self) {
        drop(self.outbound.take());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "socket task ended abnormally");
            }
        }
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(
    chat_id: String,
    serial: u64,
    target: SocketTarget,
    events: mpsc::UnboundedSender<SocketEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    tracing::debug!(%chat_id, url = %target.url, "socket connecting");
    let reason = match drive_socket(&chat_id, serial, target, &events, &mut outbound, &cancel).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(%chat_id, error = %e, "socket closed with error");
            Some(e.to_string())
        }
    };
    tracing::debug!(%chat_id, "socket closed");
    if events.send(SocketEvent::Closed { chat_id, serial, reason }).is_err() {
        tracing::debug!("chat store gone before socket close was delivered");
    }
}

async fn drive_socket(
    chat_id: &str,
    serial: u64,
    target: SocketTarget,
    events: &mpsc::UnboundedSender<SocketEvent>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    let mut request = target.url.as_str().into_client_request().map_err(ws_error)?;
    if let Some(cookie) = &target.cookie {
        request.headers_mut().insert(COOKIE, HeaderValue::from_str(cookie)?);
    }

    let limit = target.connect_timeout;
    let (stream, _) = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        connected = tokio::time::timeout(limit, connect_async(request)) => {
            connected.map_err(|_| ClientError::Timeout(limit))?.map_err(ws_error)?
        }
    };
    tracing::info!(%chat_id, "socket open");
    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            outgoing = outbound.recv() => {
                let Some(text) = outgoing else {
                    sink.send(Message::Close(None)).await.map_err(ws_error)?;
                    return Ok(());
                };
                sink.send(Message::text(text)).await.map_err(ws_error)?;
            }
            incoming = stream.next() => {
                let Some(message) = incoming else {
                    return Ok(());
                };
                match message.map_err(ws_error)? {
                    Message::Text(text) => match parse_socket_frame(text.as_str()) {
                        Ok(message) => {
                            let event = SocketEvent::Message { chat_id: chat_id.to_owned(), serial, message };
                            if events.send(event).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => tracing::warn!(%chat_id, error = %e, "dropping malformed socket frame"),
                    },
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Chat id → open socket. At most one entry per chat.
#[derive(Default)]
pub struct SocketRegistry {
    sockets: HashMap<String, ChatSocket>,
    next_serial: u64,
}

impl SocketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, chat_id: &str) -> bool {
        self.sockets.contains_key(chat_id)
    }

    #[must_use]
    pub fn get(&self, chat_id: &str) -> Option<&ChatSocket> {
        self.sockets.get(chat_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn chat_ids(&self) -> impl Iterator<Item = &str> {
        self.sockets.keys().map(String::as_str)
    }

    /// Open a socket for `chat_id` unless one is already registered.
    /// `open` receives the serial for the new socket. Returns whether a
    /// socket was opened.
    pub fn connect_with(&mut self, chat_id: &str, open: impl FnOnce(u64) -> ChatSocket) -> bool {
        if self.sockets.contains_key(chat_id) {
            return false;
        }
        self.next_serial += 1;
        let socket = open(self.next_serial);
        self.sockets.insert(chat_id.to_owned(), socket);
        true
    }

    /// True when `serial` is the socket currently registered for `chat_id`.
    #[must_use]
    pub fn is_current(&self, chat_id: &str, serial: u64) -> bool {
        self.sockets.get(chat_id).is_some_and(|socket| socket.serial() == serial)
    }

    /// Remove the entry for `chat_id` if it is still the socket `serial`.
    pub fn remove_closed(&mut self, chat_id: &str, serial: u64) -> bool {
        if self.is_current(chat_id, serial) {
            self.sockets.remove(chat_id);
            return true;
        }
        false
    }

    pub fn remove(&mut self, chat_id: &str) -> Option<ChatSocket> {
        self.sockets.remove(chat_id)
    }

    /// Drop every socket, stopping their tasks.
    pub fn clear(&mut self) {
        self.sockets.clear();
    }
}
