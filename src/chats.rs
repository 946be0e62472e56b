//! Chat session store: previews, creation, history paging, and the live
//! socket per chat.
//!
//! SYSTEM CONTEXT
//! ==============
//! `ChatStore` is the single owner of everything the chat views read. It is
//! built with an explicit `Session` and a shared `ChatBackend`, and every
//! state change happens inside its `&mut self` methods. Socket tasks never
//! touch the store; they post `SocketEvent`s that the owner pulls with
//! `next_socket_event` and applies with `apply_socket_event`.
//!
//! ERROR HANDLING
//! ==============
//! Backend failures become display strings on the relevant `ApiState` and
//! are logged. A 401 sets the expired-session login route instead of an
//! error string. Redirected and cancelled calls put the request status back
//! the way it was, so nothing is left loading. Nothing is retried and stale
//! data stays visible after a failure.

#[cfg(test)]
#[path = "chats_test.rs"]
mod chats_test;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api_state::ApiState;
use crate::backend::{ChatBackend, cancellable};
use crate::error::ClientError;
use crate::history::ChatDetails;
use crate::route::Route;
use crate::session::{INTERNAL_ERROR, INTERNAL_ERROR_SENTENCE, Session};
use crate::socket::{ChatSocket, SocketEvent, SocketRegistry};
use crate::types::{ChatMessage, ChatPreview, HistoryQuery, NewChatRequest, OutgoingMessage};

pub const FETCH_CHATS_FAILED: &str = "Failed to fetch chats";
pub const FETCH_MESSAGES_FAILED: &str = "Failed to fetch messages";
pub const CREATE_CHAT_FAILED: &str = "Error occurred when creating chat.";
pub const CHAT_NAME_REQUIRED: &str = "Please enter a chat name.";

pub struct ChatStore<B: ChatBackend> {
    backend: Arc<B>,
    session: Session,
    page_size: usize,
    previews: ApiState<Vec<ChatPreview>>,
    available: ApiState<Vec<ChatPreview>>,
    details: ApiState<HashMap<String, ChatDetails>>,
    sockets: SocketRegistry,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events_rx: mpsc::UnboundedReceiver<SocketEvent>,
    navigate_to: Option<Route>,
    cancel: CancellationToken,
}

impl<B: ChatBackend> ChatStore<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, session: Session, page_size: usize) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            session,
            page_size: page_size.max(1),
            previews: ApiState::new(),
            available: ApiState::new(),
            details: ApiState::new(),
            sockets: SocketRegistry::new(),
            events_tx,
            events_rx,
            navigate_to: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    // =========================================================================
    // PREVIEWS
    // =========================================================================

    /// `GET /chats/my-chats` into the preview list.
    pub async fn fetch_chat_previews(&mut self) {
        let checkpoint = self.previews.begin_loading();
        let result = cancellable(&self.cancel, self.backend.my_chats()).await;
        match result {
            Ok(chats) => {
                tracing::debug!(count = chats.len(), "fetched chat previews");
                self.previews.set_success(chats);
            }
            Err(e) => match self.failure_message(e, "fetch chats", FETCH_CHATS_FAILED, INTERNAL_ERROR) {
                Some(message) => self.previews.set_error(message),
                None => self.previews.restore(checkpoint),
            },
        }
    }

    /// `GET /chats/available-chats`. Kept apart from the caller's own list.
    pub async fn fetch_available_chats(&mut self) {
        let checkpoint = self.available.begin_loading();
        let result = cancellable(&self.cancel, self.backend.available_chats()).await;
        match result {
            Ok(chats) => {
                tracing::debug!(count = chats.len(), "fetched available chats");
                self.available.set_success(chats);
            }
            Err(e) => match self.failure_message(e, "fetch available chats", FETCH_CHATS_FAILED, INTERNAL_ERROR) {
                Some(message) => self.available.set_error(message),
                None => self.available.restore(checkpoint),
            },
        }
    }

    /// `POST /chats`. On success the new preview joins the list and the
    /// caller is asked to open it.
    pub async fn create_chat(&mut self, chat_name: &str, other_users: Vec<String>, is_public: bool) {
        let chat_name = chat_name.trim();
        if chat_name.is_empty() {
            self.previews.set_error(CHAT_NAME_REQUIRED);
            return;
        }

        let req = NewChatRequest { chat_name: chat_name.to_owned(), other_users, is_public };
        let result = cancellable(&self.cancel, self.backend.create_chat(&req)).await;
        match result {
            Ok(created) => {
                let chat_id = created.chat_id.clone();
                tracing::info!(%chat_id, %chat_name, "chat created");
                self.previews.update_success(|previous| {
                    let mut previews = previous.unwrap_or_default();
                    match previews.iter_mut().find(|p| p.chat_id == created.chat_id) {
                        Some(existing) => *existing = created,
                        None => previews.push(created),
                    }
                    previews
                });
                self.navigate_to = Some(Route::Chat(chat_id));
            }
            Err(e) => {
                if let Some(message) =
                    self.failure_message(e, "create chat", CREATE_CHAT_FAILED, INTERNAL_ERROR_SENTENCE)
                {
                    self.previews.set_error(message);
                }
            }
        }
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Load the next page of history for `chat_id`: the newest page when
    /// nothing is cached, otherwise the page before the earliest cached
    /// message. No-op once the chat is exhausted.
    pub async fn fetch_history(&mut self, chat_id: &str) {
        let cached = self.details.data().and_then(|all| all.get(chat_id));
        if cached.is_some_and(ChatDetails::is_exhausted) {
            tracing::debug!(%chat_id, "history exhausted");
            return;
        }
        let query = HistoryQuery {
            start_id: cached.and_then(ChatDetails::earliest_id).map(str::to_owned),
            count: self.page_size,
        };

        let checkpoint = self.details.begin_loading();
        let result = cancellable(&self.cancel, self.backend.chat_history(chat_id, &query)).await;
        match result {
            Ok(page) => {
                let short = page.len() < query.count;
                let chat_id = chat_id.to_owned();
                self.details.update_success(|previous| {
                    let mut all = previous.unwrap_or_default();
                    let details = all.entry(chat_id.clone()).or_insert_with(|| ChatDetails::new(&chat_id));
                    let added = details.merge_page(page);
                    if short {
                        details.mark_exhausted();
                    }
                    tracing::debug!(%chat_id, added, exhausted = short, "merged history page");
                    all
                });
            }
            Err(e) => match self.failure_message(e, "fetch messages", FETCH_MESSAGES_FAILED, INTERNAL_ERROR) {
                Some(message) => self.details.set_error(message),
                None => self.details.restore(checkpoint),
            },
        }
    }

    // =========================================================================
    // SOCKETS
    // =========================================================================

    /// Open a socket for every preview that has none. Returns how many were
    /// opened. Must be called within a Tokio runtime.
    pub fn connect_sockets(&mut self) -> usize {
        let chat_ids: Vec<String> = self
            .previews
            .data()
            .map(|previews| previews.iter().map(|p| p.chat_id.clone()).collect())
            .unwrap_or_default();

        let opened = chat_ids.iter().filter(|chat_id| self.connect_socket(chat_id)).count();
        if opened > 0 {
            tracing::info!(opened, total = self.sockets.len(), "chat sockets opened");
        }
        opened
    }

    /// Open the socket for one chat unless it already has one. Returns
    /// whether a socket was opened. Must be called within a Tokio runtime.
    pub fn connect_socket(&mut self, chat_id: &str) -> bool {
        if self.sockets.contains(chat_id) {
            return false;
        }
        let target = match self.backend.socket_target(chat_id) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(%chat_id, error = %e, "cannot build socket target");
                return false;
            }
        };
        let events = self.events_tx.clone();
        let cancel = self.cancel.child_token();
        self.sockets
            .connect_with(chat_id, |serial| ChatSocket::spawn(chat_id, serial, target, events, cancel))
    }

    /// Wait for the next event from any socket. Returns `None` once the store
    /// is cancelled.
    pub async fn next_socket_event(&mut self) -> Option<SocketEvent> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.events_rx.recv() => event,
        }
    }

    /// Next event if one is already queued.
    pub fn try_next_socket_event(&mut self) -> Option<SocketEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Apply one socket event to local state. Events from a socket that is
    /// no longer registered (closed, removed, replaced) are dropped.
    pub fn apply_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message { chat_id, serial, message } => {
                if self.sockets.is_current(&chat_id, serial) {
                    self.append_message(&chat_id, message);
                } else {
                    tracing::debug!(%chat_id, serial, "message from stale socket dropped");
                }
            }
            SocketEvent::Closed { chat_id, serial, reason } => {
                if self.sockets.remove_closed(&chat_id, serial) {
                    tracing::info!(%chat_id, reason = reason.as_deref().unwrap_or("none"), "chat socket closed");
                }
            }
        }
    }

    /// Append a live message to `chat_id` and bump its preview. A message id
    /// already cached is ignored.
    pub fn append_message(&mut self, chat_id: &str, message: ChatMessage) {
        let details = self
            .details
            .data_or_insert_with(HashMap::new)
            .entry(chat_id.to_owned())
            .or_insert_with(|| ChatDetails::new(chat_id));
        if !details.append(message.clone()) {
            tracing::debug!(%chat_id, message_id = %message.message_id, "duplicate message ignored");
            return;
        }

        match self
            .previews
            .data_mut()
            .and_then(|previews| previews.iter_mut().find(|p| p.chat_id == chat_id))
        {
            Some(preview) => preview.apply_message(&message),
            None => tracing::debug!(%chat_id, "message for chat without preview"),
        }
    }

    /// Send a text message over the chat's socket. Blank content is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoSocket`] if no socket is open for the chat.
    pub fn send_message(&self, chat_id: &str, content: &str) -> Result<(), ClientError> {
        if content.trim().is_empty() {
            return Ok(());
        }
        let socket = self
            .sockets
            .get(chat_id)
            .ok_or_else(|| ClientError::NoSocket(chat_id.to_owned()))?;
        socket.send(&OutgoingMessage::text(chat_id, content))
    }

    /// Close the chat's socket, flushing queued frames first.
    pub async fn close_socket(&mut self, chat_id: &str) {
        if let Some(socket) = self.sockets.remove(chat_id) {
            socket.shutdown().await;
            tracing::info!(%chat_id, "chat socket shut down");
        }
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    #[must_use]
    pub fn chat_preview(&self, chat_id: &str) -> Option<&ChatPreview> {
        self.previews.data()?.iter().find(|p| p.chat_id == chat_id)
    }

    #[must_use]
    pub fn details(&self, chat_id: &str) -> Option<&ChatDetails> {
        self.details.data()?.get(chat_id)
    }

    /// Cached messages for `chat_id`, oldest first.
    #[must_use]
    pub fn messages(&self, chat_id: &str) -> &[ChatMessage] {
        self.details(chat_id).map(ChatDetails::messages).unwrap_or_default()
    }

    #[must_use]
    pub fn socket(&self, chat_id: &str) -> Option<&ChatSocket> {
        self.sockets.get(chat_id)
    }

    #[must_use]
    pub fn sockets(&self) -> &SocketRegistry {
        &self.sockets
    }

    #[must_use]
    pub fn chat_previews(&self) -> &[ChatPreview] {
        self.previews.data().map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn previews_state(&self) -> &ApiState<Vec<ChatPreview>> {
        &self.previews
    }

    #[must_use]
    pub fn available_chats(&self) -> &[ChatPreview] {
        self.available.data().map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn available_state(&self) -> &ApiState<Vec<ChatPreview>> {
        &self.available
    }

    #[must_use]
    pub fn history_state(&self) -> &ApiState<HashMap<String, ChatDetails>> {
        &self.details
    }

    /// Previews, most recent activity first. Previews with no activity sort
    /// last; ties keep list order.
    #[must_use]
    pub fn sorted_chat_previews(&self) -> Vec<&ChatPreview> {
        let mut sorted: Vec<&ChatPreview> = self.chat_previews().iter().collect();
        sorted.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        sorted
    }

    // =========================================================================
    // LOCAL CHANGES
    // =========================================================================

    /// Drop a chat from the local list, its cached messages, and its socket.
    /// The backend is not told.
    pub fn remove_chat(&mut self, chat_id: &str) {
        if self.previews.data().is_some() {
            self.previews.update_success(|previous| {
                let mut previews = previous.unwrap_or_default();
                previews.retain(|p| p.chat_id != chat_id);
                previews
            });
        }
        self.sockets.remove(chat_id);
        if let Some(details) = self.details.data_mut() {
            details.remove(chat_id);
        }
        tracing::warn!(%chat_id, "chat removed locally; server membership unchanged");
    }

    /// Close every socket and forget all cached state.
    pub fn reset(&mut self) {
        self.sockets.clear();
        // Events still in flight from the closed sockets go to the old
        // channel and are discarded with it.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;
        self.previews.reset();
        self.available.reset();
        self.details.reset();
        self.navigate_to = None;
        tracing::info!("chat store reset");
    }

    #[must_use]
    pub fn pending_navigation(&self) -> Option<&Route> {
        self.navigate_to.as_ref()
    }

    pub fn take_navigation(&mut self) -> Option<Route> {
        self.navigate_to.take()
    }

    /// Token that aborts in-flight requests and every socket task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Turn a failed call into the message to display, or `None` when the
    /// failure is handled another way.
    fn failure_message(
        &mut self,
        error: ClientError,
        action: &'static str,
        status_message: &'static str,
        transport_message: &'static str,
    ) -> Option<&'static str> {
        match error {
            ClientError::Cancelled => {
                tracing::debug!(action, "request cancelled");
                None
            }
            ClientError::Unauthorized => {
                tracing::warn!(action, "session expired");
                self.navigate_to = Some(Route::session_expired());
                None
            }
            e if e.is_transport() => {
                tracing::warn!(action, error = %e, "request failed");
                Some(transport_message)
            }
            e => {
                tracing::warn!(action, status = ?e.status(), error = %e, "request rejected");
                Some(status_message)
            }
        }
    }
}

impl<B: ChatBackend> Drop for ChatStore<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
