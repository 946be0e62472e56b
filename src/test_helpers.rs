//! In-memory `ChatBackend` and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::COOKIE;

use crate::backend::ChatBackend;
use crate::error::ClientError;
use crate::socket::SocketTarget;
use crate::types::{ChatMessage, ChatPreview, HistoryQuery, LoginRequest, NewChatRequest, SignupRequest};

/// Scripted outcome for one mock endpoint.
#[derive(Clone, Debug)]
pub enum Reply<T> {
    Ok(T),
    Status(u16),
    Transport,
}

impl<T> Reply<T> {
    fn into_result(self) -> Result<T, ClientError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Status(code) => Err(ClientError::from_status(
                reqwest::StatusCode::from_u16(code).expect("valid status code"),
            )),
            Self::Transport => Err(serde_json::from_str::<()>("<html>").unwrap_err().into()),
        }
    }
}

pub struct MockBackend {
    pub check_session: Mutex<Reply<()>>,
    pub login: Mutex<Reply<()>>,
    pub signup: Mutex<Reply<()>>,
    pub logout: Mutex<Reply<()>>,
    pub my_chats: Mutex<Reply<Vec<ChatPreview>>>,
    pub available_chats: Mutex<Reply<Vec<ChatPreview>>>,
    pub create_chat: Mutex<Reply<ChatPreview>>,
    /// History pages handed out in order; an empty queue yields an empty page.
    pub history: Mutex<VecDeque<Reply<Vec<ChatMessage>>>>,
    /// Known users: username → user id. Unknown names answer 404.
    pub users: Mutex<HashMap<String, String>>,
    pub user_lookup_failure: Mutex<Option<Reply<String>>>,
    /// WebSocket base for `socket_target`; unset points at a closed port.
    pub socket_base: Mutex<Option<String>>,
    /// Every call as `METHOD path [detail]`.
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            check_session: Mutex::new(Reply::Ok(())),
            login: Mutex::new(Reply::Ok(())),
            signup: Mutex::new(Reply::Ok(())),
            logout: Mutex::new(Reply::Ok(())),
            my_chats: Mutex::new(Reply::Ok(Vec::new())),
            available_chats: Mutex::new(Reply::Ok(Vec::new())),
            create_chat: Mutex::new(Reply::Status(500)),
            history: Mutex::new(VecDeque::new()),
            users: Mutex::new(HashMap::new()),
            user_lookup_failure: Mutex::new(None),
            socket_base: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock mutex should lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("mock mutex should lock").push(call);
    }
}

fn take<T: Clone>(slot: &Mutex<Reply<T>>) -> Result<T, ClientError> {
    slot.lock().expect("mock mutex should lock").clone().into_result()
}

#[async_trait::async_trait]
impl ChatBackend for MockBackend {
    async fn check_session(&self) -> Result<(), ClientError> {
        self.record("GET /session".into());
        take(&self.check_session)
    }

    async fn login(&self, req: &LoginRequest) -> Result<(), ClientError> {
        self.record(format!("POST /login {}", serde_json::to_string(req).expect("serializable")));
        take(&self.login)
    }

    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError> {
        self.record(format!("POST /signup {}", serde_json::to_string(req).expect("serializable")));
        take(&self.signup)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.record("POST /logout".into());
        take(&self.logout)
    }

    async fn my_chats(&self) -> Result<Vec<ChatPreview>, ClientError> {
        self.record("GET /chats/my-chats".into());
        take(&self.my_chats)
    }

    async fn available_chats(&self) -> Result<Vec<ChatPreview>, ClientError> {
        self.record("GET /chats/available-chats".into());
        take(&self.available_chats)
    }

    async fn create_chat(&self, req: &NewChatRequest) -> Result<ChatPreview, ClientError> {
        self.record(format!("POST /chats {}", serde_json::to_string(req).expect("serializable")));
        take(&self.create_chat)
    }

    async fn chat_history(&self, chat_id: &str, query: &HistoryQuery) -> Result<Vec<ChatMessage>, ClientError> {
        let params = query
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        self.record(format!("GET /chats/{chat_id}?{params}"));
        let next = self.history.lock().expect("mock mutex should lock").pop_front();
        next.unwrap_or(Reply::Ok(Vec::new())).into_result()
    }

    async fn lookup_user(&self, username: &str) -> Result<String, ClientError> {
        self.record(format!("GET /users/{username}"));
        if let Some(reply) = self.user_lookup_failure.lock().expect("mock mutex should lock").clone() {
            return reply.into_result();
        }
        self.users
            .lock()
            .expect("mock mutex should lock")
            .get(username)
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    fn socket_target(&self, chat_id: &str) -> Result<SocketTarget, ClientError> {
        // Nothing listens on port 1, so spawned sockets close promptly.
        let base = self
            .socket_base
            .lock()
            .expect("mock mutex should lock")
            .clone()
            .unwrap_or_else(|| "ws://127.0.0.1:1".to_owned());
        Ok(SocketTarget::new(format!("{base}/ws/chats/{chat_id}")))
    }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid RFC 3339 timestamp")
}

pub fn message(id: &str, at: &str) -> ChatMessage {
    ChatMessage {
        message_id: id.to_owned(),
        sender_id: "u1".to_owned(),
        sender_username: Some("ann".to_owned()),
        content: format!("message {id}"),
        timestamp: ts(at),
    }
}

pub fn preview(chat_id: &str, last_at: Option<&str>) -> ChatPreview {
    ChatPreview {
        chat_id: chat_id.to_owned(),
        chat_name: format!("chat {chat_id}"),
        dm_participant_id: None,
        last_message: last_at.map(|at| message(&format!("{chat_id}-last"), at)),
        role: None,
        last_activity: None,
    }
}

/// Accept one WebSocket upgrade on `listener`, returning the request's
/// `Cookie` header and the server side of the socket.
pub async fn accept_socket(listener: TcpListener) -> (Option<String>, WebSocketStream<TcpStream>) {
    let (tcp, _) = listener.accept().await.expect("tcp accept");
    let (cookie_tx, cookie_rx) = oneshot::channel();
    let ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let cookie = req.headers().get(COOKIE).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let _ = cookie_tx.send(cookie);
        Ok(resp)
    })
    .await
    .expect("websocket upgrade");
    (cookie_rx.await.expect("upgrade callback ran"), ws)
}

/// A socket frame in the backend's wire shape.
pub fn message_frame(id: &str, at: &str) -> String {
    serde_json::json!({
        "messageId": id,
        "senderId": "u1",
        "senderUsername": "ann",
        "content": format!("message {id}"),
        "timestamp": at,
    })
    .to_string()
}
