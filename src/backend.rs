//! Backend seam: every ChatApp endpoint the client consumes.
//!
//! SYSTEM CONTEXT
//! ==============
//! `ChatBackend` is the boundary between client state and the network. The
//! stores only ever talk to the trait, so tests drive them with an in-memory
//! implementation while `HttpBackend` performs the real calls with `reqwest`.
//!
//! SESSION COOKIE
//! ==============
//! The backend authenticates with a `session_id` cookie set by `/login` and
//! `/signup`. `HttpBackend` keeps it in a cookie jar shared by every request
//! and hands it to socket connections, which do not go through `reqwest`.

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::socket::SocketTarget;
use crate::types::{ChatMessage, ChatPreview, HistoryQuery, LoginRequest, NewChatRequest, SignupRequest};

pub const SESSION_COOKIE: &str = "session_id";

#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /session`.
    async fn check_session(&self) -> Result<(), ClientError>;
    /// `POST /login`.
    async fn login(&self, req: &LoginRequest) -> Result<(), ClientError>;
    /// `POST /signup`.
    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError>;
    /// `POST /logout`.
    async fn logout(&self) -> Result<(), ClientError>;
    /// `GET /chats/my-chats`.
    async fn my_chats(&self) -> Result<Vec<ChatPreview>, ClientError>;
    /// `GET /chats/available-chats`.
    async fn available_chats(&self) -> Result<Vec<ChatPreview>, ClientError>;
    /// `POST /chats`. Only `201 Created` counts as success.
    async fn create_chat(&self, req: &NewChatRequest) -> Result<ChatPreview, ClientError>;
    /// `GET /chats/{id}?start_id=&count=`.
    async fn chat_history(&self, chat_id: &str, query: &HistoryQuery) -> Result<Vec<ChatMessage>, ClientError>;
    /// `GET /users/{username}`, returning the user id.
    async fn lookup_user(&self, username: &str) -> Result<String, ClientError>;
    /// Where and how to open the socket for `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket URL cannot be built.
    fn socket_target(&self, chat_id: &str) -> Result<SocketTarget, ClientError>;
}

/// Race `fut` against `cancel`.
///
/// # Errors
///
/// Returns [`ClientError::Cancelled`] if the token fires first, otherwise the
/// future's own result.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ClientError::Cancelled),
        result = fut => result,
    }
}

// =============================================================================
// HTTP BACKEND
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    ws_base_url: String,
    connect_timeout: Duration,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url).map_err(|_| ClientError::InvalidBaseUrl(config.base_url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(config.base_url.clone()));
        }

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            jar,
            base,
            ws_base_url: config.ws_base_url.clone(),
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
        })
    }

    /// Seed the cookie jar with a session id obtained earlier.
    pub fn restore_session(&self, session_id: &str) {
        self.jar
            .add_cookie_str(&format!("{SESSION_COOKIE}={session_id}; Path=/"), &self.base);
    }

    /// Current session id from the cookie jar, if the backend has set one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base)?;
        let raw = header.to_str().ok()?;
        cookie_value(raw, SESSION_COOKIE).map(ToOwned::to_owned)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        endpoint_url(&self.base, segments)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ClientError> {
        let url = self.url(segments)?;
        tracing::debug!(%method, %url, "backend request");
        Ok(self.http.request(method, url))
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn check_session(&self) -> Result<(), ClientError> {
        let resp = self.request(Method::GET, &["session"])?.send().await?;
        expect_success(&resp)
    }

    async fn login(&self, req: &LoginRequest) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, &["login"])?.json(req).send().await?;
        expect_success(&resp)
    }

    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, &["signup"])?.json(req).send().await?;
        expect_success(&resp)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, &["logout"])?.send().await?;
        expect_success(&resp)
    }

    async fn my_chats(&self) -> Result<Vec<ChatPreview>, ClientError> {
        let resp = self.request(Method::GET, &["chats", "my-chats"])?.send().await?;
        decode_success(resp).await
    }

    async fn available_chats(&self) -> Result<Vec<ChatPreview>, ClientError> {
        let resp = self
            .request(Method::GET, &["chats", "available-chats"])?
            .send()
            .await?;
        decode_success(resp).await
    }

    async fn create_chat(&self, req: &NewChatRequest) -> Result<ChatPreview, ClientError> {
        let resp = self.request(Method::POST, &["chats"])?.json(req).send().await?;
        if resp.status() != StatusCode::CREATED {
            return Err(ClientError::from_status(resp.status()));
        }
        decode(resp).await
    }

    async fn chat_history(&self, chat_id: &str, query: &HistoryQuery) -> Result<Vec<ChatMessage>, ClientError> {
        let resp = self
            .request(Method::GET, &["chats", chat_id])?
            .query(&query.query_pairs())
            .send()
            .await?;
        decode_success(resp).await
    }

    async fn lookup_user(&self, username: &str) -> Result<String, ClientError> {
        let resp = self.request(Method::GET, &["users", username])?.send().await?;
        decode_success(resp).await
    }

    fn socket_target(&self, chat_id: &str) -> Result<SocketTarget, ClientError> {
        let cookie = self
            .session_id()
            .map(|session_id| format!("{SESSION_COOKIE}={session_id}"));
        Ok(SocketTarget { url: socket_url(&self.ws_base_url, chat_id), cookie, connect_timeout: self.connect_timeout })
    }
}

fn expect_success(resp: &Response) -> Result<(), ClientError> {
    let status = resp.status();
    if status.is_success() { Ok(()) } else { Err(ClientError::from_status(status)) }
}

async fn decode_success<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    expect_success(&resp)?;
    decode(resp).await
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Append percent-encoded path segments to `base`.
fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn socket_url(ws_base_url: &str, chat_id: &str) -> String {
    format!("{}/ws/chats/{chat_id}", ws_base_url.trim_end_matches('/'))
}

/// Pick one cookie's value out of a `Cookie` header.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}
