//! Authentication session: the explicit session context plus the
//! check/login/signup/logout operations.
//!
//! SYSTEM CONTEXT
//! ==============
//! `Session` is the value the rest of the client receives at construction
//! instead of reading ambient storage. It exists from a successful login,
//! signup, or session check until logout or an expired-session redirect.
//!
//! ERROR HANDLING
//! ==============
//! Every backend failure is mapped to the display string shown next to the
//! auth form and logged. Nothing is swallowed, including logout failures.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api_state::ApiState;
use crate::backend::{ChatBackend, cancellable};
use crate::error::ClientError;
use crate::route::Route;
use crate::types::{LoginRequest, SignupRequest};

pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";
pub const INVALID_SESSION: &str = "Invalid session / no session exists";
pub const BAD_CREDENTIALS: &str = "Username or password is incorrect.";
pub const UNKNOWN_ERROR: &str = "Unknown error has occurred. Please contact website administrator.";
pub const USERNAME_TAKEN: &str = "This username is already taken. Try another.";
pub const DATABASE_ERROR: &str = "Database error. Please contact website administrator.";
pub const PASSWORDS_DIFFER: &str = "Passwords do not match";
pub const LOGOUT_FAILED: &str = "Could not log out. Please try again.";
pub const INTERNAL_ERROR: &str = "Internal Server Error";
pub const INTERNAL_ERROR_SENTENCE: &str = "Internal Server Error.";

/// The authenticated user, as far as the client knows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    username: Option<String>,
}

impl Session {
    #[must_use]
    pub fn for_user(username: &str) -> Self {
        Self { username: Some(username.to_owned()) }
    }

    /// A session revived from an existing cookie; the username is unknown.
    #[must_use]
    pub fn restored() -> Self {
        Self { username: None }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn is_current_user(&self, username: &str) -> bool {
        self.username.as_deref() == Some(username)
    }
}

pub struct SessionClient<B: ChatBackend> {
    backend: Arc<B>,
    state: ApiState<()>,
    session: Option<Session>,
    navigate_to: Option<Route>,
    session_expired: bool,
    cancel: CancellationToken,
}

impl<B: ChatBackend> SessionClient<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: ApiState::new(),
            session: None,
            navigate_to: None,
            session_expired: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Validate the session cookie with `GET /session`.
    pub async fn check_session(&mut self) {
        let checkpoint = self.state.begin_loading();
        match cancellable(&self.cancel, self.backend.check_session()).await {
            Ok(()) => {
                if self.session.is_none() {
                    self.session = Some(Session::restored());
                }
                self.state.set_success(());
            }
            Err(ClientError::Cancelled) => self.state.restore(checkpoint),
            Err(e) => {
                tracing::info!(error = %e, "session check failed");
                if matches!(e, ClientError::Unauthorized) {
                    self.session = None;
                }
                self.state.set_error(check_session_message(&e));
            }
        }
    }

    /// `POST /login`. On success the session is recorded and the caller is
    /// sent to the chat list; on failure the user stays on the form.
    pub async fn login(&mut self, username: &str, password: &str, remember_me: bool) {
        let checkpoint = self.state.begin_loading();
        let req = LoginRequest { username: username.to_owned(), password: password.to_owned(), remember_me };
        match cancellable(&self.cancel, self.backend.login(&req)).await {
            Ok(()) => {
                tracing::info!(%username, "logged in");
                self.start_session(username);
            }
            Err(ClientError::Cancelled) => self.state.restore(checkpoint),
            Err(e) => {
                tracing::warn!(%username, error = %e, "login failed");
                self.state.set_error(login_failure_message(&e));
            }
        }
    }

    /// `POST /signup`, after checking that both passwords match.
    pub async fn signup(&mut self, username: &str, password: &str, confirm_password: &str) {
        if password != confirm_password {
            self.state.set_error(PASSWORDS_DIFFER);
            return;
        }

        let checkpoint = self.state.begin_loading();
        let req = SignupRequest { username: username.to_owned(), password: password.to_owned() };
        match cancellable(&self.cancel, self.backend.signup(&req)).await {
            Ok(()) => {
                tracing::info!(%username, "signed up");
                self.start_session(username);
            }
            Err(ClientError::Cancelled) => self.state.restore(checkpoint),
            Err(e) => {
                tracing::warn!(%username, error = %e, "signup failed");
                self.state.set_error(signup_failure_message(&e));
            }
        }
    }

    /// `POST /logout`. The local session is only dropped once the backend
    /// confirms.
    pub async fn logout(&mut self) {
        let checkpoint = self.state.begin_loading();
        match cancellable(&self.cancel, self.backend.logout()).await {
            Ok(()) => {
                tracing::info!("logged out");
                self.session = None;
                self.state.reset();
                self.navigate_to = Some(Route::Home);
            }
            Err(ClientError::Cancelled) => self.state.restore(checkpoint),
            Err(e) => {
                tracing::warn!(error = %e, "logout failed");
                self.state.set_error(LOGOUT_FAILED);
            }
        }
    }

    /// Feed a navigation request coming from another store. An
    /// expired-session redirect ends the local session and arms the notice
    /// shown on the login screen.
    pub fn handle_navigation(&mut self, route: &Route) {
        if matches!(route, Route::Login { session_expired: true }) {
            self.session = None;
            self.session_expired = true;
        }
    }

    /// One-shot notice for the login screen after an expired session.
    pub fn take_session_expired_notice(&mut self) -> Option<&'static str> {
        std::mem::take(&mut self.session_expired).then_some(SESSION_EXPIRED_NOTICE)
    }

    fn start_session(&mut self, username: &str) {
        self.session = Some(Session::for_user(username));
        self.session_expired = false;
        self.state.set_success(());
        self.navigate_to = Some(Route::Chats);
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> &ApiState<()> {
        &self.state
    }

    #[must_use]
    pub fn error(&self) -> &str {
        self.state.error()
    }

    #[must_use]
    pub fn pending_navigation(&self) -> Option<&Route> {
        self.navigate_to.as_ref()
    }

    pub fn take_navigation(&mut self) -> Option<Route> {
        self.navigate_to.take()
    }

    /// Token that aborts in-flight requests when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<B: ChatBackend> Drop for SessionClient<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn check_session_message(error: &ClientError) -> &'static str {
    if error.is_transport() { INTERNAL_ERROR } else { INVALID_SESSION }
}

fn login_failure_message(error: &ClientError) -> &'static str {
    match error {
        e if e.is_transport() => INTERNAL_ERROR_SENTENCE,
        ClientError::Unauthorized => BAD_CREDENTIALS,
        _ => UNKNOWN_ERROR,
    }
}

fn signup_failure_message(error: &ClientError) -> &'static str {
    match error.status() {
        Some(409) => USERNAME_TAKEN,
        Some(500) => DATABASE_ERROR,
        _ => UNKNOWN_ERROR,
    }
}
