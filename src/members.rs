//! Member list drafted while creating a chat.
//!
//! Usernames are resolved to user ids with `GET /users/{username}` before
//! they join the draft, so the create request only ever carries ids the
//! backend knows about.

#[cfg(test)]
#[path = "members_test.rs"]
mod members_test;

use tokio_util::sync::CancellationToken;

use crate::backend::{ChatBackend, cancellable};
use crate::error::ClientError;
use crate::session::{INTERNAL_ERROR_SENTENCE, Session};

pub const USERNAME_REQUIRED: &str = "Please enter a username.";
pub const OWN_USERNAME: &str = "You have entered your own username.";
pub const LOOKUP_FAILED: &str = "Could not look up that user. Please try again.";

#[derive(Debug, Default)]
pub struct MemberDraft {
    members: Vec<String>,
    error: Option<String>,
    cancel: CancellationToken,
}

impl MemberDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `username` and add its user id. Returns whether the member
    /// was added; on rejection the reason is in [`MemberDraft::error`]. A
    /// cancelled lookup adds nothing and leaves the error as it was.
    pub async fn add_member<B: ChatBackend + ?Sized>(&mut self, backend: &B, session: &Session, username: &str) -> bool {
        let username = username.trim();
        if username.is_empty() {
            self.error = Some(USERNAME_REQUIRED.to_owned());
            return false;
        }
        if session.is_current_user(username) {
            self.error = Some(OWN_USERNAME.to_owned());
            return false;
        }

        let user_id = match cancellable(&self.cancel, backend.lookup_user(username)).await {
            Ok(user_id) => user_id,
            Err(ClientError::Cancelled) => {
                tracing::debug!(%username, "user lookup cancelled");
                return false;
            }
            Err(e) => {
                tracing::warn!(%username, error = %e, "user lookup failed");
                self.error = Some(lookup_failure_message(username, &e));
                return false;
            }
        };

        if self.members.contains(&user_id) {
            self.error = Some(format!("User \"{username}\" is already in the group of users to be added."));
            return false;
        }

        tracing::debug!(%username, %user_id, "member added to draft");
        self.members.push(user_id);
        self.error = None;
        true
    }

    pub fn remove_member(&mut self, user_id: &str) {
        self.members.retain(|member| member != user_id);
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.error = None;
    }

    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Consume the draft, yielding the user ids for the create request.
    #[must_use]
    pub fn into_members(mut self) -> Vec<String> {
        std::mem::take(&mut self.members)
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Token that aborts an in-flight lookup when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for MemberDraft {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lookup_failure_message(username: &str, error: &ClientError) -> String {
    match error {
        ClientError::NotFound => format!("User \"{username}\" does not exist."),
        e if e.is_transport() => INTERNAL_ERROR_SENTENCE.to_owned(),
        _ => LOOKUP_FAILED.to_owned(),
    }
}
