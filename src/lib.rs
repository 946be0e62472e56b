//! Client library for the ChatApp messaging service.
//!
//! SYSTEM CONTEXT
//! ==============
//! The crate talks to the ChatApp HTTP and WebSocket backend and owns only
//! client-side state:
//!
//! - `session`: login, signup, logout and session checks.
//! - `chats`: chat previews, creation, history paging, and one live socket
//!   per chat feeding new messages into local state.
//! - `members`: the member list drafted while creating a chat.
//! - `format`: timestamp rendering for list and message views.
//!
//! Network access goes through the `backend::ChatBackend` trait. Stores
//! never navigate themselves; they record a `route::Route` for the caller.

pub mod api_state;
pub mod backend;
pub mod chats;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod members;
pub mod route;
pub mod session;
pub mod socket;
pub mod types;

#[cfg(test)]
pub mod test_helpers;
