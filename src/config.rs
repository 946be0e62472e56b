//! Client configuration parsed from environment variables.

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://localhost:8000";
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub ws_base_url: String,
    pub history_page_size: usize,
    pub timeouts: Timeouts,
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    /// Config for `base_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns an error if no WebSocket URL can be derived from `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let ws_base_url = derive_ws_base_url(&base_url)?;
        Ok(Self {
            base_url,
            ws_base_url,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            timeouts: Timeouts::default(),
            accept_invalid_certs: false,
        })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `CHATAPP_BASE_URL`: default `https://localhost:8000`
    /// - `CHATAPP_WS_BASE_URL`: derived from the base URL when absent
    /// - `CHATAPP_HISTORY_PAGE_SIZE`: default 50
    /// - `CHATAPP_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHATAPP_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CHATAPP_ACCEPT_INVALID_CERTS`: default false
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable base URL or a malformed boolean.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("CHATAPP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let mut config = Self::new(&base_url)?;

        if let Ok(ws_base_url) = std::env::var("CHATAPP_WS_BASE_URL") {
            config.ws_base_url = ws_base_url.trim_end_matches('/').to_owned();
        }
        config.history_page_size = env_parse_usize("CHATAPP_HISTORY_PAGE_SIZE", DEFAULT_HISTORY_PAGE_SIZE).max(1);
        config.timeouts = Timeouts {
            request_secs: env_parse_u64("CHATAPP_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("CHATAPP_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        config.accept_invalid_certs = match std::env::var("CHATAPP_ACCEPT_INVALID_CERTS") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| ClientError::Config(format!("invalid CHATAPP_ACCEPT_INVALID_CERTS: {raw}")))?,
            Err(_) => false,
        };

        Ok(config)
    }
}

/// Map an HTTP base URL onto the matching WebSocket scheme.
///
/// # Errors
///
/// Returns [`ClientError::InvalidBaseUrl`] for anything but `http`/`https`.
pub fn derive_ws_base_url(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    if let Some(rest) = trimmed.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }

    Err(ClientError::InvalidBaseUrl(base_url.to_owned()))
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_parse_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
