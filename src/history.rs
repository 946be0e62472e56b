//! Cached message history for one chat.
//!
//! Messages are kept in server order, oldest first. History pages arrive
//! newest-first in request order (the newest page, then progressively older
//! ones) while socket pushes arrive at the tail, so merging has to place a
//! page on the correct side of what is already cached and skip ids already
//! present. The list never shrinks.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::HashSet;

use crate::types::ChatMessage;

#[derive(Clone, Debug, PartialEq)]
pub struct ChatDetails {
    chat_id: String,
    messages: Vec<ChatMessage>,
    exhausted: bool,
}

impl ChatDetails {
    #[must_use]
    pub fn new(chat_id: &str) -> Self {
        Self { chat_id: chat_id.to_owned(), messages: Vec::new(), exhausted: false }
    }

    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Id to page backward from.
    #[must_use]
    pub fn earliest_id(&self) -> Option<&str> {
        self.messages.first().map(|message| message.message_id.as_str())
    }

    /// True once the backend has returned a short page: there is nothing
    /// older to fetch.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    #[must_use]
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|message| message.message_id == message_id)
    }

    /// Push a live message. Returns false if the id is already cached.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message.message_id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Merge a history page. Messages at or before the earliest cached
    /// timestamp go in front, later ones at the end; known ids are skipped.
    /// Returns how many messages were added.
    pub fn merge_page(&mut self, page: Vec<ChatMessage>) -> usize {
        let mut known: HashSet<String> = self
            .messages
            .iter()
            .map(|message| message.message_id.clone())
            .collect();
        let earliest = self.messages.first().map(|message| message.timestamp);

        let mut older = Vec::new();
        let mut newer = Vec::new();
        for message in page {
            if !known.insert(message.message_id.clone()) {
                continue;
            }
            match earliest {
                Some(first) if message.timestamp <= first => older.push(message),
                _ => newer.push(message),
            }
        }

        let added = older.len() + newer.len();
        older.append(&mut self.messages);
        older.append(&mut newer);
        self.messages = older;
        added
    }
}
