// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use swe_model::Message;
use uuid::Uuid;

/// Rough token estimate (chars / 4) for one message.
pub fn approx_tokens(msg: &Message) -> usize {
    msg.render().len() / 4
}

/// In-memory conversation log for one agent run.
///
/// The log is rebuilt on every run (from the task text and the latest
/// summary when resuming); only [`swe_state::TaskState`] is persisted.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list.
    pub token_count: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4().to_string(), messages: Vec::new(), token_count: 0 }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += approx_tokens(&msg);
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Swap in a new message list (after compaction).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(approx_tokens).sum();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The trailing `n` messages (fewer when the log is shorter).
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_unique_id() {
        assert_ne!(Session::new().id, Session::new().id);
    }

    #[test]
    fn push_increments_token_count() {
        let mut s = Session::new();
        s.push(Message::user("a".repeat(40)));
        assert_eq!(s.token_count, 10);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn replace_messages_recalculates() {
        let mut s = Session::new();
        s.push_many([Message::user("x".repeat(400)), Message::assistant("y".repeat(400))]);
        s.replace_messages(vec![Message::user("z".repeat(8))]);
        assert_eq!(s.token_count, 2);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn tail_is_clamped() {
        let mut s = Session::new();
        s.push_many((0..3).map(|i| Message::user(format!("m{i}"))));
        assert_eq!(s.tail(2).len(), 2);
        assert_eq!(s.tail(2)[0].as_text(), Some("m1"));
        assert_eq!(s.tail(10).len(), 3);
    }
}
