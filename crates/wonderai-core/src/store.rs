//! Conversation state shared by the front ends.
//!
//! Three kinds of entry live here: finalized messages, optimistic
//! placeholders keyed by [`PendingId`], and at most one streaming message.
//! [`ChatStore::merged_view`] interleaves them by timestamp.

use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::message::{ChatMessage, PendingId};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    message: ChatMessage,
}

#[derive(Debug)]
pub struct ChatStore {
    finalized: Vec<Entry>,
    optimistic: HashMap<PendingId, Entry>,
    streaming: Option<Entry>,
    next_seq: u64,
    error: Option<String>,
    connected: bool,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        Self {
            finalized: Vec::new(),
            optimistic: HashMap::new(),
            streaming: None,
            next_seq: 0,
            error: None,
            connected: true,
        }
    }

    fn entry(&mut self, message: ChatMessage) -> Entry {
        let seq = self.next_seq;
        self.next_seq += 1;
        Entry { seq, message }
    }

    /// Append a confirmed message. An optimistic entry with the same
    /// `pending_id` is dropped in the same step.
    pub fn append_message(&mut self, mut message: ChatMessage) {
        message.is_optimistic = false;
        message.is_streaming = false;
        if let Some(pending) = &message.pending_id {
            if self.optimistic.remove(pending).is_some() {
                debug!(%pending, "optimistic message confirmed");
            }
        }
        let entry = self.entry(message);
        self.finalized.push(entry);
    }

    /// Append several confirmed messages as one transition.
    pub fn append_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.append_message(message);
        }
    }

    /// Insert a placeholder. A message without a `pending_id` gets one.
    pub fn add_optimistic(&mut self, mut message: ChatMessage) -> PendingId {
        let pending = message
            .pending_id
            .clone()
            .unwrap_or_else(PendingId::generate);
        message.pending_id = Some(pending.clone());
        message.is_optimistic = true;
        let entry = self.entry(message);
        self.optimistic.insert(pending.clone(), entry);
        pending
    }

    pub fn remove_optimistic(&mut self, pending: &PendingId) -> Option<ChatMessage> {
        self.optimistic.remove(pending).map(|e| e.message)
    }

    pub fn optimistic(&self, pending: &PendingId) -> Option<&ChatMessage> {
        self.optimistic.get(pending).map(|e| &e.message)
    }

    pub fn optimistic_len(&self) -> usize {
        self.optimistic.len()
    }

    /// Replace whatever occupies the streaming slot.
    pub fn set_streaming(&mut self, mut message: ChatMessage) {
        message.is_streaming = true;
        let entry = self.entry(message);
        if self.streaming.replace(entry).is_some() {
            debug!("streaming slot replaced while occupied");
        }
    }

    /// Overwrite the streaming text. Returns false when the slot is empty.
    pub fn update_streaming(&mut self, full_content: &str) -> bool {
        match self.streaming.as_mut() {
            Some(entry) => {
                entry.message.text.clear();
                entry.message.text.push_str(full_content);
                true
            }
            None => false,
        }
    }

    pub fn take_streaming(&mut self) -> Option<ChatMessage> {
        self.streaming.take().map(|e| e.message)
    }

    pub fn streaming(&self) -> Option<&ChatMessage> {
        self.streaming.as_ref().map(|e| &e.message)
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.finalized.iter().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.finalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty() && self.optimistic.is_empty() && self.streaming.is_none()
    }

    /// Finalized, optimistic and streaming entries ordered by timestamp.
    /// Equal timestamps keep insertion order.
    pub fn merged_view(&self) -> Vec<&ChatMessage> {
        let mut entries: Vec<&Entry> = self
            .finalized
            .iter()
            .chain(self.optimistic.values())
            .chain(self.streaming.iter())
            .collect();
        entries.sort_by_key(|e| (e.message.timestamp, e.seq));
        entries.into_iter().map(|e| &e.message).collect()
    }

    /// Drop placeholders older than `ttl` while no stream is running.
    pub fn prune_stale_optimistic(&mut self, now_millis: i64, ttl: Duration) -> usize {
        if self.streaming.is_some() {
            return 0;
        }
        let cutoff = now_millis - ttl.as_millis() as i64;
        let before = self.optimistic.len();
        self.optimistic.retain(|_, e| e.message.timestamp > cutoff);
        let removed = before - self.optimistic.len();
        if removed > 0 {
            debug!(removed, "pruned stale optimistic messages");
        }
        removed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn clear(&mut self) {
        self.finalized.clear();
        self.optimistic.clear();
        self.streaming = None;
        self.error = None;
    }
}
