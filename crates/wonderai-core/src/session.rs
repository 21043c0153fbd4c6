use tracing::{debug, warn};

use crate::assembler::StreamEvent;
use crate::error::{Result, WonderError};
use crate::message::{ChatMessage, PendingId};
use crate::store::ChatStore;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Streaming {
        pending_id: PendingId,
        prompt: String,
        started_at: i64,
    },
    Completed,
    Failed {
        error: String,
        prompt: String,
    },
}

/// Drives one reply at a time through the store.
///
/// `Idle -> Streaming -> Completed | Failed`, and back to `Streaming` on the
/// next send. A send while `Streaming` is rejected.
#[derive(Debug)]
pub struct ChatSession {
    store: ChatStore,
    state: SessionState,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_store(ChatStore::new())
    }

    pub fn with_store(store: ChatStore) -> Self {
        Self {
            store,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, SessionState::Streaming { .. })
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChatStore {
        &mut self.store
    }

    /// Show the user's text immediately and open the streaming slot.
    pub fn begin_send(&mut self, text: &str, now_millis: i64) -> Result<PendingId> {
        if self.is_streaming() {
            return Err(WonderError::Busy);
        }
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(WonderError::EmptyPrompt);
        }

        let pending_id = PendingId::generate();
        self.store.clear_error();
        self.store.add_optimistic(ChatMessage::optimistic(
            prompt,
            pending_id.clone(),
            now_millis,
        ));
        self.store
            .set_streaming(ChatMessage::streaming(pending_id.clone(), now_millis));

        debug!(%pending_id, "session streaming");
        self.state = SessionState::Streaming {
            pending_id: pending_id.clone(),
            prompt: prompt.to_string(),
            started_at: now_millis,
        };
        Ok(pending_id)
    }

    /// Id of the send currently streaming, if any.
    pub fn active_pending_id(&self) -> Option<&PendingId> {
        match &self.state {
            SessionState::Streaming { pending_id, .. } => Some(pending_id),
            _ => None,
        }
    }

    /// Feed an item that belongs to the send `pending_id`.
    ///
    /// Items from an earlier, cancelled send are dropped. Returns whether the
    /// item was applied.
    pub fn handle_for(&mut self, pending_id: &PendingId, item: Result<StreamEvent>) -> bool {
        if self.active_pending_id() != Some(pending_id) {
            debug!(%pending_id, "dropping item from a stale stream");
            return false;
        }
        self.handle(item);
        true
    }

    /// Feed one item from the response stream.
    pub fn handle(&mut self, item: Result<StreamEvent>) {
        match item {
            Ok(event) => self.apply(event),
            Err(e) => self.fail(&e),
        }
    }

    pub fn apply(&mut self, event: StreamEvent) {
        let SessionState::Streaming {
            pending_id,
            prompt,
            started_at,
        } = &self.state
        else {
            debug!("dropping stream event outside a session: {event:?}");
            return;
        };

        match event {
            StreamEvent::Update { full_content, .. } => {
                self.store.update_streaming(&full_content);
            }
            StreamEvent::Complete { full_content } => {
                let pending_id = pending_id.clone();
                let user = ChatMessage::user(prompt.clone(), *started_at)
                    .with_pending_id(pending_id.clone());
                let assistant = match self.store.take_streaming() {
                    Some(mut msg) => {
                        msg.text = full_content;
                        msg
                    }
                    None => ChatMessage::assistant(full_content, *started_at)
                        .with_pending_id(pending_id.clone()),
                };
                self.store.append_messages([user, assistant]);
                self.store.set_connected(true);
                debug!(%pending_id, "session completed");
                self.state = SessionState::Completed;
            }
        }
    }

    /// End the active session with an error and roll back its placeholders.
    pub fn fail(&mut self, error: &WonderError) {
        let SessionState::Streaming {
            pending_id, prompt, ..
        } = &self.state
        else {
            debug!("ignoring failure outside a session: {error}");
            return;
        };

        warn!(%pending_id, "session failed: {error}");
        let pending_id = pending_id.clone();
        let prompt = prompt.clone();
        self.store.take_streaming();
        self.store.remove_optimistic(&pending_id);
        let message = error.to_string();
        self.store.set_error(message.clone());
        if error.is_transport() {
            self.store.set_connected(false);
        }
        self.state = SessionState::Failed {
            error: message,
            prompt,
        };
    }

    /// Stop the active reply. No-op when nothing is streaming.
    pub fn cancel(&mut self) {
        self.fail(&WonderError::Cancelled);
    }

    /// Text of the last failed send, for putting back into the input.
    pub fn failed_prompt(&self) -> Option<&str> {
        match &self.state {
            SessionState::Failed { prompt, .. } => Some(prompt),
            _ => None,
        }
    }

    pub fn dismiss_error(&mut self) {
        self.store.clear_error();
    }
}
