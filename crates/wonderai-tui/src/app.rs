use futures_util::StreamExt;
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use wonderai_core::api::{HealthStatus, ServerMessage};
use wonderai_core::{
    now_millis, CancellationToken, ChatClient, ChatSession, Config, PendingId,
    Result as CoreResult, SessionState, StreamEvent, UserIdentity, WonderError,
};

use crate::tui::AppEvent;

const HISTORY_LIMIT: u32 = 100;

/// Reachability of the backend as shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
    Reconnecting,
}

pub struct App {
    pub should_quit: bool,

    // Chat state
    pub session: ChatSession,
    pub conversation_id: String,
    pub identity: UserIdentity,
    pub reconnecting: bool,
    /// Short-lived notice in the footer, e.g. after Ctrl+N.
    pub notice: Option<String>,

    // Input line
    pub input: String,
    pub cursor: usize, // char index into input

    // Chat view
    pub scroll: u16,
    pub max_scroll: u16,
    pub follow: bool, // pinned to the newest message
    pub chat_height: u16,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8,

    pub client: ChatClient,
    pub config: Config,
    stream_cancel: Option<CancellationToken>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        config: Config,
        identity: UserIdentity,
        events: UnboundedSender<AppEvent>,
    ) -> anyhow::Result<Self> {
        let client = ChatClient::from_config(&config)?;
        let conversation_id = config.conversation_id().to_string();
        info!(
            base_url = client.base_url(),
            conversation = %conversation_id,
            user = identity.id(),
            "chat session ready"
        );

        Ok(Self {
            should_quit: false,

            session: ChatSession::new(),
            conversation_id,
            identity,
            reconnecting: false,
            notice: None,

            input: String::new(),
            cursor: 0,

            scroll: 0,
            max_scroll: 0,
            follow: true,
            chat_height: 0,
            chat_area: None,

            animation_frame: 0,

            client,
            config,
            stream_cancel: None,
            events,
        })
    }

    pub fn connectivity(&self) -> Connectivity {
        if self.reconnecting {
            Connectivity::Reconnecting
        } else if self.session.store().is_connected() {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    /// Fetch earlier messages of the conversation in the background.
    pub fn load_history(&self) {
        let client = self.client.clone();
        let tx = self.events.clone();
        let user = self.identity.id().to_string();
        let conversation = self.conversation_id.clone();
        tokio::spawn(async move {
            let result = client
                .list_messages(&user, &conversation, HISTORY_LIMIT, 0)
                .await;
            let _ = tx.send(AppEvent::History(result));
        });
    }

    pub fn on_history(&mut self, result: CoreResult<Vec<ServerMessage>>) {
        match result {
            Ok(history) => {
                let fallback = now_millis();
                let messages: Vec<_> = history
                    .iter()
                    .filter_map(|m| m.to_chat_message(fallback))
                    .collect();
                debug!(count = messages.len(), "history loaded");
                self.session.store_mut().append_messages(messages);
                self.follow = true;
            }
            // A fresh conversation has no history yet.
            Err(WonderError::Status { status, .. }) if status.as_u16() == 404 => {
                debug!(conversation = %self.conversation_id, "no history");
            }
            Err(e) => {
                warn!("failed to load history: {e}");
                self.session.store_mut().set_error(format!("history: {e}"));
                if e.is_transport() {
                    self.session.store_mut().set_connected(false);
                    self.start_reconnect();
                }
            }
        }
    }

    /// Send the input line and start streaming the reply.
    pub fn submit(&mut self) {
        let text = self.input.clone();
        let pending_id = match self.session.begin_send(&text, now_millis()) {
            Ok(id) => id,
            Err(e) => {
                debug!("send rejected: {e}");
                return;
            }
        };

        self.input.clear();
        self.cursor = 0;
        self.follow = true;
        self.notice = None;

        let cancel = CancellationToken::new();
        self.stream_cancel = Some(cancel.clone());

        let client = self.client.clone();
        let tx = self.events.clone();
        let user = self.identity.id().to_string();
        let conversation = self.conversation_id.clone();
        let prompt = text.trim().to_string();
        debug!(%pending_id, "streaming reply");

        tokio::spawn(async move {
            let send = |item| tx.send(AppEvent::Stream(pending_id.clone(), item));
            match client
                .stream_message(&conversation, &prompt, &user, cancel)
                .await
            {
                Ok(mut stream) => {
                    while let Some(item) = stream.next().await {
                        if send(item).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = send(Err(e));
                }
            }
        });
    }

    pub fn on_stream(&mut self, pending_id: PendingId, item: CoreResult<StreamEvent>) {
        let transport_failure = matches!(&item, Err(e) if e.is_transport());
        if !self.session.handle_for(&pending_id, item) {
            return;
        }

        if self.is_streaming() {
            return;
        }
        self.stream_cancel = None;

        if let SessionState::Failed { .. } = self.session.state() {
            self.restore_failed_prompt();
            if transport_failure {
                self.start_reconnect();
            }
        }
    }

    /// Esc: stop the reply if one is running, otherwise clear the banner.
    pub fn cancel_or_dismiss(&mut self) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.cancel();
            self.session.cancel();
            self.restore_failed_prompt();
        } else {
            self.session.dismiss_error();
            self.notice = None;
        }
    }

    fn restore_failed_prompt(&mut self) {
        if !self.input.is_empty() {
            return;
        }
        if let Some(prompt) = self.session.failed_prompt() {
            self.input = prompt.to_string();
            self.cursor = self.input.chars().count();
        }
    }

    /// Probe the backend until it answers, under the configured retry policy.
    pub fn start_reconnect(&mut self) {
        if self.reconnecting {
            return;
        }
        self.reconnecting = true;
        let client = self.client.clone();
        let tx = self.events.clone();
        let policy = self.config.retry_policy();
        tokio::spawn(async move {
            let result = client.reconnect(&policy).await;
            let _ = tx.send(AppEvent::Reconnected(result));
        });
    }

    pub fn on_reconnected(&mut self, result: CoreResult<HealthStatus>) {
        self.reconnecting = false;
        match result {
            Ok(health) => {
                info!(status = %health.status, "reconnected");
                self.session.store_mut().set_connected(true);
                self.notice = Some("reconnected".to_string());
            }
            Err(e) => {
                warn!("reconnect gave up: {e}");
                self.session.store_mut().set_connected(false);
                self.session
                    .store_mut()
                    .set_error(format!("backend unreachable: {e}"));
            }
        }
    }

    /// Ctrl+N: replace the stored user identifier.
    pub fn regenerate_identity(&mut self) {
        if self.is_streaming() {
            return;
        }
        match UserIdentity::regenerate(self.identity.path()) {
            Ok(identity) => {
                self.notice = Some(format!("new identity {}", identity.id()));
                self.identity = identity;
            }
            Err(e) => {
                warn!("failed to regenerate identity: {e}");
                self.session
                    .store_mut()
                    .set_error(format!("identity: {e}"));
            }
        }
    }

    /// Tick animation frame and drop placeholders that never resolved
    pub fn tick(&mut self) {
        if self.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        let ttl = self.config.optimistic_ttl();
        self.session
            .store_mut()
            .prune_stale_optimistic(now_millis(), ttl);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.min(self.max_scroll).saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll);
        if self.scroll >= self.max_scroll {
            self.follow = true;
        }
    }

    pub fn page_size(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let identity = UserIdentity::load_or_create(&dir.path().join("user_id")).unwrap();
        let mut config = Config::new();
        // Nothing listens here; tests never wait on the network.
        config.api_base_url = "http://127.0.0.1:9".to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(config, identity, tx).unwrap();
        (app, rx, dir)
    }

    fn update(full: &str) -> StreamEvent {
        StreamEvent::Update {
            content: String::new(),
            full_content: full.to_string(),
        }
    }

    fn active(app: &App) -> PendingId {
        app.session.active_pending_id().cloned().unwrap()
    }

    fn view_texts(app: &App) -> Vec<String> {
        app.session
            .store()
            .merged_view()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn submit_then_stream_events_finalize_reply() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "Hello".to_string();
        app.cursor = 5;
        app.submit();
        let id = active(&app);

        assert!(app.is_streaming());
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);

        app.on_stream(id.clone(), Ok(update("Hi")));
        app.on_stream(
            id,
            Ok(StreamEvent::Complete {
                full_content: "Hi there".to_string(),
            }),
        );

        assert!(!app.is_streaming());
        assert_eq!(view_texts(&app), vec!["Hello", "Hi there"]);
    }

    #[tokio::test]
    async fn failure_restores_prompt_into_empty_input() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "Hello".to_string();
        app.submit();
        let id = active(&app);
        app.on_stream(
            id,
            Err(WonderError::Server {
                message: "rate limited".to_string(),
                partial: String::new(),
            }),
        );

        assert_eq!(app.session.store().error(), Some("rate limited"));
        assert_eq!(app.input, "Hello");
        assert_eq!(app.cursor, 5);
        // Server errors leave connectivity alone.
        assert_eq!(app.connectivity(), Connectivity::Online);
    }

    #[tokio::test]
    async fn escape_cancels_then_dismisses() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "Hello".to_string();
        app.submit();
        let id = active(&app);

        app.cancel_or_dismiss();
        assert!(!app.is_streaming());
        assert_eq!(app.session.store().error(), Some("cancelled"));
        assert_eq!(app.input, "Hello");

        // The spawned task's own Cancelled item arrives late and is ignored.
        app.on_stream(id, Err(WonderError::Cancelled));
        assert_eq!(app.session.store().error(), Some("cancelled"));

        app.cancel_or_dismiss();
        assert_eq!(app.session.store().error(), None);
    }

    #[tokio::test]
    async fn late_items_from_a_cancelled_reply_leave_the_next_send_alone() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "first".to_string();
        app.submit();
        let first = active(&app);
        app.cancel_or_dismiss();

        app.input = "second".to_string();
        app.submit();
        let second = active(&app);

        app.on_stream(first.clone(), Err(WonderError::Cancelled));
        app.on_stream(
            first,
            Ok(StreamEvent::Complete {
                full_content: "reply to first".to_string(),
            }),
        );
        assert!(app.is_streaming());
        assert_eq!(app.session.store().error(), None);
        assert_eq!(view_texts(&app), vec!["second", ""]);

        app.on_stream(
            second,
            Ok(StreamEvent::Complete {
                full_content: "reply to second".to_string(),
            }),
        );
        assert_eq!(view_texts(&app), vec!["second", "reply to second"]);
    }

    #[tokio::test]
    async fn blank_input_does_not_send() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "   ".to_string();
        app.submit();
        assert!(!app.is_streaming());
        assert!(app.session.store().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_goes_offline_and_reconnects() {
        let (mut app, _rx, _dir) = test_app();
        app.input = "Hello".to_string();
        app.submit();
        let id = active(&app);
        app.on_stream(
            id,
            Err(WonderError::Interrupted {
                reason: "connection reset".to_string(),
                partial: "Hi".to_string(),
            }),
        );
        assert_eq!(app.connectivity(), Connectivity::Reconnecting);

        app.on_reconnected(Ok(HealthStatus {
            status: "healthy".to_string(),
            timestamp: None,
            version: None,
            services: None,
        }));
        assert_eq!(app.connectivity(), Connectivity::Online);
    }

    #[tokio::test]
    async fn regenerate_identity_swaps_id() {
        let (mut app, _rx, _dir) = test_app();
        let before = app.identity.id().to_string();
        app.regenerate_identity();
        assert_ne!(app.identity.id(), before);
        assert!(app.notice.as_deref().unwrap().starts_with("new identity user_"));
    }

    #[test]
    fn scrolling_releases_and_regains_follow() {
        let dir = tempfile::tempdir().unwrap();
        let identity = UserIdentity::load_or_create(&dir.path().join("user_id")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new(), identity, tx).unwrap();
        app.max_scroll = 10;
        app.scroll = 10;

        app.scroll_up(4);
        assert!(!app.follow);
        assert_eq!(app.scroll, 6);

        app.scroll_down(100);
        assert_eq!(app.scroll, 10);
        assert!(app.follow);
    }
}
