//! Routes one session's event stream to the pipeline and collaborators.

use std::sync::Arc;

use {
    tokio::sync::{mpsc, watch},
    tracing::{debug, error, info, warn},
};

use crate::{
    command::CommandDescriptor,
    context::ContextFactory,
    credentials::CredentialStore,
    dispatch::CommandDispatcher,
    gate::{GateDecision, PauseGate},
    normalize::{MessageNormalizer, NormalizedMessage, normalize_own_jid},
    session::ConnectionState,
    settings::BotSettings,
    store::{Greeter, MessageStore, PausedChats},
    transport::{CloseReason, ConnectionUpdate, MessagesUpsert, SessionEvent, SessionHandle, UpsertKind},
    types::{ChatUpdate, ParticipantsUpdate, RawMessage},
};

pub const BOT_NAME: &str = "Alya";

pub struct EventRouter {
    settings: Arc<BotSettings>,
    normalizer: MessageNormalizer,
    gate: PauseGate,
    dispatcher: CommandDispatcher,
    credentials: Arc<CredentialStore>,
    store: Arc<dyn MessageStore>,
    greeter: Option<Arc<dyn Greeter>>,
}

impl EventRouter {
    pub fn new(
        settings: Arc<BotSettings>,
        commands: Vec<CommandDescriptor>,
        store: Arc<dyn MessageStore>,
        paused: Arc<dyn PausedChats>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            normalizer: MessageNormalizer::new(Arc::clone(&settings), Arc::clone(&store)),
            gate: PauseGate::new(settings.prefix.clone(), paused),
            dispatcher: CommandDispatcher::new(
                commands,
                Arc::clone(&settings),
                ContextFactory::new(Arc::clone(&store)),
            ),
            settings,
            credentials,
            store,
            greeter: None,
        }
    }

    #[must_use]
    pub fn with_greeter(mut self, greeter: Arc<dyn Greeter>) -> Self {
        self.greeter = Some(greeter);
        self
    }

    /// Consume events until the session closes or its stream ends.
    ///
    /// Returns the close reason. Events arriving after the first close are
    /// never read.
    pub async fn run(
        self: &Arc<Self>,
        session: Arc<dyn SessionHandle>,
        mut events: mpsc::Receiver<SessionEvent>,
        state: &watch::Sender<ConnectionState>,
    ) -> CloseReason {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connection(ConnectionUpdate::Connecting) => {
                    state.send_replace(ConnectionState::Connecting);
                },
                SessionEvent::Connection(ConnectionUpdate::Open) => {
                    state.send_replace(ConnectionState::Open);
                    info!(user = ?session.user_id(), "session open");
                    self.spawn_announcement(Arc::clone(&session));
                },
                SessionEvent::Connection(ConnectionUpdate::Close(reason)) => {
                    info!(reason = %reason, "session closed");
                    return reason;
                },
                SessionEvent::CredentialsUpdate(credentials) => {
                    if let Err(e) = self.credentials.save(&credentials) {
                        error!(error = %e, "failed to persist credentials");
                    }
                },
                SessionEvent::Participants(update) => self.spawn_greeting(update, &session),
                SessionEvent::ChatsUpdate(chats) => self.spawn_chat_saves(chats),
                SessionEvent::MessagesUpsert(upsert) => self.spawn_pipeline(upsert, &session),
            }
        }
        CloseReason::new(None, "event stream ended")
    }

    fn spawn_announcement(self: &Arc<Self>, session: Arc<dyn SessionHandle>) {
        let Some(own) = session.user_id().map(|j| normalize_own_jid(&j)) else {
            return;
        };
        let text = self.announcement();
        tokio::spawn(async move {
            if let Err(e) = session.send_text(&own, &text, None).await {
                warn!(error = %e, "failed to send startup announcement");
            }
        });
    }

    fn announcement(&self) -> String {
        let mut sudo: Vec<_> = self.settings.sudo.iter().map(String::as_str).collect();
        sudo.sort_unstable();
        format!(
            "*{BOT_NAME} connected*\n\nVersion: {}\nPlugins: {}\nMode: {}\nPrefix: {}\nSudo: {}",
            env!("CARGO_PKG_VERSION"),
            self.dispatcher.commands().len(),
            self.settings.work_type,
            self.settings.prefix.source(),
            if sudo.is_empty() {
                "none".to_string()
            } else {
                sudo.join(", ")
            },
        )
    }

    fn spawn_greeting(&self, update: ParticipantsUpdate, session: &Arc<dyn SessionHandle>) {
        let Some(greeter) = self.greeter.clone() else {
            return;
        };
        let session = Arc::clone(session);
        tokio::spawn(async move {
            if let Err(e) = greeter.greet(&update, session).await {
                warn!(group = %update.id, error = %e, "greeting failed");
            }
        });
    }

    fn spawn_chat_saves(&self, chats: Vec<ChatUpdate>) {
        for chat in chats {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(e) = store.save_chat(&chat).await {
                    warn!(chat_id = %chat.id, error = %e, "failed to save chat");
                }
            });
        }
    }

    fn spawn_pipeline(self: &Arc<Self>, upsert: MessagesUpsert, session: &Arc<dyn SessionHandle>) {
        if upsert.kind != UpsertKind::Notify {
            debug!(kind = ?upsert.kind, count = upsert.messages.len(), "ignoring non-live batch");
            return;
        }
        let Some(raw) = upsert.messages.into_iter().next() else {
            return;
        };
        let router = Arc::clone(self);
        let session = Arc::clone(session);
        tokio::spawn(async move {
            if let Err(e) = router.handle_message(&session, &raw).await {
                router.report_error(&session, &e).await;
            }
        });
    }

    /// Normalize → gate → log → dispatch for one live message.
    pub async fn handle_message(
        &self,
        session: &Arc<dyn SessionHandle>,
        raw: &RawMessage,
    ) -> anyhow::Result<()> {
        let Some(message) = self.normalizer.process(raw, session.as_ref()).await? else {
            return Ok(());
        };
        if self.gate.check(&message).await == GateDecision::Suppressed {
            return Ok(());
        }
        if self.settings.logs {
            self.log_message(session.as_ref(), &message).await;
        }
        self.dispatcher.dispatch(Arc::clone(session), message).await;
        Ok(())
    }

    async fn log_message(&self, session: &dyn SessionHandle, message: &NormalizedMessage) {
        let chat = if message.is_group {
            match session.group_metadata(&message.chat_id).await {
                Ok(meta) => meta.subject,
                Err(_) => message.chat_id.clone(),
            }
        } else {
            message.chat_id.clone()
        };
        let name = match self.store.get_name(&message.sender).await {
            Ok(Some(name)) => name,
            _ => message
                .push_name
                .clone()
                .unwrap_or_else(|| message.sender.clone()),
        };
        info!(chat = %chat, sender = %name, "{}", message.summary());
    }

    /// Log and forward an error to the operator's own chat.
    async fn report_error(&self, session: &Arc<dyn SessionHandle>, err: &anyhow::Error) {
        error!(error = %err, "message pipeline failed");
        let Some(own) = session.user_id().map(|j| normalize_own_jid(&j)) else {
            return;
        };
        let text = format!("*{BOT_NAME} error*\n\n{err:#}");
        if let Err(e) = session.send_text(&own, &text, None).await {
            warn!(error = %e, "failed to report error to own chat");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        super::*,
        crate::{
            command::{Trigger, handler_fn},
            testing::{FakeSession, MemoryPaused, MemoryStore},
        },
        alya_config::AlyaConfig,
        async_trait::async_trait,
        serde_json::{Value, json},
        std::sync::Mutex,
    };

    struct Harness {
        router: Arc<EventRouter>,
        session: Arc<FakeSession>,
        store: Arc<MemoryStore>,
        credentials: Arc<CredentialStore>,
        calls: Arc<Mutex<Vec<String>>>,
        _dir: tempfile::TempDir,
    }

    fn harness(config: AlyaConfig, paused: Arc<MemoryPaused>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(BotSettings::from_config(&config).unwrap());
        let store = Arc::new(MemoryStore::default());
        let credentials = Arc::new(CredentialStore::new(dir.path()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let commands = vec![CommandDescriptor::new(
            "echo",
            Trigger::Text,
            handler_fn(move |ctx, _input| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(ctx.message().id.clone());
                    Ok(())
                }
            }),
        )];
        let router = Arc::new(EventRouter::new(
            settings,
            commands,
            Arc::clone(&store) as Arc<dyn MessageStore>,
            paused,
            Arc::clone(&credentials),
        ));
        Harness {
            router,
            session: Arc::new(FakeSession::new("9:1@s.whatsapp.net")),
            store,
            credentials,
            calls,
            _dir: dir,
        }
    }

    fn raw(chat: &str, id: &str, body: &str) -> RawMessage {
        serde_json::from_value(json!({
            "key": {"remoteJid": chat, "id": id},
            "message": {"conversation": body}
        }))
        .unwrap()
    }

    impl Harness {
        async fn run(&self, events: Vec<SessionEvent>) -> (CloseReason, ConnectionState) {
            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                tx.send(event).await.unwrap();
            }
            drop(tx);
            let (state, watcher) = watch::channel(ConnectionState::Connecting);
            let reason = self
                .router
                .run(Arc::clone(&self.session) as Arc<dyn SessionHandle>, rx, &state)
                .await;
            // Let spawned work drain.
            tokio::time::sleep(Duration::from_millis(50)).await;
            (reason, *watcher.borrow())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_announces_and_close_returns_reason() {
        let h = harness(
            AlyaConfig {
                sudo: vec!["42".into()],
                ..Default::default()
            },
            MemoryPaused::with_paused(&[]),
        );
        let (reason, state) = h
            .run(vec![
                SessionEvent::Connection(ConnectionUpdate::Connecting),
                SessionEvent::Connection(ConnectionUpdate::Open),
                SessionEvent::Connection(ConnectionUpdate::Close(CloseReason::new(
                    Some(428),
                    "closed",
                ))),
                SessionEvent::MessagesUpsert(MessagesUpsert {
                    kind: UpsertKind::Notify,
                    messages: vec![raw("1@s.whatsapp.net", "LATE", "after close")],
                }),
            ])
            .await;
        assert_eq!(reason.status_code, Some(428));
        assert_eq!(state, ConnectionState::Open);
        let sent = h.session.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].jid, "9@s.whatsapp.net");
        assert!(sent[0].text.contains("Plugins: 1"));
        assert!(sent[0].text.contains("Sudo: 42"));
        assert!(h.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_is_a_recoverable_close() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        let (reason, _) = h.run(Vec::new()).await;
        assert_eq!(reason.status_code, None);
        assert!(!reason.is_logged_out());
    }

    #[tokio::test(start_paused = true)]
    async fn only_first_message_of_notify_batches_is_processed() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        h.run(vec![
            SessionEvent::MessagesUpsert(MessagesUpsert {
                kind: UpsertKind::Append,
                messages: vec![raw("1@s.whatsapp.net", "HIST", "old")],
            }),
            SessionEvent::MessagesUpsert(MessagesUpsert {
                kind: UpsertKind::Notify,
                messages: vec![
                    raw("1@s.whatsapp.net", "FIRST", "hi"),
                    raw("1@s.whatsapp.net", "SECOND", "there"),
                ],
            }),
        ])
        .await;
        assert_eq!(h.calls(), ["FIRST"]);
        assert!(h.store.sender_of("HIST").is_none());
        assert!(h.store.sender_of("SECOND").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_chat_only_admits_resume() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&["1@s.whatsapp.net"]));
        let notify = |id: &str, body: &str| {
            SessionEvent::MessagesUpsert(MessagesUpsert {
                kind: UpsertKind::Notify,
                messages: vec![raw("1@s.whatsapp.net", id, body)],
            })
        };
        h.run(vec![notify("A", "do something"), notify("B", "!resume")])
            .await;
        assert_eq!(h.calls(), ["B"]);
        // Suppressed messages are still persisted.
        assert!(h.store.sender_of("A").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_updates_are_saved_independently() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        let chats: Vec<ChatUpdate> = serde_json::from_value(json!([
            {"id": "a@s.whatsapp.net", "name": "A"},
            {"id": "fail@s.whatsapp.net"},
            {"id": "b@g.us", "unreadCount": 2}
        ]))
        .unwrap();
        h.run(vec![SessionEvent::ChatsUpdate(chats)]).await;
        let mut saved: Vec<_> = h.store.chats().into_iter().map(|c| c.id).collect();
        saved.sort();
        assert_eq!(saved, ["a@s.whatsapp.net", "b@g.us"]);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_updates_are_persisted_verbatim() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        let creds = json!({"me": {"id": "9@s.whatsapp.net"}, "registered": true});
        h.run(vec![SessionEvent::CredentialsUpdate(creds.clone())])
            .await;
        assert_eq!(h.credentials.load().unwrap(), creds);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_errors_are_reported_to_own_chat() {
        let h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        h.run(vec![SessionEvent::MessagesUpsert(MessagesUpsert {
            kind: UpsertKind::Notify,
            messages: vec![raw("1@s.whatsapp.net", "fail-1", "hi")],
        })])
        .await;
        assert!(h.calls().is_empty());
        let sent = h.session.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].jid, "9@s.whatsapp.net");
        assert!(sent[0].text.contains("refusing message fail-1"));
    }

    struct RecordingGreeter(Mutex<Vec<ParticipantsUpdate>>);

    #[async_trait]
    impl Greeter for RecordingGreeter {
        async fn greet(
            &self,
            update: &ParticipantsUpdate,
            _session: Arc<dyn SessionHandle>,
        ) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn participant_changes_reach_the_greeter() {
        let mut h = harness(AlyaConfig::default(), MemoryPaused::with_paused(&[]));
        let greeter = Arc::new(RecordingGreeter(Mutex::new(Vec::new())));
        let router = Arc::try_unwrap(h.router).ok().unwrap();
        h.router = Arc::new(router.with_greeter(Arc::clone(&greeter) as Arc<dyn Greeter>));

        let update: ParticipantsUpdate = serde_json::from_value(json!({
            "id": "g@g.us", "participants": ["5@s.whatsapp.net"], "action": "add"
        }))
        .unwrap();
        h.run(vec![SessionEvent::Participants(update.clone())]).await;
        assert_eq!(*greeter.0.lock().unwrap(), vec![update]);
    }

    #[tokio::test(start_paused = true)]
    async fn logs_resolve_group_subject() {
        let mut h = harness(
            AlyaConfig {
                logs: true,
                ..Default::default()
            },
            MemoryPaused::with_paused(&[]),
        );
        h.session = Arc::new(FakeSession::new("9@s.whatsapp.net").with_group("g@g.us", "Friends"));
        let value: Value = json!({
            "key": {"remoteJid": "g@g.us", "id": "G", "participant": "5@s.whatsapp.net"},
            "message": {"conversation": "hello group"},
            "pushName": "Five"
        });
        h.run(vec![SessionEvent::MessagesUpsert(MessagesUpsert {
            kind: UpsertKind::Notify,
            messages: vec![serde_json::from_value(value).unwrap()],
        })])
        .await;
        assert_eq!(h.calls(), ["G"]);
    }
}
