//! End-to-end: scripted transport → session manager → dispatch → handlers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use {
    alya_bot::{
        CloseReason, CommandDescriptor, CommandInput, Connection, ConnectOptions,
        ConnectionUpdate, CredentialStore, EventRouter, MessageStore, MessagesUpsert,
        PausedChatEntry, PausedChats, ReconnectPolicy, SessionEvent, SessionHandle,
        SessionManager, Shutdown, Transport, Trigger, UpsertKind, handler_fn,
        settings::BotSettings,
        types::{ChatUpdate, GroupMetadata, MessageKey, RawMessage},
    },
    alya_config::{AlyaConfig, ReconnectConfig},
    anyhow::{Result, anyhow},
    async_trait::async_trait,
    serde_json::json,
    tokio::sync::mpsc,
};

#[derive(Default)]
struct Outbox(Mutex<Vec<(String, String)>>);

struct Session {
    outbox: Arc<Outbox>,
}

#[async_trait]
impl SessionHandle for Session {
    fn user_id(&self) -> Option<String> {
        Some("100:7@s.whatsapp.net".into())
    }

    async fn send_text(&self, jid: &str, text: &str, _quoted: Option<&RawMessage>) -> Result<()> {
        self.outbox.0.lock().unwrap().push((jid.into(), text.into()));
        Ok(())
    }

    async fn read_messages(&self, _keys: &[MessageKey]) -> Result<()> {
        Ok(())
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata> {
        Err(anyhow!("no metadata for {jid}"))
    }

    async fn download_media(&self, _message: &RawMessage) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct Store(Mutex<HashMap<String, RawMessage>>);

#[async_trait]
impl MessageStore for Store {
    async fn load_message(&self, id: &str) -> Result<Option<RawMessage>> {
        Ok(self.0.lock().unwrap().get(id).cloned())
    }

    async fn save_message(&self, message: &RawMessage, _sender: &str) -> Result<()> {
        let id = message.key.id.clone().unwrap_or_default();
        self.0.lock().unwrap().insert(id, message.clone());
        Ok(())
    }

    async fn save_chat(&self, _chat: &ChatUpdate) -> Result<()> {
        Ok(())
    }

    async fn get_name(&self, _sender: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

struct Paused(Vec<String>);

#[async_trait]
impl PausedChats for Paused {
    async fn paused_chats(&self) -> Result<Vec<PausedChatEntry>> {
        Ok(self
            .0
            .iter()
            .map(|chat_id| PausedChatEntry {
                chat_id: chat_id.clone(),
                reason: None,
                paused_at: 0,
            })
            .collect())
    }

    async fn pause(&self, _chat_id: &str, _reason: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn resume(&self, _chat_id: &str) -> Result<bool> {
        Ok(false)
    }
}

struct Scripted {
    batches: Mutex<VecDeque<Vec<SessionEvent>>>,
    outbox: Arc<Outbox>,
}

#[async_trait]
impl Transport for Scripted {
    async fn connect(&self, _options: ConnectOptions) -> Result<Connection> {
        let events = self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))?;
        let (tx, rx) = mpsc::channel(events.len() + 1);
        for event in events {
            tx.send(event).await?;
        }
        Ok(Connection {
            handle: Arc::new(Session {
                outbox: Arc::clone(&self.outbox),
            }),
            events: rx,
        })
    }
}

fn notify(chat: &str, id: &str, body: &str) -> SessionEvent {
    SessionEvent::MessagesUpsert(MessagesUpsert {
        kind: UpsertKind::Notify,
        messages: vec![
            serde_json::from_value(json!({
                "key": {"remoteJid": chat, "id": id},
                "message": {"conversation": body}
            }))
            .unwrap(),
        ],
    })
}

fn close(code: u16) -> SessionEvent {
    SessionEvent::Connection(ConnectionUpdate::Close(CloseReason::new(Some(code), "closed")))
}

#[tokio::test(start_paused = true)]
async fn messages_flow_through_reconnects_until_logout() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = Arc::new(Outbox::default());
    let seen: Arc<Mutex<Vec<(String, CommandInput)>>> = Arc::default();

    let config = AlyaConfig {
        handlers: "^[.!]".into(),
        ..Default::default()
    };
    let settings = Arc::new(BotSettings::from_config(&config).unwrap());
    let ping = settings.prefix.command_pattern("ping").unwrap();

    let recorder = |name: &'static str| {
        let seen = Arc::clone(&seen);
        handler_fn(move |ctx, input| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push((name.to_string(), input));
                ctx.reply("ok").await
            }
        })
    };
    let commands = vec![
        CommandDescriptor::new("ping", Trigger::Pattern(ping), recorder("ping")),
        CommandDescriptor::new(
            "broken",
            Trigger::Text,
            handler_fn(|_ctx, _input| async { Err::<(), _>(anyhow!("broken handler")) }),
        ),
        CommandDescriptor::new("text", Trigger::Text, recorder("text")),
    ];

    let store: Arc<dyn MessageStore> = Arc::new(Store::default());
    let credentials = Arc::new(CredentialStore::new(dir.path().join("session")));
    let router = Arc::new(EventRouter::new(
        Arc::clone(&settings),
        commands,
        Arc::clone(&store),
        Arc::new(Paused(vec!["muted@s.whatsapp.net".into()])),
        Arc::clone(&credentials),
    ));
    let transport = Arc::new(Scripted {
        batches: Mutex::new(VecDeque::from([
            vec![
                SessionEvent::Connection(ConnectionUpdate::Open),
                notify("1@s.whatsapp.net", "A", ".ping now"),
                notify("muted@s.whatsapp.net", "B", ".ping muted"),
                close(428),
            ],
            vec![
                SessionEvent::Connection(ConnectionUpdate::Open),
                notify("muted@s.whatsapp.net", "C", "!resume"),
                close(401),
            ],
        ])),
        outbox: Arc::clone(&outbox),
    });

    let manager = SessionManager::new(
        transport,
        router,
        Arc::clone(&credentials),
        store,
        ReconnectPolicy::from(&ReconnectConfig::default()),
    );
    manager.initialize(Some("alya~seed")).unwrap();
    assert_eq!(manager.run().await, Shutdown::LoggedOut);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.text().cmp(&b.1.text())));
    assert_eq!(seen, vec![
        ("ping".to_string(), CommandInput::Pattern {
            residual: Some("now".into())
        }),
        ("text".to_string(), CommandInput::Text {
            body: "!resume".into()
        }),
        ("text".to_string(), CommandInput::Text {
            body: ".ping now".into()
        }),
    ]);

    // Two announcements to the own chat, three replies to the senders.
    let outbox = outbox.0.lock().unwrap();
    let own: Vec<_> = outbox
        .iter()
        .filter(|(jid, _)| jid == "100@s.whatsapp.net")
        .collect();
    assert_eq!(own.len(), 2);
    assert_eq!(outbox.len(), 5);
    assert_eq!(credentials.load().unwrap(), json!({"session": "alya~seed"}));
}
