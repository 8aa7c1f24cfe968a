//! WebSocket link to the Baileys sidecar.
//!
//! One link multiplexes every session the gateway opens. Requests are matched
//! to their responses by `request_id`; session events are routed by
//! `session_id` to the channel handed out when that session was registered.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    alya_bot::{
        CloseReason, ConnectionUpdate, MessageStore, MessagesUpsert, SessionEvent,
    },
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    types::{ConnectionPhase, GatewayMessage, SidecarMessage},
};

pub const CONNECT_ATTEMPTS: u32 = 10;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Reply = std::result::Result<Value, String>;

/// Where a session's events go, and what resolves its message lookups.
pub(crate) struct SessionRoute {
    pub events: mpsc::Sender<SessionEvent>,
    pub store: Arc<dyn MessageStore>,
    pub user_id: Arc<RwLock<Option<String>>>,
}

pub struct SidecarLink {
    writer: mpsc::Sender<GatewayMessage>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    routes: Mutex<HashMap<String, SessionRoute>>,
    connected: AtomicBool,
}

impl SidecarLink {
    /// Connect once to the sidecar listening on `port`.
    pub async fn connect(port: u16) -> Result<Arc<Self>> {
        let url = format!("ws://127.0.0.1:{port}");
        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();
        let (writer, mut outgoing) = mpsc::channel::<GatewayMessage>(64);

        let link = Arc::new(Self {
            writer,
            pending: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
        });

        tokio::spawn(async move {
            while let Some(frame) = outgoing.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode sidecar frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "sidecar write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = Arc::clone(&link);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SidecarMessage>(&text) {
                        Ok(msg) => reader.handle_frame(msg).await,
                        Err(e) => warn!(error = %e, "unparseable sidecar frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {},
                    Err(e) => {
                        warn!(error = %e, "sidecar read failed");
                        break;
                    },
                }
            }
            reader.on_disconnect();
        });

        info!(%url, "connected to whatsapp sidecar");
        Ok(link)
    }

    /// Connect, retrying while the sidecar process is still starting.
    pub async fn connect_with_retry(port: u16, attempts: u32, delay: Duration) -> Result<Arc<Self>> {
        let mut last = Error::NotConnected;
        for attempt in 1..=attempts.max(1) {
            match Self::connect(port).await {
                Ok(link) => return Ok(link),
                Err(e) => {
                    debug!(attempt, error = %e, "sidecar not reachable yet");
                    last = e;
                },
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Fire-and-forget frame.
    pub async fn send(&self, frame: GatewayMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.writer
            .send(frame)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Send a frame built around a fresh request id and wait for its response.
    pub async fn request(&self, build: impl FnOnce(String) -> GatewayMessage) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id.clone(), tx);

        if let Err(e) = self.send(build(request_id.clone())).await {
            self.forget(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(Error::sidecar(message)),
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                self.forget(&request_id);
                Err(Error::Timeout { request_id })
            },
        }
    }

    pub(crate) fn register(&self, session_id: &str, route: SessionRoute) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), route);
    }

    pub(crate) fn unregister(&self, session_id: &str) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }

    fn forget(&self, request_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
    }

    fn route_events(&self, session_id: &str) -> Option<mpsc::Sender<SessionEvent>> {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|r| r.events.clone())
    }

    async fn emit(&self, session_id: &str, event: SessionEvent) {
        let Some(events) = self.route_events(session_id) else {
            debug!(session_id, "event for unknown session dropped");
            return;
        };
        // A closed receiver means the session was already torn down.
        let _ = events.send(event).await;
    }

    async fn handle_frame(self: &Arc<Self>, msg: SidecarMessage) {
        match msg {
            SidecarMessage::ConnectionUpdate {
                session_id,
                connection,
                status_code,
                reason,
                user_id,
            } => {
                if let Some(user_id) = user_id {
                    let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(route) = routes.get(&session_id) {
                        *route.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id);
                    }
                }
                let update = match connection {
                    ConnectionPhase::Connecting => ConnectionUpdate::Connecting,
                    ConnectionPhase::Open => ConnectionUpdate::Open,
                    ConnectionPhase::Close => ConnectionUpdate::Close(CloseReason {
                        status_code,
                        message: reason,
                    }),
                };
                self.emit(&session_id, SessionEvent::Connection(update)).await;
            },
            SidecarMessage::Qr { session_id, qr } => {
                info!(session_id, qr = %qr, "scan this QR code with WhatsApp to pair");
            },
            SidecarMessage::CredsUpdate { session_id, creds } => {
                self.emit(&session_id, SessionEvent::CredentialsUpdate(creds))
                    .await;
            },
            SidecarMessage::ParticipantsUpdate { session_id, update } => {
                self.emit(&session_id, SessionEvent::Participants(update))
                    .await;
            },
            SidecarMessage::ChatsUpdate { session_id, chats } => {
                self.emit(&session_id, SessionEvent::ChatsUpdate(chats))
                    .await;
            },
            SidecarMessage::MessagesUpsert {
                session_id,
                upsert_type,
                messages,
            } => {
                let upsert = MessagesUpsert {
                    kind: upsert_type,
                    messages,
                };
                self.emit(&session_id, SessionEvent::MessagesUpsert(upsert))
                    .await;
            },
            SidecarMessage::GetMessage {
                request_id,
                session_id,
                id,
            } => self.answer_lookup(request_id, &session_id, id),
            SidecarMessage::Response {
                request_id,
                ok,
                result,
                error,
            } => {
                let waiter = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&request_id);
                let Some(waiter) = waiter else {
                    debug!(request_id, "response for unknown request");
                    return;
                };
                let reply = if ok {
                    Ok(result.unwrap_or(Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| "request failed".into()))
                };
                let _ = waiter.send(reply);
            },
            SidecarMessage::Error { session_id, error } => {
                warn!(?session_id, error, "sidecar error");
            },
        }
    }

    /// Resolve a message body the network asked for, from storage.
    fn answer_lookup(self: &Arc<Self>, request_id: String, session_id: &str, id: String) {
        let store = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|r| Arc::clone(&r.store));
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let message = match store {
                Some(store) => match store.load_message(&id).await {
                    Ok(Some(raw)) => raw.message,
                    Ok(None) => None,
                    Err(e) => {
                        warn!(id, error = %e, "message lookup failed");
                        None
                    },
                },
                None => None,
            };
            let message = message.unwrap_or_else(|| json!({ "conversation": null }));
            if let Err(e) = link
                .send(GatewayMessage::MessageLookup {
                    request_id,
                    message,
                })
                .await
            {
                warn!(error = %e, "failed to answer message lookup");
            }
        });
    }

    /// Close every open session and fail every in-flight request.
    fn on_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        warn!("whatsapp sidecar connection lost");

        let routes: Vec<_> = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (session_id, route) in routes {
            let close = SessionEvent::Connection(ConnectionUpdate::Close(CloseReason::new(
                None,
                "sidecar connection lost",
            )));
            if route.events.try_send(close).is_err() {
                debug!(session_id, "session already gone");
            }
        }
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
