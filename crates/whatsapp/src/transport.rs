//! [`Transport`] implementation backed by the Baileys sidecar.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use {
    alya_bot::{
        Connection, ConnectOptions, SessionHandle, Transport,
        types::{GroupMetadata, MessageKey, RawMessage},
    },
    anyhow::Context,
    async_trait::async_trait,
    serde::Deserialize,
    tokio::sync::{Mutex, mpsc},
    tracing::{debug, info},
};

use crate::{
    process::{SidecarProcess, locate_sidecar},
    sidecar::{CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY, SessionRoute, SidecarLink},
    types::GatewayMessage,
};

const EVENT_BUFFER: usize = 256;

/// Where the sidecar lives and whether this process should start it.
#[derive(Debug, Clone)]
pub struct SidecarSettings {
    pub port: u16,
    /// Sidecar checkout; searched for when unset.
    pub dir: Option<PathBuf>,
    /// Spawn the sidecar ourselves instead of expecting one to be running.
    pub auto_start: bool,
    /// Scratch directory the sidecar may use for its own key files.
    pub auth_dir: PathBuf,
}

pub struct SidecarTransport {
    settings: SidecarSettings,
    process: Mutex<Option<SidecarProcess>>,
    link: Mutex<Option<Arc<SidecarLink>>>,
}

impl SidecarTransport {
    pub fn new(settings: SidecarSettings) -> Self {
        Self {
            settings,
            process: Mutex::new(None),
            link: Mutex::new(None),
        }
    }

    async fn ensure_process(&self) -> anyhow::Result<()> {
        if !self.settings.auto_start {
            return Ok(());
        }
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut()
            && running.is_running()
        {
            return Ok(());
        }
        let dir = locate_sidecar(self.settings.dir.as_deref())?;
        let spawned =
            SidecarProcess::spawn(&dir, self.settings.port, Some(&self.settings.auth_dir)).await?;
        *process = Some(spawned);
        Ok(())
    }

    async fn ensure_link(&self) -> anyhow::Result<Arc<SidecarLink>> {
        let mut link = self.link.lock().await;
        if let Some(existing) = link.as_ref()
            && existing.is_connected()
        {
            return Ok(Arc::clone(existing));
        }
        let fresh =
            SidecarLink::connect_with_retry(self.settings.port, CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY)
                .await
                .with_context(|| {
                    format!("whatsapp sidecar unreachable on port {}", self.settings.port)
                })?;
        *link = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    /// Drop the link and stop the sidecar if this process started it.
    pub async fn stop(&self) {
        self.link.lock().await.take();
        if let Some(mut process) = self.process.lock().await.take() {
            process.stop().await;
        }
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(&self, options: ConnectOptions) -> anyhow::Result<Connection> {
        self.ensure_process().await?;
        let link = self.ensure_link().await?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let user_id = Arc::new(RwLock::new(None));
        link.register(&session_id, SessionRoute {
            events,
            store: options.store,
            user_id: Arc::clone(&user_id),
        });

        let connect = GatewayMessage::Connect {
            session_id: session_id.clone(),
            auth_dir: self.settings.auth_dir.clone(),
            credentials: options.credentials,
        };
        if let Err(e) = link.send(connect).await {
            link.unregister(&session_id);
            return Err(e.into());
        }
        info!(session_id, "whatsapp session requested");

        Ok(Connection {
            handle: Arc::new(SidecarSession {
                link,
                session_id,
                user_id,
            }),
            events: rx,
        })
    }
}

#[derive(Deserialize)]
struct MediaPayload {
    data: Vec<u8>,
}

/// One socket inside the sidecar.
pub struct SidecarSession {
    link: Arc<SidecarLink>,
    session_id: String,
    user_id: Arc<RwLock<Option<String>>>,
}

#[async_trait]
impl SessionHandle for SidecarSession {
    fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn send_text(
        &self,
        jid: &str,
        text: &str,
        quoted: Option<&RawMessage>,
    ) -> anyhow::Result<()> {
        self.link
            .request(|request_id| GatewayMessage::SendText {
                request_id,
                session_id: self.session_id.clone(),
                jid: jid.to_string(),
                text: text.to_string(),
                quoted: quoted.cloned(),
            })
            .await
            .with_context(|| format!("send to {jid} failed"))?;
        Ok(())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> anyhow::Result<()> {
        self.link
            .request(|request_id| GatewayMessage::ReadMessages {
                request_id,
                session_id: self.session_id.clone(),
                keys: keys.to_vec(),
            })
            .await?;
        Ok(())
    }

    async fn group_metadata(&self, jid: &str) -> anyhow::Result<GroupMetadata> {
        let value = self
            .link
            .request(|request_id| GatewayMessage::GroupMetadata {
                request_id,
                session_id: self.session_id.clone(),
                jid: jid.to_string(),
            })
            .await?;
        serde_json::from_value(value).with_context(|| format!("malformed metadata for {jid}"))
    }

    async fn download_media(&self, message: &RawMessage) -> anyhow::Result<Vec<u8>> {
        let value = self
            .link
            .request(|request_id| GatewayMessage::DownloadMedia {
                request_id,
                session_id: self.session_id.clone(),
                message: message.clone(),
            })
            .await?;
        let payload: MediaPayload =
            serde_json::from_value(value).context("malformed media payload")?;
        Ok(payload.data)
    }

    async fn close(&self) {
        let disconnect = GatewayMessage::Disconnect {
            session_id: self.session_id.clone(),
        };
        if let Err(e) = self.link.send(disconnect).await {
            debug!(session_id = %self.session_id, error = %e, "disconnect not delivered");
        }
        self.link.unregister(&self.session_id);
    }
}
