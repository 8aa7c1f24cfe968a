//! Session lifecycle: connect, route, tear down, and reconnect or stop.
//!
//! The manager owns the only live [`SessionHandle`] in a slot that is swapped
//! whole on every reconnect. Reconnection is an explicit loop here rather than
//! a reaction inside the event handlers, so a session's close can only ever
//! start one new connection.

use std::{
    future::Future,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    alya_config::ReconnectConfig,
    tokio::sync::{mpsc, watch},
    tracing::{info, warn},
};

use crate::{
    credentials::{CredentialStore, SeedOutcome},
    error::Result,
    router::EventRouter,
    store::MessageStore,
    transport::{CloseReason, ConnectOptions, SessionEvent, SessionHandle, Transport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ClosedRecoverable,
    /// Logged out remotely; the session cannot be resumed.
    ClosedTerminal,
}

impl ConnectionState {
    pub fn from_close(reason: &CloseReason) -> Self {
        if reason.is_logged_out() {
            Self::ClosedTerminal
        } else {
            Self::ClosedRecoverable
        }
    }
}

/// Why [`SessionManager::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    LoggedOut,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub logout_drain: Duration,
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            logout_drain: Duration::from_millis(config.logout_drain_ms),
        }
    }
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    router: Arc<EventRouter>,
    credentials: Arc<CredentialStore>,
    store: Arc<dyn MessageStore>,
    policy: ReconnectPolicy,
    slot: RwLock<Option<Arc<dyn SessionHandle>>>,
    state: watch::Sender<ConnectionState>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        router: Arc<EventRouter>,
        credentials: Arc<CredentialStore>,
        store: Arc<dyn MessageStore>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            transport,
            router,
            credentials,
            store,
            policy,
            slot: RwLock::new(None),
            state,
        }
    }

    /// Ensure the credential store exists, seeding it once from `session_id`.
    pub fn initialize(&self, session_id: Option<&str>) -> Result<SeedOutcome> {
        let outcome = self.credentials.initialize(session_id)?;
        match outcome {
            SeedOutcome::Seeded => info!(dir = %self.credentials.dir().display(), "seeded session credentials"),
            SeedOutcome::Unseeded => {
                warn!("no credentials and no session id; the transport will need to pair")
            },
            SeedOutcome::Existing => {},
        }
        Ok(outcome)
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<Arc<dyn SessionHandle>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Open a transport connection with the stored credentials and install
    /// its handle as the live session.
    pub async fn connect(
        &self,
    ) -> anyhow::Result<(Arc<dyn SessionHandle>, mpsc::Receiver<SessionEvent>)> {
        let credentials = self.credentials.load()?;
        let connection = self
            .transport
            .connect(ConnectOptions {
                credentials,
                store: Arc::clone(&self.store),
            })
            .await?;
        let previous = self
            .slot
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Arc::clone(&connection.handle));
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok((connection.handle, connection.events))
    }

    /// Connect and keep reconnecting until the account is logged out.
    pub async fn run(&self) -> Shutdown {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);
            info!(attempt, "connecting");

            let reason = match self.connect().await {
                Ok((handle, events)) => {
                    let reason = self.router.run(handle, events, &self.state).await;
                    self.teardown().await;
                    reason
                },
                Err(e) => {
                    warn!(error = %e, "connect failed");
                    CloseReason::new(None, format!("connect failed: {e}"))
                },
            };

            let next = ConnectionState::from_close(&reason);
            self.state.send_replace(next);
            if next == ConnectionState::ClosedTerminal {
                warn!(reason = %reason, "logged out, shutting down");
                tokio::time::sleep(self.policy.logout_drain).await;
                return Shutdown::LoggedOut;
            }
            info!(reason = %reason, delay_ms = self.policy.delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(self.policy.delay).await;
        }
    }

    /// [`run`](Self::run) until `shutdown` resolves.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Shutdown {
        tokio::select! {
            outcome = self.run() => outcome,
            () = shutdown => {
                info!("shutdown requested");
                self.teardown().await;
                Shutdown::Stopped
            },
        }
    }

    /// Empty the slot and close the handle it held.
    async fn teardown(&self) {
        let previous = self.slot.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(previous) = previous {
            previous.close().await;
        }
    }
}
