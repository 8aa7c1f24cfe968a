/// Config schema types (bot behaviour, reconnect policy, sidecar, greetings).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Default handler prefix pattern: a leading `.` or `!`.
pub const DEFAULT_HANDLERS: &str = "^[.!]";

/// Default port of the WhatsApp sidecar WebSocket server.
pub const DEFAULT_SIDECAR_PORT: u16 = 3917;

/// Root configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlyaConfig {
    /// Seed credential written to the session store on first start.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<Secret<String>>,
    /// Bot mode, shown in the startup announcement ("public" / "private").
    pub work_type: String,
    /// Regex source matched against message bodies to detect a command prefix.
    pub handlers: String,
    /// Phone numbers (user part of the jid) treated as privileged senders.
    pub sudo: Vec<String>,
    /// Send read receipts for every inbound message.
    pub auto_read: bool,
    /// Send read receipts for `status@broadcast` messages.
    pub auto_status_read: bool,
    /// Log one line per processed message.
    pub logs: bool,
    /// Directory holding the session store and the database.
    pub data_dir: Option<PathBuf>,
    pub reconnect: ReconnectConfig,
    pub sidecar: SidecarConfig,
    pub greetings: GreetingsConfig,
}

impl std::fmt::Debug for AlyaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlyaConfig")
            .field(
                "session_id",
                &self.session_id.as_ref().map(|_| "[REDACTED]"),
            )
            .field("work_type", &self.work_type)
            .field("handlers", &self.handlers)
            .field("sudo", &self.sudo)
            .field("auto_read", &self.auto_read)
            .field("auto_status_read", &self.auto_status_read)
            .field("logs", &self.logs)
            .finish_non_exhaustive()
    }
}

impl Default for AlyaConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            work_type: "public".into(),
            handlers: DEFAULT_HANDLERS.into(),
            sudo: Vec::new(),
            auto_read: false,
            auto_status_read: false,
            logs: false,
            data_dir: None,
            reconnect: ReconnectConfig::default(),
            sidecar: SidecarConfig::default(),
            greetings: GreetingsConfig::default(),
        }
    }
}

impl AlyaConfig {
    /// The seed credential, if one is configured and non-empty.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    /// Directory holding credential state (`<data_dir>/session`).
    pub fn session_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("session")
    }

    /// SQLite database URL (`<data_dir>/alya.db`).
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}?mode=rwc",
            self.resolved_data_dir().join("alya.db").display()
        )
    }

    /// The configured data directory, or the platform default.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(crate::loader::default_data_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Reconnect pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before reconnecting after a recoverable close.
    pub delay_ms: u64,
    /// Drain delay before exiting after the device is logged out.
    pub logout_drain_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 300,
            logout_drain_ms: 3000,
        }
    }
}

/// Baileys sidecar process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub port: u16,
    /// Directory containing the sidecar's `package.json`.
    pub dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process. Disable to run it by hand.
    pub auto_start: bool,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SIDECAR_PORT,
            dir: None,
            auto_start: true,
        }
    }
}

/// Group join/leave message templates. `{user}` and `{group}` are replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingsConfig {
    pub welcome: Option<String>,
    pub goodbye: Option<String>,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AlyaConfig::default();
        assert_eq!(cfg.handlers, "^[.!]");
        assert_eq!(cfg.work_type, "public");
        assert_eq!(cfg.reconnect.delay_ms, 300);
        assert_eq!(cfg.reconnect.logout_drain_ms, 3000);
        assert_eq!(cfg.sidecar.port, DEFAULT_SIDECAR_PORT);
        assert!(cfg.sidecar.auto_start);
        assert!(cfg.session_id().is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let cfg: AlyaConfig = toml::from_str(
            r#"
            session_id = "alya~abc"
            handlers = "^[!]"
            sudo = ["15551234567"]
            auto_read = true

            [reconnect]
            delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session_id(), Some("alya~abc"));
        assert_eq!(cfg.handlers, "^[!]");
        assert_eq!(cfg.sudo, vec!["15551234567"]);
        assert!(cfg.auto_read);
        assert!(!cfg.auto_status_read);
        assert_eq!(cfg.reconnect.delay_ms, 50);
        assert_eq!(cfg.reconnect.logout_drain_ms, 3000);
    }

    #[test]
    fn empty_session_id_is_treated_as_absent() {
        let cfg = AlyaConfig {
            session_id: Some(Secret::new(String::new())),
            ..Default::default()
        };
        assert!(cfg.session_id().is_none());
    }

    #[test]
    fn debug_redacts_session_id() {
        let cfg = AlyaConfig {
            session_id: Some(Secret::new("very-secret".into())),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("very-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn paths_derive_from_data_dir() {
        let cfg = AlyaConfig {
            data_dir: Some(PathBuf::from("/var/lib/alya")),
            ..Default::default()
        };
        assert_eq!(cfg.session_dir(), PathBuf::from("/var/lib/alya/session"));
        assert_eq!(
            cfg.database_url(),
            "sqlite:///var/lib/alya/alya.db?mode=rwc"
        );
    }
}
