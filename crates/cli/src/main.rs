//! `alya`: runs the bot until the account is logged out or Ctrl-C.

use std::sync::Arc;

use {
    alya_bot::{
        BotSettings, CredentialStore, EventRouter, MessageStore, PausedChats, ReconnectPolicy,
        SessionManager, Shutdown, Transport,
    },
    alya_config::{AlyaConfig, Severity},
    alya_plugins::{Greetings, PluginRegistry},
    alya_storage::SqliteStore,
    alya_whatsapp::{SidecarSettings, SidecarTransport},
    anyhow::{Context, bail},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// `RUST_LOG` filtering (default `info`); `ALYA_LOG_FORMAT=json` for JSON lines.
fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let json = std::env::var("ALYA_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Log every diagnostic; refuse to start on errors.
fn check_config(config: &AlyaConfig) -> anyhow::Result<()> {
    let result = alya_config::validate(config);
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!(path = %diagnostic.path, "{}", diagnostic.message),
            Severity::Warning => warn!(path = %diagnostic.path, "{}", diagnostic.message),
        }
    }
    if result.has_errors() {
        bail!(
            "configuration has {} error(s)",
            result.count(Severity::Error)
        );
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C; running until logout");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry();
    info!(version = env!("CARGO_PKG_VERSION"), "alya starting");

    let config = alya_config::discover_and_load();
    check_config(&config)?;

    let data_dir = config.resolved_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

    let settings = Arc::new(BotSettings::from_config(&config)?);
    let store = Arc::new(
        SqliteStore::new(&config.database_url())
            .await
            .context("failed to open database")?,
    );
    let paused: Arc<dyn PausedChats> = Arc::clone(&store) as Arc<dyn PausedChats>;
    let messages: Arc<dyn MessageStore> = store;

    let registry = PluginRegistry::with_bundled(&settings, Arc::clone(&paused))?;
    info!(commands = registry.len(), "plugins loaded");

    let credentials = Arc::new(CredentialStore::new(config.session_dir()));
    let mut router = EventRouter::new(
        Arc::clone(&settings),
        registry.into_commands(),
        Arc::clone(&messages),
        paused,
        Arc::clone(&credentials),
    );
    let greetings = Greetings::from_config(&config.greetings);
    if greetings.is_enabled() {
        router = router.with_greeter(Arc::new(greetings));
    }

    let transport = Arc::new(SidecarTransport::new(SidecarSettings {
        port: config.sidecar.port,
        dir: config.sidecar.dir.clone(),
        auto_start: config.sidecar.auto_start,
        auth_dir: data_dir.join("sidecar"),
    }));
    let manager = SessionManager::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(router),
        credentials,
        messages,
        ReconnectPolicy::from(&config.reconnect),
    );
    manager.initialize(config.session_id())?;

    let shutdown = manager.run_until(ctrl_c()).await;
    transport.stop().await;
    match shutdown {
        Shutdown::LoggedOut => info!("account logged out, exiting"),
        Shutdown::Stopped => info!("alya stopped"),
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handlers_refuse_to_start() {
        let config = AlyaConfig {
            handlers: "[unclosed".into(),
            ..Default::default()
        };
        assert!(check_config(&config).is_err());
    }

    #[test]
    fn defaults_start() {
        assert!(check_config(&AlyaConfig::default()).is_ok());
    }
}
