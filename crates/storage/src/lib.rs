//! Persistence for the bot: messages, chats, display names and the
//! paused-chat registry.
//!
//! [`SqliteStore`] is the production backend; [`InMemoryStore`] keeps
//! everything in process for tests and ephemeral runs.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use {
    error::{Error, Result},
    memory::InMemoryStore,
    sqlite::SqliteStore,
};

/// Run database migrations for the storage tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
