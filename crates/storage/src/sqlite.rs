//! SQLite-backed store using sqlx.

use {
    alya_bot::{
        MessageStore, PausedChatEntry, PausedChats,
        types::{ChatUpdate, RawMessage},
    },
    anyhow::Context,
    async_trait::async_trait,
    serde_json::{Map, Value},
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::error::Result;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with a dedicated pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        debug!(url = %database_url, "storage ready");
        Ok(Self { pool })
    }

    /// Stored metadata for one chat.
    pub async fn chat(&self, id: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query("SELECT data FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let data: String = r.get("data");
            serde_json::from_str(&data).context("corrupt chat row")
        })
        .transpose()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn load_message(&self, id: &str) -> anyhow::Result<Option<RawMessage>> {
        let row = sqlx::query("SELECT data FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.get("data");
        Ok(Some(
            serde_json::from_str(&data).with_context(|| format!("corrupt message row {id}"))?,
        ))
    }

    async fn save_message(&self, message: &RawMessage, sender: &str) -> anyhow::Result<()> {
        let id = message
            .key
            .id
            .as_deref()
            .context("message has no id")?;
        let chat_id = message.key.remote_jid.as_deref().unwrap_or_default();
        let data = serde_json::to_string(message)?;
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender, push_name, data) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                sender = excluded.sender,
                push_name = COALESCE(excluded.push_name, messages.push_name),
                data = excluded.data",
        )
        .bind(id)
        .bind(chat_id)
        .bind(sender)
        .bind(message.push_name.as_deref())
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_chat(&self, chat: &ChatUpdate) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query("SELECT data FROM chats WHERE id = ?")
            .bind(&chat.id)
            .fetch_optional(&mut *tx)
            .await?;

        // Updates are partial; merge over what is already known.
        let mut merged: Map<String, Value> = match existing {
            Some(row) => {
                let data: String = row.get("data");
                serde_json::from_str(&data).unwrap_or_default()
            },
            None => Map::new(),
        };
        for (key, value) in &chat.fields {
            merged.insert(key.clone(), value.clone());
        }
        merged.insert("id".into(), Value::String(chat.id.clone()));

        sqlx::query(
            "INSERT INTO chats (id, data, updated_at) VALUES (?, ?, strftime('%s', 'now'))
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&chat.id)
        .bind(serde_json::to_string(&merged)?)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_name(&self, sender: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            "SELECT push_name FROM messages
             WHERE sender = ? AND push_name IS NOT NULL AND push_name != ''
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(sender)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("push_name")))
    }
}

#[async_trait]
impl PausedChats for SqliteStore {
    async fn paused_chats(&self) -> anyhow::Result<Vec<PausedChatEntry>> {
        let rows = sqlx::query("SELECT chat_id, reason, paused_at FROM paused_chats ORDER BY paused_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PausedChatEntry {
                chat_id: row.get("chat_id"),
                reason: row.get("reason"),
                paused_at: row.get("paused_at"),
            })
            .collect())
    }

    async fn pause(&self, chat_id: &str, reason: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO paused_chats (chat_id, reason, paused_at) VALUES (?, ?, strftime('%s', 'now'))
             ON CONFLICT(chat_id) DO UPDATE SET reason = excluded.reason, paused_at = excluded.paused_at",
        )
        .bind(chat_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resume(&self, chat_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM paused_chats WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
