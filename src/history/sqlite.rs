use async_trait::async_trait;
use chrono::{ DateTime, SecondsFormat, Utc };
use log::{ debug, info };
use sqlx::sqlite::{ SqliteConnectOptions, SqlitePoolOptions, SqliteRow };
use sqlx::{ Row, SqlitePool };
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{
    derive_title,
    ChatMessage,
    ChatPage,
    ChatSummary,
    MessageMatch,
    Role,
    TitleMatch,
    DEFAULT_CHAT_TITLE,
};

const SCHEMA: [&str; 4] = [
    r"
    CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        title_folded TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        content_folded TEXT NOT NULL,
        tool_calls TEXT,
        metadata TEXT,
        created_at TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages (chat_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_chats_updated ON chats (updated_at)",
];

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HistoryError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

/// Lowercased copy kept next to searchable text. SQLite only folds ASCII case itself.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// `LIKE` pattern over folded text matching `query` anywhere, with wildcards taken literally.
fn contains_pattern(query: &str) -> String {
    let escaped = fold(query).replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, HistoryError> {
    let role: String = row.get("role");
    let tool_calls: Option<String> = row.get("tool_calls");
    let metadata: Option<String> = row.get("metadata");
    let created_at: String = row.get("created_at");

    Ok(ChatMessage {
        id: row.get("id"),
        role: Role::from_str(&role).map_err(HistoryError::Corrupt)?,
        content: row.get("content"),
        tool_calls: tool_calls.as_deref().map(serde_json::from_str).transpose()?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        created_at: Some(parse_timestamp(&created_at)?),
    })
}

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub async fn connect(database_url: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so pin exactly one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options).await?
        } else {
            SqlitePoolOptions::new().max_connections(5).connect_with(options).await?
        };

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to chat history database: {}", database_url);
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), HistoryError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn upsert_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
        now: &str
    ) -> Result<(), HistoryError> {
        let tool_calls = message.tool_calls.as_ref().map(serde_json::to_string).transpose()?;
        let metadata = message.metadata.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = message.created_at.map(timestamp).unwrap_or_else(|| now.to_string());

        sqlx::query(
            r"
            INSERT INTO messages (id, chat_id, role, content, content_folded, tool_calls, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                content_folded = excluded.content_folded,
                tool_calls = excluded.tool_calls,
                metadata = excluded.metadata
            "
        )
            .bind(&message.id)
            .bind(chat_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(fold(&message.content))
            .bind(tool_calls)
            .bind(metadata)
            .bind(created_at)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn create_chat(&self) -> Result<String, HistoryError> {
        let id = Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO chats (id, title, title_folded, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)"
        )
            .bind(&id)
            .bind(DEFAULT_CHAT_TITLE)
            .bind(fold(DEFAULT_CHAT_TITLE))
            .bind(&now)
            .execute(&self.pool).await?;

        debug!("Created chat {}", id);
        Ok(id)
    }

    async fn load_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let exists = sqlx::query("SELECT 1 FROM chats WHERE id = ?1")
            .bind(chat_id)
            .fetch_optional(&self.pool).await?;
        if exists.is_none() {
            return Err(HistoryError::NotFound(chat_id.to_string()));
        }

        let rows = sqlx::query(
            r"
            SELECT id, role, content, tool_calls, metadata, created_at
            FROM messages
            WHERE chat_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "
        )
            .bind(chat_id)
            .fetch_all(&self.pool).await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn save_chat(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError> {
        let now = timestamp(Utc::now());

        let updated = match derive_title(messages) {
            Some(title) =>
                sqlx::query(
                    "UPDATE chats SET title = ?1, title_folded = ?2, updated_at = ?3 WHERE id = ?4"
                )
                    .bind(&title)
                    .bind(fold(&title))
                    .bind(&now)
                    .bind(chat_id)
                    .execute(&self.pool).await?,
            None =>
                sqlx::query("UPDATE chats SET updated_at = ?1 WHERE id = ?2")
                    .bind(&now)
                    .bind(chat_id)
                    .execute(&self.pool).await?,
        };
        if updated.rows_affected() == 0 {
            return Err(HistoryError::NotFound(chat_id.to_string()));
        }

        // Each upsert stands alone; a failure part way leaves earlier rows written.
        for message in messages {
            self.upsert_message(chat_id, message, &now).await?;
        }
        Ok(())
    }

    async fn list_chats(&self, limit: i64, offset: i64) -> Result<ChatPage, HistoryError> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.title, c.created_at, c.updated_at, COUNT(m.id) AS message_count
            FROM chats c
            LEFT JOIN messages m ON m.chat_id = c.id
            GROUP BY c.id
            ORDER BY c.updated_at DESC, c.created_at DESC
            LIMIT ?1 OFFSET ?2
            "
        )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool).await?;

        let chats = rows
            .iter()
            .map(|r| {
                let created_at: String = r.get("created_at");
                let updated_at: String = r.get("updated_at");
                Ok(ChatSummary {
                    id: r.get("id"),
                    title: r.get("title"),
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                    message_count: r.get("message_count"),
                })
            })
            .collect::<Result<Vec<_>, HistoryError>>()?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM chats")
            .fetch_one(&self.pool).await?
            .get("total");

        Ok(ChatPage { chats, total })
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?1")
            .bind(chat_id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_chats_by_title(
        &self,
        query: &str,
        limit: i64
    ) -> Result<Vec<TitleMatch>, HistoryError> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.title, c.updated_at,
                   (SELECT m.content FROM messages m
                    WHERE m.chat_id = c.id
                    ORDER BY m.created_at DESC, m.rowid DESC
                    LIMIT 1) AS latest_content
            FROM chats c
            WHERE c.title_folded LIKE ?1 ESCAPE '\'
            ORDER BY c.updated_at DESC
            LIMIT ?2
            "
        )
            .bind(contains_pattern(query))
            .bind(limit)
            .fetch_all(&self.pool).await?;

        rows.iter()
            .map(|r| {
                let updated_at: String = r.get("updated_at");
                Ok(TitleMatch {
                    chat_id: r.get("id"),
                    title: r.get("title"),
                    updated_at: parse_timestamp(&updated_at)?,
                    latest_content: r.get("latest_content"),
                })
            })
            .collect()
    }

    async fn find_messages_by_content(
        &self,
        query: &str,
        limit: i64
    ) -> Result<Vec<MessageMatch>, HistoryError> {
        let rows = sqlx::query(
            r"
            SELECT m.chat_id, c.title, c.updated_at, m.content
            FROM messages m
            JOIN chats c ON c.id = m.chat_id
            WHERE m.content_folded LIKE ?1 ESCAPE '\'
            ORDER BY m.created_at DESC, m.rowid DESC
            LIMIT ?2
            "
        )
            .bind(contains_pattern(query))
            .bind(limit)
            .fetch_all(&self.pool).await?;

        rows.iter()
            .map(|r| {
                let updated_at: String = r.get("updated_at");
                Ok(MessageMatch {
                    chat_id: r.get("chat_id"),
                    title: r.get("title"),
                    updated_at: parse_timestamp(&updated_at)?,
                    content: r.get("content"),
                })
            })
            .collect()
    }
}
