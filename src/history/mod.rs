mod sqlite;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::models::chat::{ ChatMessage, ChatPage, MessageMatch, TitleMatch };

pub use self::sqlite::SqliteHistoryStore;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Chat not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored payload is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Corrupt stored row: {0}")]
    Corrupt(String),
}

impl HistoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::NotFound(_))
    }
}

/// Durable chats and their messages.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Inserts an empty chat with the placeholder title and returns its id.
    async fn create_chat(&self) -> Result<String, HistoryError>;

    /// All messages of a chat, oldest first.
    async fn load_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Retitles the chat from its first user message and upserts every message by id.
    async fn save_chat(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError>;

    async fn list_chats(&self, limit: i64, offset: i64) -> Result<ChatPage, HistoryError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_chat(&self, chat_id: &str) -> Result<bool, HistoryError>;

    async fn find_chats_by_title(
        &self,
        query: &str,
        limit: i64
    ) -> Result<Vec<TitleMatch>, HistoryError>;

    async fn find_messages_by_content(
        &self,
        query: &str,
        limit: i64
    ) -> Result<Vec<MessageMatch>, HistoryError>;
}

pub async fn initialize_history_store(args: &Args) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    info!("Chat history will be stored in: {}", args.database_url);
    let store = SqliteHistoryStore::connect(&args.database_url).await?;
    Ok(Arc::new(store))
}
