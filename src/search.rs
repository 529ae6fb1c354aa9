use std::collections::HashSet;

use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ truncate_with_ellipsis, SearchResult };

/// Matches taken from each source (titles, messages) before deduplication.
pub const SEARCH_LIMIT_PER_SOURCE: i64 = 10;
pub const EXCERPT_MAX_CHARS: usize = 100;
const UNTITLED: &str = "Untitled Chat";
const NO_MESSAGES: &str = "No messages";

fn excerpt(content: Option<&str>) -> String {
    match content {
        Some(text) if !text.is_empty() => truncate_with_ellipsis(text, EXCERPT_MAX_CHARS),
        _ => NO_MESSAGES.to_string(),
    }
}

fn display_title(title: String) -> String {
    if title.is_empty() { UNTITLED.to_string() } else { title }
}

/// Substring search over chat titles and message content, one result per chat.
pub async fn search_chats(
    store: &dyn HistoryStore,
    query: &str
) -> Result<Vec<SearchResult>, HistoryError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let by_title = store.find_chats_by_title(query, SEARCH_LIMIT_PER_SOURCE).await?;
    let by_content = store.find_messages_by_content(query, SEARCH_LIMIT_PER_SOURCE).await?;

    let candidates = by_title
        .into_iter()
        .map(|m| SearchResult {
            excerpt: excerpt(m.latest_content.as_deref()),
            id: m.chat_id,
            title: display_title(m.title),
            updated_at: m.updated_at,
        })
        .chain(
            by_content.into_iter().map(|m| SearchResult {
                excerpt: excerpt(Some(&m.content)),
                id: m.chat_id,
                title: display_title(m.title),
                updated_at: m.updated_at,
            })
        );

    let mut seen = HashSet::new();
    Ok(candidates.filter(|result| seen.insert(result.id.clone())).collect())
}
