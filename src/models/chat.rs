use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

pub const TITLE_MAX_CHARS: usize = 50;
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown message role: '{}'", other)),
        }
    }
}

/// One tool invocation made by the assistant, kept with the message that issued it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub input: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            metadata: None,
            created_at: None,
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(id, content)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Clone, Debug)]
pub struct ChatPage {
    pub chats: Vec<ChatSummary>,
    pub total: i64,
}

/// A chat whose title matched a search, with the content of its latest message.
#[derive(Clone, Debug)]
pub struct TitleMatch {
    pub chat_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub latest_content: Option<String>,
}

/// A message whose content matched a search, joined to its chat.
#[derive(Clone, Debug)]
pub struct MessageMatch {
    pub chat_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub updated_at: DateTime<Utc>,
}

/// Title shown for a chat: the first user message, cut to 50 characters.
pub fn derive_title(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| truncate_with_ellipsis(&m.content, TITLE_MAX_CHARS))
}

pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_title_is_kept() {
        let messages = vec![
            ChatMessage::assistant("a1", "Hello there"),
            ChatMessage::user("u1", "List my projects"),
        ];
        assert_eq!(derive_title(&messages).as_deref(), Some("List my projects"));
    }

    #[test]
    fn exactly_fifty_chars_is_not_truncated() {
        let text = "x".repeat(50);
        assert_eq!(truncate_with_ellipsis(&text, TITLE_MAX_CHARS), text);
    }

    #[test]
    fn long_title_is_cut_at_fifty_chars() {
        let text = "a".repeat(49) + "bcdef";
        let title = truncate_with_ellipsis(&text, TITLE_MAX_CHARS);
        assert_eq!(title, format!("{}b...", "a".repeat(49)));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let text = "é".repeat(60);
        let title = truncate_with_ellipsis(&text, TITLE_MAX_CHARS);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn no_user_message_means_no_title() {
        let messages = vec![ChatMessage::assistant("a1", "Hi")];
        assert_eq!(derive_title(&messages), None);
    }

    #[test]
    fn message_wire_format_is_camel_case() {
        let json = serde_json::json!({
            "id": "m1",
            "role": "assistant",
            "content": "done",
            "toolCalls": [{ "id": "c1", "name": "deleteProject", "input": { "projectId": 3 }, "output": "ok" }]
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].name, "deleteProject");
        assert_eq!(calls[0].output.as_deref(), Some("ok"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let json = serde_json::json!({ "id": "m1", "role": "system", "content": "x" });
        assert!(serde_json::from_value::<ChatMessage>(json).is_err());
    }
}
