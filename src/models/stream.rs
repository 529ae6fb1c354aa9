use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;
use super::chat::ChatMessage;

/// Body of a turn submission.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Events streamed back to the client while a turn runs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "start", rename_all = "camelCase")] Start {
        chat_id: String,
    },
    #[serde(rename = "text-delta")] TextDelta {
        delta: String,
    },
    #[serde(rename = "tool-call", rename_all = "camelCase")] ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: JsonValue,
    },
    #[serde(rename = "tool-result", rename_all = "camelCase")] ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: String,
    },
    #[serde(rename = "finish", rename_all = "camelCase")] Finish {
        chat_id: String,
        messages: Vec<ChatMessage>,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = StreamEvent::ToolResult {
            tool_call_id: "c1".into(),
            tool_name: "listAllGroups".into(),
            output: "No groups found.".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool-result");
        assert_eq!(json["toolCallId"], "c1");
        assert_eq!(json["toolName"], "listAllGroups");
    }

    #[test]
    fn turn_request_without_chat_id() {
        let req: TurnRequest = serde_json::from_str(
            r#"{"messages":[{"id":"u1","role":"user","content":"hi"}]}"#
        ).unwrap();
        assert!(req.chat_id.is_none());
        assert_eq!(req.messages.len(), 1);
    }
}
