use futures::StreamExt;
use log::{ debug, error, info, warn };
use serde_json::json;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cli::Args;
use crate::gitlab::{ GitLabClient, GitLabConfig };
use crate::history::{ initialize_history_store, HistoryError, HistoryStore };
use crate::llm::LlmConfig;
use crate::llm::chat::{
    new_client as new_chat_client,
    ChatClient,
    CompletionRequest,
    LlmError,
    ModelMessage,
    ModelToolCall,
    StepEvent,
};
use crate::models::chat::{ ChatMessage, Role, ToolCallRecord };
use crate::models::stream::StreamEvent;
use crate::tools::{ ToolError, ToolRegistry };

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Failed to create chat: {0}")]
    CreateChat(#[source] HistoryError),
    #[error("Failed to load chat history: {0}")]
    LoadHistory(#[source] HistoryError),
    #[error("Completion failed: {0}")]
    Completion(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("message at position {0} has no id")]
    MissingId(usize),
    #[error("message '{id}' has an invalid tool call: {source}")]
    ToolCall {
        id: String,
        #[source]
        source: ToolError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered without asking for more tools.
    Stop,
    /// The step budget ran out while the model still wanted tools.
    StepLimit,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => f.write_str("stop"),
            FinishReason::StepLimit => f.write_str("step-limit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub chat_id: String,
    /// Validated input followed by the new assistant message.
    pub messages: Vec<ChatMessage>,
    pub steps: usize,
    pub finish_reason: FinishReason,
    pub persisted: bool,
}

/// Result of the model/tool loop for one turn.
struct StepLoop {
    text: String,
    records: Vec<ToolCallRecord>,
    steps: usize,
    finish_reason: FinishReason,
}

async fn emit(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    // A closed receiver means the client left; the turn still runs to completion.
    if events.send(event).await.is_err() {
        debug!("Stream receiver closed; continuing turn without client");
    }
}

/// Replays stored messages in the provider's format. Tool calls go first,
/// followed by their results, then any text the assistant produced.
pub fn to_model_messages(messages: &[ChatMessage]) -> Vec<ModelMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::User => out.push(ModelMessage::User { content: message.content.clone() }),
            Role::Assistant => {
                let calls = message.tool_calls.as_deref().unwrap_or_default();
                if !calls.is_empty() {
                    out.push(ModelMessage::Assistant {
                        content: None,
                        tool_calls: calls
                            .iter()
                            .map(|c| ModelToolCall::function(&c.id, &c.name, c.input.to_string()))
                            .collect(),
                    });
                    for call in calls {
                        out.push(ModelMessage::Tool {
                            tool_call_id: call.id.clone(),
                            content: call.output
                                .clone()
                                .unwrap_or_else(|| "Tool call did not complete.".to_string()),
                        });
                    }
                }
                if !message.content.is_empty() || calls.is_empty() {
                    out.push(ModelMessage::Assistant {
                        content: Some(message.content.clone()),
                        tool_calls: Vec::new(),
                    });
                }
            }
        }
    }
    out
}

#[derive(Clone)]
pub struct Assistant {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn HistoryStore>,
    tools: ToolRegistry,
    system_prompt: String,
    max_steps: usize,
}

impl Assistant {
    fn initialize_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: args.chat_llm_type.parse()?,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}",
            args.chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Ok(chat_client)
    }

    pub async fn new(args: &Args) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_client = Self::initialize_chat_client(args)?;
        let history_store = initialize_history_store(args).await?;
        let gitlab = GitLabClient::new(GitLabConfig::from_args(args));
        if args.gitlab_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            warn!("GITLAB_TOKEN is not set; GitLab tools will report a configuration error");
        }

        Ok(
            Self::from_parts(
                chat_client,
                history_store,
                ToolRegistry::new(gitlab),
                args.system_prompt.clone(),
                args.max_steps
            )
        )
    }

    pub fn from_parts(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        tools: ToolRegistry,
        system_prompt: String,
        max_steps: usize
    ) -> Self {
        Self {
            chat_client,
            history_store,
            tools,
            system_prompt,
            max_steps: max_steps.max(1),
        }
    }

    pub fn history_store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history_store)
    }

    /// Uses the given chat id, or creates a new chat when there is none.
    pub async fn resolve_chat(&self, chat_id: Option<String>) -> Result<String, TurnError> {
        match chat_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                info!("Using existing chat {}", id);
                Ok(id)
            }
            None => {
                let id = self.history_store.create_chat().await.map_err(TurnError::CreateChat)?;
                info!("Created new chat {}", id);
                Ok(id)
            }
        }
    }

    async fn load_history(&self, chat_id: &str) -> Result<Vec<ChatMessage>, TurnError> {
        match self.history_store.load_chat(chat_id).await {
            Ok(messages) => {
                info!("Loaded {} previous messages for chat {}", messages.len(), chat_id);
                Ok(messages)
            }
            Err(e) if e.is_not_found() => {
                warn!("Chat {} has no stored history; starting empty", chat_id);
                Ok(Vec::new())
            }
            Err(e) => Err(TurnError::LoadHistory(e)),
        }
    }

    /// Checks a transcript against the current tool schemas.
    pub fn validate(&self, messages: &[ChatMessage]) -> Result<(), ValidationError> {
        for (index, message) in messages.iter().enumerate() {
            if message.id.trim().is_empty() {
                return Err(ValidationError::MissingId(index));
            }
            for record in message.tool_calls.as_deref().unwrap_or_default() {
                self.tools.validate_record(record).map_err(|source| ValidationError::ToolCall {
                    id: message.id.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn merge_and_validate(
        &self,
        history: Vec<ChatMessage>,
        incoming: Vec<ChatMessage>
    ) -> Vec<ChatMessage> {
        let mut merged = history;
        merged.extend(incoming.iter().cloned());
        match self.validate(&merged) {
            Ok(()) => merged,
            Err(e) => {
                // Stored rows are left alone; only this turn ignores them.
                warn!("History failed validation ({}); continuing with the new messages only", e);
                incoming
            }
        }
    }

    async fn run_steps(
        &self,
        messages: &[ChatMessage],
        events: &mpsc::Sender<StreamEvent>
    ) -> Result<StepLoop, TurnError> {
        let mut request = CompletionRequest {
            system: self.system_prompt.clone(),
            messages: to_model_messages(messages),
            tools: self.tools.definitions(),
        };
        let mut text = String::new();
        let mut records = Vec::new();
        let mut steps = 0;
        let mut finish_reason = FinishReason::StepLimit;

        while steps < self.max_steps {
            steps += 1;
            debug!("Starting model step {}/{}", steps, self.max_steps);
            let mut stream = self.chat_client.stream_step(&request).await?;
            let mut step_text = String::new();
            let mut calls = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    StepEvent::TextDelta(delta) => {
                        step_text.push_str(&delta);
                        emit(events, StreamEvent::TextDelta { delta }).await;
                    }
                    StepEvent::ToolCall(call) => calls.push(call),
                    StepEvent::Finish { .. } => {
                        break;
                    }
                }
            }

            request.messages.push(ModelMessage::Assistant {
                content: (!step_text.is_empty()).then(|| step_text.clone()),
                tool_calls: calls.clone(),
            });
            text.push_str(&step_text);

            if calls.is_empty() {
                finish_reason = FinishReason::Stop;
                break;
            }

            for call in calls {
                let name = call.function.name.clone();
                let invocation = self.tools.invoke(&name, &call.function.arguments).await;
                emit(events, StreamEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: name.clone(),
                    input: invocation.input.clone(),
                }).await;
                emit(events, StreamEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: name.clone(),
                    output: invocation.output.clone(),
                }).await;
                request.messages.push(ModelMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: invocation.output.clone(),
                });
                // Calls the registry rejected stay out of the transcript so it keeps validating.
                if invocation.accepted {
                    records.push(ToolCallRecord {
                        id: call.id,
                        name,
                        input: invocation.input,
                        output: Some(invocation.output),
                    });
                }
            }
        }

        if finish_reason == FinishReason::StepLimit {
            warn!("Turn stopped after reaching the step limit of {}", self.max_steps);
        }

        Ok(StepLoop { text, records, steps, finish_reason })
    }

    /// Runs one turn for an already resolved chat, streaming progress into `events`.
    pub async fn run_turn(
        &self,
        chat_id: String,
        incoming: Vec<ChatMessage>,
        events: &mpsc::Sender<StreamEvent>
    ) -> Result<TurnOutcome, TurnError> {
        emit(events, StreamEvent::Start { chat_id: chat_id.clone() }).await;

        let history = self.load_history(&chat_id).await?;
        let mut messages = self.merge_and_validate(history, incoming);
        info!("Processing {} messages for chat {}", messages.len(), chat_id);

        let outcome = match self.run_steps(&messages, events).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Turn failed for chat {}: {}", chat_id, e);
                emit(events, StreamEvent::Error { message: e.to_string() }).await;
                return Err(e);
            }
        };

        let reply = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: outcome.text,
            tool_calls: (!outcome.records.is_empty()).then_some(outcome.records),
            metadata: Some(
                json!({
                    "steps": outcome.steps,
                    "finishReason": outcome.finish_reason.to_string(),
                    "model": self.chat_client.get_model(),
                })
            ),
            created_at: None,
        };
        messages.push(reply);

        emit(events, StreamEvent::Finish {
            chat_id: chat_id.clone(),
            messages: messages.clone(),
        }).await;

        let persisted = match self.history_store.save_chat(&chat_id, &messages).await {
            Ok(()) => {
                info!("Saved {} messages to chat {}", messages.len(), chat_id);
                true
            }
            Err(e) => {
                error!("Failed to save chat {}: {}", chat_id, e);
                false
            }
        };

        Ok(TurnOutcome {
            chat_id,
            messages,
            steps: outcome.steps,
            finish_reason: outcome.finish_reason,
            persisted,
        })
    }

    pub async fn process_turn(
        &self,
        chat_id: Option<String>,
        incoming: Vec<ChatMessage>,
        events: &mpsc::Sender<StreamEvent>
    ) -> Result<TurnOutcome, TurnError> {
        let chat_id = self.resolve_chat(chat_id).await?;
        self.run_turn(chat_id, incoming, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replays_tool_calls_before_their_results_and_text() {
        let stored = vec![
            ChatMessage::user("u1", "list my groups"),
            ChatMessage {
                tool_calls: Some(
                    vec![ToolCallRecord {
                        id: "call_1".into(),
                        name: "listAllGroups".into(),
                        input: json!({}),
                        output: Some("Found 0 groups".into()),
                    }]
                ),
                ..ChatMessage::assistant("a1", "You have no groups.")
            }
        ];

        let replay = to_model_messages(&stored);
        assert_eq!(replay.len(), 4);
        assert!(matches!(&replay[0], ModelMessage::User { content } if content == "list my groups"));
        assert!(
            matches!(&replay[1], ModelMessage::Assistant { content: None, tool_calls } if tool_calls.len() == 1)
        );
        assert!(
            matches!(&replay[2], ModelMessage::Tool { tool_call_id, content } if tool_call_id == "call_1" && content == "Found 0 groups")
        );
        assert!(
            matches!(&replay[3], ModelMessage::Assistant { content: Some(text), .. } if text == "You have no groups.")
        );
    }

    #[test]
    fn tool_only_reply_has_no_trailing_text_message() {
        let stored = vec![ChatMessage {
            tool_calls: Some(
                vec![ToolCallRecord {
                    id: "call_1".into(),
                    name: "listAllProjects".into(),
                    input: json!({}),
                    output: None,
                }]
            ),
            ..ChatMessage::assistant("a1", "")
        }];
        let replay = to_model_messages(&stored);
        assert_eq!(replay.len(), 2);
        assert!(
            matches!(&replay[1], ModelMessage::Tool { content, .. } if content == "Tool call did not complete.")
        );
    }

    #[test]
    fn finish_reason_renders_kebab_case() {
        assert_eq!(FinishReason::Stop.to_string(), "stop");
        assert_eq!(FinishReason::StepLimit.to_string(), "step-limit");
    }
}
