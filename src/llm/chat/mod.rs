pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::{ Future, Stream };
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::tools::ToolDefinition;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Chat provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Chat provider returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("Malformed chat stream: {0}")]
    Decode(String),
    #[error("Chat provider configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ModelToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A message in the provider's chat-completions format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ModelMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ModelToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// Everything one model step needs.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: &'static [ToolDefinition],
}

/// What a streaming step yields. Tool calls arrive fully assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    TextDelta(String),
    ToolCall(ModelToolCall),
    Finish {
        reason: Option<String>,
    },
}

pub type StepStream = Pin<Box<dyn Stream<Item = Result<StepEvent, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Runs a single model step and streams its output.
    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> StepStream
where
    F: FnOnce(mpsc::Sender<Result<StepEvent, LlmError>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = Arc::new(OpenAIChatClient::from_config(config)?);
    Ok(client)
}
