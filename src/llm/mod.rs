pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

/// Providers reachable through an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    OpenAI,
    Cerebras,
    Groq,
    XAI,
    DeepSeek,
    Ollama,
}

impl LlmType {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "https://api.openai.com/v1",
            LlmType::Cerebras => "https://api.cerebras.ai/v1",
            LlmType::Groq => "https://api.groq.com/openai/v1",
            LlmType::XAI => "https://api.x.ai/v1",
            LlmType::DeepSeek => "https://api.deepseek.com/v1",
            LlmType::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "gpt-4o",
            LlmType::Cerebras => "gpt-oss-120b",
            LlmType::Groq => "llama-3.3-70b-versatile",
            LlmType::XAI => "grok-3",
            LlmType::DeepSeek => "deepseek-chat",
            LlmType::Ollama => "llama3.1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAI),
            "cerebras" => Ok(LlmType::Cerebras),
            "groq" => Ok(LlmType::Groq),
            "xai" => Ok(LlmType::XAI),
            "deepseek" => Ok(LlmType::DeepSeek),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Cerebras,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}
