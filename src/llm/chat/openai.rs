use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;

use super::sse::StreamDecoder;
use super::{ create_streaming_response, ChatClient, CompletionRequest, LlmError, ModelMessage, StepStream };
use crate::llm::LlmConfig;
use crate::tools::ToolDefinition;

/// Client for any provider that speaks the OpenAI chat-completions protocol.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ModelMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    stream: bool,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    LlmError::Config(format!("Invalid API key format: {}", e))
                )?
            );
        }

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self { http, model, base_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() && config.llm_type.requires_api_key() {
            return Err(LlmError::Config(format!("{:?} API key is required", config.llm_type)));
        }
        let model = config.completion_model
            .clone()
            .unwrap_or_else(|| config.llm_type.default_model().to_string());
        let base_url = config.base_url
            .clone()
            .unwrap_or_else(|| config.llm_type.default_base_url().to_string());

        Self::new(api_key, model, base_url)
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        let system = ModelMessage::System { content: request.system.clone() };
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(&system);
        }
        messages.extend(request.messages.iter());

        let body = OpenAIChatRequest {
            model: &self.model,
            messages,
            tools: request.tools
                .iter()
                .map(|function| ToolSpec { kind: "function", function })
                .collect(),
            stream: true,
        };

        let url = self.completions_url();
        debug!("Requesting chat completion from {} with model {}", url, self.model);
        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        Ok(
            create_streaming_response(move |tx| async move {
                let mut bytes = resp.bytes_stream();
                let mut decoder = StreamDecoder::new();

                while let Some(chunk) = bytes.next().await {
                    let decoded = match chunk {
                        Ok(buf) => decoder.feed(&buf),
                        Err(e) => Err(LlmError::Http(e)),
                    };
                    match decoded {
                        Ok(events) => {
                            for event in events {
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                    if decoder.is_finished() {
                        break;
                    }
                }

                match decoder.finish() {
                    Ok(events) => {
                        for event in events {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                    }
                }
                info!("Chat completion stream closed");
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmType;

    #[test]
    fn provider_defaults_fill_missing_config() {
        let client = OpenAIChatClient::from_config(&LlmConfig {
            llm_type: LlmType::Cerebras,
            api_key: Some("key".into()),
            completion_model: None,
            base_url: None,
        }).unwrap();
        assert_eq!(client.get_model(), "gpt-oss-120b");
        assert_eq!(client.completions_url(), "https://api.cerebras.ai/v1/chat/completions");
    }

    #[test]
    fn full_endpoint_is_used_as_is() {
        let client = OpenAIChatClient::new(
            None,
            "m".into(),
            "http://localhost:8080/v1/chat/completions/".into()
        ).unwrap();
        assert_eq!(client.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn hosted_provider_needs_a_key() {
        let result = OpenAIChatClient::from_config(&LlmConfig {
            llm_type: LlmType::OpenAI,
            ..LlmConfig::default()
        });
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn ollama_runs_without_a_key() {
        let result = OpenAIChatClient::from_config(&LlmConfig {
            llm_type: LlmType::Ollama,
            ..LlmConfig::default()
        });
        assert!(result.is_ok());
    }
}
