use log::warn;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{ LlmError, ModelToolCall, StepEvent };

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Turns the provider's `data:` lines into [`StepEvent`]s.
///
/// Bytes may be split anywhere, including inside a line or a UTF-8 sequence.
/// Tool-call fragments are merged by index and released once the step ends.
#[derive(Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    calls: BTreeMap<usize, PartialCall>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StepEvent>, LlmError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line), &mut events)?;
        }
        Ok(events)
    }

    /// Called when the byte stream ends; closes the step if the provider never did.
    pub fn finish(&mut self) -> Result<Vec<StepEvent>, LlmError> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&rest), &mut events)?;
        }
        self.flush(None, &mut events);
        Ok(events)
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<StepEvent>) -> Result<(), LlmError> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if self.finished || data.is_empty() {
            return Ok(());
        }
        if data == "[DONE]" {
            self.flush(None, events);
            return Ok(());
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Skipping unparsable stream chunk: {} ({})", data, e);
                return Ok(());
            }
        };
        if let Some(err) = chunk.error {
            return Err(LlmError::Decode(err.to_string()));
        }

        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    events.push(StepEvent::TextDelta(content));
                }
                for fragment in delta.tool_calls.unwrap_or_default() {
                    let call = self.calls.entry(fragment.index).or_default();
                    if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                        call.id = Some(id);
                    }
                    if let Some(function) = fragment.function {
                        if let Some(name) = function.name {
                            call.name.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            call.arguments.push_str(&arguments);
                        }
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.flush(Some(reason), events);
            }
        }
        Ok(())
    }

    fn flush(&mut self, reason: Option<String>, events: &mut Vec<StepEvent>) {
        if self.finished {
            return;
        }
        self.finished = true;
        for call in std::mem::take(&mut self.calls).into_values() {
            // Ids must stay unique across steps once replayed from history.
            let id = call.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            events.push(StepEvent::ToolCall(ModelToolCall::function(id, call.name, call.arguments)));
        }
        events.push(StepEvent::Finish { reason });
    }
}
