use std::pin::Pin;

use async_stream::stream;
use clap::ValueEnum;
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub history: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Opaque generation capability: turns a conversation history into a lazy
/// sequence of text fragments. Implementations are expected to tolerate
/// concurrent calls; each call produces an independent stream.
pub trait ChatEngine: Send + Sync {
    fn stream_chat(&self, request: GenerationRequest) -> FragmentStream;
}

const VICUNA_PREAMBLE: &str = "A chat between a curious user and an artificial \
intelligence assistant. The assistant gives helpful, detailed, and polite \
answers to the user's questions.";

/// Prompt template applied to the history before it is sent to the
/// completion server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChatFormat {
    Vicuna,
    Chatml,
}

impl ChatFormat {
    pub fn render(&self, history: &[ChatMessage]) -> String {
        match self {
            ChatFormat::Vicuna => {
                let system: Vec<&str> = history
                    .iter()
                    .filter(|m| m.role == "system")
                    .map(|m| m.content.as_str())
                    .collect();
                let mut prompt = if system.is_empty() {
                    VICUNA_PREAMBLE.to_string()
                } else {
                    system.join("\n")
                };
                for message in history.iter().filter(|m| m.role != "system") {
                    if message.role == "assistant" {
                        prompt.push_str(&format!(" ASSISTANT: {}</s>", message.content));
                    } else {
                        prompt.push_str(&format!(" USER: {}", message.content));
                    }
                }
                prompt.push_str(" ASSISTANT:");
                prompt
            }
            ChatFormat::Chatml => {
                let mut prompt = String::new();
                for message in history {
                    prompt.push_str(&format!(
                        "<|im_start|>{}\n{}<|im_end|>\n",
                        message.role, message.content
                    ));
                }
                prompt.push_str("<|im_start|>assistant\n");
                prompt
            }
        }
    }
}

/// Streaming client for a llama.cpp-compatible completion server. The
/// server owns the model weights; this side only renders the prompt and
/// consumes the SSE token stream.
pub struct LlamaServerEngine {
    client: reqwest::Client,
    base_url: String,
    format: ChatFormat,
}

impl LlamaServerEngine {
    pub fn new(base_url: String, format: ChatFormat) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            format,
        }
    }
}

impl ChatEngine for LlamaServerEngine {
    fn stream_chat(&self, request: GenerationRequest) -> FragmentStream {
        let client = self.client.clone();
        let url = format!("{}/v1/completions", self.base_url);
        let prompt = self.format.render(&request.history);

        Box::pin(stream! {
            let request_body = serde_json::json!({
                "prompt": prompt,
                "n_predict": request.max_tokens,
                "stop": request.stop,
                "stream": true
            });

            let response = match client.post(&url).json(&request_body).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(GenerationError::Transport(e));
                    return;
                }
            };

            if !response.status().is_success() {
                yield Err(GenerationError::Status(response.status()));
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(GenerationError::Transport(e));
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = String::from_utf8_lossy(&buffer[..pos]).to_string();
                    buffer.drain(..=pos);

                    if line.trim().is_empty() || !line.starts_with("data: ") {
                        continue;
                    }

                    let data = &line[6..];
                    if data == "[DONE]" {
                        return;
                    }

                    if let Ok(resp_json) = serde_json::from_str::<serde_json::Value>(data) {
                        if let Some(choice) = resp_json["choices"]
                            .as_array()
                            .and_then(|choices| choices.first())
                        {
                            let text = choice["text"].as_str().unwrap_or("");
                            let finished = !choice["finish_reason"].is_null();

                            // empty deltas are forwarded, not suppressed, so
                            // chunk counts stay stable for clients
                            yield Ok(text.to_string());

                            if finished {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}
