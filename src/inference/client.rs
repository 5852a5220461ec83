//! Streaming Inference Client
//!
//! Wraps an OpenAI-compatible `/v1/chat/completions` endpoint with
//! `stream: true`. Text deltas are forwarded as they arrive; tool-call
//! argument fragments are keyed by index and assembled into complete
//! calls before the turn is reported complete.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::types::{
    ChatMessage, InferenceClient, InferenceEvent, InferenceOptions, InferenceToolCall,
    InferenceToolCallFunction,
};

pub struct OpenAiInferenceClient {
    api_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    default_max_tokens: u32,
    http: Client,
}

impl OpenAiInferenceClient {
    pub fn new(config: &GatewayConfig) -> Self {
        OpenAiInferenceClient {
            api_url: config.inference_api_url.trim_end_matches('/').to_string(),
            api_key: config.inference_api_key.clone(),
            default_model: config.inference_model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens_per_reply,
            http: Client::new(),
        }
    }

    fn build_body(&self, messages: &[ChatMessage], options: &InferenceOptions) -> Value {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "temperature": options.temperature.unwrap_or(self.default_temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.default_max_tokens),
        });

        if let Some(ref tools) = options.tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools);
                body["tool_choice"] = serde_json::json!("auto");
            }
        }

        body
    }
}

#[async_trait]
impl InferenceClient for OpenAiInferenceClient {
    async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        options: InferenceOptions,
    ) -> Result<mpsc::Receiver<InferenceEvent>> {
        let body = self.build_body(&messages, &options);
        let url = format!("{}/v1/chat/completions", self.api_url);

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Inference request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Inference error: {}: {}", status.as_u16(), text);
        }

        let (tx, rx) = mpsc::channel::<InferenceEvent>(64);

        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();
            let mut assembler = ToolCallAssembler::new();
            let mut finish_reason: Option<String> = None;

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(InferenceEvent::Failed {
                                message: format!("Inference stream error: {}", e),
                            })
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);

                    let payload = match sse_data(&line) {
                        Some(p) => p.to_string(),
                        None => continue,
                    };

                    if payload == "[DONE]" {
                        for call in assembler.finish() {
                            if tx.send(InferenceEvent::ToolCall(call)).await.is_err() {
                                return;
                            }
                        }
                        let _ = tx
                            .send(InferenceEvent::Completed {
                                finish_reason: finish_reason.unwrap_or_else(|| "stop".to_string()),
                            })
                            .await;
                        return;
                    }

                    let event: Value = match serde_json::from_str(&payload) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "Skipping unparseable stream chunk");
                            continue;
                        }
                    };

                    if let Some(message) = extract_stream_error(&event) {
                        let _ = tx.send(InferenceEvent::Failed { message }).await;
                        return;
                    }

                    let choice = &event["choices"][0];

                    if let Some(reason) = choice["finish_reason"].as_str() {
                        finish_reason = Some(reason.to_string());
                    }

                    let delta = &choice["delta"];
                    if let Some(text) = delta["content"].as_str() {
                        if !text.is_empty()
                            && tx
                                .send(InferenceEvent::TextDelta(text.to_string()))
                                .await
                                .is_err()
                        {
                            debug!("Stream consumer dropped, abandoning inference read");
                            return;
                        }
                    }
                    if let Some(fragments) = delta["tool_calls"].as_array() {
                        for fragment in fragments {
                            assembler.absorb(fragment);
                        }
                    }
                }
            }

            // Stream closed without the [DONE] sentinel.
            if finish_reason.is_some() {
                for call in assembler.finish() {
                    if tx.send(InferenceEvent::ToolCall(call)).await.is_err() {
                        return;
                    }
                }
                let _ = tx
                    .send(InferenceEvent::Completed {
                        finish_reason: finish_reason.unwrap(),
                    })
                    .await;
            } else {
                let _ = tx
                    .send(InferenceEvent::Failed {
                        message: "Inference stream closed before completion".to_string(),
                    })
                    .await;
            }
        });

        Ok(rx)
    }
}

/// Payload of one `data:` SSE line, if the line carries one.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Provider-reported error inside the stream, in either the object or
/// plain-string shape.
fn extract_stream_error(event: &Value) -> Option<String> {
    let error = event.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("Inference provider reported an error".to_string())
}

/// Accumulates streamed tool-call fragments. The provider splits each
/// call across chunks: the id and name arrive once, the arguments as a
/// sequence of string fragments keyed by the call's index.
struct ToolCallAssembler {
    partial: Vec<PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    fn new() -> Self {
        ToolCallAssembler {
            partial: Vec::new(),
        }
    }

    fn absorb(&mut self, fragment: &Value) {
        let index = fragment["index"].as_u64().unwrap_or(0) as usize;
        while self.partial.len() <= index {
            self.partial.push(PartialToolCall::default());
        }
        let entry = &mut self.partial[index];

        if let Some(id) = fragment["id"].as_str() {
            entry.id.push_str(id);
        }
        if let Some(name) = fragment["function"]["name"].as_str() {
            entry.name.push_str(name);
        }
        if let Some(args) = fragment["function"]["arguments"].as_str() {
            entry.arguments.push_str(args);
        }
    }

    fn finish(self) -> Vec<InferenceToolCall> {
        self.partial
            .into_iter()
            .filter(|p| !p.name.is_empty())
            .map(|p| InferenceToolCall {
                id: if p.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4())
                } else {
                    p.id
                },
                call_type: "function".to_string(),
                function: InferenceToolCallFunction {
                    name: p.name,
                    arguments: if p.arguments.is_empty() {
                        "{}".to_string()
                    } else {
                        p.arguments
                    },
                },
            })
            .collect()
    }
}
