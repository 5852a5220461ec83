//! The Conversation Orchestrator
//!
//! Drives one request through the model↔tool loop: call the model with
//! the tool catalogue, execute every requested tool call, append each
//! outcome as a tool-role message, and re-invoke the model until a turn
//! ends with no further tool calls. That turn's text is the final
//! streamed answer.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::server::stream::ResponseStreamer;
use crate::types::{
    ChatMessage, ChatRole, ExecutedToolCall, InferenceClient, InferenceEvent, InferenceOptions,
    InferenceToolCall, SupportBackend, ToolResult,
};

use super::system_prompt::build_system_prompt;
use super::tools::{create_support_tools, execute_tool, tools_to_inference_format, GatewayTool};

/// Conversation phases. Every transition is explicit; `Done` is reached
/// only when a model turn requests no further tools (or the round cap
/// forces a final answer).
enum Phase {
    AwaitingModel { tools_enabled: bool },
    ExecutingTools { content: String, calls: Vec<InferenceToolCall> },
    Done,
}

pub struct Orchestrator {
    inference: Arc<dyn InferenceClient>,
    backend: Arc<dyn SupportBackend>,
    tools: Arc<Vec<GatewayTool>>,
    max_tool_rounds: usize,
}

impl Orchestrator {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        backend: Arc<dyn SupportBackend>,
        config: &GatewayConfig,
    ) -> Self {
        Orchestrator {
            inference,
            backend,
            tools: Arc::new(create_support_tools()),
            max_tool_rounds: config.max_tool_rounds,
        }
    }

    /// Run the conversation to completion, forwarding text deltas to
    /// the streamer as they arrive. Returns `Ok` on a finished answer
    /// or an abandoned (disconnected) client; `Err` only on failures
    /// outside tool execution.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        streamer: &ResponseStreamer,
    ) -> Result<()> {
        if !messages.iter().any(|m| m.role == ChatRole::System) {
            messages.insert(0, ChatMessage::system(build_system_prompt()));
        }

        let mut rounds_used = 0usize;
        let mut phase = Phase::AwaitingModel { tools_enabled: true };

        loop {
            phase = match phase {
                Phase::AwaitingModel { tools_enabled } => {
                    let options = InferenceOptions {
                        tools: tools_enabled.then(|| tools_to_inference_format(&self.tools)),
                        ..Default::default()
                    };

                    let mut rx = self.inference.chat_stream(messages.clone(), options).await?;

                    let mut content = String::new();
                    let mut calls: Vec<InferenceToolCall> = Vec::new();
                    let mut completed = false;

                    while let Some(event) = rx.recv().await {
                        match event {
                            InferenceEvent::TextDelta(text) => {
                                content.push_str(&text);
                                if !streamer.write(&text).await {
                                    info!("Client disconnected, abandoning conversation");
                                    return Ok(());
                                }
                            }
                            InferenceEvent::ToolCall(call) => calls.push(call),
                            InferenceEvent::Completed { .. } => {
                                completed = true;
                                break;
                            }
                            InferenceEvent::Failed { message } => {
                                anyhow::bail!("Inference provider failure: {}", message);
                            }
                        }
                    }
                    if !completed {
                        anyhow::bail!("Inference stream ended before completion");
                    }

                    if calls.is_empty() || !tools_enabled {
                        Phase::Done
                    } else if rounds_used >= self.max_tool_rounds {
                        // Cap hit: the pending calls are not executed.
                        // One last turn without tools produces the
                        // best-effort final answer.
                        warn!(
                            rounds = rounds_used,
                            "Tool round cap reached, forcing final answer"
                        );
                        Phase::AwaitingModel {
                            tools_enabled: false,
                        }
                    } else {
                        rounds_used += 1;
                        Phase::ExecutingTools { content, calls }
                    }
                }

                Phase::ExecutingTools { content, calls } => {
                    messages.push(ChatMessage::assistant(content, calls.clone()));

                    // Every outcome, success or failure, goes back to
                    // the model, in issuance order.
                    for executed in self.execute_round(&calls).await {
                        info!(
                            tool = %executed.name,
                            ok = executed.result.is_success(),
                            duration_ms = executed.duration_ms,
                            "Tool call finished"
                        );
                        messages.push(ChatMessage::tool(
                            executed.call_id,
                            executed.name,
                            executed.result.to_model_json().to_string(),
                        ));
                    }

                    Phase::AwaitingModel {
                        tools_enabled: true,
                    }
                }

                Phase::Done => return Ok(()),
            };
        }
    }

    /// Execute one turn's tool calls concurrently. Completion order is
    /// arbitrary; results are slotted back by issuance index so the
    /// transcript the model sees is reproducible.
    async fn execute_round(&self, calls: &[InferenceToolCall]) -> Vec<ExecutedToolCall> {
        let mut join = JoinSet::new();
        for (idx, call) in calls.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let tools = Arc::clone(&self.tools);
            join.spawn(async move {
                let executed = execute_tool(&call, &tools, backend.as_ref()).await;
                (idx, executed)
            });
        }

        let mut slots: Vec<Option<ExecutedToolCall>> =
            calls.iter().map(|_| None).collect();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((idx, executed)) => slots[idx] = Some(executed),
                Err(e) => warn!(error = %e, "Tool task failed to join"),
            }
        }

        // A joined-with-error slot still owes the model an outcome.
        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| ExecutedToolCall {
                    call_id: calls[idx].id.clone(),
                    name: calls[idx].function.name.clone(),
                    arguments: serde_json::Value::Null,
                    result: ToolResult::unreachable(
                        "La ejecución de la herramienta fue interrumpida",
                    ),
                    duration_ms: 0,
                })
            })
            .collect()
    }
}
