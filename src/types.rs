//! Ventanilla - Type Definitions
//!
//! Shared types for the support-chat gateway: the chat wire model, the
//! uniform tool result union, and the trait seams for the inference
//! provider and the customer-management backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

// ─── Chat Wire Model ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the conversation, OpenAI wire-compatible.
/// The history is append-only within a request and never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<InferenceToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<InferenceToolCall>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
            name: None,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        }
    }

    /// A tool-role message carrying one normalized tool outcome back to
    /// the model, matched to its originating call id.
    pub fn tool(call_id: impl Into<String>, name: impl Into<String>, content: String) -> Self {
        ChatMessage {
            role: ChatRole::Tool,
            content,
            name: Some(name.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Inbound body of `POST /chat`.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

// ─── Inference ───────────────────────────────────────────────────

/// A tool call as emitted by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: InferenceToolCallFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceToolCallFunction {
    pub name: String,
    /// Raw JSON string, exactly as streamed by the provider.
    pub arguments: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceToolDefinition {
    #[serde(rename = "type")]
    pub def_type: String,
    pub function: InferenceToolDefinitionFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceToolDefinitionFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, Default)]
pub struct InferenceOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<InferenceToolDefinition>>,
}

/// Incremental output of one streamed model turn. Tool calls are
/// emitted fully assembled, after the last text delta of the turn.
#[derive(Clone, Debug)]
pub enum InferenceEvent {
    TextDelta(String),
    ToolCall(InferenceToolCall),
    Completed { finish_reason: String },
    Failed { message: String },
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Open one streamed chat-completion turn. The receiver yields text
    /// deltas and assembled tool calls, terminated by `Completed` or
    /// `Failed`.
    async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        options: InferenceOptions,
    ) -> anyhow::Result<mpsc::Receiver<InferenceEvent>>;
}

// ─── Tool Results ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema/validation failure caught before any network call.
    InvalidArgument,
    /// The backend reports the referenced entity does not exist.
    NotFound,
    /// Transport failure, timeout, or an unexpected backend status.
    Unreachable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unreachable => "unreachable",
        }
    }
}

/// Uniform outcome of one tool call. Exactly one variant; a `Failure`
/// is returned as data and re-injected into the conversation, never
/// raised.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolResult {
    Success { payload: Value },
    Failure { kind: ErrorKind, message: String },
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        ToolResult::Success { payload }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ToolResult::Failure {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ToolResult::Failure {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        ToolResult::Failure {
            kind: ErrorKind::Unreachable,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// The JSON the model sees as the tool message content. Success
    /// payloads keep their endpoint-specific fields under a `success`
    /// flag; failures collapse to the uniform kind + message pair.
    pub fn to_model_json(&self) -> Value {
        match self {
            ToolResult::Success { payload } => {
                let mut out = match payload {
                    Value::Object(map) => Value::Object(map.clone()),
                    other => json!({ "data": other }),
                };
                out["success"] = json!(true);
                out
            }
            ToolResult::Failure { kind, message } => json!({
                "success": false,
                "error": kind.as_str(),
                "message": message,
            }),
        }
    }
}

/// A tool outcome tied back to the call that produced it.
#[derive(Clone, Debug)]
pub struct ExecutedToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub result: ToolResult,
    pub duration_ms: u64,
}

// ─── Backend ─────────────────────────────────────────────────────

/// Typed failure of a backend request. Nothing else crosses the
/// `SupportBackend` boundary: network failures, non-2xx statuses and
/// body-parse failures all end up here.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {message}")]
    Transport { message: String },
    #[error("backend returned status {status}")]
    Status { status: u16, body: Value },
    #[error("invalid backend response body: {message}")]
    InvalidBody { message: String },
}

impl BackendError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Best-effort human message from the backend's own error body.
    /// The endpoints disagree on field names (`error`, `message`,
    /// `mensaje`), so all three are tried in order.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::Status { body, .. } => ["error", "message", "mensaje"]
                .iter()
                .find_map(|k| body[*k].as_str())
                .filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait SupportBackend: Send + Sync {
    async fn buscar_cliente(&self, query: &str) -> Result<Value, BackendError>;
    async fn consultar_saldo(&self, cliente_id: i64) -> Result<Value, BackendError>;
    async fn crear_ticket(&self, body: Value, idempotency_key: &str)
        -> Result<Value, BackendError>;
    async fn registrar_pago(
        &self,
        body: Value,
        idempotency_key: &str,
    ) -> Result<Value, BackendError>;
}

// ─── Domain Enums ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Prioridad {
    Baja,
    Media,
    Alta,
    Critica,
}

impl Prioridad {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "baja" => Some(Prioridad::Baja),
            "media" => Some(Prioridad::Media),
            "alta" => Some(Prioridad::Alta),
            "critica" => Some(Prioridad::Critica),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Prioridad::Baja => "baja",
            Prioridad::Media => "media",
            Prioridad::Alta => "alta",
            Prioridad::Critica => "critica",
        }
    }
}

impl Default for Prioridad {
    fn default() -> Self {
        Prioridad::Media
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetodoPago {
    Efectivo,
    Tarjeta,
    Transferencia,
    Cheque,
}

impl MetodoPago {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "efectivo" => Some(MetodoPago::Efectivo),
            "tarjeta" => Some(MetodoPago::Tarjeta),
            "transferencia" => Some(MetodoPago::Transferencia),
            "cheque" => Some(MetodoPago::Cheque),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetodoPago::Efectivo => "efectivo",
            MetodoPago::Tarjeta => "tarjeta",
            MetodoPago::Transferencia => "transferencia",
            MetodoPago::Cheque => "cheque",
        }
    }
}

impl Default for MetodoPago {
    fn default() -> Self {
        MetodoPago::Transferencia
    }
}
