//! Gateway Tool System
//!
//! The catalogue of operations the model may invoke, and the adapters
//! that execute them against the customer-management backend. Each
//! adapter validates its declared argument schema before any network
//! call and maps every backend response or error into the uniform
//! `ToolResult` union. Adapters return failures as data; they never
//! raise.

use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::{
    BackendError, ExecutedToolCall, InferenceToolCall, InferenceToolDefinition,
    InferenceToolDefinitionFunction, MetodoPago, Prioridad, SupportBackend, ToolResult,
};

/// Backend ceiling for a single payment, enforced locally as well so an
/// over-limit amount never leaves the gateway.
const MONTO_MAXIMO: f64 = 999_999.99;

/// One operation exposed to the model.
#[derive(Debug, Clone)]
pub struct GatewayTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The four support tools, with the argument schemas the model sees.
pub fn create_support_tools() -> Vec<GatewayTool> {
    vec![
        GatewayTool {
            name: "buscar_cliente".to_string(),
            description: "Buscar cliente en el sistema por nombre o email".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Nombre o email del cliente a buscar"
                    }
                },
                "required": ["query"]
            }),
        },
        GatewayTool {
            name: "consultar_saldo".to_string(),
            description: "Consultar el saldo actual de un cliente por su ID".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "clienteId": {
                        "type": "integer",
                        "description": "ID numérico del cliente"
                    }
                },
                "required": ["clienteId"]
            }),
        },
        GatewayTool {
            name: "crear_ticket".to_string(),
            description: "Crear un nuevo ticket de soporte para un cliente".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "clienteId": { "type": "integer", "description": "ID del cliente" },
                    "titulo": { "type": "string", "description": "Título del problema" },
                    "descripcion": {
                        "type": "string",
                        "description": "Descripción detallada del problema"
                    },
                    "prioridad": {
                        "type": "string",
                        "enum": ["baja", "media", "alta", "critica"],
                        "description": "Prioridad del ticket (media si se omite)"
                    }
                },
                "required": ["clienteId", "titulo", "descripcion"]
            }),
        },
        GatewayTool {
            name: "registrar_pago".to_string(),
            description: "Registrar un pago de cliente y actualizar su saldo".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "clienteId": {
                        "type": "integer",
                        "description": "ID del cliente que realiza el pago"
                    },
                    "monto": {
                        "type": "number",
                        "description": "Monto del pago (debe ser positivo)"
                    },
                    "descripcion": {
                        "type": "string",
                        "description": "Descripción o concepto del pago"
                    },
                    "metodoPago": {
                        "type": "string",
                        "enum": ["efectivo", "tarjeta", "transferencia", "cheque"],
                        "description": "Método de pago (transferencia si se omite)"
                    }
                },
                "required": ["clienteId", "monto"]
            }),
        },
    ]
}

/// Convert the catalogue to OpenAI-compatible function definitions.
pub fn tools_to_inference_format(tools: &[GatewayTool]) -> Vec<InferenceToolDefinition> {
    tools
        .iter()
        .map(|t| InferenceToolDefinition {
            def_type: "function".to_string(),
            function: InferenceToolDefinitionFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// Execute one model-issued tool call and return its outcome tied to
/// the originating call id. Unknown names, malformed argument JSON and
/// schema violations all come back as `Failure` values.
pub async fn execute_tool(
    call: &InferenceToolCall,
    tools: &[GatewayTool],
    backend: &dyn SupportBackend,
) -> ExecutedToolCall {
    let start = Instant::now();
    let name = call.function.name.as_str();

    // The tool-call id doubles as the idempotency token for mutating
    // calls: unique per logical call, stable if the same call is ever
    // replayed.
    let idempotency_key = if call.id.is_empty() {
        format!("tc_{}", Uuid::new_v4())
    } else {
        call.id.clone()
    };

    let (arguments, result) = match serde_json::from_str::<Value>(&call.function.arguments) {
        Err(_) => (
            Value::Null,
            ToolResult::invalid("Los argumentos de la herramienta no son JSON válido"),
        ),
        Ok(args) => {
            let result = if !tools.iter().any(|t| t.name == name) {
                ToolResult::invalid(format!("Herramienta desconocida: {}", name))
            } else {
                match name {
                    "buscar_cliente" => buscar_cliente(&args, backend).await,
                    "consultar_saldo" => consultar_saldo(&args, backend).await,
                    "crear_ticket" => crear_ticket(&args, backend, &idempotency_key).await,
                    "registrar_pago" => registrar_pago(&args, backend, &idempotency_key).await,
                    _ => ToolResult::invalid(format!("Herramienta desconocida: {}", name)),
                }
            };
            (args, result)
        }
    };

    ExecutedToolCall {
        call_id: idempotency_key.clone(),
        name: name.to_string(),
        arguments,
        result,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

// ─── Adapters ────────────────────────────────────────────────────

async fn buscar_cliente(args: &Value, backend: &dyn SupportBackend) -> ToolResult {
    let query = match args["query"].as_str().map(str::trim) {
        Some(q) if !q.is_empty() => q,
        _ => {
            return ToolResult::invalid(
                "El parámetro 'query' es requerido y no puede estar vacío",
            )
        }
    };

    match backend.buscar_cliente(query).await {
        // An empty match list is a successful search, not a failure.
        Ok(data) => ToolResult::success(json!({
            "message": data["message"].as_str().unwrap_or("Búsqueda completada"),
            "clientes": data["clientes"].as_array().cloned().unwrap_or_default(),
            "total": data["total"].as_u64().unwrap_or(0),
        })),
        Err(err) => ToolResult::unreachable(format!(
            "No se pudo conectar con el sistema de clientes: {}",
            err
        )),
    }
}

async fn consultar_saldo(args: &Value, backend: &dyn SupportBackend) -> ToolResult {
    let cliente_id = match args["clienteId"].as_i64() {
        Some(id) => id,
        None => {
            return ToolResult::invalid("El parámetro 'clienteId' debe ser un número entero")
        }
    };

    match backend.consultar_saldo(cliente_id).await {
        Ok(data) => ToolResult::success(json!({
            "cliente": data["cliente"],
            "ultimos_pagos": data["ultimos_pagos"].as_array().cloned().unwrap_or_default(),
            "resumen": if data["resumen"].is_object() { data["resumen"].clone() } else { json!({}) },
        })),
        Err(err) if err.status_code() == Some(404) => {
            ToolResult::not_found(format!("No existe cliente con ID {}", cliente_id))
        }
        Err(err) => ToolResult::unreachable(format!("No se pudo consultar el saldo: {}", err)),
    }
}

async fn crear_ticket(
    args: &Value,
    backend: &dyn SupportBackend,
    idempotency_key: &str,
) -> ToolResult {
    let cliente_id = match args["clienteId"].as_i64() {
        Some(id) => id,
        None => {
            return ToolResult::invalid("El parámetro 'clienteId' debe ser un número entero")
        }
    };
    let titulo = match args["titulo"].as_str().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return ToolResult::invalid("El parámetro 'titulo' es requerido"),
    };
    let descripcion = match args["descripcion"].as_str().map(str::trim) {
        Some(d) if !d.is_empty() => d,
        _ => return ToolResult::invalid("El parámetro 'descripcion' es requerido"),
    };
    let prioridad = match parse_enum_arg(args, "prioridad", Prioridad::parse) {
        Ok(p) => p.unwrap_or_default(),
        Err(message) => return ToolResult::invalid(message),
    };

    let body = json!({
        "cliente": cliente_id,
        "titulo": titulo,
        "descripcion": descripcion,
        "prioridad": prioridad.as_str(),
    });

    match backend.crear_ticket(body, idempotency_key).await {
        Ok(data) => ToolResult::success(json!({
            "mensaje": data["mensaje"],
            "ticket": data["ticket"],
            "instrucciones": data["instrucciones"],
        })),
        Err(err) => mutating_failure(err, cliente_id, "No se pudo crear el ticket"),
    }
}

async fn registrar_pago(
    args: &Value,
    backend: &dyn SupportBackend,
    idempotency_key: &str,
) -> ToolResult {
    let cliente_id = match args["clienteId"].as_i64() {
        Some(id) => id,
        None => {
            return ToolResult::invalid("El parámetro 'clienteId' debe ser un número entero")
        }
    };
    let monto = match args["monto"].as_f64() {
        Some(m) => m,
        None => return ToolResult::invalid("El parámetro 'monto' debe ser un número"),
    };
    if monto <= 0.0 {
        return ToolResult::invalid(format!("El monto debe ser mayor a 0 (recibido: {})", monto));
    }
    if monto > MONTO_MAXIMO {
        return ToolResult::invalid(format!(
            "El monto es demasiado alto (máximo ${:.2})",
            MONTO_MAXIMO
        ));
    }
    let descripcion = args["descripcion"]
        .as_str()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Pago registrado");
    let metodo_pago = match parse_enum_arg(args, "metodoPago", MetodoPago::parse) {
        Ok(m) => m.unwrap_or_default(),
        Err(message) => return ToolResult::invalid(message),
    };

    let body = json!({
        "cliente": cliente_id,
        "monto": monto,
        "descripcion": descripcion,
        "metodo_pago": metodo_pago.as_str(),
    });

    match backend.registrar_pago(body, idempotency_key).await {
        Ok(data) => ToolResult::success(json!({
            "mensaje": data["mensaje"],
            "pago": data["pago"],
            "saldos": data["saldos"],
            "confirmacion": data["confirmacion"],
        })),
        Err(err) => mutating_failure(err, cliente_id, "No se pudo registrar el pago"),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Parse an optional enum-valued argument. Absent or null means
/// "use the default"; anything present must be a valid member.
fn parse_enum_arg<T>(
    args: &Value,
    field: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, String> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => match parse(s) {
            Some(v) => Ok(Some(v)),
            None => Err(format!("Valor inválido para '{}': '{}'", field, s)),
        },
        Some(_) => Err(format!("El parámetro '{}' debe ser una cadena", field)),
    }
}

/// Backend failure mapping shared by the mutating adapters: a 404 means
/// the referenced client does not exist; anything else is surfaced with
/// the backend's own error text when it sent one.
fn mutating_failure(err: BackendError, cliente_id: i64, fallback: &str) -> ToolResult {
    let message = err
        .backend_message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}: {}", fallback, err));

    match err.status_code() {
        Some(404) => ToolResult::not_found(
            err.backend_message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("No existe cliente con ID {}", cliente_id)),
        ),
        _ => ToolResult::unreachable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every backend call and pops scripted replies; panics if
    /// called without one, which is how the "no network call" tests
    /// assert the short-circuit.
    struct MockBackend {
        calls: Mutex<Vec<(String, Value, Option<String>)>>,
        replies: Mutex<VecDeque<Result<Value, BackendError>>>,
    }

    impl MockBackend {
        fn new() -> Self {
            MockBackend {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
            }
        }

        fn reply_ok(self, value: Value) -> Self {
            self.replies.lock().unwrap().push_back(Ok(value));
            self
        }

        fn reply_err(self, err: BackendError) -> Self {
            self.replies.lock().unwrap().push_back(Err(err));
            self
        }

        fn calls(&self) -> Vec<(String, Value, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(
            &self,
            endpoint: &str,
            payload: Value,
            key: Option<&str>,
        ) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push((
                endpoint.to_string(),
                payload,
                key.map(str::to_string),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("backend called without a scripted reply")
        }
    }

    #[async_trait]
    impl SupportBackend for MockBackend {
        async fn buscar_cliente(&self, query: &str) -> Result<Value, BackendError> {
            self.record("buscar_cliente", json!({ "q": query }), None)
        }

        async fn consultar_saldo(&self, cliente_id: i64) -> Result<Value, BackendError> {
            self.record("consultar_saldo", json!({ "cliente_id": cliente_id }), None)
        }

        async fn crear_ticket(
            &self,
            body: Value,
            idempotency_key: &str,
        ) -> Result<Value, BackendError> {
            self.record("crear_ticket", body, Some(idempotency_key))
        }

        async fn registrar_pago(
            &self,
            body: Value,
            idempotency_key: &str,
        ) -> Result<Value, BackendError> {
            self.record("registrar_pago", body, Some(idempotency_key))
        }
    }

    fn call(name: &str, arguments: &str) -> InferenceToolCall {
        InferenceToolCall {
            id: "call_test".to_string(),
            call_type: "function".to_string(),
            function: crate::types::InferenceToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn failure_kind(result: &ToolResult) -> ErrorKind {
        match result {
            ToolResult::Failure { kind, .. } => *kind,
            ToolResult::Success { .. } => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn test_negative_monto_rejected_without_network_call() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("registrar_pago", r#"{"clienteId": 1, "monto": -10}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_monto_rejected() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("registrar_pago", r#"{"clienteId": 1}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_excessive_monto_rejected() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("registrar_pago", r#"{"clienteId": 1, "monto": 5000000}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_metodo_pago_rejected_without_network_call() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call(
                "registrar_pago",
                r#"{"clienteId": 1, "monto": 50, "metodoPago": "bitcoin"}"#,
            ),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pago_defaults_applied() {
        let backend = MockBackend::new().reply_ok(json!({
            "mensaje": "Pago registrado exitosamente",
            "pago": { "id": 7 },
            "saldos": { "anterior": 0.0, "actual": 50.0 },
            "confirmacion": "Saldo actualizado"
        }));
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("registrar_pago", r#"{"clienteId": 1, "monto": 50}"#),
            &tools,
            &backend,
        )
        .await;

        assert!(executed.result.is_success());
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["metodo_pago"], json!("transferencia"));
        assert_eq!(calls[0].1["descripcion"], json!("Pago registrado"));
        // The tool-call id is forwarded as the idempotency token.
        assert_eq!(calls[0].2.as_deref(), Some("call_test"));
    }

    #[tokio::test]
    async fn test_prioridad_defaults_to_media() {
        let backend = MockBackend::new().reply_ok(json!({
            "mensaje": "Ticket creado",
            "ticket": { "id": 12, "numero": "#000012" },
            "instrucciones": "Seguimiento con #000012"
        }));
        let tools = create_support_tools();

        let executed = execute_tool(
            &call(
                "crear_ticket",
                r#"{"clienteId": 3, "titulo": "Sin señal", "descripcion": "No hay servicio desde ayer"}"#,
            ),
            &tools,
            &backend,
        )
        .await;

        assert!(executed.result.is_success());
        let calls = backend.calls();
        assert_eq!(calls[0].1["prioridad"], json!("media"));
    }

    #[tokio::test]
    async fn test_invalid_prioridad_rejected_without_network_call() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call(
                "crear_ticket",
                r#"{"clienteId": 3, "titulo": "x", "descripcion": "y", "prioridad": "urgente"}"#,
            ),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_titulo_rejected() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("crear_ticket", r#"{"clienteId": 3, "descripcion": "y"}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_network_call() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("buscar_cliente", r#"{"query": "   "}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_match_search_is_success() {
        let backend = MockBackend::new().reply_ok(json!({
            "message": "No se encontraron clientes con \"zzz\"",
            "clientes": [],
            "total": 0
        }));
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("buscar_cliente", r#"{"query": "zzz"}"#),
            &tools,
            &backend,
        )
        .await;

        match executed.result {
            ToolResult::Success { payload } => {
                assert_eq!(payload["total"], json!(0));
                assert_eq!(payload["clientes"], json!([]));
            }
            ToolResult::Failure { .. } => panic!("zero matches must be a success"),
        }
    }

    #[tokio::test]
    async fn test_search_transport_error_is_unreachable() {
        let backend = MockBackend::new().reply_err(BackendError::Transport {
            message: "connection refused".to_string(),
        });
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("buscar_cliente", r#"{"query": "ana"}"#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_saldo_404_maps_to_not_found_with_id() {
        let backend = MockBackend::new().reply_err(BackendError::Status {
            status: 404,
            body: json!({ "error": "Cliente no encontrado" }),
        });
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("consultar_saldo", r#"{"clienteId": 999999}"#),
            &tools,
            &backend,
        )
        .await;

        match executed.result {
            ToolResult::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::NotFound);
                assert!(message.contains("999999"));
            }
            ToolResult::Success { .. } => panic!("expected a not-found failure"),
        }
    }

    #[tokio::test]
    async fn test_saldo_success_normalization() {
        let backend = MockBackend::new().reply_ok(json!({
            "cliente": { "id": 42, "nombre": "Ana Torres", "saldo": 120.5 },
            "ultimos_pagos": [{ "monto": 20.0 }],
            "resumen": { "total_pagos": 9 }
        }));
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("consultar_saldo", r#"{"clienteId": 42}"#),
            &tools,
            &backend,
        )
        .await;

        match executed.result {
            ToolResult::Success { payload } => {
                assert_eq!(payload["cliente"]["nombre"], json!("Ana Torres"));
                assert_eq!(payload["resumen"]["total_pagos"], json!(9));
            }
            ToolResult::Failure { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_ticket_backend_error_carries_backend_message() {
        let backend = MockBackend::new().reply_err(BackendError::Status {
            status: 400,
            body: json!({ "error": "Datos inválidos para crear el ticket" }),
        });
        let tools = create_support_tools();

        let executed = execute_tool(
            &call(
                "crear_ticket",
                r#"{"clienteId": 3, "titulo": "x", "descripcion": "y"}"#,
            ),
            &tools,
            &backend,
        )
        .await;

        match executed.result {
            ToolResult::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::Unreachable);
                assert_eq!(message, "Datos inválidos para crear el ticket");
            }
            ToolResult::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_argument() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(&call("borrar_cliente", "{}"), &tools, &backend).await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_arguments_json_is_invalid_argument() {
        let backend = MockBackend::new();
        let tools = create_support_tools();

        let executed = execute_tool(
            &call("buscar_cliente", r#"{"query": "#),
            &tools,
            &backend,
        )
        .await;

        assert_eq!(failure_kind(&executed.result), ErrorKind::InvalidArgument);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_catalogue_has_the_four_support_tools() {
        let tools = create_support_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "buscar_cliente",
                "consultar_saldo",
                "crear_ticket",
                "registrar_pago"
            ]
        );
    }

    #[test]
    fn test_tools_to_inference_format() {
        let tools = create_support_tools();
        let formatted = tools_to_inference_format(&tools);
        assert_eq!(formatted.len(), tools.len());
        for f in &formatted {
            assert_eq!(f.def_type, "function");
            assert!(!f.function.name.is_empty());
            assert!(!f.function.description.is_empty());
            assert!(f.function.parameters["type"] == json!("object"));
        }
    }
}
