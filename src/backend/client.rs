//! Customer-Management Backend Client
//!
//! Thin HTTP client over the backend's tool endpoints. Every failure
//! mode (connection errors, timeouts, non-2xx statuses, unparseable
//! bodies) is converted into a typed `BackendError`; nothing else
//! crosses this boundary.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::types::{BackendError, SupportBackend};

/// Header carrying the caller-generated token that makes retried
/// mutating calls safe to replay.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct HttpSupportBackend {
    base_url: String,
    http: Client,
}

impl HttpSupportBackend {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(HttpSupportBackend {
            base_url: config.backend_api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Send one request to the backend and return the parsed JSON body.
    ///
    /// GET responses must never be served from a cache: balance and
    /// ticket data has to be current, so no-cache headers are always
    /// sent. A `409 Conflict` is the duplicate-idempotency-token replay
    /// and carries the original response body, so it is returned as
    /// success rather than re-executed.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = match method {
            "POST" => self.http.post(&url),
            _ => self
                .http
                .get(&url)
                .header("Cache-Control", "no-cache")
                .header("Pragma", "no-cache"),
        };

        builder = builder.header("Content-Type", "application/json");

        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(b) = body {
            builder = builder.json(&b);
        }

        let resp = builder.send().await.map_err(|e| BackendError::Transport {
            message: format!("{} {} failed: {}", method, path, e),
        })?;

        let status = resp.status();
        let raw = resp.text().await.map_err(|e| BackendError::Transport {
            message: format!("{} {}: failed to read response body: {}", method, path, e),
        })?;

        let parsed: Option<Value> = serde_json::from_str(&raw).ok();

        if status.is_success() || status.as_u16() == 409 {
            return parsed.ok_or_else(|| BackendError::InvalidBody {
                message: format!("{} {} returned a non-JSON body", method, path),
            });
        }

        Err(BackendError::Status {
            status: status.as_u16(),
            body: parsed.unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl SupportBackend for HttpSupportBackend {
    async fn buscar_cliente(&self, query: &str) -> Result<Value, BackendError> {
        let path = format!("/tools/buscar-cliente/?q={}", urlencoding::encode(query));
        self.request("GET", &path, None, None).await
    }

    async fn consultar_saldo(&self, cliente_id: i64) -> Result<Value, BackendError> {
        let path = format!("/tools/cliente/{}/saldo/", cliente_id);
        self.request("GET", &path, None, None).await
    }

    async fn crear_ticket(
        &self,
        body: Value,
        idempotency_key: &str,
    ) -> Result<Value, BackendError> {
        self.request("POST", "/tools/crear-ticket/", Some(body), Some(idempotency_key))
            .await
    }

    async fn registrar_pago(
        &self,
        body: Value,
        idempotency_key: &str,
    ) -> Result<Value, BackendError> {
        self.request(
            "POST",
            "/tools/registrar-pago/",
            Some(body),
            Some(idempotency_key),
        )
        .await
    }
}
