//! HTTP Surface
//!
//! axum server exposing `POST /chat` (chunked text stream) and
//! `GET /health`. A failure before the first chunk answers 500 with a
//! generic `{ error, message }` body; a failure after streaming began
//! closes the stream. Backend internals never reach the caller.

pub mod stream;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::backend::HttpSupportBackend;
use crate::chat::orchestrator::Orchestrator;
use crate::config::GatewayConfig;
use crate::inference::OpenAiInferenceClient;
use crate::types::ChatRequest;

use stream::{ResponseStreamer, StreamEvent};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Build the router and serve until the process is stopped.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let backend = Arc::new(HttpSupportBackend::new(&config)?);
    let inference = Arc::new(OpenAiInferenceClient::new(&config));
    let orchestrator = Arc::new(Orchestrator::new(inference, backend, &config));

    let app = Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState { orchestrator });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Gateway listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            error!(error = %rejection, "Rejected malformed /chat body");
            return internal_error_response();
        }
    };

    let (streamer, mut rx) = ResponseStreamer::channel(32);
    let orchestrator = Arc::clone(&state.orchestrator);

    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(request.messages, &streamer).await {
            error!(error = %e, "Conversation failed");
            streamer.fail(e.to_string()).await;
        }
    });

    // Gate on the first event: anything fatal before the first chunk
    // can still be answered with a proper status code.
    match rx.recv().await {
        Some(StreamEvent::Chunk(first)) => text_stream_response(first, rx),
        Some(StreamEvent::Fatal(_)) => internal_error_response(),
        None => text_stream_response(String::new(), rx),
    }
}

async fn health_handler() -> Response {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

/// Chunked text body: the first chunk followed by the rest of the
/// channel, ending at channel close or the first fatal event.
fn text_stream_response(first: String, rx: mpsc::Receiver<StreamEvent>) -> Response {
    let body_stream = text_chunks(first, rx).map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("static response parts are valid")
}

fn text_chunks(
    first: String,
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = String> + Send {
    let rest = ReceiverStream::new(rx).map_while(|event| match event {
        StreamEvent::Chunk(chunk) => Some(chunk),
        // Status is already committed; all we can do is end the stream.
        StreamEvent::Fatal(_) => None,
    });
    tokio_stream::once(first).chain(rest).filter(|c| !c.is_empty())
}

/// The uniform 500 body. Deliberately generic: raw provider and
/// backend errors stay in the logs.
fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Error interno del servidor",
            "message": "La solicitud no pudo ser procesada",
        })),
    )
        .into_response()
}
