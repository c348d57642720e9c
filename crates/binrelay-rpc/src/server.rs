//! HTTP transport for the gateway using Axum.
//!
//! A client POSTs JSON-RPC envelopes to `/mcp`; requests get the routed reply
//! as JSON, notifications an empty `202 Accepted`.

use crate::handler::McpHandler;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use binrelay_core::{Gateway, JsonRpcResponse, RelayError};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Upper bound on requests handled at once.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Gateway shared across handlers.
pub type AppState = Arc<Gateway<McpHandler>>;

/// Build the transport router.
pub fn router(gateway: AppState) -> Router {
    // Configure CORS for browser-based clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/mcp", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(gateway)
}

/// Start the HTTP transport.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(gateway: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(gateway);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let actual_addr = listener.local_addr()?;

    info!("MCP HTTP transport listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP transport error: {}", e);
        }
    });

    Ok(actual_addr)
}

/// Health check endpoint.
pub async fn handle_health(State(gateway): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "instances": gateway.registry().count(),
    }))
}

/// JSON-RPC endpoint.
pub async fn handle_rpc(State(gateway): State<AppState>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = RelayError::Parse {
                message: e.to_string(),
            };
            return Json(JsonRpcResponse::from_error(None, &err).into_value()).into_response();
        }
    };

    match gateway.handle(request).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
