//! Registration listener workers push their metadata to.
//!
//! Plain JSON over HTTP on a fixed port:
//!
//! - `POST /register` adds or replaces an instance
//! - `POST /unregister` removes one by `binary_id`, `sha256` or `md5`
//! - `GET /instances` lists a summary of every instance
//!
//! Unparseable bodies get a 400 and unknown paths a 404.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use binrelay_core::{
    InstanceRegistration, InstanceRegistry, RegistrationReply, RelayError, UnregisterRequest,
};
use serde_json::json;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Handle to a running registration listener. Dropping shuts it down.
pub struct ListenerHandle {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting registrations. Does not wait for in-flight requests.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Build the listener router over a shared registry.
pub fn router(registry: Arc<InstanceRegistry>) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/unregister", post(handle_unregister))
        .route("/instances", get(handle_instances))
        .fallback(handle_not_found)
        .with_state(registry)
}

/// Bind the listener and serve it in the background.
///
/// Returns `Ok(None)` when the port is already taken, which usually means
/// another gateway owns it; the caller carries on without a listener.
pub async fn start_listener(
    registry: Arc<InstanceRegistry>,
    host: &str,
    port: u16,
) -> anyhow::Result<Option<ListenerHandle>> {
    // Hostnames such as `localhost` resolve through `ToSocketAddrs`.
    let listener = match TcpListener::bind((host, port)).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            debug!("Registration port {} already in use, skipping listener", port);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let addr = listener.local_addr()?;
    info!("Registration listener on {}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(registry);

    let task_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Registration listener error: {}", e);
        }
    });

    Ok(Some(ListenerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task_handle: Some(task_handle),
    }))
}

async fn handle_register(
    State(registry): State<Arc<InstanceRegistry>>,
    body: Bytes,
) -> impl IntoResponse {
    let Ok(registration) = serde_json::from_slice::<InstanceRegistration>(&body) else {
        return invalid_json();
    };

    let module = registration.module.clone();
    let port = registration.port;
    let reply = match registry.register(registration) {
        Ok(binary_id) => {
            info!("Registered instance: {} on port {}", module, port);
            RegistrationReply::ok(binary_id)
        }
        Err(e) => RegistrationReply::failed(reply_message(e)),
    };
    (StatusCode::OK, Json(reply)).into_response()
}

async fn handle_unregister(
    State(registry): State<Arc<InstanceRegistry>>,
    body: Bytes,
) -> impl IntoResponse {
    let Ok(request) = serde_json::from_slice::<UnregisterRequest>(&body) else {
        return invalid_json();
    };

    let removed = request
        .keys()
        .find_map(|key| registry.unregister(key).ok());

    let reply = match removed {
        Some(binary_id) => {
            info!("Unregistered instance: {}", binary_id);
            RegistrationReply::ok(binary_id)
        }
        None => RegistrationReply::failed(reply_message(RelayError::InstanceNotFound {
            key: request.binary_id.clone(),
        })),
    };
    (StatusCode::OK, Json(reply)).into_response()
}

async fn handle_instances(State(registry): State<Arc<InstanceRegistry>>) -> impl IntoResponse {
    Json(json!({ "instances": registry.summaries() }))
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

fn invalid_json() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(RegistrationReply::failed("Invalid JSON")),
    )
        .into_response()
}

/// Wire text for a failed registration call.
fn reply_message(err: RelayError) -> String {
    match err {
        RelayError::Validation { message, .. } => message,
        other => other.to_string(),
    }
}
