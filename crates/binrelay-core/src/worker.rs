//! HTTP client for worker RPC endpoints.
//!
//! Every worker serves JSON-RPC at `POST /mcp`. The gateway opens one request
//! per forwarded call, so a slow worker only holds up the call it serves.

use crate::config::NetworkConfig;
use crate::protocol::JsonRpcRequest;
use crate::{RelayError, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Client for forwarding JSON-RPC envelopes to workers.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http_client: Client,
    timeout: Duration,
}

impl WorkerClient {
    /// Create a client using the standard forward timeout.
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("binrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            timeout: NetworkConfig::FORWARD_TIMEOUT,
        })
    }

    /// Create with custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// POST a raw envelope to `http://host:port/mcp` and parse the reply.
    pub async fn forward(&self, host: &str, port: u16, request: &Value) -> Result<Value> {
        self.post(host, port, request, self.timeout).await
    }

    /// Invoke a worker tool via `tools/call` with an explicit timeout.
    pub async fn call_tool(
        &self,
        host: &str,
        port: u16,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let request = JsonRpcRequest::new(
            crate::config::MethodNames::TOOLS_CALL,
            json!({"name": name, "arguments": arguments}),
            1,
        );
        let body = serde_json::to_value(&request)?;
        self.post(host, port, &body, timeout).await
    }

    async fn post(&self, host: &str, port: u16, body: &Value, timeout: Duration) -> Result<Value> {
        let addr = format!("{}:{}", host, port);
        let url = format!("http://{}{}", addr, NetworkConfig::WORKER_RPC_PATH);
        debug!("Forwarding to {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_worker_call(&addr, timeout, e))?;

        // Error statuses still carry a JSON-RPC body worth relaying.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::from_worker_call(&addr, timeout, e))?;

        serde_json::from_slice(&bytes).map_err(|e| RelayError::MalformedReply {
            addr,
            message: e.to_string(),
        })
    }
}
