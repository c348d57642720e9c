//! Methods the gateway answers without a worker.
//!
//! The router hands over the MCP handshake, notifications and the
//! `list_instances` tool; everything else that reaches this dispatcher is an
//! envelope the router could not make sense of.

use binrelay_core::config::{GatewayConfig, MethodNames};
use binrelay_core::{
    DiscoveryScanner, InstanceEntry, JsonRpcRequest, JsonRpcResponse, LocalDispatch, RelayError,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Local MCP method handler backed by the shared registry.
pub struct McpHandler {
    scanner: DiscoveryScanner,
}

impl McpHandler {
    pub fn new(scanner: DiscoveryScanner) -> Self {
        Self { scanner }
    }

    /// Rescan for workers, then list every registered instance.
    pub async fn list_instances(&self) -> Vec<InstanceEntry> {
        self.scanner.scan().await;
        self.scanner.registry().list()
    }

    async fn dispatch_method(&self, request: &JsonRpcRequest) -> Result<Value, RelayError> {
        let params = request.params.clone().unwrap_or_else(|| json!({}));

        match request.method.as_str() {
            MethodNames::INITIALIZE => Ok(initialize_result(&params)),
            MethodNames::PING => Ok(json!({})),
            MethodNames::TOOLS_CALL => self.call_tool(&params).await,
            method => {
                warn!("Method not found: {}", method);
                Err(RelayError::MethodNotFound {
                    method: method.to_string(),
                })
            }
        }
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, RelayError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::InvalidParams {
                message: "Missing required parameter: name".to_string(),
            })?;

        if name != GatewayConfig::LIST_INSTANCES_TOOL {
            return Err(RelayError::InvalidParams {
                message: format!("Unknown tool: {}", name),
            });
        }

        let instances: Vec<Value> = self.list_instances().await.iter().map(instance_info).collect();
        let text = serde_json::to_string_pretty(&instances)?;

        Ok(json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": {"result": instances},
            "isError": false,
        }))
    }
}

#[async_trait::async_trait]
impl LocalDispatch for McpHandler {
    async fn dispatch(&self, raw: Value) -> Option<Value> {
        let request = match JsonRpcRequest::from_value(raw) {
            Ok(request) => request,
            Err(e) => return Some(JsonRpcResponse::from_error(None, &e).into_value()),
        };

        if request.method.starts_with(MethodNames::NOTIFICATION_PREFIX) {
            debug!("Notification received: {}", request.method);
            return None;
        }

        let result = self.dispatch_method(&request).await;
        let id = request.id?;
        Some(
            match result {
                Ok(value) => JsonRpcResponse::success(Some(id), value),
                Err(e) => JsonRpcResponse::from_error(Some(id), &e),
            }
            .into_value(),
        )
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(GatewayConfig::PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {
            "name": GatewayConfig::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Row of the `list_instances` tool result.
fn instance_info(entry: &InstanceEntry) -> Value {
    json!({
        "binary_id": entry.binary_id,
        "module": entry.module,
        "path": entry.path,
        "md5": entry.md5,
        "sha256": entry.sha256,
        "port": entry.port,
        "registered_at": entry.registered_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrelay_core::{GatewaySettings, InstanceRegistration, InstanceRegistry, WorkerClient};
    use std::sync::Arc;
    use std::time::Duration;

    fn handler() -> (McpHandler, Arc<InstanceRegistry>) {
        let closed = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let settings = GatewaySettings {
            discovery_start_port: closed,
            discovery_max_tries: 1,
            ..GatewaySettings::default()
        };
        let registry = Arc::new(InstanceRegistry::new());
        let scanner = DiscoveryScanner::new(registry.clone(), WorkerClient::new().unwrap())
            .with_settings(&settings)
            .with_probe_timeout(Duration::from_millis(300));
        (McpHandler::new(scanner), registry)
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let (handler, _) = handler();
        let reply = handler
            .dispatch(json!({"jsonrpc": "2.0", "method": "initialize", "id": 1, "params": {"protocolVersion": "2025-03-26"}}))
            .await
            .unwrap();

        assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(reply["result"]["serverInfo"]["name"], "binrelay");
        assert!(reply["result"]["capabilities"].get("tools").is_some());
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let (handler, _) = handler();
        let reply = handler
            .dispatch(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_list_instances_reports_registry() {
        let (handler, registry) = handler();
        registry
            .register(InstanceRegistration {
                host: "127.0.0.1".into(),
                port: 13338,
                path: "/samples/calc.exe".into(),
                module: "calc.exe".into(),
                md5: "m1".into(),
                sha256: "aa11".into(),
            })
            .unwrap();

        let reply = handler
            .dispatch(json!({"jsonrpc": "2.0", "method": "tools/call", "id": 2, "params": {"name": "list_instances", "arguments": {}}}))
            .await
            .unwrap();

        let rows = reply["result"]["structuredContent"]["result"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["binary_id"], "aa11");
        assert_eq!(rows[0]["module"], "calc.exe");
        assert_eq!(rows[0]["port"], 13338);

        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed[0]["md5"], "m1");
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let (handler, _) = handler();
        let reply = handler
            .dispatch(json!({"jsonrpc": "2.0", "method": "resources/list", "id": 3}))
            .await
            .unwrap();
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_invalid_envelope_is_invalid_request() {
        let (handler, _) = handler();
        let reply = handler.dispatch(json!({"jsonrpc": "2.0", "id": 4})).await.unwrap();
        assert_eq!(reply["error"]["code"], -32600);
        assert_eq!(reply["id"], Value::Null);
    }
}
