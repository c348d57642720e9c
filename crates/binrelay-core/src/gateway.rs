//! Request router sitting between the client and the worker instances.
//!
//! Every inbound JSON-RPC envelope passes through [`Gateway::handle`]:
//!
//! ```text
//! initialize, ping, notifications/*, tools/call list_instances ──▶ LocalDispatch
//! tools/list ──▶ discover if empty ──▶ any worker ──▶ augment_tool_list
//! everything else ──▶ strip `binary` ──▶ resolve target ──▶ POST /mcp
//! ```
//!
//! `ping` is answered locally too, so a client can check the gateway is alive
//! even when no worker is running; workers never see it.
//!
//! Failures never escape as Rust errors: they become JSON-RPC error replies,
//! or no reply at all when the request was a notification.

use crate::config::{start_shortcut_label, GatewayConfig, GatewaySettings, MethodNames};
use crate::discovery::DiscoveryScanner;
use crate::protocol::JsonRpcResponse;
use crate::registry::{InstanceRegistry, RouteCandidate};
use crate::schema;
use crate::worker::WorkerClient;
use crate::RelayError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handler for requests the gateway answers itself.
///
/// Receives the raw inbound envelope and returns a reply envelope, or `None`
/// when no reply is due (notifications).
#[async_trait::async_trait]
pub trait LocalDispatch: Send + Sync + 'static {
    async fn dispatch(&self, request: Value) -> Option<Value>;
}

/// Worker address a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub host: String,
    pub port: u16,
    /// Identity of the registered instance, `None` for the fallback address.
    pub binary_id: Option<String>,
}

/// Fields of the inbound envelope the router inspects.
struct Envelope<'a> {
    method: &'a str,
    id: Option<Value>,
}

impl<'a> Envelope<'a> {
    fn parse(raw: &'a Value) -> Option<Self> {
        let method = raw.get("method")?.as_str()?;
        Some(Self {
            method,
            id: raw.get("id").filter(|id| !id.is_null()).cloned(),
        })
    }

    fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    fn is_local(&self, raw: &Value) -> bool {
        if self.method == MethodNames::INITIALIZE
            || self.method == MethodNames::PING
            || self.method.starts_with(MethodNames::NOTIFICATION_PREFIX)
        {
            return true;
        }
        self.method == MethodNames::TOOLS_CALL
            && raw
                .get("params")
                .and_then(|params| params.get("name"))
                .and_then(Value::as_str)
                == Some(GatewayConfig::LIST_INSTANCES_TOOL)
    }
}

/// Routing gateway over a shared instance registry.
pub struct Gateway<D> {
    registry: Arc<InstanceRegistry>,
    scanner: DiscoveryScanner,
    client: WorkerClient,
    local: Arc<D>,
    fallback_host: String,
    fallback_port: u16,
}

impl<D: LocalDispatch> Gateway<D> {
    pub fn new(
        scanner: DiscoveryScanner,
        client: WorkerClient,
        local: Arc<D>,
        settings: &GatewaySettings,
    ) -> Self {
        Self {
            registry: scanner.registry().clone(),
            scanner,
            client,
            local,
            fallback_host: settings.worker_host.clone(),
            fallback_port: settings.worker_port,
        }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Route one inbound envelope. `None` means no reply is sent.
    pub async fn handle(&self, raw: Value) -> Option<Value> {
        let Some(envelope) = Envelope::parse(&raw) else {
            // Envelope validation belongs to the local dispatcher.
            return self.local.dispatch(raw).await;
        };

        if envelope.is_local(&raw) {
            debug!("Dispatching {} locally", envelope.method);
            return self.local.dispatch(raw).await;
        }

        if envelope.method == MethodNames::TOOLS_LIST {
            return self.list_tools(&envelope, &raw).await;
        }

        let (selector, outbound) = strip_selector(envelope.method, &raw);
        debug!(method = envelope.method, selector = ?selector, "Routing request");

        let target = match self.resolve(selector.as_deref()) {
            Ok(target) => target,
            Err(e) => return error_reply(&envelope, &e),
        };

        debug!(
            instance = target.binary_id.as_deref().unwrap_or("default"),
            "Forwarding {} to {}:{}", envelope.method, target.host, target.port
        );
        match self.forward(&envelope, &target, &outbound).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(
                    instance = target.binary_id.as_deref().unwrap_or("default"),
                    "Forward to {}:{} failed: {}", target.host, target.port, e
                );
                connection_error_reply(&envelope, &e)
            }
        }
    }

    /// Pick the worker a request goes to.
    ///
    /// A selector must match a registered instance. Without one, a single
    /// instance is used automatically, no instance means the fallback
    /// address, and several instances are an error.
    pub fn resolve(&self, selector: Option<&str>) -> Result<RouteTarget, RelayError> {
        if let Some(selector) = selector {
            let instance = self
                .registry
                .find(selector)
                .ok_or_else(|| RelayError::NoMatchingInstance {
                    selector: selector.to_string(),
                })?;
            return Ok(RouteTarget {
                host: instance.host,
                port: instance.port,
                binary_id: Some(instance.binary_id),
            });
        }

        match self.registry.route_candidate() {
            RouteCandidate::One(instance) => Ok(RouteTarget {
                host: instance.host,
                port: instance.port,
                binary_id: Some(instance.binary_id),
            }),
            RouteCandidate::None => Ok(RouteTarget {
                host: self.fallback_host.clone(),
                port: self.fallback_port,
                binary_id: None,
            }),
            RouteCandidate::Many(count) => Err(RelayError::AmbiguousInstance { count }),
        }
    }

    async fn list_tools(&self, envelope: &Envelope<'_>, raw: &Value) -> Option<Value> {
        if self.registry.is_empty() {
            self.scanner.scan().await;
        }

        let Some(instance) = self.registry.any() else {
            debug!("No instances registered; advertising list_instances only");
            return Some(JsonRpcResponse::success(envelope.id.clone(), schema::empty_tool_list()).into_value());
        };

        let target = RouteTarget {
            host: instance.host,
            port: instance.port,
            binary_id: Some(instance.binary_id),
        };
        match self.forward(envelope, &target, raw).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Failed to fetch tools from {}:{}: {}", target.host, target.port, e);
                let id = envelope.id.clone()?;
                Some(
                    JsonRpcResponse::error(
                        Some(id),
                        GatewayConfig::ROUTING_ERROR_CODE,
                        format!("Failed to get tools: {}", e),
                    )
                    .into_value(),
                )
            }
        }
    }

    async fn forward(
        &self,
        envelope: &Envelope<'_>,
        target: &RouteTarget,
        outbound: &Value,
    ) -> Result<Value, RelayError> {
        let reply = self.client.forward(&target.host, target.port, outbound).await?;
        if envelope.method == MethodNames::TOOLS_LIST {
            Ok(schema::augment_tool_list(reply))
        } else {
            Ok(reply)
        }
    }
}

/// Remove the selector from a copy of the request.
///
/// For `tools/call` the selector sits in `params.arguments`; for any other
/// method (or a `tools/call` without `arguments`) it sits in `params`. The
/// inbound value is not modified.
pub fn strip_selector(method: &str, raw: &Value) -> (Option<String>, Value) {
    let mut outbound = raw.clone();
    let selector = outbound
        .get_mut("params")
        .and_then(Value::as_object_mut)
        .and_then(|params| selector_container(method, params))
        .and_then(|container| container.remove(GatewayConfig::SELECTOR_PARAM))
        .and_then(selector_text);
    (selector, outbound)
}

fn selector_container<'a>(method: &str, params: &'a mut Map<String, Value>) -> Option<&'a mut Map<String, Value>> {
    if method == MethodNames::TOOLS_CALL && params.contains_key("arguments") {
        params.get_mut("arguments").and_then(Value::as_object_mut)
    } else {
        Some(params)
    }
}

fn selector_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn error_reply(envelope: &Envelope<'_>, err: &RelayError) -> Option<Value> {
    if envelope.is_notification() {
        return None;
    }
    Some(JsonRpcResponse::from_error(envelope.id.clone(), err).into_value())
}

fn connection_error_reply(envelope: &Envelope<'_>, err: &RelayError) -> Option<Value> {
    if envelope.is_notification() {
        return None;
    }
    let message = format!(
        "Failed to connect to IDA Pro! Did you run Edit -> Plugins -> MCP ({}) to start the server?\n{}",
        start_shortcut_label(),
        err
    );
    Some(
        JsonRpcResponse::error(envelope.id.clone(), GatewayConfig::ROUTING_ERROR_CODE, message)
            .with_data(Value::String(err.to_string()))
            .into_value(),
    )
}
