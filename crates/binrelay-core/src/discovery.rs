//! Active discovery of workers that never pushed a registration.
//!
//! Each port in a contiguous range is asked for its database metadata through
//! the worker's metadata tool. Anything that answers with a well-formed
//! payload is registered; every other outcome is skipped silently.

use crate::config::{DiscoveryConfig, GatewaySettings};
use crate::registry::{InstanceRegistration, InstanceRegistry};
use crate::worker::WorkerClient;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Metadata a worker reports about the binary it owns.
#[derive(Debug, Deserialize)]
struct WorkerMetadata {
    #[serde(default)]
    path: String,
    #[serde(default)]
    module: String,
    #[serde(default)]
    md5: String,
    #[serde(default)]
    sha256: String,
}

/// Port-range prober feeding the shared registry.
#[derive(Debug, Clone)]
pub struct DiscoveryScanner {
    registry: Arc<InstanceRegistry>,
    client: WorkerClient,
    probe_timeout: Duration,
    host: String,
    start_port: u16,
    max_tries: u16,
}

impl DiscoveryScanner {
    /// Scanner over the default loopback port range.
    pub fn new(registry: Arc<InstanceRegistry>, client: WorkerClient) -> Self {
        let defaults = GatewaySettings::default();
        Self {
            registry,
            client,
            probe_timeout: DiscoveryConfig::PROBE_TIMEOUT,
            host: defaults.worker_host,
            start_port: defaults.discovery_start_port,
            max_tries: defaults.discovery_max_tries,
        }
    }

    /// Scan the range described by the gateway settings.
    pub fn with_settings(mut self, settings: &GatewaySettings) -> Self {
        self.host = settings.worker_host.clone();
        self.start_port = settings.discovery_start_port;
        self.max_tries = settings.discovery_max_tries;
        self
    }

    /// Create with custom per-probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Probe the configured port range.
    pub async fn scan(&self) -> usize {
        self.probe(&self.host, self.start_port, self.max_tries).await
    }

    /// Probe `max_tries` ports starting at `start_port`.
    ///
    /// Probes run concurrently; results are registered in port order.
    /// Returns the number of instances that were not registered before.
    pub async fn probe(&self, host: &str, start_port: u16, max_tries: u16) -> usize {
        let ports: Vec<u16> = (0..max_tries)
            .filter_map(|offset| start_port.checked_add(offset))
            .collect();

        let results = join_all(ports.iter().map(|&port| self.probe_port(host, port))).await;

        let mut discovered = 0;
        for (port, registration) in ports.into_iter().zip(results) {
            let Some(registration) = registration else {
                continue;
            };
            let module = registration.module.clone();

            match self.registry.insert(registration) {
                Ok((_, true)) => {
                    discovered += 1;
                    info!("Discovered instance: {} on port {}", module_or_unknown(&module), port);
                }
                Ok((_, false)) => {}
                Err(e) => debug!("Ignoring worker on port {}: {}", port, e),
            }
        }

        discovered
    }

    async fn probe_port(&self, host: &str, port: u16) -> Option<InstanceRegistration> {
        let reply = match self
            .client
            .call_tool(host, port, DiscoveryConfig::METADATA_TOOL, json!({}), self.probe_timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!("No worker on port {}: {}", port, e);
                return None;
            }
        };

        let metadata = parse_metadata(&reply)?;
        Some(InstanceRegistration {
            host: host.to_string(),
            port,
            path: metadata.path,
            module: metadata.module,
            md5: metadata.md5,
            sha256: metadata.sha256,
        })
    }
}

/// Extract metadata from a `tools/call` reply: `result.content[0].text` holds JSON.
fn parse_metadata(reply: &Value) -> Option<WorkerMetadata> {
    let text = reply
        .get("result")?
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()?;
    serde_json::from_str(text).ok()
}

fn module_or_unknown(module: &str) -> &str {
    if module.is_empty() {
        "unknown"
    } else {
        module
    }
}
