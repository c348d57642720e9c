//! Centralized configuration for binrelay.
//!
//! Compile-time defaults live in unit structs grouped by concern; the
//! resolved runtime options a gateway process runs with live in
//! [`GatewaySettings`].

use std::time::Duration;

/// Gateway-level configuration.
pub struct GatewayConfig;

impl GatewayConfig {
    pub const SERVER_NAME: &'static str = "binrelay";
    pub const PROTOCOL_VERSION: &'static str = "2025-06-18";

    /// Loopback host shared by the listener and the default worker.
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    /// Registration listener port, also the legacy single-worker port.
    pub const DEFAULT_PORT: u16 = 13337;

    /// Tool-call argument that selects the target worker.
    pub const SELECTOR_PARAM: &'static str = "binary";
    /// Gateway-local tool enumerating registered workers.
    pub const LIST_INSTANCES_TOOL: &'static str = "list_instances";

    /// Single application error code shared by every routing failure.
    pub const ROUTING_ERROR_CODE: i32 = -32000;
}

/// Method names the router treats specially.
pub struct MethodNames;

impl MethodNames {
    pub const INITIALIZE: &'static str = "initialize";
    pub const PING: &'static str = "ping";
    pub const NOTIFICATION_PREFIX: &'static str = "notifications/";
    pub const TOOLS_LIST: &'static str = "tools/list";
    pub const TOOLS_CALL: &'static str = "tools/call";
}

/// Active discovery configuration.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    /// First port workers try to bind (the listener owns `DEFAULT_PORT`).
    pub const START_PORT: u16 = 13338;
    pub const MAX_TRIES: u16 = 10;
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
    /// Worker tool returning `{path, module, md5, sha256}` for its database.
    pub const METADATA_TOOL: &'static str = "idb_meta";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);
    pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);
    pub const WORKER_RPC_PATH: &'static str = "/mcp";
}

/// Runtime options resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Host probed during discovery and used for the default worker.
    pub worker_host: String,
    /// Worker port used when no instance is registered.
    pub worker_port: u16,
    pub discovery_start_port: u16,
    pub discovery_max_tries: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            worker_host: GatewayConfig::DEFAULT_HOST.to_string(),
            worker_port: GatewayConfig::DEFAULT_PORT,
            discovery_start_port: DiscoveryConfig::START_PORT,
            discovery_max_tries: DiscoveryConfig::MAX_TRIES,
        }
    }
}

/// Keyboard shortcut shown to users for starting the worker plugin.
pub fn start_shortcut_label() -> &'static str {
    if cfg!(target_os = "macos") {
        "Ctrl+Option+M"
    } else {
        "Ctrl+Alt+M"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_constants() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.worker_host, "127.0.0.1");
        assert_eq!(settings.worker_port, GatewayConfig::DEFAULT_PORT);
        assert_eq!(settings.discovery_start_port, DiscoveryConfig::START_PORT);
        assert_eq!(settings.discovery_max_tries, 10);
    }

    #[test]
    fn test_timeouts_are_ordered() {
        assert!(DiscoveryConfig::PROBE_TIMEOUT < NetworkConfig::REGISTRATION_TIMEOUT);
        assert!(NetworkConfig::REGISTRATION_TIMEOUT < NetworkConfig::FORWARD_TIMEOUT);
    }

    #[test]
    fn test_shortcut_label() {
        let label = start_shortcut_label();
        assert!(label.starts_with("Ctrl+"));
        assert!(label.ends_with("+M"));
    }
}
