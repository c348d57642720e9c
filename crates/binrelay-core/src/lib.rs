//! binrelay core - instance registry, discovery and JSON-RPC routing.
//!
//! A gateway process presents one MCP endpoint to a client and fans calls out
//! to any number of worker processes, each serving one analysed binary. This
//! crate holds everything that does not depend on how the gateway itself is
//! reached (stdio or HTTP); the `binrelay-rpc` crate wires it to transports.
//!
//! # Example
//!
//! ```rust,ignore
//! use binrelay_core::{DiscoveryScanner, Gateway, GatewaySettings, InstanceRegistry, WorkerClient};
//! use std::sync::Arc;
//!
//! let settings = GatewaySettings::default();
//! let registry = Arc::new(InstanceRegistry::new());
//! let client = WorkerClient::new()?;
//! let scanner = DiscoveryScanner::new(registry, client.clone()).with_settings(&settings);
//! let gateway = Gateway::new(scanner, client, Arc::new(my_local_dispatch), &settings);
//!
//! let reply = gateway.handle(serde_json::json!({
//!     "jsonrpc": "2.0", "method": "tools/list", "id": 1
//! })).await;
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod worker;

// Re-export commonly used types
pub use config::{GatewayConfig, GatewaySettings, MethodNames};
pub use discovery::DiscoveryScanner;
pub use error::{RelayError, Result};
pub use gateway::{Gateway, LocalDispatch, RouteTarget};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use registry::{
    InstanceEntry, InstanceRegistration, InstanceRegistry, InstanceSummary, Registrar,
    RegistrationReply, RouteCandidate, UnregisterRequest,
};
pub use worker::WorkerClient;
