//! Command-line options and the settings derived from them.

use anyhow::{anyhow, bail, Result};
use binrelay_core::config::{DiscoveryConfig, GatewayConfig};
use binrelay_core::GatewaySettings;
use clap::Parser;
use serde_json::{json, Value};
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "binrelay")]
#[command(about = "MCP gateway routing tool calls to per-binary analysis workers")]
#[command(version)]
pub struct Args {
    /// MCP transport: `stdio` or an HTTP address such as http://127.0.0.1:8744
    #[arg(long, env = "BINRELAY_TRANSPORT", default_value = "stdio")]
    pub transport: String,

    /// Default worker RPC address, used when no instance is registered
    #[arg(long, env = "BINRELAY_WORKER_RPC", default_value = "http://127.0.0.1:13337")]
    pub worker_rpc: String,

    /// Port of the registration listener
    #[arg(long, env = "BINRELAY_LISTENER_PORT", default_value_t = GatewayConfig::DEFAULT_PORT)]
    pub listener_port: u16,

    /// First port probed by discovery
    #[arg(long, env = "BINRELAY_DISCOVERY_START_PORT", default_value_t = DiscoveryConfig::START_PORT)]
    pub discovery_start_port: u16,

    /// Number of consecutive ports probed by discovery
    #[arg(long, env = "BINRELAY_DISCOVERY_MAX_TRIES", default_value_t = DiscoveryConfig::MAX_TRIES)]
    pub discovery_max_tries: u16,

    /// Enable debug logging
    #[arg(short, long, env = "BINRELAY_DEBUG")]
    pub debug: bool,

    /// Print MCP client configuration snippets and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Where the gateway itself is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http { host: String, port: u16 },
}

impl Args {
    pub fn transport(&self) -> Result<Transport> {
        if self.transport == "stdio" {
            return Ok(Transport::Stdio);
        }
        let (host, port) = parse_address(&self.transport)
            .map_err(|e| anyhow!("Invalid transport URL {}: {}", self.transport, e))?;
        Ok(Transport::Http { host, port })
    }

    /// Resolved gateway settings.
    pub fn settings(&self) -> Result<GatewaySettings> {
        let (worker_host, worker_port) = parse_address(&self.worker_rpc)
            .map_err(|e| anyhow!("Invalid worker RPC address {}: {}", self.worker_rpc, e))?;
        Ok(GatewaySettings {
            worker_host,
            worker_port,
            discovery_start_port: self.discovery_start_port,
            discovery_max_tries: self.discovery_max_tries,
        })
    }
}

/// Split an `http://host:port` URL; both parts are required.
pub fn parse_address(raw: &str) -> Result<(String, u16)> {
    let url = Url::parse(raw)?;
    let Some(host) = url.host_str() else {
        bail!("missing host");
    };
    // `port()` drops the scheme's default port, so require it explicitly.
    let Some(port) = url.port() else {
        bail!("missing port");
    };
    Ok((host.to_string(), port))
}

/// `mcpServers` snippets for the HTTP and stdio ways of attaching a client.
pub fn client_config(settings: &GatewaySettings) -> (Value, Value) {
    let name = GatewayConfig::SERVER_NAME;
    let worker_rpc = format!("http://{}:{}", settings.worker_host, settings.worker_port);
    let http = json!({
        "mcpServers": {
            name: {
                "type": "http",
                "url": format!("{}/mcp", worker_rpc),
            }
        }
    });

    let command = std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| name.to_string());
    let stdio = json!({
        "mcpServers": {
            name: {
                "command": command,
                "args": ["--worker-rpc", worker_rpc],
            }
        }
    });
    (http, stdio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["binrelay"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.transport().unwrap(), Transport::Stdio);
        assert_eq!(args.listener_port, 13337);

        let settings = args.settings().unwrap();
        assert_eq!(settings, GatewaySettings::default());
    }

    #[test]
    fn test_http_transport() {
        let args = args(&["--transport", "http://0.0.0.0:8744"]);
        assert_eq!(
            args.transport().unwrap(),
            Transport::Http {
                host: "0.0.0.0".into(),
                port: 8744
            }
        );
    }

    #[test]
    fn test_address_requires_port() {
        assert!(parse_address("http://127.0.0.1").is_err());
        assert!(parse_address("not a url").is_err());
        assert_eq!(
            parse_address("http://localhost:13400").unwrap(),
            ("localhost".to_string(), 13400)
        );

        let args = args(&["--worker-rpc", "http://127.0.0.1"]);
        assert!(args.settings().is_err());
    }

    #[test]
    fn test_client_config_snippets() {
        let (http, stdio) = client_config(&GatewaySettings::default());
        assert_eq!(http["mcpServers"]["binrelay"]["url"], "http://127.0.0.1:13337/mcp");
        assert_eq!(http["mcpServers"]["binrelay"]["type"], "http");
        assert_eq!(
            stdio["mcpServers"]["binrelay"]["args"],
            json!(["--worker-rpc", "http://127.0.0.1:13337"])
        );
    }
}
