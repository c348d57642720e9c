//! binrelay - MCP gateway for multiple per-binary analysis workers.
//!
//! Workers register with the listener (or are found by discovery); the
//! client talks to this process over stdio or HTTP and picks a worker per
//! call with the `binary` argument.

use anyhow::Result;
use binrelay_core::{DiscoveryScanner, Gateway, InstanceRegistry, WorkerClient};
use binrelay_rpc::cli::{client_config, Args, Transport};
use binrelay_rpc::{serve_stdio, start_listener, start_server, McpHandler};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;
    let transport = args.transport()?;

    if args.print_config {
        let (http, stdio) = client_config(&settings);
        // Intentional stdout: the snippets are meant to be copied.
        println!("[HTTP MCP CONFIGURATION]");
        println!("{}", serde_json::to_string_pretty(&http)?);
        println!("\n[STDIO MCP CONFIGURATION]");
        println!("{}", serde_json::to_string_pretty(&stdio)?);
        return Ok(());
    }

    // Logs go to stderr; stdout belongs to the stdio transport.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting binrelay {}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(InstanceRegistry::new());
    let mut listener = start_listener(registry.clone(), &settings.worker_host, args.listener_port).await?;
    if listener.is_none() {
        info!("Another gateway owns the registration port; relying on discovery");
    }

    let client = WorkerClient::new()?;
    let scanner = DiscoveryScanner::new(registry, client.clone()).with_settings(&settings);
    let found = scanner.scan().await;
    info!("Startup discovery found {} instance(s)", found);

    let handler = Arc::new(McpHandler::new(scanner.clone()));
    let gateway = Arc::new(Gateway::new(scanner, client, handler, &settings));

    match transport {
        Transport::Stdio => {
            tokio::select! {
                result = serve_stdio(gateway) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            }
        }
        Transport::Http { host, port } => {
            let addr = start_server(gateway, &host, port).await?;
            info!("MCP endpoint: http://{}/mcp", addr);
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
        }
    }

    if let Some(listener) = listener.as_mut() {
        listener.shutdown();
    }
    info!("binrelay stopped");
    Ok(())
}
