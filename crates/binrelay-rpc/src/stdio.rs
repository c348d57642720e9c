//! Stdio transport: one JSON-RPC envelope per line on stdin and stdout.
//!
//! Each request is routed in its own task so a slow worker never blocks the
//! client's other calls. Replies are funnelled through a channel to a single
//! writer, keeping stdout lines whole.

use crate::handler::McpHandler;
use binrelay_core::{Gateway, JsonRpcResponse, RelayError};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Replies waiting for the writer.
const REPLY_QUEUE: usize = 64;

/// Serve the gateway on the process's stdin and stdout until stdin closes.
pub async fn serve_stdio(gateway: Arc<Gateway<McpHandler>>) -> anyhow::Result<()> {
    info!("MCP stdio transport ready");
    serve(gateway, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve the gateway over any line-oriented reader and writer.
pub async fn serve<R, W>(gateway: Arc<Gateway<McpHandler>>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (reply_tx, reply_rx) = mpsc::channel::<Value>(REPLY_QUEUE);
    let writer_task = tokio::spawn(write_replies(writer, reply_rx));

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Discarding unparseable line: {}", e);
                let err = RelayError::Parse {
                    message: e.to_string(),
                };
                let _ = reply_tx.send(JsonRpcResponse::from_error(None, &err).into_value()).await;
                continue;
            }
        };

        let gateway = gateway.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = gateway.handle(request).await {
                let _ = reply_tx.send(reply).await;
            }
        });
    }

    debug!("stdin closed, draining replies");
    // The writer stops once every in-flight request has dropped its sender.
    drop(reply_tx);
    writer_task.await??;
    Ok(())
}

async fn write_replies<W>(mut writer: W, mut replies: mpsc::Receiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let mut line = serde_json::to_vec(&reply)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
