//! Stdio Transport
//!
//! Standard MCP transport over stdin/stdout. One JSON-RPC message per line;
//! notifications get no reply.

use super::{McpHandler, Transport};
use crate::faults::{Fault, FaultSource};
use crate::{JsonRpcError, McpRequest, McpResponse, McpServer};
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

/// Stdio transport - reads JSON-RPC from stdin, writes to stdout
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn serve(self, server: Arc<McpServer>) -> Result<()> {
        info!("Starting MCP stdio transport");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        serve_lines(server.as_ref(), stdin, stdout).await?;
        info!("Stdio transport shutting down");
        Ok(())
    }
}

/// Answer newline-delimited requests from `reader` on `writer` until EOF.
///
/// A failed write ends the loop; it is reported to the handler's fault
/// sink first, since no caller is left to receive it.
pub async fn serve_lines<H, R, W>(handler: &H, reader: R, mut writer: W) -> Result<()>
where
    H: McpHandler + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(request = %line, "Received request");

        let response = match serde_json::from_str::<McpRequest>(line) {
            Ok(request) if request.is_notification() => {
                handler.handle_request(request).await;
                continue;
            }
            Ok(request) => handler.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Parse error");
                McpResponse::error(None, JsonRpcError::parse_error(e.to_string()))
            }
        };

        let mut response_json = serde_json::to_string(&response)?;
        debug!(response = %response_json, "Sending response");
        response_json.push('\n');

        if let Err(e) = write_line(&mut writer, response_json.as_bytes()).await {
            handler.report_fault(
                Fault::new(FaultSource::Transport, e.to_string()).with_context("stdout"),
            );
            return Err(e.into());
        }
    }

    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McpServerConfig;
    use nb_core::InMemorySessionStore;
    use serde_json::Value;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn server() -> Arc<McpServer> {
        McpServer::create(
            McpServerConfig::default(),
            Arc::new(InMemorySessionStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_requests_answered_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "not json\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut out = Vec::new();
        serve_lines(server().as_ref(), input.as_bytes(), &mut out)
            .await
            .unwrap();

        let replies: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert_eq!(replies[2]["id"], 2);
        assert_eq!(replies[2]["result"]["tools"][0]["name"], "list_sessions");
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_reported() {
        let server = server();
        let mut faults = server.subscribe_faults();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";

        let result = serve_lines(server.as_ref(), input.as_bytes(), BrokenPipe).await;
        assert!(result.is_err());

        let fault = faults.try_recv().unwrap();
        assert_eq!(fault.source, FaultSource::Transport);
        assert_eq!(fault.context.as_deref(), Some("stdout"));
    }
}
