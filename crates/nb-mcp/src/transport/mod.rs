//! Transport Layer
//!
//! Provides two transport implementations:
//! - Stdio (newline-delimited JSON-RPC on stdin/stdout)
//! - HTTP (JSON-RPC plus REST endpoints, streamed tool results)

mod http;
mod stdio;

pub use http::{router, HttpTransport};
pub use stdio::{serve_lines, StdioTransport};

use anyhow::Result;
use std::sync::Arc;

use crate::faults::Fault;
use crate::{McpRequest, McpResponse, McpServer};

/// JSON-RPC side of a server, as seen by line-oriented transports
#[async_trait::async_trait]
pub trait McpHandler: Send + Sync {
    async fn handle_request(&self, request: McpRequest) -> McpResponse;

    /// Sink for faults the transport cannot hand back to a caller
    fn report_fault(&self, fault: Fault);
}

/// Transport trait - implement for new transport types
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Serve requests using this transport
    async fn serve(self, server: Arc<McpServer>) -> Result<()>;
}

#[async_trait::async_trait]
impl McpHandler for McpServer {
    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        McpServer::handle_request(self, request).await
    }

    fn report_fault(&self, fault: Fault) {
        McpServer::report_fault(self, fault);
    }
}
