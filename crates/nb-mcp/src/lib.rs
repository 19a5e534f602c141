//! nb-mcp: MCP server for notebook sessions
//!
//! Exposes open notebook sessions to model-driven clients over the Model
//! Context Protocol. Sessions show up as resources; reading and editing
//! them goes through a fixed set of tools. Large tool results (session
//! exports) are delivered chunk by chunk through the streaming transport.
//!
//! Architecture:
//! stdin / HTTP → JSON-RPC → McpServer → ToolRegistry → SessionStore
//!
//! Methods:
//! - initialize → handshake
//! - tools/list → registered tools, in registration order
//! - tools/call → validated dispatch to one tool
//! - resources/list → one `session://` resource per open session
//! - resources/read → session snapshot as JSON

pub mod config;
pub mod error;
pub mod faults;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod streaming;
pub mod tool_registry;
pub mod tools;
pub mod transport;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "nb-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types
pub use error::{McpError, Result};
pub use faults::{Fault, FaultReporter, FaultSource};
pub use protocol::{JsonRpcError, McpRequest, McpResponse};
pub use resources::{ResourceContents, ResourceInfo, SessionResources};
pub use server::{Lifecycle, McpServer, McpServerConfig};
pub use streaming::{body_channel, stream_to_channel, ResponseChannel, StreamOptions, StreamSummary};
pub use tool_registry::{Tool, ToolInfo, ToolOutput, ToolRegistry};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        McpError, McpRequest, McpResponse, McpServer, McpServerConfig, ResponseChannel,
        StreamOptions, ToolOutput,
    };
}
