//! Error taxonomy for the MCP server and streaming transport

use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    /// Unknown tool or resource name
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Arguments do not match the tool's input schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Write attempted on a response channel that already ended
    #[error("Response channel closed")]
    ChannelClosed,

    /// The chunk producer failed mid-stream
    #[error("Upstream producer failed: {0}")]
    UpstreamFailure(String),

    /// A tool handler panicked while executing
    #[error("Tool {tool} panicked: {message}")]
    HandlerPanic { tool: String, message: String },

    /// Operation attempted after `close()`
    #[error("Server closed")]
    ServerClosed,

    #[error("Session error: {0}")]
    Session(nb_core::Error),

    #[error("Tool registration error: {0}")]
    Registry(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, McpError>;

impl McpError {
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        McpError::NotFound {
            kind: "Tool",
            name: name.into(),
        }
    }

    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        McpError::NotFound {
            kind: "Resource",
            name: uri.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        McpError::Internal(msg.into())
    }

    /// Faults that happen after a response may already be committed
    pub fn is_stream_fault(&self) -> bool {
        matches!(self, McpError::ChannelClosed | McpError::UpstreamFailure(_))
    }
}

impl From<nb_core::Error> for McpError {
    fn from(err: nb_core::Error) -> Self {
        match err {
            nb_core::Error::NotFound { kind, id } => McpError::NotFound { kind, name: id },
            nb_core::Error::InvalidArgument(msg) => McpError::InvalidArguments(msg),
            other => McpError::Session(other),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Internal(format!("serialization: {}", err))
    }
}

impl From<anyhow::Error> for McpError {
    fn from(err: anyhow::Error) -> Self {
        McpError::Internal(err.to_string())
    }
}
