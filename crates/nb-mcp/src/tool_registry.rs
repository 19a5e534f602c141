//! Tool Registry
//!
//! Tools are registered once while the server is being built and never
//! change afterwards, so the registry is shared as a plain `Arc` without a
//! lock. Listing preserves registration order.
//!
//! Every tool's input schema is compiled at registration time; a tool with
//! a broken schema never makes it into the registry.

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use futures::FutureExt;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

use crate::error::{McpError, Result};

/// Single-pass producer of result chunks
pub type ChunkStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// What a tool hands back
pub enum ToolOutput {
    Value(Value),
    /// Large or incremental payload, delivered through the streaming transport
    Stream(ChunkStream),
}

impl ToolOutput {
    pub fn is_stream(&self) -> bool {
        matches!(self, ToolOutput::Stream(_))
    }
}

impl std::fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolOutput::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ToolOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Value(value)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn category(&self) -> &str {
        "session"
    }
    /// Arguments have already been validated against `input_schema`
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}

pub type BoxedTool = Arc<dyn Tool>;

/// Tool information for MCP discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct Entry {
    tool: BoxedTool,
    info: ToolInfo,
    validator: Validator,
}

#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; duplicate names and invalid schemas are rejected
    pub fn register(&mut self, tool: BoxedTool) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(McpError::Registry(format!("duplicate tool name: {}", name)));
        }

        let input_schema = tool.input_schema();
        let validator = jsonschema::validator_for(&input_schema)
            .map_err(|e| McpError::Registry(format!("invalid schema for {}: {}", name, e)))?;

        let info = ToolInfo {
            name: name.clone(),
            description: tool.description().to_string(),
            input_schema,
        };

        debug!(tool = %name, category = tool.category(), "Registered tool");
        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            tool,
            info,
            validator,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<BoxedTool> {
        self.index.get(name).map(|&i| self.entries[i].tool.clone())
    }

    /// Descriptors in registration order
    pub fn definitions(&self) -> Vec<ToolInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }

    /// Check `args` against the tool's input schema
    pub fn validate(&self, name: &str, args: &Value) -> Result<()> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| McpError::tool_not_found(name))?;

        if entry.validator.is_valid(args) {
            return Ok(());
        }

        let msg = entry
            .validator
            .iter_errors(args)
            .take(5)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        if msg.is_empty() {
            return Err(McpError::InvalidArguments(format!(
                "arguments do not match the input schema of {}",
                name
            )));
        }
        Err(McpError::InvalidArguments(msg))
    }

    /// Look up, validate and run a tool. A panicking handler comes back
    /// as [`McpError::HandlerPanic`] instead of unwinding into the caller.
    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput> {
        let tool = self.get(name).ok_or_else(|| McpError::tool_not_found(name))?;
        self.validate(name, &args)?;
        AssertUnwindSafe(tool.execute(args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(McpError::HandlerPanic {
                    tool: name.to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
