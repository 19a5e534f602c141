//! Built-in Tools
//!
//! Registered once, in a fixed order, when the server is created.
//! Tools that read or edit a session go through the store's per-session
//! lock, so two calls against the same session never interleave.

pub mod cells;
pub mod export;
pub mod project;
pub mod sessions;

use nb_core::{SessionId, SessionStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::error::{McpError, Result};
use crate::tool_registry::ToolRegistry;

/// Shared state handed to every built-in tool
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn SessionStore>,
    pub preview_lines: usize,
}

/// Load all built-in tools into the registry
pub fn register_all(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<usize> {
    let mut count = 0;
    count += sessions::register_all(registry, ctx)?;
    count += cells::register_all(registry, ctx)?;
    count += project::register_all(registry, ctx)?;
    count += export::register_all(registry, ctx)?;

    info!(count, "Loaded built-in tools");
    Ok(count)
}

pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| McpError::InvalidArguments(e.to_string()))
}

#[derive(Deserialize)]
pub(crate) struct SessionArgs {
    pub session_id: String,
}

impl SessionArgs {
    pub fn id(&self) -> SessionId {
        SessionId::from(self.session_id.as_str())
    }
}

pub(crate) fn session_id_schema() -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "description": "Id of an open session"
    })
}
