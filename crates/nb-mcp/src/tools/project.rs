//! Project configuration tools
//!
//! A session carries the raw text of its project configuration
//! (e.g. a `pyproject.toml`). The server stores it verbatim and never parses it.

use async_trait::async_trait;
use nb_core::{SessionId, SessionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{parse_args, session_id_schema, SessionArgs, ToolContext};
use crate::error::Result;
use crate::tool_registry::{Tool, ToolOutput, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<usize> {
    registry.register(Arc::new(GetProjectConfigTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(SetProjectConfigTool {
        store: ctx.store.clone(),
    }))?;
    Ok(2)
}

pub struct GetProjectConfigTool {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl Tool for GetProjectConfigTool {
    fn name(&self) -> &str { "get_project_config" }
    fn description(&self) -> &str { "Get the raw project configuration of a session, or null." }
    fn category(&self) -> &str { "project" }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "session_id": session_id_schema() },
            "required": ["session_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: SessionArgs = parse_args(args)?;
        let session = self.store.get_session(&args.id()).await?;
        Ok(json!({
            "session_id": session.id(),
            "config": session.project_config(),
        })
        .into())
    }
}

pub struct SetProjectConfigTool {
    store: Arc<dyn SessionStore>,
}

#[derive(Deserialize)]
struct SetConfigArgs {
    session_id: String,
    config: Option<String>,
}

#[async_trait]
impl Tool for SetProjectConfigTool {
    fn name(&self) -> &str { "set_project_config" }
    fn description(&self) -> &str {
        "Replace a session's project configuration. Pass null to clear it."
    }
    fn category(&self) -> &str { "project" }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "config": { "type": ["string", "null"] }
            },
            "required": ["session_id", "config"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: SetConfigArgs = parse_args(args)?;
        let mut session = self.store.lock_session(&SessionId::from(args.session_id)).await?;

        let previous = session.project_config().map(str::len);
        session.set_project_config(args.config);
        info!(
            session = %session.id(),
            cleared = session.project_config().is_none(),
            "Project config updated"
        );

        Ok(json!({
            "session_id": session.id(),
            "previous_bytes": previous,
            "has_project_config": session.project_config().is_some(),
        })
        .into())
    }
}
