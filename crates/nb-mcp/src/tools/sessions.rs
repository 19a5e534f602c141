//! Session lifecycle tools

use async_trait::async_trait;
use nb_core::{Language, NewSession, SessionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::{parse_args, session_id_schema, SessionArgs, ToolContext};
use crate::error::Result;
use crate::resources::session_uri;
use crate::tool_registry::{Tool, ToolOutput, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<usize> {
    registry.register(Arc::new(ListSessionsTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(OpenSessionTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(CloseSessionTool {
        store: ctx.store.clone(),
    }))?;
    Ok(3)
}

pub struct ListSessionsTool {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl Tool for ListSessionsTool {
    fn name(&self) -> &str { "list_sessions" }
    fn description(&self) -> &str { "List open notebook sessions with language and cell counts." }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput> {
        let sessions: Vec<_> = self
            .store
            .open_sessions()
            .await?
            .iter()
            .map(|s| s.summary())
            .collect();
        Ok(json!({ "count": sessions.len(), "sessions": sessions }).into())
    }
}

pub struct OpenSessionTool {
    store: Arc<dyn SessionStore>,
}

#[derive(Deserialize)]
struct OpenArgs {
    directory: PathBuf,
    language: Language,
    #[serde(default)]
    project_config: Option<String>,
}

#[async_trait]
impl Tool for OpenSessionTool {
    fn name(&self) -> &str { "open_session" }
    fn description(&self) -> &str { "Open a new empty session rooted at a directory." }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": { "type": "string", "minLength": 1 },
                "language": { "type": "string", "enum": ["python", "r", "julia", "sql"] },
                "project_config": { "type": "string", "description": "Raw project configuration text" }
            },
            "required": ["directory", "language"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: OpenArgs = parse_args(args)?;
        let mut params = NewSession::new(args.directory, args.language);
        params.project_config = args.project_config;

        let session = self.store.open_session(params).await?;
        Ok(json!({
            "session": session.summary(),
            "uri": session_uri(session.id()),
        })
        .into())
    }
}

pub struct CloseSessionTool {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl Tool for CloseSessionTool {
    fn name(&self) -> &str { "close_session" }
    fn description(&self) -> &str { "Close a session and drop it from the registry." }

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
        let closed = self.store.close_session(&args.id()).await?;
        Ok(json!({ "closed": closed.id(), "cell_count": closed.cells().len() }).into())
    }
}
