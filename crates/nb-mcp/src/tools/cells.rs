//! Cell inspection and editing tools

use async_trait::async_trait;
use nb_core::{Cell, CellId, CellKind, SessionId, SessionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{parse_args, session_id_schema, ToolContext};
use crate::error::Result;
use crate::tool_registry::{Tool, ToolOutput, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<usize> {
    registry.register(Arc::new(GetCellMapTool {
        store: ctx.store.clone(),
        default_preview_lines: ctx.preview_lines,
    }))?;
    registry.register(Arc::new(GetCellTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(AddCellTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(UpdateCellTool {
        store: ctx.store.clone(),
    }))?;
    registry.register(Arc::new(RemoveCellTool {
        store: ctx.store.clone(),
    }))?;
    Ok(5)
}

fn cell_id_schema() -> Value {
    json!({ "type": "string", "minLength": 1 })
}

pub struct GetCellMapTool {
    store: Arc<dyn SessionStore>,
    default_preview_lines: usize,
}

#[derive(Deserialize)]
struct CellMapArgs {
    session_id: String,
    #[serde(default)]
    preview_lines: Option<usize>,
}

#[async_trait]
impl Tool for GetCellMapTool {
    fn name(&self) -> &str { "get_cell_map" }
    fn description(&self) -> &str {
        "Ordered overview of a session's cells: id, kind, name, line count and the first lines of source."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "preview_lines": { "type": "integer", "minimum": 0, "maximum": 200 }
            },
            "required": ["session_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: CellMapArgs = parse_args(args)?;
        let lines = args.preview_lines.unwrap_or(self.default_preview_lines);
        let session = self.store.get_session(&SessionId::from(args.session_id)).await?;

        let cells: Vec<_> = session
            .cells()
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                json!({
                    "index": index,
                    "id": cell.id,
                    "kind": cell.kind,
                    "name": cell.name,
                    "line_count": cell.line_count(),
                    "preview": cell.preview(lines),
                })
            })
            .collect();

        Ok(json!({
            "session_id": session.id(),
            "language": session.language(),
            "cells": cells,
        })
        .into())
    }
}

pub struct GetCellTool {
    store: Arc<dyn SessionStore>,
}

#[derive(Deserialize)]
struct CellArgs {
    session_id: String,
    cell_id: String,
}

#[async_trait]
impl Tool for GetCellTool {
    fn name(&self) -> &str { "get_cell" }
    fn description(&self) -> &str { "Get one cell's full source." }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "cell_id": cell_id_schema()
            },
            "required": ["session_id", "cell_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: CellArgs = parse_args(args)?;
        let session = self.store.get_session(&SessionId::from(args.session_id)).await?;
        let cell_id = CellId::from(args.cell_id);

        let (index, cell) = session
            .cells()
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == cell_id)
            .ok_or_else(|| nb_core::Error::cell_not_found(cell_id.as_str()))?;

        Ok(json!({ "index": index, "cell": cell }).into())
    }
}

pub struct AddCellTool {
    store: Arc<dyn SessionStore>,
}

#[derive(Deserialize)]
struct AddCellArgs {
    session_id: String,
    source: String,
    #[serde(default)]
    kind: CellKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

#[async_trait]
impl Tool for AddCellTool {
    fn name(&self) -> &str { "add_cell" }
    fn description(&self) -> &str {
        "Insert a cell at an index, or append it when no index is given."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "source": { "type": "string" },
                "kind": { "type": "string", "enum": ["code", "markdown"] },
                "name": { "type": "string" },
                "index": { "type": "integer", "minimum": 0 }
            },
            "required": ["session_id", "source"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: AddCellArgs = parse_args(args)?;
        let mut cell = match args.kind {
            CellKind::Code => Cell::code(args.source),
            CellKind::Markdown => Cell::markdown(args.source),
        };
        cell.name = args.name;
        let cell_id = cell.id.clone();

        let mut session = self.store.lock_session(&SessionId::from(args.session_id)).await?;
        let index = session.insert_cell(cell, args.index)?;
        debug!(session = %session.id(), cell = %cell_id, index, "Cell added");

        Ok(json!({
            "cell_id": cell_id,
            "index": index,
            "cell_count": session.cells().len(),
        })
        .into())
    }
}

pub struct UpdateCellTool {
    store: Arc<dyn SessionStore>,
}

#[derive(Deserialize)]
struct UpdateCellArgs {
    session_id: String,
    cell_id: String,
    source: String,
}

#[async_trait]
impl Tool for UpdateCellTool {
    fn name(&self) -> &str { "update_cell" }
    fn description(&self) -> &str { "Replace the source of an existing cell." }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "cell_id": cell_id_schema(),
                "source": { "type": "string" }
            },
            "required": ["session_id", "cell_id", "source"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: UpdateCellArgs = parse_args(args)?;
        let cell_id = CellId::from(args.cell_id);

        let mut session = self.store.lock_session(&SessionId::from(args.session_id)).await?;
        let cell = session.update_cell(&cell_id, args.source)?;

        Ok(json!({ "cell": cell }).into())
    }
}

pub struct RemoveCellTool {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl Tool for RemoveCellTool {
    fn name(&self) -> &str { "remove_cell" }
    fn description(&self) -> &str { "Delete a cell from a session." }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": session_id_schema(),
                "cell_id": cell_id_schema()
            },
            "required": ["session_id", "cell_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let args: CellArgs = parse_args(args)?;
        let cell_id = CellId::from(args.cell_id);

        let mut session = self.store.lock_session(&SessionId::from(args.session_id)).await?;
        let removed = session.remove_cell(&cell_id)?;
        debug!(session = %session.id(), cell = %removed.id, "Cell removed");

        Ok(json!({
            "removed": removed.id,
            "cell_count": session.cells().len(),
        })
        .into())
    }
}
