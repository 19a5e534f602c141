//! Session export
//!
//! Renders a session as a script in its own language, one chunk per cell.
//! Cells are copied out under the session lock, so edits made while the
//! stream is being consumed do not show up in it.

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::{self, StreamExt};
use nb_core::{Cell, CellKind, Language, SessionStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{parse_args, session_id_schema, SessionArgs, ToolContext};
use crate::error::Result;
use crate::tool_registry::{Tool, ToolOutput, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<usize> {
    registry.register(Arc::new(ExportSessionTool {
        store: ctx.store.clone(),
    }))?;
    Ok(1)
}

pub struct ExportSessionTool {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl Tool for ExportSessionTool {
    fn name(&self) -> &str { "export_session" }
    fn description(&self) -> &str {
        "Export a session as a script in its language. Streams one chunk per cell."
    }
    fn category(&self) -> &str { "export" }

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

        let (header, language, cells) = {
            let session = self.store.lock_session(&args.id()).await?;
            let language = session.language();
            let prefix = language.comment_prefix();
            let header = format!(
                "{} {} session {} ({})\n{} file: {}.{}\n\n",
                prefix,
                language,
                session.id(),
                session.directory().display(),
                prefix,
                session.display_name(),
                language.file_extension()
            );
            (header, session.language(), session.cells().to_vec())
        };
        debug!(session = %args.session_id, cells = cells.len(), "Exporting session");

        let chunks = std::iter::once(header).chain(
            cells
                .into_iter()
                .enumerate()
                .map(move |(n, cell)| render_cell(language, n + 1, &cell)),
        );

        Ok(ToolOutput::Stream(
            stream::iter(chunks.map(|chunk| Ok::<_, anyhow::Error>(Bytes::from(chunk)))).boxed(),
        ))
    }
}

fn render_cell(language: Language, number: usize, cell: &Cell) -> String {
    let prefix = language.comment_prefix();
    let mut out = match &cell.name {
        Some(name) => format!("{} %% cell {} {}", prefix, number, name),
        None => format!("{} %% cell {}", prefix, number),
    };

    match cell.kind {
        CellKind::Code => {
            out.push('\n');
            out.push_str(&cell.source);
            out.push('\n');
        }
        CellKind::Markdown => {
            out.push_str(" [markdown]\n");
            for line in cell.source.lines() {
                if line.is_empty() {
                    out.push_str(prefix);
                } else {
                    out.push_str(&format!("{} {}", prefix, line));
                }
                out.push('\n');
            }
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::collect_text;
    use nb_core::{InMemorySessionStore, NewSession};

    #[test]
    fn test_render_code_cell() {
        let cell = Cell::code("SELECT 1;").with_name("smoke");
        assert_eq!(
            render_cell(Language::Sql, 2, &cell),
            "-- %% cell 2 smoke\nSELECT 1;\n\n"
        );
    }

    #[test]
    fn test_render_markdown_cell() {
        let cell = Cell::markdown("# Title\n\nbody");
        assert_eq!(
            render_cell(Language::Python, 1, &cell),
            "# %% cell 1 [markdown]\n# # Title\n#\n# body\n\n"
        );
    }

    #[tokio::test]
    async fn test_export_is_a_snapshot() {
        let store = Arc::new(InMemorySessionStore::new());
        let session = store
            .open_session(
                NewSession::new("/work/etl", Language::R)
                    .with_cells(vec![Cell::code("x <- 1"), Cell::code("y <- 2")]),
            )
            .await
            .unwrap();
        let tool = ExportSessionTool {
            store: store.clone(),
        };

        let output = tool
            .execute(json!({ "session_id": session.id().as_str() }))
            .await
            .unwrap();
        assert!(output.is_stream());

        store
            .lock_session(session.id())
            .await
            .unwrap()
            .insert_cell(Cell::code("z <- 3"), None)
            .unwrap();

        let ToolOutput::Stream(chunks) = output else {
            panic!("expected a stream");
        };
        let text = collect_text(chunks).await.unwrap();
        assert!(text.starts_with("# r session "));
        assert!(text.contains("\n# file: etl.r\n\n"));
        assert!(text.contains("# %% cell 1\nx <- 1\n"));
        assert!(text.contains("# %% cell 2\ny <- 2\n"));
        assert!(!text.contains("z <- 3"));
    }
}
