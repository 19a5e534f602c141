//! Session resources for MCP
//!
//! Every open session is exposed as one readable resource. The list is
//! rebuilt from the session store on each call and never cached, so a
//! closed session disappears from the very next listing.

use nb_core::{Session, SessionId, SessionStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::{McpError, Result};

pub const SESSION_SCHEME: &str = "session://";

/// Resource information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// Body of a `resources/read` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

pub fn session_uri(id: &SessionId) -> String {
    format!("{}{}", SESSION_SCHEME, id)
}

fn describe(session: &Session) -> ResourceInfo {
    ResourceInfo {
        uri: session_uri(session.id()),
        name: session.display_name(),
        description: Some(format!(
            "{} session in {} with {} cell(s), opened {}",
            session.language(),
            session.directory().display(),
            session.cells().len(),
            session.opened_at().to_rfc3339()
        )),
        mime_type: Some("application/json".to_string()),
    }
}

pub struct SessionResources {
    store: Arc<dyn SessionStore>,
}

impl SessionResources {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<ResourceInfo>> {
        let sessions = self.store.open_sessions().await?;
        Ok(sessions.iter().map(describe).collect())
    }

    pub async fn read(&self, uri: &str) -> Result<ResourceContents> {
        let id = uri
            .strip_prefix(SESSION_SCHEME)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| McpError::resource_not_found(uri))?;

        let session = self
            .store
            .get_session(&SessionId::from(id))
            .await
            .map_err(|e| match e {
                nb_core::Error::NotFound { .. } => McpError::resource_not_found(uri),
                other => other.into(),
            })?;

        let body = json!({
            "id": session.id(),
            "directory": session.directory(),
            "language": session.language(),
            "openedAt": session.opened_at(),
            "projectConfig": session.project_config(),
            "cells": session.cells(),
        });

        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type: "application/json".to_string(),
            text: serde_json::to_string_pretty(&body)?,
        })
    }
}
