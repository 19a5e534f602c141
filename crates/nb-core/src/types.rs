//! Session and cell types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cell identifier, unique within its session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source dialect of a session's executable cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    R,
    Julia,
    Sql,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::Python, Language::R, Language::Julia, Language::Sql];

    /// Line comment prefix used when rendering a session as a script
    pub fn comment_prefix(&self) -> &'static str {
        match self {
            Language::Python | Language::R | Language::Julia => "#",
            Language::Sql => "--",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::R => "r",
            Language::Julia => "jl",
            Language::Sql => "sql",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::R => write!(f, "r"),
            Language::Julia => write!(f, "julia"),
            Language::Sql => write!(f, "sql"),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "r" => Ok(Language::R),
            "julia" | "jl" => Ok(Language::Julia),
            "sql" => Ok(Language::Sql),
            other => Err(Error::invalid_argument(format!(
                "unsupported language '{}' (expected one of python, r, julia, sql)",
                other
            ))),
        }
    }
}

/// Kind of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    #[default]
    Code,
    Markdown,
}

/// One executable or content unit of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub kind: CellKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            id: CellId::generate(),
            kind: CellKind::Code,
            name: None,
            source: source.into(),
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            id: CellId::generate(),
            kind: CellKind::Markdown,
            name: None,
            source: source.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }

    /// First `lines` lines of the source
    pub fn preview(&self, lines: usize) -> String {
        self.source.lines().take(lines).collect::<Vec<_>>().join("\n")
    }
}

/// Parameters for opening a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub directory: PathBuf,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub project_config: Option<String>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl NewSession {
    pub fn new(directory: impl Into<PathBuf>, language: Language) -> Self {
        Self {
            directory: directory.into(),
            language,
            project_config: None,
            cells: Vec::new(),
        }
    }

    pub fn with_project_config(mut self, config: impl Into<String>) -> Self {
        self.project_config = Some(config.into());
        self
    }

    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }
}

/// A notebook-like unit of work
///
/// `id`, `directory`, `language` and `opened_at` are fixed at creation.
/// Cell edits and config updates never touch `opened_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    directory: PathBuf,
    cells: Vec<Cell>,
    language: Language,
    project_config: Option<String>,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Open a session with a fresh id
    pub fn open(params: NewSession) -> Self {
        Self {
            id: SessionId::generate(),
            directory: params.directory,
            cells: params.cells,
            language: params.language,
            project_config: params.project_config,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn project_config(&self) -> Option<&str> {
        self.project_config.as_deref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Display name: the last component of the directory, or the id
    pub fn display_name(&self) -> String {
        self.directory
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn cell(&self, id: &CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| &c.id == id)
    }

    /// Insert a cell at `index`, or append when `index` is None
    pub fn insert_cell(&mut self, cell: Cell, index: Option<usize>) -> Result<usize> {
        if self.cell(&cell.id).is_some() {
            return Err(Error::invalid_argument(format!(
                "cell '{}' already exists in session {}",
                cell.id, self.id
            )));
        }
        let index = index.unwrap_or(self.cells.len());
        if index > self.cells.len() {
            return Err(Error::invalid_argument(format!(
                "cell index {} out of range (session has {} cells)",
                index,
                self.cells.len()
            )));
        }
        self.cells.insert(index, cell);
        Ok(index)
    }

    pub fn update_cell(&mut self, id: &CellId, source: impl Into<String>) -> Result<&Cell> {
        let cell = self
            .cells
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| Error::cell_not_found(id.as_str()))?;
        cell.source = source.into();
        Ok(cell)
    }

    pub fn remove_cell(&mut self, id: &CellId) -> Result<Cell> {
        let index = self
            .cells
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| Error::cell_not_found(id.as_str()))?;
        Ok(self.cells.remove(index))
    }

    pub fn set_project_config(&mut self, config: Option<String>) {
        self.project_config = config;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.display_name(),
            directory: self.directory.clone(),
            language: self.language,
            cell_count: self.cells.len(),
            has_project_config: self.project_config.is_some(),
            opened_at: self.opened_at,
        }
    }
}

/// Lightweight view of a session used in listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub directory: PathBuf,
    pub language: Language,
    pub cell_count: usize,
    pub has_project_config: bool,
    pub opened_at: DateTime<Utc>,
}
