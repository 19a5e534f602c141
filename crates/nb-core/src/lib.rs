//! Core types for nb-mcp
//!
//! # Modules
//!
//! - `error`: Error types and Result alias
//! - `types`: Sessions, cells and source languages
//! - `store`: The session store the MCP server reads from

pub mod error;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use store::{InMemorySessionStore, SessionGuard, SessionStore};
pub use types::*;
