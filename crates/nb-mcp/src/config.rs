//! Settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `NB_MCP__*` environment variables
//! (e.g. `NB_MCP__HTTP__BIND_ADDR=0.0.0.0:3001`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::server::McpServerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "nb-mcp.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub name: Option<String>,
    /// Lines of source shown per cell by `get_cell_map`
    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
    #[serde(default = "default_fault_capacity")]
    pub fault_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default)]
    pub bind_addr: Option<String>,
    /// Chunks buffered between a streaming tool and the HTTP body
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_preview_lines() -> usize {
    3
}

fn default_fault_capacity() -> usize {
    64
}

fn default_stream_buffer() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: None,
            preview_lines: default_preview_lines(),
            fault_capacity: default_fault_capacity(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_addr: None,
            stream_buffer: default_stream_buffer(),
            cors: true,
        }
    }
}

impl Settings {
    /// Load settings; an explicit `path` must exist, the default file may not
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let s = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("NB_MCP").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn server_config(&self) -> McpServerConfig {
        McpServerConfig {
            name: self.server.name.clone(),
            preview_lines: self.server.preview_lines,
            fault_capacity: self.server.fault_capacity,
            stream_buffer: self.http.stream_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nname = \"lab\"\npreview_lines = 5\n\n[http]\nbind_addr = \"127.0.0.1:4000\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.server.name.as_deref(), Some("lab"));
        assert_eq!(settings.server.preview_lines, 5);
        assert_eq!(settings.server.fault_capacity, 64);
        assert_eq!(settings.http.bind_addr.as_deref(), Some("127.0.0.1:4000"));
        assert_eq!(settings.http.stream_buffer, 16);

        let server = settings.server_config();
        assert_eq!(server.preview_lines, 5);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/nb-mcp.toml"))).is_err());
    }
}
