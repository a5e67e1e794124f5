//! Project configuration (`rung.toml`).
//!
//! Every key is optional. A project without `[[extensions]]` is treated as a
//! single extension named after its directory, with its source in
//! `index.js`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RungError, RungResult};

/// File name looked up in the project root.
pub const CONFIG_FILE: &str = "rung.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub sandbox: SandboxConfig,
    pub storage: StorageConfig,
    pub extensions: Vec<ExtensionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub open_browser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Whitelist file, relative to the root. Built-in list when absent.
    pub whitelist: Option<PathBuf>,
    /// Extra CommonJS capabilities: name → file relative to the root.
    pub modules: BTreeMap<String, PathBuf>,
    /// Globals injected into every extension context.
    pub globals: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record file. `<data dir>/rung/db.json` when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5001,
            open_browser: true,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl Config {
    /// Load `rung.toml` from `root`, or defaults if there is none.
    pub fn load(root: &Path) -> RungResult<Self> {
        let path = root.join(CONFIG_FILE);

        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            Self::parse(&content).map_err(|e| match e {
                RungError::Config(message) => {
                    RungError::Config(format!("{}: {}", path.display(), message))
                }
                other => other,
            })?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> RungResult<Self> {
        toml::from_str(content).map_err(|e| RungError::Config(e.to_string()))
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> RungResult<()> {
        if self.server.port == 0 {
            return Err(RungError::Config("server.port must not be 0".to_string()));
        }

        let mut seen = HashSet::new();
        for ext in &self.extensions {
            let name = ext.name.trim();
            if name.is_empty() {
                return Err(RungError::Config("extension name is required".to_string()));
            }
            if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(RungError::Config(format!(
                    "extension name '{}' must not contain whitespace",
                    ext.name
                )));
            }
            if !seen.insert(name) {
                return Err(RungError::Config(format!(
                    "duplicate extension name '{}'",
                    ext.name
                )));
            }
            if ext.path.as_os_str().is_empty() {
                return Err(RungError::Config(format!(
                    "extension '{}' requires a path",
                    ext.name
                )));
            }
        }

        Ok(())
    }

    /// Extensions to run, in declared order.
    pub fn resolved_extensions(&self, root: &Path) -> Vec<ExtensionConfig> {
        if !self.extensions.is_empty() {
            return self.extensions.clone();
        }

        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "extension".to_string());

        vec![ExtensionConfig {
            name,
            path: PathBuf::from("index.js"),
            params: serde_json::Map::new(),
        }]
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(crate::extensions::JsonFileStore::default_path)
    }
}
