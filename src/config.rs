use std::path::Path;

use serde::Deserialize;

/// Top-level config loaded from `dash.toml`. ClickHouse connection details
/// come from the environment instead (see `main`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DashConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Cap on widget executions in flight per dashboard call.
    #[serde(default = "default_max_concurrent_widgets")]
    pub max_concurrent_widgets: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_concurrent_widgets: default_max_concurrent_widgets() }
    }
}

fn default_max_concurrent_widgets() -> usize {
    crate::query_engine::DEFAULT_MAX_CONCURRENT_WIDGETS
}

impl DashConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: DashConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}
