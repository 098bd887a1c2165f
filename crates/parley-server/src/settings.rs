//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (`PARLEY_CONFIG`, default `parley.toml`), then `PARLEY__*` environment
//! variables, e.g. `PARLEY__STORE__ADDRESS=redis:6379`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// `Origin` header value allowed to open `/echo`
    pub allowed_origin: String,
    /// `Host` header value allowed to open `/echo`
    pub allowed_host: String,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// host:port
    pub address: String,
    #[serde(default)]
    pub password: Option<String>,
    pub db: i64,
    pub command_timeout_ms: u64,
    /// Upper bound on chats returned by one range query
    pub search_limit: usize,
    /// Create the chat search index at startup
    pub create_index: bool,
}

impl StoreConfig {
    /// Password, if one is set and not empty
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            address: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            command_timeout_ms: 2000,
            search_limit: 1000,
            create_index: true,
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let store = StoreConfig::default();
    config::Config::builder()
        .set_default("bind_address", "0.0.0.0:8080")?
        .set_default("allowed_origin", "http://localhost:8080")?
        .set_default("allowed_host", "localhost:8080")?
        .set_default("store.backend", "redis")?
        .set_default("store.address", store.address)?
        .set_default("store.db", store.db)?
        .set_default("store.command_timeout_ms", store.command_timeout_ms)?
        .set_default("store.search_limit", store.search_limit as u64)?
        .set_default("store.create_index", store.create_index)
}

/// Load configuration from defaults, file and environment
pub fn load() -> Result<ServerConfig, ConfigError> {
    let path = std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| "parley.toml".to_string());

    defaults()?
        .add_source(File::with_name(&path).required(false))
        .add_source(
            Environment::with_prefix("PARLEY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
