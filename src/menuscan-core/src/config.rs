use serde::{Deserialize, Serialize};

use crate::query::DEFAULT_SEARCH_INDEX;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_port")]
    pub port: String,

    // CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    // Data generation and bulk load
    #[serde(default)]
    pub install: InstallConfig,

    // Query surface
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "menuscan".to_string()
}

fn default_collection() -> String {
    "restaurants".to_string()
}

fn default_port() -> String {
    "8080".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_enabled")]
    pub enabled: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_cors_enabled() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_cors_enabled(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstallConfig {
    /// Records per insert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Concurrent insert workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Generator seed; same seed, same dataset
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_full_document_count")]
    pub full_document_count: u64,

    #[serde(default = "default_dummy_document_count")]
    pub dummy_document_count: u64,
}

fn default_batch_size() -> u64 {
    10_000
}

fn default_workers() -> usize {
    4
}

fn default_seed() -> u64 {
    42
}

fn default_full_document_count() -> u64 {
    1_000_000
}

fn default_dummy_document_count() -> u64 {
    100
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            seed: default_seed(),
            full_document_count: default_full_document_count(),
            dummy_document_count: default_dummy_document_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search index used when a request names none
    #[serde(default = "default_search_index")]
    pub default_index: String,

    /// Cap applied by `get-restaurants`; 0 leaves it unbounded
    #[serde(default = "default_result_limit")]
    pub result_limit: i64,
}

fn default_search_index() -> String {
    DEFAULT_SEARCH_INDEX.to_string()
}

fn default_result_limit() -> i64 {
    0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_index: default_search_index(),
            result_limit: default_result_limit(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Override connection settings from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override connection settings from `lookup`; empty values are ignored
    pub fn apply_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(uri) = get("MONGODB_URI") {
            self.mongodb_uri = uri;
        }
        if let Some(database) = get("MONGODB_DATABASE") {
            self.database = database;
        }
        if let Some(collection) = get("MONGODB_COLLECTION") {
            self.collection = collection;
        }
        if let Some(port) = get("PORT") {
            self.port = port;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongodb_uri: default_mongodb_uri(),
            database: default_database(),
            collection: default_collection(),
            port: default_port(),
            cors: CorsConfig::default(),
            install: InstallConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"database":"bench","install":{"workers":8}}"#).unwrap();
        assert_eq!(config.database, "bench");
        assert_eq!(config.collection, "restaurants");
        assert_eq!(config.install.workers, 8);
        assert_eq!(config.install.batch_size, 10_000);
        assert_eq!(config.install.full_document_count, 1_000_000);
        assert_eq!(config.search.default_index, "default");
    }

    #[test]
    fn test_env_overrides_connection_settings() {
        let env: HashMap<&str, &str> = [
            ("MONGODB_URI", "mongodb+srv://cluster.example.net"),
            ("MONGODB_COLLECTION", "places"),
            ("PORT", ""),
        ]
        .into_iter()
        .collect();

        let config = Config::default().apply_env_with(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.mongodb_uri, "mongodb+srv://cluster.example.net");
        assert_eq!(config.collection, "places");
        // Empty values leave the default alone
        assert_eq!(config.port, "8080");
        assert_eq!(config.database, "menuscan");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/menuscan/config.json").is_err());
    }
}
