//! Runtime configuration: graph endpoint, source database, label prefixes, sync limits.
//!
//! Loaded from a TOML file, then overridden by environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::environment::LabelPrefixes;
use crate::error::{RegsyncError, RegsyncResult};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
    /// Upper bound on waiting for a pooled connection and running one statement.
    pub acquire_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 200,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// SQLite file exposing the curated views.
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("regsync.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent merge writes within one entity type.
    pub concurrency: usize,
    /// Versioned graph configuration (model + mapping rules) JSON.
    pub model_path: PathBuf,
    /// Attribution recorded on nodes the engine derives itself.
    pub system_actor: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            model_path: PathBuf::from("config/regulatory_model.json"),
            system_actor: "system:regsync".to_string(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub source: SourceConfig,
    pub environments: LabelPrefixes,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load from `path` (or defaults when `None`), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> RegsyncResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with overrides read from `lookup` instead of the process environment.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> RegsyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> RegsyncResult<Self> {
        toml::from_str(text).map_err(|e| RegsyncError::config(e.to_string()))
    }

    /// Apply `NEO4J_*` / `REGSYNC_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        if let Some(v) = lookup("NEO4J_DATABASE") {
            self.graph.database = v;
        }
        if let Some(v) = lookup("REGSYNC_SOURCE_DB") {
            self.source.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REGSYNC_MODEL") {
            self.sync.model_path = PathBuf::from(v);
        }
        if let Some(n) = lookup("REGSYNC_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.sync.concurrency = n;
        }
    }

    pub fn validate(&self) -> RegsyncResult<()> {
        self.environments.validate()?;
        if self.sync.concurrency == 0 {
            return Err(RegsyncError::config("sync.concurrency must be at least 1"));
        }
        if self.graph.acquire_timeout_secs == 0 {
            return Err(RegsyncError::config("graph.acquire_timeout_secs must be positive"));
        }
        if self.graph.max_connections == 0 {
            return Err(RegsyncError::config("graph.max_connections must be at least 1"));
        }
        if self.sync.system_actor.trim().is_empty() {
            return Err(RegsyncError::config("sync.system_actor must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.environments.staging, "Staging_");
        assert_eq!(config.sync.concurrency, 8);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [graph]
            uri = "bolt://graph.internal:7687"

            [environments]
            staging = "Stg_"

            [sync]
            concurrency = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.uri, "bolt://graph.internal:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.environments.staging, "Stg_");
        assert_eq!(config.environments.production, "");
        assert_eq!(config.sync.concurrency, 2);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("NEO4J_URI", "bolt://other:7687"),
            ("REGSYNC_CONCURRENCY", "3"),
            ("REGSYNC_SOURCE_DB", "/data/curated.db"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.graph.uri, "bolt://other:7687");
        assert_eq!(config.sync.concurrency, 3);
        assert_eq!(config.source.path, PathBuf::from("/data/curated.db"));
    }

    #[test]
    fn test_invalid_values() {
        let config = AppConfig::from_toml("[sync]\nconcurrency = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml("[environments]\nstaging = \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[source]\npath = \"curated.db\"\n\n[graph]\nfetch_size = 50").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.graph.fetch_size, 50);

        let vars: HashMap<&str, &str> =
            HashMap::from([("NEO4J_URI", "bolt://from-env:7687"), ("REGSYNC_CONCURRENCY", "4")]);
        let config = AppConfig::load_with(Some(file.path()), |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.source.path, PathBuf::from("curated.db"));
        assert_eq!(config.graph.fetch_size, 50);
        assert_eq!(config.graph.uri, "bolt://from-env:7687");
        assert_eq!(config.sync.concurrency, 4);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\nconcurrency = 0").unwrap();
        assert!(AppConfig::load_with(Some(file.path()), |_| None).is_err());

        let missing = Path::new("/nonexistent/regsync.toml");
        assert!(AppConfig::load_with(Some(missing), |_| None).is_err());
    }
}
