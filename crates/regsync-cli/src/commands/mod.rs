//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use regsync_core::{AppConfig, Environment, GraphConfiguration};
use regsync_graph::GraphClient;

pub mod db;
pub mod health;
pub mod status;
pub mod sync;
pub mod templates;
pub mod validate;

/// Approval-gated regulatory graph sync
#[derive(Parser)]
#[command(name = "regsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "REGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backfill approved records into an environment
    Sync(sync::SyncArgs),

    /// Check approval and data-quality invariants of an environment
    Validate(validate::ValidateArgs),

    /// Generate and inspect the MERGE templates for an environment
    Templates(templates::TemplatesArgs),

    /// Show node and relationship counts for an environment
    Status(status::StatusArgs),

    /// Check that the graph store is reachable
    Health,

    /// Create or migrate the source database schema
    InitDb,
}

impl Cli {
    /// Run the selected command and return the process exit code.
    pub async fn execute(self) -> Result<i32> {
        let config = AppConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Sync(args) => sync::execute(args, &config).await,
            Commands::Validate(args) => validate::execute(args, &config).await,
            Commands::Templates(args) => templates::execute(args, &config),
            Commands::Status(args) => status::execute(args, &config).await,
            Commands::Health => health::execute(&config).await,
            Commands::InitDb => db::execute(&config),
        }
    }
}

pub(crate) fn parse_environment(value: &str) -> Result<Environment, String> {
    value.parse().map_err(|e: regsync_core::RegsyncError| e.to_string())
}

pub(crate) fn load_configuration(path: &Path) -> Result<Arc<GraphConfiguration>> {
    let configuration = GraphConfiguration::load(path)
        .with_context(|| format!("loading graph configuration from {}", path.display()))?;
    Ok(Arc::new(configuration))
}

pub(crate) async fn connect(config: &AppConfig) -> Result<GraphClient> {
    let client = GraphClient::connect(&config.graph, config.environments.clone())
        .await
        .with_context(|| format!("connecting to {}", config.graph.uri))?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_flags() {
        let cli = Cli::try_parse_from(["regsync", "sync", "--env", "prod", "--dry-run"]).unwrap();
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.env, Environment::Production);
        assert!(args.dry_run);
        assert!(!args.json);
    }

    #[test]
    fn test_environment_defaults_to_staging() {
        let cli = Cli::try_parse_from(["regsync", "validate"]).unwrap();
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.env, Environment::Staging);
    }

    #[test]
    fn test_unknown_environment_rejected() {
        assert!(Cli::try_parse_from(["regsync", "status", "--env", "qa"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["regsync", "health", "--config", "regsync.toml", "-v"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("regsync.toml")));
        assert!(cli.verbose);
    }
}
