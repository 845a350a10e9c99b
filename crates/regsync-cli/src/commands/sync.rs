//! `regsync sync`: run one backfill.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::warn;

use regsync_core::{AppConfig, Environment};
use regsync_graph::{run_backfill, BackfillContext, BackfillOptions, CancellationFlag, GraphClient};

use super::{connect, load_configuration, parse_environment};
use crate::output;

#[derive(Args)]
pub struct SyncArgs {
    /// Target environment (staging or production)
    #[arg(short, long, value_parser = parse_environment, default_value = "staging")]
    pub env: Environment,

    /// Count source rows without writing to the graph
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: SyncArgs, config: &AppConfig) -> Result<i32> {
    let configuration = load_configuration(&config.sync.model_path)?;
    let source = regsync_db::init_pool(&config.source.path.to_string_lossy())
        .with_context(|| format!("opening source database {}", config.source.path.display()))?;
    // Dry runs never reach the store, so they do not require it to be up.
    let client = if args.dry_run {
        GraphClient::connect_lazy(&config.graph, config.environments.clone()).await?
    } else {
        connect(config).await?
    };

    let cancellation = CancellationFlag::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let ctx = BackfillContext::new(Arc::new(client), source, configuration)
        .with_options(BackfillOptions {
            concurrency: config.sync.concurrency,
            system_actor: config.sync.system_actor.clone(),
        })
        .with_cancellation(cancellation);

    if !args.json {
        let mode = if args.dry_run { " (dry run)" } else { "" };
        println!("{} {}{}", "Syncing to".bold(), args.env.to_string().cyan(), mode.dimmed());
    }

    let result = run_backfill(&ctx, args.env, args.dry_run).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::print_sync_result(&result);
    }
    Ok(if result.success { 0 } else { 1 })
}
