//! `regsync status`: per-environment counts.

use anyhow::Result;
use clap::Args;

use regsync_core::{AppConfig, Environment};
use regsync_graph::GraphExecutor;

use super::{connect, parse_environment};
use crate::output;

#[derive(Args)]
pub struct StatusArgs {
    /// Environment to inspect (staging or production)
    #[arg(short, long, value_parser = parse_environment, default_value = "staging")]
    pub env: Environment,

    /// Print the statistics as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: StatusArgs, config: &AppConfig) -> Result<i32> {
    let client = connect(config).await?;
    let statistics = client.statistics(args.env).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
    } else {
        output::print_statistics(&statistics);
    }
    Ok(0)
}
