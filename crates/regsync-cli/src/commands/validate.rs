//! `regsync validate`: read-only invariant checks.

use anyhow::Result;
use clap::Args;

use regsync_core::{AppConfig, Environment};
use regsync_graph::{run_validation, BackfillPlan};

use super::{connect, load_configuration, parse_environment};
use crate::output;

#[derive(Args)]
pub struct ValidateArgs {
    /// Environment to check (staging or production)
    #[arg(short, long, value_parser = parse_environment, default_value = "staging")]
    pub env: Environment,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ValidateArgs, config: &AppConfig) -> Result<i32> {
    let configuration = load_configuration(&config.sync.model_path)?;
    let client = connect(config).await?;

    let report = run_validation(
        &client,
        &configuration.model,
        &BackfillPlan::regulatory(),
        args.env,
    )
    .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_validation_report(&report);
    }
    Ok(if report.passed { 0 } else { 1 })
}
