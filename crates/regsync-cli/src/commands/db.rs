//! `regsync init-db`: create or migrate the source schema.

use anyhow::{Context, Result};
use colored::Colorize;

use regsync_core::AppConfig;

pub fn execute(config: &AppConfig) -> Result<i32> {
    let path = config.source.path.to_string_lossy();
    regsync_db::init_pool(&path).with_context(|| format!("initializing {path}"))?;
    println!("{} {}", "Source schema ready:".green().bold(), path);
    Ok(0)
}
