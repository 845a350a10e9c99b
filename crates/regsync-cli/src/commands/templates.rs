//! `regsync templates`: compile templates without touching the graph store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use regsync_core::{AppConfig, Environment};
use regsync_graph::generate_templates;
use regsync_graph::templates::{bind_row, render_template, validate_template, BindContext};

use super::{load_configuration, parse_environment};
use crate::output;

#[derive(Args)]
pub struct TemplatesArgs {
    /// Environment whose label prefix is composed in
    #[arg(short, long, value_parser = parse_environment, default_value = "staging")]
    pub env: Environment,

    /// Write the generated templates to this JSON file
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Render each node template with the first approved row of its view
    #[arg(long)]
    pub preview: bool,
}

pub fn execute(args: TemplatesArgs, config: &AppConfig) -> Result<i32> {
    let configuration = load_configuration(&config.sync.model_path)?;
    let templates = generate_templates(&configuration, args.env, &config.environments);

    if let Some(path) = &args.out {
        let json = serde_json::to_string_pretty(&templates)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("{} {}", "Templates written to".green(), path.display());
    }

    output::print_templates(&templates);

    let mut malformed = 0;
    for template in templates.node_templates.values() {
        for issue in validate_template(&template.cypher, true) {
            malformed += 1;
            println!("  {} {}: {}", "✗".red(), template.label, issue);
        }
    }
    for template in templates.relationship_templates.values() {
        for issue in validate_template(&template.cypher, false) {
            malformed += 1;
            println!("  {} {}: {}", "✗".red(), template.key, issue);
        }
    }

    if args.preview {
        let source = regsync_db::init_pool(&config.source.path.to_string_lossy())
            .with_context(|| format!("opening source database {}", config.source.path.display()))?;
        let bind = BindContext {
            config_version: configuration.version.clone(),
            synced_at: "<syncedAt>".to_string(),
        };
        for template in templates.node_templates.values() {
            println!("\n{} {}", "Preview".bold(), template.stored_label.cyan());
            let rows = regsync_db::fetch_view(&source, &template.source_view)?;
            let Some(row) = rows.first() else {
                println!("  {}", format!("{} has no approved rows", template.source_view).dimmed());
                continue;
            };
            match bind_row(template, row, &bind) {
                Ok(bound) => println!("{}", render_template(&template.cypher, &bound.params)),
                Err(e) => println!("  {} {}", "✗".red(), e),
            }
        }
    }

    Ok(if malformed == 0 { 0 } else { 1 })
}
