//! `regsync health`.

use anyhow::Result;
use colored::Colorize;

use regsync_core::AppConfig;
use regsync_graph::{GraphClient, GraphExecutor};

pub async fn execute(config: &AppConfig) -> Result<i32> {
    let healthy = match GraphClient::connect(&config.graph, config.environments.clone()).await {
        Ok(client) => client.health_check().await,
        Err(e) => {
            eprintln!("{} {}", "Connection failed:".red(), e);
            false
        }
    };

    if healthy {
        println!("{} {}", "Graph store reachable:".green().bold(), config.graph.uri);
        Ok(0)
    } else {
        println!("{} {}", "Graph store unavailable:".red().bold(), config.graph.uri);
        Ok(1)
    }
}
