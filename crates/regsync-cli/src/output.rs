//! Terminal output formatting.

use std::collections::BTreeMap;

use colored::{ColoredString, Colorize};

use regsync_graph::{EntitySummary, GraphStatistics, SyncResult, Templates, ValidationReport};

fn verdict(ok: bool, yes: &str, no: &str) -> ColoredString {
    if ok {
        yes.green().bold()
    } else {
        no.red().bold()
    }
}

fn count(n: usize) -> ColoredString {
    if n == 0 {
        n.to_string().dimmed()
    } else {
        n.to_string().cyan()
    }
}

/// Print a backfill result.
pub fn print_sync_result(result: &SyncResult) {
    println!("{}", "─".repeat(60));
    let headline = if result.cancelled {
        "Cancelled".yellow().bold()
    } else {
        verdict(result.success, "Sync complete", "Sync finished with errors")
    };
    println!("{} {}", headline, format!("(run {})", result.run_id).dimmed());
    println!("  Environment:    {}", result.environment.to_string().cyan());
    println!("  Config version: {}", result.config_version);
    if result.dry_run {
        println!("  {}", "Dry run: no graph writes were issued".yellow());
    }

    if !result.summary.is_empty() {
        println!();
        println!("  {:<20} {:>8} {:>8} {:>8} {:>8}", "Label", "Found", "Created", "Updated", "Failed");
        println!("  {}", "─".repeat(56));
        print_summaries(&result.summary);
        if !result.derived.is_empty() {
            println!("  {}", "derived".dimmed());
            print_summaries(&result.derived);
        }
    }

    if !result.relationships.is_empty() {
        println!();
        println!("  {}", "Relationships".bold());
        for pass in &result.relationships {
            println!("    {:<40} {:<20} {}", pass.name, pass.rel_type.yellow(), count(pass.count));
        }
        println!("    {:<40} {:<20} {}", "total".bold(), "", result.relationships_total);
    }

    print_messages("Warnings", &result.warnings, |m| m.yellow());
    print_messages("Errors", &result.errors, |m| m.red());
}

fn print_summaries(summaries: &BTreeMap<String, EntitySummary>) {
    for (label, summary) in summaries {
        let failed = if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().dimmed()
        };
        println!(
            "  {:<20} {:>8} {:>8} {:>8} {:>8}",
            label, summary.found, summary.created, summary.updated, failed
        );
    }
}

/// Print a validation report.
pub fn print_validation_report(report: &ValidationReport) {
    println!(
        "{} {}",
        verdict(report.passed, "Validation passed", "Validation failed"),
        report.environment.to_string().cyan()
    );
    println!("{}", "─".repeat(40));
    println!("  Non-approved nodes:  {}", count(report.non_approved_count));
    println!("  Incomplete approval: {}", count(report.incomplete_count));
    println!("  Orphan relationships: {}", count(report.orphan_count));

    if !report.duplicate_keys.is_empty() {
        println!();
        println!("  {} {}", "Duplicate keys".yellow().bold(), "(advisory)".dimmed());
        for finding in &report.duplicate_keys {
            println!(
                "    {}.{} = {} ×{}",
                finding.label, finding.key_property, finding.key_value, finding.count
            );
        }
    }
}

/// Print node and relationship counts.
pub fn print_statistics(statistics: &GraphStatistics) {
    let environment = statistics
        .environment
        .map(|e| e.to_string())
        .unwrap_or_else(|| "all".to_string());
    println!("{} {}", "Graph Status".bold(), environment.cyan());
    println!("{}", "─".repeat(40));
    println!("  Nodes:         {}", statistics.nodes.to_string().cyan());
    println!("  Relationships: {}", statistics.relationships.to_string().cyan());

    if !statistics.labels.is_empty() {
        println!();
        for (label, n) in &statistics.labels {
            println!("  {:<30} {}", label, n);
        }
    }
    println!("{}", "─".repeat(40));
}

/// Print a summary of generated templates.
pub fn print_templates(templates: &Templates) {
    println!(
        "{} {} {}",
        "Templates for".bold(),
        templates.environment.to_string().cyan(),
        format!("(config {})", templates.config_version).dimmed()
    );
    for template in templates.node_templates.values() {
        println!(
            "  {} {:<24} {} {}",
            "•".dimmed(),
            template.stored_label,
            format!("from {}", template.source_view).dimmed(),
            format!("[{} params]", template.parameters.len()).dimmed()
        );
    }
    for template in templates
        .relationship_templates
        .values()
        .chain(templates.extraction_templates.values())
    {
        println!(
            "  {} {}-[{}]->{}",
            "→".dimmed(),
            template.from_label,
            template.rel_type.yellow(),
            template.to_label
        );
    }
    print_messages("Skipped", &templates.warnings, |m| m.yellow());
}

fn print_messages(title: &str, messages: &[String], paint: impl Fn(&str) -> ColoredString) {
    if messages.is_empty() {
        return;
    }
    println!();
    println!("  {} ({})", title.bold(), messages.len());
    for message in messages {
        println!("    {}", paint(message));
    }
}
