//! Validation Engine: approval and data-quality invariants of one environment.
//!
//! Read-only. Findings are data, never errors; only store failures error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use regsync_core::model::approval::{APPROVAL_STATUS, APPROVED, APPROVED_AT, APPROVED_BY};
use regsync_core::{Environment, GraphModel, RegsyncResult};

use crate::cypher::{ident, prop};
use crate::scope::{scope_condition, scope_params};
use crate::statement::{first_count, row_count};
use crate::sync::BackfillPlan;
use crate::{GraphExecutor, Statement};

/// Most duplicate groups reported per label.
const DUPLICATE_LIMIT: usize = 100;

/// A key value shared by more than one node of a label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKeyFinding {
    pub label: String,
    pub key_property: String,
    pub key_value: Value,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub environment: Environment,
    /// Nodes whose `approvalStatus` is set to anything but APPROVED.
    pub non_approved_count: usize,
    /// Nodes missing any mandatory approval field.
    pub incomplete_count: usize,
    /// Relationships leaving the environment scope.
    pub orphan_count: usize,
    /// Advisory; does not affect `passed`.
    pub duplicate_keys: Vec<DuplicateKeyFinding>,
    pub passed: bool,
    pub checked_at: DateTime<Utc>,
}

/// Run every check against `env`.
///
/// Duplicate detection covers each NodeSpec of `model` plus the labels the
/// plan derives.
pub async fn run_validation(
    executor: &dyn GraphExecutor,
    model: &GraphModel,
    plan: &BackfillPlan,
    env: Environment,
) -> RegsyncResult<ValidationReport> {
    let prefixes = executor.prefixes();
    let params = scope_params(prefixes, env);
    let in_scope = |var: &str| scope_condition(var, prefixes, env);

    let non_approved = Statement::new(format!(
        "MATCH (n) WHERE {} AND {status} IS NOT NULL AND {status} <> '{APPROVED}'\nRETURN count(n) AS count",
        in_scope("n"),
        status = prop("n", APPROVAL_STATUS),
    ))
    .with_params(params.clone());
    let non_approved_count = first_count(&executor.execute_prefixed_read(non_approved).await?, "count");

    let incomplete = Statement::new(format!(
        "MATCH (n) WHERE {} AND ({} IS NULL OR {} IS NULL OR {} IS NULL)\nRETURN count(n) AS count",
        in_scope("n"),
        prop("n", APPROVAL_STATUS),
        prop("n", APPROVED_BY),
        prop("n", APPROVED_AT),
    ))
    .with_params(params.clone());
    let incomplete_count = first_count(&executor.execute_prefixed_read(incomplete).await?, "count");

    let orphans = Statement::new(format!(
        "MATCH (a)-[r]->(b) WHERE {} AND NOT {}\nRETURN count(r) AS count",
        in_scope("a"),
        in_scope("b"),
    ))
    .with_params(params);
    let orphan_count = first_count(&executor.execute_prefixed_read(orphans).await?, "count");

    let mut duplicate_keys = Vec::new();
    for (label, key_property) in plan.keyed_labels(model) {
        let stored = prefixes.apply(env, &label);
        let duplicates = Statement::new(format!(
            "MATCH (n:{}) WHERE {key} IS NOT NULL\nWITH {key} AS keyValue, count(n) AS count WHERE count > 1\nRETURN keyValue, count ORDER BY count DESC LIMIT {DUPLICATE_LIMIT}",
            ident(&stored),
            key = prop("n", &key_property),
        ));
        for row in executor.execute_prefixed_read(duplicates).await? {
            duplicate_keys.push(DuplicateKeyFinding {
                label: label.clone(),
                key_property: key_property.clone(),
                key_value: row.get("keyValue").cloned().unwrap_or(Value::Null),
                count: row_count(&row, "count"),
            });
        }
    }

    let passed = non_approved_count == 0 && incomplete_count == 0 && orphan_count == 0;
    let report = ValidationReport {
        environment: env,
        non_approved_count,
        incomplete_count,
        orphan_count,
        duplicate_keys,
        passed,
        checked_at: Utc::now(),
    };

    if passed {
        info!(
            environment = %env,
            duplicates = report.duplicate_keys.len(),
            "Validation passed"
        );
    } else {
        warn!(
            environment = %env,
            non_approved = non_approved_count,
            incomplete = incomplete_count,
            orphans = orphan_count,
            "Validation failed"
        );
    }
    Ok(report)
}
