//! Phase 2: derived reference nodes from distinct values across views.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tracing::{debug, info};

use regsync_core::model::approval::{
    APPROVAL_STATUS, APPROVED, APPROVED_AT, APPROVED_BY, CONFIG_VERSION, LAST_SYNCED_AT,
    SYNCED_AT, UPDATED_AT,
};
use regsync_core::{Environment, RegsyncResult};
use regsync_db::{distinct_values, view_exists};

use super::plan::ReferenceNodeSpec;
use super::{BackfillContext, EntitySummary, SyncResult};
use crate::cypher::{ident, prop};
use crate::statement::row_count;
use crate::templates::BindContext;
use crate::Statement;

const PHASE: &str = "reference_nodes";

pub(crate) async fn create_reference_nodes(
    ctx: &BackfillContext,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<()> {
    for spec in &ctx.plan.reference_nodes {
        match merge_reference(ctx, spec, env, bind, result).await {
            Ok(summary) => {
                info!(
                    label = %spec.label,
                    distinct = summary.found,
                    created = summary.created,
                    "Reference nodes merged"
                );
                result.derived.insert(spec.label.clone(), summary);
            }
            Err(e) => result.absorb(PHASE, e)?,
        }
    }
    Ok(())
}

async fn merge_reference(
    ctx: &BackfillContext,
    spec: &ReferenceNodeSpec,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<EntitySummary> {
    let mut sources = Vec::new();
    for (view, column) in &spec.sources {
        if view_exists(&ctx.source, view)? {
            sources.push((view.clone(), column.clone()));
        } else {
            result.warnings.push(format!(
                "reference '{}': source view '{view}' does not exist",
                spec.label
            ));
        }
    }

    let keys: BTreeSet<String> = distinct_values(&ctx.source, &sources)?
        .iter()
        .filter_map(|raw| spec.normalization.apply(raw))
        .collect();
    let mut summary = EntitySummary {
        found: keys.len(),
        ..Default::default()
    };
    if keys.is_empty() {
        return Ok(summary);
    }

    let items: Vec<Value> = keys
        .iter()
        .map(|key| {
            let attributes = spec.canonical.get(key).cloned().unwrap_or_default();
            json!({ "key": key, "attributes": attributes })
        })
        .collect();

    let statement = reference_statement(spec, env, ctx)
        .param("items", items)
        .param(APPROVED_BY, ctx.options.system_actor.as_str())
        .param(APPROVED_AT, bind.synced_at.as_str())
        .param(CONFIG_VERSION, bind.config_version.as_str())
        .param(SYNCED_AT, bind.synced_at.as_str());

    let rows = ctx.executor.execute_prefixed_write(statement).await?;
    let total = rows.first().map(|r| row_count(r, "total")).unwrap_or(0);
    summary.created = rows.first().map(|r| row_count(r, "created")).unwrap_or(0);
    summary.updated = total.saturating_sub(summary.created);
    debug!(label = %spec.label, total, "Reference merge returned");
    Ok(summary)
}

fn reference_statement(spec: &ReferenceNodeSpec, env: Environment, ctx: &BackfillContext) -> Statement {
    let stored = ctx.executor.prefixes().apply(env, &spec.label);
    Statement::new(format!(
        "UNWIND $items AS item\n\
         MERGE (n:{label} {{{key}: item.key}})\n\
         ON CREATE SET n += item.attributes, {status} = '{APPROVED}', {by} = ${APPROVED_BY}, \
         {at} = ${APPROVED_AT}, {version} = ${CONFIG_VERSION}, {synced} = ${SYNCED_AT}, \
         {updated} = ${SYNCED_AT}\n\
         ON MATCH SET {updated} = ${SYNCED_AT}, {last} = ${SYNCED_AT}\n\
         RETURN count(n) AS total, count(CASE WHEN {last} IS NULL THEN 1 END) AS created",
        label = ident(&stored),
        key = ident(&spec.key_property),
        status = prop("n", APPROVAL_STATUS),
        by = prop("n", APPROVED_BY),
        at = prop("n", APPROVED_AT),
        version = prop("n", CONFIG_VERSION),
        synced = prop("n", SYNCED_AT),
        updated = prop("n", UPDATED_AT),
        last = prop("n", LAST_SYNCED_AT),
    ))
}

