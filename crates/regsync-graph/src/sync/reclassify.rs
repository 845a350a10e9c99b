//! Phase 3: promote matching rows into overlay nodes.
//!
//! The overlay reuses the source row's merge key and approval attribution and
//! links back to the original node, which is left untouched.

use serde_json::{json, Map, Value};
use tracing::info;

use regsync_core::model::approval::{
    APPROVAL_STATUS, APPROVED, APPROVED_AT, APPROVED_BY, CONFIG_VERSION, LAST_SYNCED_AT,
    SYNCED_AT, UPDATED_AT,
};
use regsync_core::{Environment, RegsyncError, RegsyncResult};
use regsync_db::fetch_view;

use super::plan::ReclassificationRule;
use super::{BackfillContext, EntitySummary, SyncResult};
use crate::cypher::{ident, prop};
use crate::statement::row_count;
use crate::templates::{compute_key, BindContext, NodeTemplate, Templates};
use crate::Statement;

const PHASE: &str = "reclassification";

pub(crate) async fn reclassify(
    ctx: &BackfillContext,
    templates: &Templates,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<()> {
    for rule in &ctx.plan.reclassifications {
        let Some(source) = templates.node(&rule.source_label) else {
            result.warnings.push(format!(
                "reclassification '{}': source label '{}' has no template",
                rule.target_label, rule.source_label
            ));
            continue;
        };
        match overlay(ctx, rule, source, env, bind, result).await {
            Ok(summary) => {
                info!(
                    from = %rule.source_label,
                    to = %rule.target_label,
                    matched = summary.found,
                    created = summary.created,
                    "Records reclassified"
                );
                result.derived.insert(rule.target_label.clone(), summary);
            }
            Err(e) => result.absorb(PHASE, e)?,
        }
    }
    Ok(())
}

async fn overlay(
    ctx: &BackfillContext,
    rule: &ReclassificationRule,
    source: &NodeTemplate,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<EntitySummary> {
    let rows = fetch_view(&ctx.source, &source.source_view)?;
    let mut summary = EntitySummary::default();
    let mut items = Vec::new();

    for row in rows.iter().filter(|row| rule.predicate.matches(row.get(&rule.predicate.column))) {
        summary.found += 1;
        let malformed = |message: String| RegsyncError::MalformedRow {
            view: source.source_view.clone(),
            message,
        };
        let key = match compute_key(source, row) {
            Ok(key) => key,
            Err(message) => {
                summary.failed += 1;
                result.absorb(PHASE, malformed(message))?;
                continue;
            }
        };
        let attribution = [&source.approval.approved_by, &source.approval.approved_at]
            .map(|column| row.get(column.as_str()).filter(|v| !v.is_null()).cloned());
        let [Some(approved_by), Some(approved_at)] = attribution else {
            summary.failed += 1;
            result.absorb(PHASE, malformed(format!("attribution missing for key {key}")))?;
            continue;
        };

        let properties: Map<String, Value> = rule
            .properties
            .iter()
            .map(|(column, target)| (target.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
            .collect();
        items.push(json!({
            "key": key,
            "properties": properties,
            "approvedBy": approved_by,
            "approvedAt": approved_at,
        }));
    }

    if items.is_empty() {
        return Ok(summary);
    }

    let statement = overlay_statement(ctx, rule, source, env)
        .param("items", items)
        .param(CONFIG_VERSION, bind.config_version.as_str())
        .param(SYNCED_AT, bind.synced_at.as_str());
    let rows = ctx.executor.execute_prefixed_write(statement).await?;
    let row = rows.first();

    let total = row.map(|r| row_count(r, "total")).unwrap_or(0);
    summary.created = row.map(|r| row_count(r, "created")).unwrap_or(0);
    summary.updated = total.saturating_sub(summary.created);
    let linked = row.map(|r| row_count(r, "linked")).unwrap_or(0);
    result.add_pass(
        &format!("reclassify_{}", rule.target_label.to_lowercase()),
        &rule.link_type,
        linked,
    );
    Ok(summary)
}

fn overlay_statement(
    ctx: &BackfillContext,
    rule: &ReclassificationRule,
    source: &NodeTemplate,
    env: Environment,
) -> Statement {
    let prefixes = ctx.executor.prefixes();
    Statement::new(format!(
        "UNWIND $items AS item\n\
         MERGE (o:{target} {{{target_key}: item.key}})\n\
         ON CREATE SET o += item.properties, {status} = '{APPROVED}', {by} = item.approvedBy, \
         {at} = item.approvedAt, {version} = ${CONFIG_VERSION}, {synced} = ${SYNCED_AT}, \
         {updated} = ${SYNCED_AT}\n\
         ON MATCH SET {updated} = ${SYNCED_AT}, {last} = ${SYNCED_AT}\n\
         WITH o, item, {last} IS NULL AS created\n\
         OPTIONAL MATCH (s:{source} {{{source_key}: item.key}})\n\
         FOREACH (_ IN CASE WHEN s IS NULL THEN [] ELSE [1] END |\n  \
         MERGE (o)-[r:{link}]->(s)\n  \
         ON CREATE SET r.configVersion = ${CONFIG_VERSION}, r.syncedAt = ${SYNCED_AT}\n  \
         ON MATCH SET r.updatedAt = ${SYNCED_AT})\n\
         RETURN count(o) AS total, count(CASE WHEN created THEN 1 END) AS created, count(s) AS linked",
        target = ident(&prefixes.apply(env, &rule.target_label)),
        target_key = ident(&rule.key_property),
        source = ident(&source.stored_label),
        source_key = ident(&source.key_property),
        link = ident(&rule.link_type),
        status = prop("o", APPROVAL_STATUS),
        by = prop("o", APPROVED_BY),
        at = prop("o", APPROVED_AT),
        version = prop("o", CONFIG_VERSION),
        synced = prop("o", SYNCED_AT),
        updated = prop("o", UPDATED_AT),
        last = prop("o", LAST_SYNCED_AT),
    ))
}
