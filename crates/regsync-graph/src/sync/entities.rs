//! Phase 1: one merge per approved source row.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use regsync_core::model::graph::relationship_key;
use regsync_core::{MappingRule, MatchStrategy, RegsyncResult};
use regsync_db::fetch_view;

use super::{BackfillContext, EntitySummary, SyncResult};
use crate::statement::row_flag;
use crate::templates::{bind_row, BindContext, NodeTemplate};
use crate::Statement;

const PHASE: &str = "primary_entities";

/// Column-equality links found while binding rows, written in phase 4.
///
/// Keyed like extraction templates; each pair is (source key, target value).
#[derive(Debug, Default)]
pub(crate) struct PendingLinks(pub(crate) BTreeMap<String, Vec<(Value, Value)>>);

impl PendingLinks {
    fn push(&mut self, key: String, pair: (Value, Value)) {
        self.0.entry(key).or_default().push(pair);
    }
}

/// Sync all rows of one entity type.
///
/// Malformed rows and rejected writes are recorded and counted as failed; the
/// remaining rows still sync. Writes within the type run concurrently.
pub(crate) async fn sync_entity(
    ctx: &BackfillContext,
    template: &NodeTemplate,
    rule: &MappingRule,
    bind: &BindContext,
    dry_run: bool,
    result: &mut SyncResult,
    pending: &mut PendingLinks,
) -> RegsyncResult<EntitySummary> {
    let rows = fetch_view(&ctx.source, &template.source_view)?;
    let mut summary = EntitySummary {
        found: rows.len(),
        ..Default::default()
    };
    if dry_run {
        return Ok(summary);
    }

    let mut statements = Vec::with_capacity(rows.len());
    for row in &rows {
        match bind_row(template, row, bind) {
            Ok(bound) => {
                result.warnings.extend(bound.warnings);
                for extraction in &rule.relationships {
                    let MatchStrategy::ColumnEquality { source_column, .. } =
                        &extraction.match_strategy
                    else {
                        continue;
                    };
                    match row.get(source_column) {
                        Some(Value::Null) | None => {}
                        Some(value) => pending.push(
                            relationship_key(
                                &extraction.rel_type,
                                &rule.node_label,
                                &extraction.target_label,
                            ),
                            (bound.key.clone(), value.clone()),
                        ),
                    }
                }
                statements.push((
                    bound.key,
                    Statement::new(template.cypher.as_str()).with_params(bound.params),
                ));
            }
            Err(e) => {
                summary.failed += 1;
                result.absorb(PHASE, e)?;
            }
        }
    }

    let executor = ctx.executor.as_ref();
    let outcomes: Vec<_> = stream::iter(statements.into_iter().map(|(key, statement)| async move {
        (key, executor.execute_prefixed_write(statement).await)
    }))
    .buffer_unordered(ctx.options.concurrency.max(1))
    .collect()
    .await;

    for (key, outcome) in outcomes {
        match outcome {
            Ok(rows) => {
                if rows.first().is_some_and(|row| row_flag(row, "created")) {
                    summary.created += 1;
                } else {
                    summary.updated += 1;
                }
            }
            Err(e) => {
                summary.failed += 1;
                result.absorb_at(PHASE, format_args!("{} {key}", template.label), e)?;
            }
        }
    }

    debug!(entity = %template.label, links = pending.0.len(), "Rows merged");
    Ok(summary)
}
