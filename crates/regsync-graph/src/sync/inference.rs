//! Phase 4: relationship extraction and the inference battery.
//!
//! Battery passes are full barriers. Each pass is one set-based statement and
//! pass k+1 starts only after pass k has returned, because later joins walk
//! relationships that earlier passes created.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use regsync_core::model::approval::{CONFIG_VERSION, SYNCED_AT, UPDATED_AT};
use regsync_core::{Environment, LabelPrefixes, MatchStrategy, RegsyncResult};

use super::entities::PendingLinks;
use super::plan::{Endpoint, InferencePass, JoinCondition};
use super::{BackfillContext, SyncResult};
use crate::cypher::{ident, prop};
use crate::statement::{first_count, row_count};
use crate::templates::{bind_relationship, BindContext, Templates};
use crate::Statement;

const PHASE: &str = "relationship_inference";

/// Names shorter than this never take part in containment matches.
pub const MIN_NAME_LENGTH: usize = 3;

/// Write the column-equality links collected in phase 1, then the fuzzy lookups
/// declared by mapping rules.
pub(crate) async fn run_extractions(
    ctx: &BackfillContext,
    templates: &Templates,
    pending: PendingLinks,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<()> {
    for (key, pairs) in pending.0 {
        let Some(template) = templates.extraction_templates.get(&key) else {
            result
                .warnings
                .push(format!("extraction '{key}' has no relationship template"));
            continue;
        };

        let executor = ctx.executor.as_ref();
        let no_properties = BTreeMap::new();
        let outcomes: Vec<_> = stream::iter(pairs.into_iter().map(|(from, to)| {
            let params = bind_relationship(template, from, to, &no_properties, bind);
            let statement = Statement::new(template.cypher.as_str()).with_params(params);
            async move { executor.execute_prefixed_write(statement).await }
        }))
        .buffer_unordered(ctx.options.concurrency.max(1))
        .collect()
        .await;

        let mut count = 0;
        for outcome in outcomes {
            match outcome {
                Ok(rows) => count += first_count(&rows, "count"),
                Err(e) => result.absorb_at(PHASE, &key, e)?,
            }
        }
        info!(extraction = %key, count, "Extracted relationships");
        result.add_pass(&format!("extract:{key}"), &template.rel_type, count);
    }

    let prefixes = ctx.executor.prefixes();
    for rule in &ctx.configuration.mapping_rules {
        for extraction in &rule.relationships {
            let MatchStrategy::FuzzyLookup {
                source_property,
                target_property,
            } = &extraction.match_strategy
            else {
                continue;
            };
            let pass = InferencePass {
                name: format!("extract:{}({}->{})", extraction.rel_type, rule.node_label, extraction.target_label),
                rel_type: extraction.rel_type.clone(),
                from_label: rule.node_label.clone(),
                to_label: extraction.target_label.clone(),
                join: JoinCondition::NameContainment {
                    text_on: Endpoint::From,
                    text_property: source_property.clone(),
                    name_property: target_property.clone(),
                },
            };
            run_pass(ctx, &pass, prefixes, env, bind, result).await?;
        }
    }
    Ok(())
}

/// Run the plan's inference passes in order.
pub(crate) async fn run_battery(
    ctx: &BackfillContext,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<()> {
    let prefixes = ctx.executor.prefixes();
    for pass in &ctx.plan.inference_passes {
        run_pass(ctx, pass, prefixes, env, bind, result).await?;
    }
    Ok(())
}

async fn run_pass(
    ctx: &BackfillContext,
    pass: &InferencePass,
    prefixes: &LabelPrefixes,
    env: Environment,
    bind: &BindContext,
    result: &mut SyncResult,
) -> RegsyncResult<()> {
    let statement = pass_statement(pass, prefixes, env)
        .param(CONFIG_VERSION, bind.config_version.as_str())
        .param(SYNCED_AT, bind.synced_at.as_str());

    let count = match ctx.executor.execute_prefixed_write(statement).await {
        Ok(rows) => first_count(&rows, "count"),
        Err(e) => {
            return result.absorb_at(PHASE, &pass.name, e);
        }
    };
    info!(pass = %pass.name, rel = %pass.rel_type, count, "Inference pass complete");
    result.add_pass(&pass.name, &pass.rel_type, count);

    if let JoinCondition::NameContainment { text_on, .. } = &pass.join {
        match ctx
            .executor
            .execute_prefixed_read(ambiguity_statement(pass, *text_on, prefixes, env))
            .await
        {
            Ok(rows) => {
                let ambiguous = rows.first().map(|r| row_count(r, "ambiguous")).unwrap_or(0);
                if ambiguous > 0 {
                    warn!(pass = %pass.name, ambiguous, "Free text matched several candidates");
                    result.warnings.push(format!(
                        "{}: {ambiguous} node(s) matched more than one {} by name; a relationship was created to every match",
                        pass.name,
                        match text_on {
                            Endpoint::From => &pass.to_label,
                            Endpoint::To => &pass.from_label,
                        }
                    ));
                }
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => debug!(pass = %pass.name, error = %e, "Ambiguity check failed"),
        }
    }
    Ok(())
}

/// Set-based MERGE for one pass, labels composed for `env`.
pub fn pass_statement(pass: &InferencePass, prefixes: &LabelPrefixes, env: Environment) -> Statement {
    let from = ident(&prefixes.apply(env, &pass.from_label));
    let to = ident(&prefixes.apply(env, &pass.to_label));
    let lower = |var: &str, name: &str| format!("toLower(toString({}))", prop(var, name));

    let mut statement = Statement::new("");
    let pattern = match &pass.join {
        JoinCondition::KeyMatch {
            from_property,
            to_property,
            case_insensitive,
        } => {
            let condition = if *case_insensitive {
                format!("{} = {}", lower("b", to_property), lower("a", from_property))
            } else {
                format!("{} = {}", prop("b", to_property), prop("a", from_property))
            };
            format!(
                "MATCH (a:{from}) WHERE {} IS NOT NULL\nMATCH (b:{to}) WHERE {condition}",
                prop("a", from_property)
            )
        }
        JoinCondition::DomainContainment {
            from_property,
            to_property,
        } => format!(
            "MATCH (a:{from}) WHERE {} IS NOT NULL\nMATCH (b:{to}) WHERE {} IS NOT NULL AND trim({}) <> '' AND {} CONTAINS {}",
            prop("a", from_property),
            prop("b", to_property),
            prop("b", to_property),
            lower("a", from_property),
            lower("b", to_property),
        ),
        JoinCondition::NameContainment {
            text_on,
            text_property,
            name_property,
        } => {
            let (text_var, name_var) = match text_on {
                Endpoint::From => ("a", "b"),
                Endpoint::To => ("b", "a"),
            };
            format!(
                "MATCH (a:{from})\nMATCH (b:{to})\nWHERE {text} IS NOT NULL AND {name} IS NOT NULL \
                 AND size(trim(toString({name}))) >= {MIN_NAME_LENGTH} AND {} CONTAINS {}",
                lower(text_var, text_property),
                lower(name_var, name_property),
                text = prop(text_var, text_property),
                name = prop(name_var, name_property),
            )
        }
        JoinCondition::Via {
            via_label,
            first_rel,
            second_rel,
            via_filter,
        } => {
            let via = ident(&prefixes.apply(env, via_label));
            let filter = match via_filter {
                Some((property, value)) => {
                    statement = statement.param("viaValue", value.as_str());
                    format!(" WHERE {} = $viaValue", prop("v", property))
                }
                None => String::new(),
            };
            format!(
                "MATCH (a:{from})-[:{}]->(v:{via})-[:{}]->(b:{to}){filter}\nWITH DISTINCT a, b",
                ident(first_rel),
                ident(second_rel),
            )
        }
    };

    statement.text = format!(
        "{pattern}\nMERGE (a)-[r:{rel}]->(b)\nON CREATE SET r.inferredBy = $inferredBy, {} = ${CONFIG_VERSION}, {} = ${SYNCED_AT}\nON MATCH SET {} = ${SYNCED_AT}\nRETURN count(r) AS count",
        prop("r", CONFIG_VERSION),
        prop("r", SYNCED_AT),
        prop("r", UPDATED_AT),
        rel = ident(&pass.rel_type),
    );
    statement.param("inferredBy", pass.name.as_str())
}

/// Count text-side nodes linked by this pass to more than one candidate.
fn ambiguity_statement(
    pass: &InferencePass,
    text_on: Endpoint,
    prefixes: &LabelPrefixes,
    env: Environment,
) -> Statement {
    let text_var = match text_on {
        Endpoint::From => "a",
        Endpoint::To => "b",
    };
    Statement::new(format!(
        "MATCH (a:{})-[r:{}]->(b:{}) WHERE r.inferredBy = $inferredBy\n\
         WITH {text_var}, count(r) AS matches WHERE matches > 1\n\
         RETURN count({text_var}) AS ambiguous",
        ident(&prefixes.apply(env, &pass.from_label)),
        ident(&pass.rel_type),
        ident(&prefixes.apply(env, &pass.to_label)),
    ))
    .param("inferredBy", pass.name.as_str())
}
