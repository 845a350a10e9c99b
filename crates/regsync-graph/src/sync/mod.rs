//! Backfill orchestrator: curated views to the graph store.
//!
//! A run walks four phases in order, each depending on the graph state the
//! previous ones left behind:
//! 1. primary entities, one merge per approved row
//! 2. derived reference nodes (agencies, therapeutic areas)
//! 3. reclassification overlays
//! 4. relationship extraction, then the inference battery
//!
//! Phases are not atomic as a whole. Failures are recorded in
//! [`SyncResult::errors`] and the run continues; only connection errors abort.

mod entities;
mod inference;
pub mod plan;
mod reclassify;
mod reference;

pub use plan::{
    BackfillPlan, Endpoint, FieldPredicate, InferencePass, JoinCondition, Normalization,
    ReclassificationRule, ReferenceNodeSpec,
};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use regsync_core::{Environment, GraphConfiguration, RegsyncError, RegsyncResult};
use regsync_db::SourcePool;

use crate::schema::ensure_constraints;
use crate::templates::{BindContext, TemplateCache};
use crate::GraphExecutor;

/// Cooperative cancellation, observed between phases and entity types.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Concurrent merge writes within one entity type.
    pub concurrency: usize,
    /// Attribution for nodes the engine derives rather than copies.
    pub system_actor: String,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            system_actor: "system:regsync".to_string(),
        }
    }
}

/// Everything one backfill invocation needs.
pub struct BackfillContext {
    pub executor: Arc<dyn GraphExecutor>,
    pub source: SourcePool,
    pub configuration: Arc<GraphConfiguration>,
    pub plan: BackfillPlan,
    pub options: BackfillOptions,
    pub cancellation: CancellationFlag,
    pub cache: Arc<TemplateCache>,
}

impl BackfillContext {
    /// Context with the regulatory plan and default options.
    pub fn new(
        executor: Arc<dyn GraphExecutor>,
        source: SourcePool,
        configuration: Arc<GraphConfiguration>,
    ) -> Self {
        Self {
            executor,
            source,
            configuration,
            plan: BackfillPlan::regulatory(),
            options: BackfillOptions::default(),
            cancellation: CancellationFlag::new(),
            cache: Arc::new(TemplateCache::new()),
        }
    }

    pub fn with_plan(mut self, plan: BackfillPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_options(mut self, options: BackfillOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Per-label outcome of phase 1, or of a derived label in phases 2 and 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    /// Rows (or distinct values) read from the source.
    pub found: usize,
    pub created: usize,
    /// Merges that matched an existing node.
    pub updated: usize,
    pub failed: usize,
}

/// Relationships created or matched by one extraction or inference pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassCount {
    pub name: String,
    pub rel_type: String,
    pub count: usize,
}

/// Report of one backfill run. Always returned for partial failure.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub run_id: String,
    pub environment: Environment,
    pub dry_run: bool,
    pub config_version: String,
    pub success: bool,
    pub cancelled: bool,
    /// Primary entities, one entry per mapped label.
    pub summary: BTreeMap<String, EntitySummary>,
    /// Reference and overlay labels the engine derives itself.
    pub derived: BTreeMap<String, EntitySummary>,
    pub relationships: Vec<PassCount>,
    pub relationships_total: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    fn new(run_id: String, env: Environment, dry_run: bool, config_version: &str) -> Self {
        Self {
            run_id,
            environment: env,
            dry_run,
            config_version: config_version.to_string(),
            success: false,
            cancelled: false,
            summary: BTreeMap::new(),
            derived: BTreeMap::new(),
            relationships: Vec::new(),
            relationships_total: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Primary entity nodes created.
    pub fn nodes_created(&self) -> usize {
        self.summary.values().map(|s| s.created).sum()
    }

    /// Primary entity merges that matched an existing node.
    pub fn nodes_updated(&self) -> usize {
        self.summary.values().map(|s| s.updated).sum()
    }

    /// Reference and overlay nodes created.
    pub fn derived_created(&self) -> usize {
        self.derived.values().map(|s| s.created).sum()
    }

    /// Source rows found across primary labels.
    pub fn entities_found(&self) -> usize {
        self.summary.values().map(|s| s.found).sum()
    }

    /// Record a failure under `phase`; connection errors are handed back instead.
    pub(crate) fn absorb(&mut self, phase: &str, e: RegsyncError) -> RegsyncResult<()> {
        if e.is_connection() {
            return Err(e);
        }
        let e = match e {
            RegsyncError::Phase { .. } => e,
            other => RegsyncError::phase(phase, other),
        };
        warn!(error = %e, "Recorded backfill error");
        self.errors.push(e.to_string());
        Ok(())
    }

    /// Like [`absorb`](Self::absorb), naming what failed (a key, a pass).
    pub(crate) fn absorb_at(
        &mut self,
        phase: &str,
        context: impl std::fmt::Display,
        e: RegsyncError,
    ) -> RegsyncResult<()> {
        if e.is_connection() {
            return Err(e);
        }
        self.absorb(phase, RegsyncError::phase(phase, format!("{context}: {e}")))
    }

    pub(crate) fn add_pass(&mut self, name: &str, rel_type: &str, count: usize) {
        self.relationships_total += count;
        self.relationships.push(PassCount {
            name: name.to_string(),
            rel_type: rel_type.to_string(),
            count,
        });
    }

    fn finish(mut self) -> Self {
        self.success = self.errors.is_empty() && !self.cancelled;
        self.finished_at = Some(Utc::now());
        info!(
            success = self.success,
            cancelled = self.cancelled,
            found = self.entities_found(),
            created = self.nodes_created(),
            updated = self.nodes_updated(),
            derived = self.derived_created(),
            relationships = self.relationships_total,
            errors = self.errors.len(),
            "Backfill finished"
        );
        self
    }
}

/// Run one backfill against `env`.
///
/// `dry_run` reads and counts source rows and issues no graph statements at
/// all. Returns `Err` only when the graph store is unreachable; every other
/// failure is reported in the result.
pub async fn run_backfill(
    ctx: &BackfillContext,
    env: Environment,
    dry_run: bool,
) -> RegsyncResult<SyncResult> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("backfill", run_id = %run_id, environment = %env, dry_run);
    backfill(ctx, run_id, env, dry_run).instrument(span).await
}

async fn backfill(
    ctx: &BackfillContext,
    run_id: String,
    env: Environment,
    dry_run: bool,
) -> RegsyncResult<SyncResult> {
    let configuration = ctx.configuration.as_ref();
    let mut result = SyncResult::new(run_id, env, dry_run, &configuration.version);
    let bind = BindContext {
        config_version: configuration.version.clone(),
        synced_at: result.started_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    };
    info!(version = %configuration.version, "Starting backfill");

    if !dry_run {
        ctx.executor.verify_connectivity().await?;
    }

    let templates = ctx
        .cache
        .get_or_generate(configuration, env, ctx.executor.prefixes());
    result.warnings.extend(templates.warnings.iter().cloned());

    if ctx.cancellation.is_cancelled() {
        return Ok(cancelled(result, "schema"));
    }
    if !dry_run {
        let keyed = ctx.plan.keyed_labels(&configuration.model);
        if let Err(e) = ensure_constraints(ctx.executor.as_ref(), &keyed, env).await {
            result.absorb("schema", e)?;
        }
    }

    // Phase 1
    let mut pending = entities::PendingLinks::default();
    for label in entity_sequence(ctx) {
        if ctx.cancellation.is_cancelled() {
            return Ok(cancelled(result, "primary_entities"));
        }
        let (Some(template), Some(rule)) = (templates.node(&label), configuration.mapping_rule(&label))
        else {
            if configuration.model.node(&label).is_none() {
                result
                    .warnings
                    .push(format!("entity '{label}' is in the sync order but not configured"));
            }
            continue;
        };

        match entities::sync_entity(ctx, template, rule, &bind, dry_run, &mut result, &mut pending)
            .await
        {
            Ok(summary) => {
                info!(
                    entity = %label,
                    found = summary.found,
                    created = summary.created,
                    updated = summary.updated,
                    failed = summary.failed,
                    "Entity synced"
                );
                result.summary.insert(label, summary);
            }
            Err(e) => result.absorb("primary_entities", e)?,
        }
    }

    if dry_run {
        return Ok(result.finish());
    }

    // Phase 2
    if ctx.cancellation.is_cancelled() {
        return Ok(cancelled(result, "reference_nodes"));
    }
    reference::create_reference_nodes(ctx, env, &bind, &mut result).await?;

    // Phase 3
    if ctx.cancellation.is_cancelled() {
        return Ok(cancelled(result, "reclassification"));
    }
    reclassify::reclassify(ctx, &templates, env, &bind, &mut result).await?;

    // Phase 4
    if ctx.cancellation.is_cancelled() {
        return Ok(cancelled(result, "relationship_inference"));
    }
    inference::run_extractions(ctx, &templates, pending, env, &bind, &mut result).await?;
    inference::run_battery(ctx, env, &bind, &mut result).await?;

    Ok(result.finish())
}

/// Plan order first, then any mapped label the plan does not mention.
fn entity_sequence(ctx: &BackfillContext) -> Vec<String> {
    let mut labels = ctx.plan.entity_order.clone();
    for rule in &ctx.configuration.mapping_rules {
        if !labels.contains(&rule.node_label) {
            labels.push(rule.node_label.clone());
        }
    }
    labels
}

fn cancelled(mut result: SyncResult, before: &str) -> SyncResult {
    info!(phase = before, "Backfill cancelled");
    result.cancelled = true;
    result.finish()
}
