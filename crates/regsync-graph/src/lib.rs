//! # Regsync Graph
//!
//! Approval-gated synchronization of curated regulatory records into Neo4j.
//!
//! - `client`: graph execution layer (sessions, environment label prefixes, statistics)
//! - `templates`: compiles the declarative graph model into parameterized MERGE statements
//! - `sync`: the backfill orchestrator (entities, reference nodes, reclassification, inference)
//! - `validation`: approval and data-quality invariant checks

pub mod client;
pub mod cypher;
pub mod prefix;
pub mod schema;
pub mod scope;
pub mod statement;
pub mod sync;
pub mod templates;
pub mod validation;

pub use client::{GraphClient, GraphExecutor, GraphStatistics};
pub use regsync_core::GraphConfig;
pub use statement::{AccessMode, GraphRow, Statement};
pub use sync::{
    run_backfill, BackfillContext, BackfillOptions, BackfillPlan, CancellationFlag, EntitySummary,
    PassCount, SyncResult,
};
pub use templates::{generate_templates, render_template, NodeTemplate, RelationshipTemplate, Templates};
pub use validation::{run_validation, DuplicateKeyFinding, ValidationReport};
