//! Regsync Core Library
//!
//! Declarative graph model, mapping rules, environments and configuration
//! shared by the template engine, the backfill orchestrator and the CLI.

pub mod config;
pub mod environment;
pub mod error;
pub mod model;

pub use config::{AppConfig, GraphConfig, SourceConfig, SyncConfig};
pub use environment::{Environment, LabelPrefixes};
pub use error::{RegsyncError, RegsyncResult};
pub use model::{
    ApprovalColumns, GraphConfiguration, GraphModel, KeyStrategy, MappingRule, MatchStrategy,
    NodeSpec, PropertyMapping, PropertySpec, PropertyType, RelationshipExtractionRule,
    RelationshipSpec, Transform,
};
