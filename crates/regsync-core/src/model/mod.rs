//! Declarative graph model and the mapping rules that feed it.
//!
//! These are plain data: the template engine walks them generically, so a new
//! entity type is a configuration change rather than new code.

pub mod approval;
pub mod configuration;
pub mod graph;
pub mod mapping;
pub mod transform;

pub use configuration::GraphConfiguration;
pub use graph::{GraphModel, NodeSpec, PropertySpec, PropertyType, RelationshipSpec};
pub use mapping::{
    ApprovalColumns, KeyStrategy, MappingRule, MatchStrategy, PropertyMapping,
    RelationshipExtractionRule,
};
pub use transform::Transform;
