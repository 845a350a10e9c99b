//! Target graph schema.

use serde::{Deserialize, Serialize};

/// Property value type declared by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    List,
}

impl Default for PropertyType {
    fn default() -> Self {
        Self::String
    }
}

/// One property of a node or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
}

/// A node label with its properties and merge key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub label: String,
    pub key_property: String,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeSpec {
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }
}

/// A relationship type between two labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(rename = "from")]
    pub from_label: String,
    #[serde(rename = "to")]
    pub to_label: String,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl RelationshipSpec {
    /// Stable identifier used to key relationship templates.
    pub fn template_key(&self) -> String {
        relationship_key(&self.rel_type, &self.from_label, &self.to_label)
    }
}

/// `TYPE(From->To)`, the key shared by relationship specs and extraction rules.
pub fn relationship_key(rel_type: &str, from: &str, to: &str) -> String {
    format!("{rel_type}({from}->{to})")
}

/// The whole target schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

impl GraphModel {
    pub fn node(&self, label: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.label == label)
    }

    pub fn relationship(&self, rel_type: &str, from: &str, to: &str) -> Option<&RelationshipSpec> {
        self.relationships
            .iter()
            .find(|r| r.rel_type == rel_type && r.from_label == from && r.to_label == to)
    }
}
