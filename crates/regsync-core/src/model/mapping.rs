//! Column-to-property mapping rules, one per node label.

use serde::{Deserialize, Serialize};

use super::transform::Transform;

/// How the merge key of a node is built from a source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum KeyStrategy {
    /// The value of a single column.
    Column { field: String },
    /// Several columns joined by a separator.
    Composite {
        fields: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// SHA-256 (hex) of the joined columns.
    Hash { fields: Vec<String> },
}

fn default_separator() -> String {
    "|".to_string()
}

impl KeyStrategy {
    /// Source columns the key is built from, in order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            KeyStrategy::Column { field } => vec![field.as_str()],
            KeyStrategy::Composite { fields, .. } | KeyStrategy::Hash { fields } => {
                fields.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyStrategy::Column { .. } => "column",
            KeyStrategy::Composite { .. } => "composite",
            KeyStrategy::Hash { .. } => "hash",
        }
    }
}

/// Maps one source column onto one node property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMapping {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Overrides whether the property is refreshed when the node already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_on_match: Option<bool>,
}

impl PropertyMapping {
    /// Titles, names and dates change over a record's life; everything else is write-once
    /// unless the rule says otherwise.
    pub fn refreshes_on_match(&self) -> bool {
        if let Some(explicit) = self.refresh_on_match {
            return explicit;
        }
        matches!(self.transform, Some(Transform::DateCast))
            || matches!(self.target.as_str(), "title" | "name")
            || self.target.ends_with("Date")
            || self.target.ends_with("At")
    }
}

/// How the target node of an extracted relationship is located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MatchStrategy {
    /// Row column value equals a property of the target node.
    ColumnEquality {
        source_column: String,
        target_property: String,
    },
    /// Case-insensitive containment of the target property inside a source node property.
    FuzzyLookup {
        source_property: String,
        target_property: String,
    },
}

/// A relationship to derive from the rows of a mapping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipExtractionRule {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target_label: String,
    #[serde(rename = "match")]
    pub match_strategy: MatchStrategy,
}

/// Source columns holding the reviewer attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalColumns {
    pub approved_by: String,
    pub approved_at: String,
}

impl Default for ApprovalColumns {
    fn default() -> Self {
        Self {
            approved_by: "approved_by".to_string(),
            approved_at: "approved_at".to_string(),
        }
    }
}

/// Mapping from one curated view onto one node label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub node_label: String,
    pub source_view: String,
    pub key: KeyStrategy,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
    #[serde(default)]
    pub relationships: Vec<RelationshipExtractionRule>,
    #[serde(default)]
    pub approval: ApprovalColumns,
}

impl MappingRule {
    /// Mapping for a source column, if any.
    pub fn mapping_for_source(&self, column: &str) -> Option<&PropertyMapping> {
        self.properties.iter().find(|m| m.source == column)
    }

    /// Mapping that writes a target property, if any.
    pub fn mapping_for_target(&self, property: &str) -> Option<&PropertyMapping> {
        self.properties.iter().find(|m| m.target == property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strategy_from_json() {
        let key: KeyStrategy =
            serde_json::from_str(r#"{"strategy":"composite","fields":["registry","registry_id"]}"#)
                .unwrap();
        assert_eq!(key.fields(), vec!["registry", "registry_id"]);
        assert_eq!(
            key,
            KeyStrategy::Composite {
                fields: vec!["registry".to_string(), "registry_id".to_string()],
                separator: "|".to_string(),
            }
        );
    }

    #[test]
    fn test_refresh_on_match_defaults() {
        let title = PropertyMapping {
            source: "title".into(),
            target: "title".into(),
            transform: None,
            refresh_on_match: None,
        };
        assert!(title.refreshes_on_match());

        let sponsor = PropertyMapping {
            source: "sponsor".into(),
            target: "sponsor".into(),
            transform: None,
            refresh_on_match: None,
        };
        assert!(!sponsor.refreshes_on_match());

        let date = PropertyMapping {
            source: "decision_date".into(),
            target: "decisionDate".into(),
            transform: Some(Transform::DateCast),
            refresh_on_match: None,
        };
        assert!(date.refreshes_on_match());

        let pinned = PropertyMapping {
            refresh_on_match: Some(false),
            ..title
        };
        assert!(!pinned.refreshes_on_match());
    }

    #[test]
    fn test_mapping_rule_defaults() {
        let rule: MappingRule = serde_json::from_str(
            r#"{
                "nodeLabel": "Drug",
                "sourceView": "v_approved_drugs",
                "key": {"strategy": "column", "field": "id"},
                "properties": [{"source": "id", "target": "drugId"}]
            }"#,
        )
        .unwrap();
        assert_eq!(rule.approval, ApprovalColumns::default());
        assert!(rule.relationships.is_empty());
        assert_eq!(rule.mapping_for_source("id").unwrap().target, "drugId");
    }
}
