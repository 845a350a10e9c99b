//! Versioned graph configuration: model plus mapping rules.
//!
//! Produced by the proposal workflow and treated as immutable input. A change
//! is a new `version`, never an in-place edit.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::graph::GraphModel;
use super::mapping::{MappingRule, MatchStrategy};
use crate::error::{RegsyncError, RegsyncResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfiguration {
    /// Stamped on every node as `configVersion`.
    pub version: String,
    pub model: GraphModel,
    #[serde(default)]
    pub mapping_rules: Vec<MappingRule>,
}

impl GraphConfiguration {
    /// Parse and validate a configuration document.
    pub fn from_json(json: &str) -> RegsyncResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> RegsyncResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            version = %config.version,
            nodes = config.model.nodes.len(),
            relationships = config.model.relationships.len(),
            "Loaded graph configuration"
        );
        Ok(config)
    }

    pub fn mapping_rule(&self, label: &str) -> Option<&MappingRule> {
        self.mapping_rules.iter().find(|r| r.node_label == label)
    }

    /// Ingestion checks. Column-level mismatches are left to template generation,
    /// which skips the affected label with a warning.
    pub fn validate(&self) -> RegsyncResult<()> {
        let issues = self.ingestion_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(RegsyncError::schema(issues.join("; ")))
        }
    }

    /// Every structural problem that makes the configuration unusable.
    pub fn ingestion_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.version.trim().is_empty() {
            issues.push("configuration version must not be empty".to_string());
        }

        let mut labels = HashSet::new();
        for node in &self.model.nodes {
            if !labels.insert(node.label.as_str()) {
                issues.push(format!("duplicate node label '{}'", node.label));
            }
            if !node.has_property(&node.key_property) {
                issues.push(format!(
                    "node '{}' key property '{}' is not a declared property",
                    node.label, node.key_property
                ));
            }
        }

        for rel in &self.model.relationships {
            for endpoint in [&rel.from_label, &rel.to_label] {
                if !labels.contains(endpoint.as_str()) {
                    issues.push(format!(
                        "relationship '{}' references unknown node '{}'",
                        rel.rel_type, endpoint
                    ));
                }
            }
        }

        let mut mapped = HashSet::new();
        for rule in &self.mapping_rules {
            if !labels.contains(rule.node_label.as_str()) {
                issues.push(format!(
                    "mapping rule for '{}' references unknown node",
                    rule.node_label
                ));
            }
            if !mapped.insert(rule.node_label.as_str()) {
                issues.push(format!("duplicate mapping rule for '{}'", rule.node_label));
            }
            for extraction in &rule.relationships {
                if !labels.contains(extraction.target_label.as_str()) {
                    issues.push(format!(
                        "extraction rule '{}' on '{}' targets unknown node '{}'",
                        extraction.rel_type, rule.node_label, extraction.target_label
                    ));
                }
                if let MatchStrategy::ColumnEquality { .. } = extraction.match_strategy {
                    if self
                        .model
                        .relationship(&extraction.rel_type, &rule.node_label, &extraction.target_label)
                        .is_none()
                    {
                        issues.push(format!(
                            "extraction rule '{}' on '{}' has no matching relationship spec",
                            extraction.rel_type, rule.node_label
                        ));
                    }
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "version": "2026.10.1",
        "model": {
            "nodes": [
                {"label": "Drug", "keyProperty": "drugId",
                 "properties": [{"name": "drugId", "required": true}, {"name": "name"}]},
                {"label": "Trial", "keyProperty": "trialId",
                 "properties": [{"name": "trialId"}, {"name": "title"}]}
            ],
            "relationships": [{"type": "STUDIES", "from": "Trial", "to": "Drug"}]
        },
        "mappingRules": [
            {"nodeLabel": "Drug", "sourceView": "v_approved_drugs",
             "key": {"strategy": "column", "field": "id"},
             "properties": [{"source": "id", "target": "drugId"}, {"source": "name", "target": "name"}]},
            {"nodeLabel": "Trial", "sourceView": "v_approved_trials",
             "key": {"strategy": "column", "field": "id"},
             "properties": [{"source": "id", "target": "trialId"}],
             "relationships": [{"type": "STUDIES", "targetLabel": "Drug",
                "match": {"strategy": "column_equality", "sourceColumn": "drug_id", "targetProperty": "drugId"}}]}
        ]
    }"#;

    #[test]
    fn test_valid_configuration() {
        let config = GraphConfiguration::from_json(MINIMAL).unwrap();
        assert_eq!(config.version, "2026.10.1");
        assert_eq!(config.mapping_rule("Trial").unwrap().relationships.len(), 1);
    }

    #[test]
    fn test_unknown_relationship_endpoint() {
        let json = MINIMAL.replace(r#""to": "Drug""#, r#""to": "Agency""#);
        let err = GraphConfiguration::from_json(&json).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown node 'Agency'"), "{msg}");
    }

    #[test]
    fn test_unknown_mapping_label() {
        let json = MINIMAL.replace(r#""nodeLabel": "Drug""#, r#""nodeLabel": "Medicine""#);
        let config: GraphConfiguration = serde_json::from_str(&json).unwrap();
        let issues = config.ingestion_issues();
        assert!(issues.iter().any(|i| i.contains("'Medicine' references unknown node")));
    }

    #[test]
    fn test_key_property_must_be_declared() {
        let json = MINIMAL.replace(r#""keyProperty": "drugId""#, r#""keyProperty": "code""#);
        assert!(GraphConfiguration::from_json(&json).is_err());
    }
}
