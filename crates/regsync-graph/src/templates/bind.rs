//! Binding source rows to template parameters.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use regsync_core::model::approval::{APPROVED_AT, APPROVED_BY, CONFIG_VERSION, SYNCED_AT};
use regsync_core::{KeyStrategy, RegsyncError, RegsyncResult};
use regsync_db::SourceRow;

use super::{
    param_name, NodeTemplate, RelationshipTemplate, FROM_KEY_PARAM, KEY_PARAM, TO_KEY_PARAM,
};

/// Per-run values stamped on every write.
#[derive(Debug, Clone)]
pub struct BindContext {
    pub config_version: String,
    pub synced_at: String,
}

/// Parameters for one node write, plus its merge key for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRow {
    pub key: Value,
    pub params: BTreeMap<String, Value>,
    /// Optional columns whose transform failed and were bound as null.
    pub warnings: Vec<String>,
}

/// Build the parameter map of one row.
///
/// Missing columns, null required values and missing attribution make the row
/// malformed, as does a failed transform on a required column. A failed
/// transform on an optional column binds null and is reported in `warnings`.
pub fn bind_row(template: &NodeTemplate, row: &SourceRow, ctx: &BindContext) -> RegsyncResult<BoundRow> {
    let malformed = |message: String| RegsyncError::MalformedRow {
        view: template.source_view.clone(),
        message,
    };

    let key = compute_key(template, row).map_err(&malformed)?;

    let mut params = BTreeMap::new();
    let mut warnings = Vec::new();
    params.insert(KEY_PARAM.to_string(), key.clone());

    for binding in &template.bindings {
        let raw = row
            .get(&binding.source)
            .ok_or_else(|| malformed(format!("missing column '{}' (key {key})", binding.source)))?;
        let value = match &binding.transform {
            Some(transform) => match transform.apply(raw) {
                Ok(value) => value,
                Err(e) => {
                    let message = format!(
                        "column '{}' ({}) for key {key}: {e}",
                        binding.source,
                        transform.name()
                    );
                    if binding.required {
                        return Err(malformed(message));
                    }
                    warn!(view = %template.source_view, "{message}; bound as null");
                    warnings.push(format!("{}: {message}; bound as null", template.source_view));
                    Value::Null
                }
            },
            None => raw.clone(),
        };
        if binding.required && is_blank(&value) {
            return Err(malformed(format!(
                "required property '{}' is empty for key {key}",
                binding.target
            )));
        }
        params.insert(binding.param.clone(), value);
    }

    for (column, param) in [
        (&template.approval.approved_by, APPROVED_BY),
        (&template.approval.approved_at, APPROVED_AT),
    ] {
        match row.get(column.as_str()) {
            Some(value) if !is_blank(value) => {
                params.insert(param.to_string(), value.clone());
            }
            _ => {
                return Err(malformed(format!(
                    "attribution column '{column}' is empty for key {key}"
                )))
            }
        }
    }

    params.insert(CONFIG_VERSION.to_string(), Value::from(ctx.config_version.as_str()));
    params.insert(SYNCED_AT.to_string(), Value::from(ctx.synced_at.as_str()));

    Ok(BoundRow {
        key,
        params,
        warnings,
    })
}

/// Merge key of a row under the template's key strategy.
pub fn compute_key(template: &NodeTemplate, row: &SourceRow) -> Result<Value, String> {
    match &template.key {
        KeyStrategy::Column { field } => {
            let raw = key_column(row, field)?;
            let value = match &template.key_transform {
                Some(transform) => transform
                    .apply(raw)
                    .map_err(|e| format!("key column '{field}': {e}"))?,
                None => raw.clone(),
            };
            if is_blank(&value) {
                return Err(format!("key column '{field}' is empty"));
            }
            Ok(value)
        }
        KeyStrategy::Composite { fields, separator } => {
            Ok(Value::String(joined(row, fields, separator)?))
        }
        KeyStrategy::Hash { fields } => {
            let digest = Sha256::digest(joined(row, fields, "|")?.as_bytes());
            Ok(Value::String(hex::encode(digest)))
        }
    }
}

fn key_column<'a>(row: &'a SourceRow, field: &str) -> Result<&'a Value, String> {
    match row.get(field) {
        None => Err(format!("missing key column '{field}'")),
        Some(value) if is_blank(value) => Err(format!("key column '{field}' is empty")),
        Some(value) => Ok(value),
    }
}

fn joined(row: &SourceRow, fields: &[String], separator: &str) -> Result<String, String> {
    let parts = fields
        .iter()
        .map(|field| key_column(row, field).map(text))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(separator))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parameters for one relationship write; undeclared properties bind as null.
pub fn bind_relationship(
    template: &RelationshipTemplate,
    from_key: Value,
    to_key: Value,
    properties: &BTreeMap<String, Value>,
    ctx: &BindContext,
) -> BTreeMap<String, Value> {
    let mut params: BTreeMap<String, Value> = template
        .parameters
        .iter()
        .map(|p| (p.clone(), Value::Null))
        .collect();
    for (name, value) in properties {
        params.insert(param_name(name), value.clone());
    }
    params.insert(FROM_KEY_PARAM.to_string(), from_key);
    params.insert(TO_KEY_PARAM.to_string(), to_key);
    params.insert(CONFIG_VERSION.to_string(), Value::from(ctx.config_version.as_str()));
    params.insert(SYNCED_AT.to_string(), Value::from(ctx.synced_at.as_str()));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::generate_templates;
    use crate::templates::tests::configuration;
    use regsync_core::{Environment, LabelPrefixes};
    use serde_json::json;

    fn ctx() -> BindContext {
        BindContext {
            config_version: "2024.06-1".into(),
            synced_at: "2024-06-01T00:00:00.000000Z".into(),
        }
    }

    fn row(value: Value) -> SourceRow {
        serde_json::from_value(value).unwrap()
    }

    fn drug_row() -> SourceRow {
        row(json!({
            "id": "D-1",
            "name": "Keytruda",
            "title": "Keytruda (pembrolizumab)",
            "sponsor": "Merck",
            "first_approval_date": "2014-09-04T00:00:00Z",
            "approved_by": "reviewer@agency",
            "approved_at": "2024-05-30T10:00:00Z"
        }))
    }

    #[test]
    fn test_bind_drug_row() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let bound = bind_row(templates.node("Drug").unwrap(), &drug_row(), &ctx()).unwrap();

        assert_eq!(bound.key, json!("D-1"));
        assert_eq!(bound.params["firstApprovalDate"], json!("2014-09-04"));
        assert_eq!(bound.params["approvedBy"], json!("reviewer@agency"));
        assert_eq!(bound.params["configVersion"], json!("2024.06-1"));
        let drug = templates.node("Drug").unwrap();
        for name in &drug.parameters {
            assert!(bound.params.contains_key(name), "unbound parameter {name}");
        }
    }

    #[test]
    fn test_missing_attribution_is_malformed() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let mut source = drug_row();
        source.insert("approved_by".into(), Value::Null);

        let err = bind_row(templates.node("Drug").unwrap(), &source, &ctx()).unwrap_err();
        assert!(matches!(err, RegsyncError::MalformedRow { ref view, .. } if view == "v_approved_drugs"));
    }

    #[test]
    fn test_optional_transform_failure_binds_null() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let drug = templates.node("Drug").unwrap();

        let mut source = drug_row();
        source.insert("first_approval_date".into(), json!("sometime soon"));
        let bound = bind_row(drug, &source, &ctx()).unwrap();
        assert_eq!(bound.params["firstApprovalDate"], Value::Null);
        assert_eq!(bound.warnings.len(), 1);
        assert!(bound.warnings[0].contains("first_approval_date"));

        source.insert("first_approval_date".into(), json!(""));
        let bound = bind_row(drug, &source, &ctx()).unwrap();
        assert_eq!(bound.params["firstApprovalDate"], Value::Null);
        assert!(bound.warnings.is_empty());
    }

    #[test]
    fn test_required_transform_failure_is_malformed() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let mut drug = templates.node("Drug").unwrap().clone();
        for binding in &mut drug.bindings {
            if binding.source == "first_approval_date" {
                binding.required = true;
            }
        }
        let mut source = drug_row();
        source.insert("first_approval_date".into(), json!("sometime soon"));
        assert!(bind_row(&drug, &source, &ctx()).is_err());
    }

    #[test]
    fn test_required_null_is_malformed() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let mut source = drug_row();
        source.insert("name".into(), Value::Null);
        assert!(bind_row(templates.node("Drug").unwrap(), &source, &ctx()).is_err());
    }

    #[test]
    fn test_composite_and_hash_keys() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let mut trial = templates.node("Trial").unwrap().clone();
        let source = row(json!({"registry": "CTGOV", "registry_id": "NCT0001"}));

        assert_eq!(compute_key(&trial, &source).unwrap(), json!("CTGOV|NCT0001"));

        trial.key = KeyStrategy::Hash {
            fields: vec!["registry".into(), "registry_id".into()],
        };
        let hashed = compute_key(&trial, &source).unwrap();
        assert_eq!(hashed.as_str().unwrap().len(), 64);
        assert_eq!(hashed, compute_key(&trial, &source).unwrap());
    }

    #[test]
    fn test_empty_key_component_rejected() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let source = row(json!({"registry": "CTGOV", "registry_id": " "}));
        assert!(compute_key(templates.node("Trial").unwrap(), &source).is_err());
    }

    #[test]
    fn test_bind_relationship_fills_declared_params() {
        let templates =
            generate_templates(&configuration(), Environment::Staging, &LabelPrefixes::default());
        let rel = templates.relationship("INVESTIGATES", "Trial", "Drug").unwrap();
        let params = bind_relationship(rel, json!("CTGOV|NCT0001"), json!("D-1"), &BTreeMap::new(), &ctx());

        assert_eq!(params["fromKey"], json!("CTGOV|NCT0001"));
        assert_eq!(params["toKey"], json!("D-1"));
        assert_eq!(params["syncedAt"], json!("2024-06-01T00:00:00.000000Z"));
    }
}
