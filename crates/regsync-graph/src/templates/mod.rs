//! Template Generation Engine.
//!
//! Compiles a versioned [`GraphConfiguration`] into parameterized MERGE
//! statements, one per node label and one per relationship type. Pure: no I/O.
//! Labels are composed with the environment prefix here, so the statements
//! are dispatched through the prefix-aware write primitive unchanged.

mod bind;
mod render;
mod validate;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use regsync_core::model::approval::{
    APPROVAL_STATUS, APPROVED, APPROVED_AT, APPROVED_BY, CONFIG_VERSION, LAST_SYNCED_AT,
    SYNCED_AT, UPDATED_AT,
};
use regsync_core::model::graph::relationship_key;
use regsync_core::{
    ApprovalColumns, Environment, GraphConfiguration, GraphModel, KeyStrategy, LabelPrefixes,
    MappingRule, MatchStrategy, NodeSpec, RegsyncError, RelationshipSpec, Transform,
};

use crate::cypher::{ident, prop};

pub use bind::{bind_relationship, bind_row, compute_key, BindContext, BoundRow};
pub use render::render_template;
pub use validate::validate_template;

/// Parameter carrying the merge key of a node.
pub const KEY_PARAM: &str = "key";
pub const FROM_KEY_PARAM: &str = "fromKey";
pub const TO_KEY_PARAM: &str = "toKey";

/// Parameter names the engine binds itself; mapped properties may not reuse them.
const RESERVED_PARAMS: [&str; 7] = [
    KEY_PARAM,
    FROM_KEY_PARAM,
    TO_KEY_PARAM,
    APPROVED_BY,
    APPROVED_AT,
    CONFIG_VERSION,
    SYNCED_AT,
];

/// Properties written by the engine on every node.
const ENGINE_PROPERTIES: [&str; 7] = [
    APPROVAL_STATUS,
    APPROVED_BY,
    APPROVED_AT,
    CONFIG_VERSION,
    SYNCED_AT,
    UPDATED_AT,
    LAST_SYNCED_AT,
];

/// One mapped column as the template binds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyBinding {
    pub source: String,
    pub target: String,
    pub param: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    pub required: bool,
    pub refresh_on_match: bool,
}

/// Merge statement for one node label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    pub label: String,
    /// Label as stored in the target environment.
    pub stored_label: String,
    pub source_view: String,
    pub key_property: String,
    pub key: KeyStrategy,
    /// Transform applied to a single-column key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_transform: Option<Transform>,
    pub bindings: Vec<PropertyBinding>,
    pub approval: ApprovalColumns,
    pub cypher: String,
    /// Every parameter the statement expects, in binding order.
    pub parameters: Vec<String>,
    pub config_version: String,
}

/// Merge statement for one relationship type between two labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipTemplate {
    pub key: String,
    pub rel_type: String,
    pub from_label: String,
    pub to_label: String,
    /// Property matched on the source endpoint.
    pub from_key: String,
    /// Property matched on the target endpoint.
    pub to_key: String,
    pub cypher: String,
    pub parameters: Vec<String>,
}

/// Everything generated for one configuration version and environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Templates {
    pub environment: Environment,
    pub config_version: String,
    pub node_templates: BTreeMap<String, NodeTemplate>,
    pub relationship_templates: BTreeMap<String, RelationshipTemplate>,
    /// Column-equality extraction statements, keyed like relationship templates.
    pub extraction_templates: BTreeMap<String, RelationshipTemplate>,
    /// Schema mismatches; each names a label or relationship that was skipped.
    pub warnings: Vec<String>,
}

impl Templates {
    pub fn node(&self, label: &str) -> Option<&NodeTemplate> {
        self.node_templates.get(label)
    }

    pub fn relationship(&self, rel_type: &str, from: &str, to: &str) -> Option<&RelationshipTemplate> {
        self.relationship_templates.get(&relationship_key(rel_type, from, to))
    }
}

/// Compile node and relationship templates for `env`.
///
/// A label whose mapping does not fit its NodeSpec is skipped and reported in
/// `warnings`; generation itself never fails.
pub fn generate_templates(
    configuration: &GraphConfiguration,
    env: Environment,
    prefixes: &LabelPrefixes,
) -> Templates {
    let mut templates = Templates {
        environment: env,
        config_version: configuration.version.clone(),
        node_templates: BTreeMap::new(),
        relationship_templates: BTreeMap::new(),
        extraction_templates: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for node in &configuration.model.nodes {
        let Some(rule) = configuration.mapping_rule(&node.label) else {
            templates.skip(RegsyncError::schema(format!(
                "no mapping rule for node '{}'; template skipped",
                node.label
            )));
            continue;
        };
        match node_template(node, rule, &configuration.version, env, prefixes) {
            Ok(template) => {
                debug!(label = %template.stored_label, "Node template generated");
                templates.node_templates.insert(node.label.clone(), template);
            }
            Err(e) => templates.skip(e),
        }
    }

    for spec in &configuration.model.relationships {
        match relationship_template(spec, &configuration.model, None, env, prefixes) {
            Ok(template) => {
                templates
                    .relationship_templates
                    .insert(template.key.clone(), template);
            }
            Err(e) => templates.skip(e),
        }
    }

    for rule in &configuration.mapping_rules {
        for extraction in &rule.relationships {
            let MatchStrategy::ColumnEquality { target_property, .. } = &extraction.match_strategy
            else {
                continue;
            };
            let Some(spec) = configuration.model.relationship(
                &extraction.rel_type,
                &rule.node_label,
                &extraction.target_label,
            ) else {
                continue;
            };
            match relationship_template(
                spec,
                &configuration.model,
                Some(target_property),
                env,
                prefixes,
            ) {
                Ok(template) => {
                    templates
                        .extraction_templates
                        .insert(template.key.clone(), template);
                }
                Err(e) => templates.skip(e),
            }
        }
    }

    templates
}

impl Templates {
    fn skip(&mut self, e: RegsyncError) {
        warn!(error = %e, "Template skipped");
        self.warnings.push(e.to_string());
    }
}

fn param_name(target: &str) -> String {
    let mut name: String = target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

fn node_template(
    node: &NodeSpec,
    rule: &MappingRule,
    config_version: &str,
    env: Environment,
    prefixes: &LabelPrefixes,
) -> Result<NodeTemplate, RegsyncError> {
    let mismatch = |what: String| RegsyncError::schema(format!("node '{}': {what}", node.label));

    let mut key_transform = None;
    match &rule.key {
        KeyStrategy::Column { field } => {
            if let Some(mapping) = rule.mapping_for_source(field) {
                if mapping.target != node.key_property {
                    return Err(mismatch(format!(
                        "key column '{field}' maps to '{}' instead of key property '{}'",
                        mapping.target, node.key_property
                    )));
                }
                key_transform = mapping.transform.clone();
            }
        }
        strategy => {
            if rule.mapping_for_target(&node.key_property).is_some() {
                return Err(mismatch(format!(
                    "key property '{}' is computed by the {} strategy and cannot also be mapped",
                    node.key_property,
                    strategy.name()
                )));
            }
        }
    }

    let mut bindings = Vec::new();
    let mut seen = HashSet::new();
    for mapping in &rule.properties {
        if mapping.target == node.key_property {
            continue;
        }
        let Some(spec) = node.property(&mapping.target) else {
            return Err(mismatch(format!(
                "mapping targets undeclared property '{}'",
                mapping.target
            )));
        };
        if ENGINE_PROPERTIES.contains(&mapping.target.as_str()) {
            return Err(mismatch(format!(
                "mapping overwrites approval field '{}'",
                mapping.target
            )));
        }
        let param = param_name(&mapping.target);
        if RESERVED_PARAMS.contains(&param.as_str()) || !seen.insert(param.clone()) {
            return Err(mismatch(format!(
                "property '{}' collides with parameter '${param}'",
                mapping.target
            )));
        }
        bindings.push(PropertyBinding {
            source: mapping.source.clone(),
            target: mapping.target.clone(),
            param,
            transform: mapping.transform.clone(),
            required: spec.required,
            refresh_on_match: mapping.refreshes_on_match(),
        });
    }

    if let Some(missing) = node
        .properties
        .iter()
        .filter(|p| p.required && p.name != node.key_property)
        .find(|p| rule.mapping_for_target(&p.name).is_none())
    {
        return Err(mismatch(format!(
            "required property '{}' has no mapping",
            missing.name
        )));
    }

    let stored_label = prefixes.apply(env, &node.label);
    let cypher = node_cypher(&stored_label, &node.key_property, &bindings);

    let mut parameters = vec![KEY_PARAM.to_string()];
    parameters.extend(bindings.iter().map(|b| b.param.clone()));
    parameters.extend([APPROVED_BY, APPROVED_AT, CONFIG_VERSION, SYNCED_AT].map(String::from));

    let issues = validate_template(&cypher, true);
    if !issues.is_empty() {
        return Err(mismatch(format!("generated statement rejected: {}", issues.join(", "))));
    }

    Ok(NodeTemplate {
        label: node.label.clone(),
        stored_label,
        source_view: rule.source_view.clone(),
        key_property: node.key_property.clone(),
        key: rule.key.clone(),
        key_transform,
        bindings,
        approval: rule.approval.clone(),
        cypher,
        parameters,
        config_version: config_version.to_string(),
    })
}

fn node_cypher(stored_label: &str, key_property: &str, bindings: &[PropertyBinding]) -> String {
    let mut on_create: Vec<String> = bindings
        .iter()
        .map(|b| format!("{} = ${}", prop("n", &b.target), b.param))
        .collect();
    on_create.push(format!("{} = '{APPROVED}'", prop("n", APPROVAL_STATUS)));
    on_create.push(format!("{} = ${APPROVED_BY}", prop("n", APPROVED_BY)));
    on_create.push(format!("{} = ${APPROVED_AT}", prop("n", APPROVED_AT)));
    on_create.push(format!("{} = ${CONFIG_VERSION}", prop("n", CONFIG_VERSION)));
    on_create.push(format!("{} = ${SYNCED_AT}", prop("n", SYNCED_AT)));
    on_create.push(format!("{} = ${SYNCED_AT}", prop("n", UPDATED_AT)));

    let mut on_match: Vec<String> = bindings
        .iter()
        .filter(|b| b.refresh_on_match)
        .map(|b| format!("{} = ${}", prop("n", &b.target), b.param))
        .collect();
    on_match.push(format!("{} = ${SYNCED_AT}", prop("n", UPDATED_AT)));
    on_match.push(format!("{} = ${SYNCED_AT}", prop("n", LAST_SYNCED_AT)));

    // lastSyncedAt is only ever written on match, so it is null right after creation.
    format!(
        "MERGE (n:{} {{{}: ${KEY_PARAM}}})\nON CREATE SET {}\nON MATCH SET {}\nRETURN {} IS NULL AS created",
        ident(stored_label),
        ident(key_property),
        on_create.join(", "),
        on_match.join(", "),
        prop("n", LAST_SYNCED_AT),
    )
}

fn relationship_template(
    spec: &RelationshipSpec,
    model: &GraphModel,
    to_property: Option<&str>,
    env: Environment,
    prefixes: &LabelPrefixes,
) -> Result<RelationshipTemplate, RegsyncError> {
    let key = spec.template_key();
    let endpoint = |label: &str| {
        model.node(label).ok_or_else(|| {
            RegsyncError::schema(format!("relationship '{key}': unknown endpoint '{label}'"))
        })
    };
    let from = endpoint(&spec.from_label)?;
    let to = endpoint(&spec.to_label)?;
    let to_key = to_property.unwrap_or(&to.key_property).to_string();

    let mut on_create: Vec<String> = spec
        .properties
        .iter()
        .map(|p| format!("{} = ${}", prop("r", &p.name), param_name(&p.name)))
        .collect();
    on_create.push(format!("{} = ${CONFIG_VERSION}", prop("r", CONFIG_VERSION)));
    on_create.push(format!("{} = ${SYNCED_AT}", prop("r", SYNCED_AT)));

    let cypher = format!(
        "MATCH (a:{} {{{}: ${FROM_KEY_PARAM}}})\nMATCH (b:{} {{{}: ${TO_KEY_PARAM}}})\nMERGE (a)-[r:{}]->(b)\nON CREATE SET {}\nON MATCH SET {} = ${SYNCED_AT}\nRETURN count(r) AS count",
        ident(&prefixes.apply(env, &from.label)),
        ident(&from.key_property),
        ident(&prefixes.apply(env, &to.label)),
        ident(&to_key),
        ident(&spec.rel_type),
        on_create.join(", "),
        prop("r", UPDATED_AT),
    );

    let issues = validate_template(&cypher, false);
    if !issues.is_empty() {
        return Err(RegsyncError::schema(format!(
            "relationship '{key}': generated statement rejected: {}",
            issues.join(", ")
        )));
    }

    let mut parameters = vec![FROM_KEY_PARAM.to_string(), TO_KEY_PARAM.to_string()];
    parameters.extend(spec.properties.iter().map(|p| param_name(&p.name)));
    parameters.extend([CONFIG_VERSION, SYNCED_AT].map(String::from));

    Ok(RelationshipTemplate {
        key,
        rel_type: spec.rel_type.clone(),
        from_label: spec.from_label.clone(),
        to_label: spec.to_label.clone(),
        from_key: from.key_property.clone(),
        to_key,
        cypher,
        parameters,
    })
}

/// Generated templates keyed by configuration version and environment.
///
/// Configurations are immutable per version, so an entry never goes stale.
#[derive(Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<(String, Environment), Arc<Templates>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_generate(
        &self,
        configuration: &GraphConfiguration,
        env: Environment,
        prefixes: &LabelPrefixes,
    ) -> Arc<Templates> {
        let mut entries = self.entries.lock();
        entries
            .entry((configuration.version.clone(), env))
            .or_insert_with(|| Arc::new(generate_templates(configuration, env, prefixes)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
