//! Environment scoping predicates for statements that span all labels.

use std::collections::BTreeMap;

use regsync_core::{Environment, LabelPrefixes};
use serde_json::Value;

/// Predicate true when node `var` belongs to `env`.
///
/// Pair with [`scope_params`]; both reference `$scopePrefix`.
pub fn scope_condition(var: &str, prefixes: &LabelPrefixes, env: Environment) -> String {
    if prefixes.prefix(env).is_empty() {
        format!("(size(labels({var})) > 0 AND NONE(l IN labels({var}) WHERE l STARTS WITH $scopePrefix))")
    } else {
        format!("ANY(l IN labels({var}) WHERE l STARTS WITH $scopePrefix)")
    }
}

/// Parameters for [`scope_condition`].
pub fn scope_params(prefixes: &LabelPrefixes, env: Environment) -> BTreeMap<String, Value> {
    let prefix = match prefixes.prefix(env) {
        "" => prefixes.staging.clone(),
        p => p.to_string(),
    };
    BTreeMap::from([("scopePrefix".to_string(), Value::String(prefix))])
}
