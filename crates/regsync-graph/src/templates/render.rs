//! Human-readable previews of parameterized statements.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::cypher::string_literal;

lazy_static! {
    static ref PARAM: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Substitute parameter values as literals, for previews and debugging only.
///
/// Writes always bind parameters through the driver. Unknown parameters are
/// left in place.
pub fn render_template(cypher: &str, params: &BTreeMap<String, Value>) -> String {
    PARAM
        .replace_all(cypher, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => literal(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => string_literal(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", crate::cypher::ident(k), literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_literals() {
        let params = BTreeMap::from([
            ("key".to_string(), json!("D-1")),
            ("title".to_string(), json!("Ocrevus 'new'")),
            ("phase".to_string(), json!(3)),
        ]);
        let rendered = render_template(
            "MERGE (n:Drug {drugId: $key}) SET n.title = $title, n.phase = $phase, n.x = $missing",
            &params,
        );
        assert_eq!(
            rendered,
            r"MERGE (n:Drug {drugId: 'D-1'}) SET n.title = 'Ocrevus \'new\'', n.phase = 3, n.x = $missing"
        );
    }

    #[test]
    fn test_render_longest_parameter_name_wins() {
        let params = BTreeMap::from([
            ("synced".to_string(), json!("a")),
            ("syncedAt".to_string(), json!("b")),
        ]);
        assert_eq!(render_template("$syncedAt $synced", &params), "'b' 'a'");
    }
}
