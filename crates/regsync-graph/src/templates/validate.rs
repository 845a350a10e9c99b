//! Shallow structural checks on generated statements.
//!
//! Not a grammar: it may miss broken statements, but it never rejects a
//! well-formed one.

use regsync_core::model::approval::MANDATORY_FIELDS;

/// Problems found in `cypher`; empty when the statement looks sound.
///
/// Grouping symbols must balance outside quoted text. Node statements must
/// also set every mandatory approval field in their ON CREATE clause.
pub fn validate_template(cypher: &str, is_node: bool) -> Vec<String> {
    let mut issues = Vec::new();

    if let Err(issue) = check_balanced(cypher) {
        issues.push(issue);
    }

    if is_node {
        match on_create_clause(cypher) {
            None => issues.push("missing ON CREATE SET clause".to_string()),
            Some(clause) => {
                for field in MANDATORY_FIELDS {
                    if !clause.contains(field) {
                        issues.push(format!("ON CREATE does not set {field}"));
                    }
                }
            }
        }
    }

    issues
}

fn check_balanced(cypher: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in cypher.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("unbalanced '{c}'"));
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted text".to_string());
    }
    match stack.last() {
        Some(open) => Err(format!("unclosed '{open}'")),
        None => Ok(()),
    }
}

fn on_create_clause(cypher: &str) -> Option<&str> {
    let start = cypher.find("ON CREATE SET")?;
    let rest = &cypher[start..];
    let end = ["ON MATCH SET", "RETURN"]
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
