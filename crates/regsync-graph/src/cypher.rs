//! Small helpers for composing Cypher text safely.

/// Plain identifiers pass through; anything else is backtick-quoted.
pub fn ident(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `var.prop`, quoting the property when needed.
pub fn prop(var: &str, name: &str) -> String {
    format!("{var}.{}", ident(name))
}

/// Cypher string literal with quotes and backslashes escaped.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
