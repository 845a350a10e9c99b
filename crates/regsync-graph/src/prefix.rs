//! Label prefixing for caller-supplied, environment-agnostic queries.
//!
//! Statements built by this crate compose prefixed labels directly; this
//! rewriting is only for raw queries passed through the generic read/write
//! entry points. String literals, backtick-quoted names and everything inside
//! `[...]` (relationship types, list literals) are left alone. Labels used inside
//! a bracketed pattern comprehension are therefore not rewritten.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref LABEL_TOKEN: Regex = Regex::new(
        r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`|\[[^\]]*\]|:([A-Z][A-Za-z0-9_]*)"#
    )
    .expect("label token pattern is valid");
}

/// Prefix every `:Label` token not already carrying `prefix`.
///
/// Applying it twice gives the same text as applying it once.
pub fn rewrite_labels(query: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return query.to_string();
    }

    LABEL_TOKEN
        .replace_all(query, |caps: &Captures| match caps.get(1) {
            Some(label) if !label.as_str().starts_with(prefix) => {
                format!(":{prefix}{}", label.as_str())
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "Staging_";

    #[test]
    fn test_rewrites_node_labels() {
        let q = "MATCH (d:Drug)-[:SUBJECT_OF]->(x:Decision) WHERE d:Drug RETURN d";
        assert_eq!(
            rewrite_labels(q, PREFIX),
            "MATCH (d:Staging_Drug)-[:SUBJECT_OF]->(x:Staging_Decision) WHERE d:Staging_Drug RETURN d"
        );
    }

    #[test]
    fn test_fixed_point() {
        let q = "MATCH (n:Drug:Trial {drugId: $id}) RETURN count(n) AS count";
        let once = rewrite_labels(q, PREFIX);
        assert_eq!(rewrite_labels(&once, PREFIX), once);
        assert!(once.contains(":Staging_Drug:Staging_Trial"));
    }

    #[test]
    fn test_leaves_literals_and_parameters() {
        let q = r#"MATCH (n:News) WHERE n.title = 'Recall:Drug X' AND n.note <> "a:B" AND n.id = $Id RETURN n"#;
        let out = rewrite_labels(q, PREFIX);
        assert!(out.contains("(n:Staging_News)"));
        assert!(out.contains("'Recall:Drug X'"));
        assert!(out.contains(r#""a:B""#));
        assert!(out.contains("$Id"));
    }

    #[test]
    fn test_map_keys_untouched() {
        let q = "MERGE (a:Agency {code: $code}) RETURN a {.code, Name: a.name}";
        let out = rewrite_labels(q, PREFIX);
        assert!(out.contains("(a:Staging_Agency {code: $code})"));
        assert!(out.contains("Name: a.name"));
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let q = "MATCH (n:Drug) RETURN n";
        assert_eq!(rewrite_labels(q, ""), q);
    }
}
