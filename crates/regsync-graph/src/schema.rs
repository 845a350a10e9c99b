//! Neo4j schema initialization (uniqueness constraints on merge keys).

use tracing::{debug, info};

use regsync_core::{Environment, RegsyncResult};

use crate::cypher::ident;
use crate::{GraphExecutor, Statement};

/// Constraint name for a stored label and key, e.g. `regsync_staging_drug_drugid`.
pub fn constraint_name(stored_label: &str, key_property: &str) -> String {
    let clean = |s: &str| {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect::<String>()
    };
    format!("regsync_{}_{}", clean(stored_label), clean(key_property))
}

/// Statement creating the uniqueness constraint for one keyed label.
pub fn constraint_statement(stored_label: &str, key_property: &str) -> Statement {
    Statement::new(format!(
        "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
        constraint_name(stored_label, key_property),
        ident(stored_label),
        ident(key_property)
    ))
}

/// Create one uniqueness constraint per `(label, key)` pair for `env`.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses.
pub async fn ensure_constraints(
    executor: &dyn GraphExecutor,
    keyed_labels: &[(String, String)],
    env: Environment,
) -> RegsyncResult<usize> {
    info!(environment = %env, "Ensuring graph constraints...");

    for (label, key) in keyed_labels {
        let stored = executor.prefixes().apply(env, label);
        debug!(label = %stored, key = %key, "Constraint");
        executor
            .execute_prefixed_write(constraint_statement(&stored, key))
            .await?;
    }

    info!(constraints = keyed_labels.len(), "Graph constraints ensured");
    Ok(keyed_labels.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_statement() {
        let stmt = constraint_statement("Staging_Drug", "drugId");
        assert_eq!(
            stmt.text,
            "CREATE CONSTRAINT regsync_staging_drug_drugid IF NOT EXISTS FOR (n:Staging_Drug) REQUIRE n.drugId IS UNIQUE"
        );
    }

    #[test]
    fn test_constraint_name_sanitized() {
        assert_eq!(constraint_name("Therapeutic Area", "name"), "regsync_therapeutic_area_name");
    }
}
