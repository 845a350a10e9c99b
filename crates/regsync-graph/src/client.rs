//! Graph execution layer: Neo4j sessions and environment-aware dispatch.
//!
//! Decides nothing about *what* is written. Connection failures surface as
//! `RegsyncError::Connection` and are never retried here.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, Query, Txn,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use regsync_core::{Environment, GraphConfig, LabelPrefixes, RegsyncError, RegsyncResult};

use crate::cypher::ident;
use crate::prefix::rewrite_labels;
use crate::scope::{scope_condition, scope_params};
use crate::statement::{first_count, AccessMode, GraphRow, Statement};

/// Node and relationship counts for one environment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStatistics {
    pub environment: Option<Environment>,
    pub nodes: usize,
    pub relationships: usize,
    pub labels: BTreeMap<String, usize>,
}

/// Statement dispatch against a graph store.
///
/// Implementors supply the raw primitives; the provided methods add label
/// prefixing, health checks and statistics on top.
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    /// Run one statement in a session of the given access mode and collect its rows.
    async fn run(&self, statement: Statement, mode: AccessMode) -> RegsyncResult<Vec<GraphRow>>;

    /// Run several write statements in one transaction.
    async fn run_all(&self, statements: Vec<Statement>) -> RegsyncResult<()>;

    /// Fail with a connection error unless the store answers.
    async fn verify_connectivity(&self) -> RegsyncResult<()>;

    fn prefixes(&self) -> &LabelPrefixes;

    /// Rewrite labels of an environment-agnostic statement for `env`.
    fn scoped(&self, mut statement: Statement, env: Environment) -> Statement {
        statement.text = rewrite_labels(&statement.text, self.prefixes().prefix(env));
        statement
    }

    async fn execute_read(&self, statement: Statement, env: Environment) -> RegsyncResult<Vec<GraphRow>> {
        let statement = self.scoped(statement, env);
        self.run(statement, AccessMode::Read).await
    }

    async fn execute_write(&self, statement: Statement, env: Environment) -> RegsyncResult<Vec<GraphRow>> {
        let statement = self.scoped(statement, env);
        self.run(statement, AccessMode::Write).await
    }

    /// Read whose labels are already composed for the target environment.
    async fn execute_prefixed_read(&self, statement: Statement) -> RegsyncResult<Vec<GraphRow>> {
        self.run(statement, AccessMode::Read).await
    }

    /// Write whose labels are already composed for the target environment (templates).
    async fn execute_prefixed_write(&self, statement: Statement) -> RegsyncResult<Vec<GraphRow>> {
        self.run(statement, AccessMode::Write).await
    }

    async fn execute_transaction(&self, statements: Vec<Statement>, env: Environment) -> RegsyncResult<()> {
        let statements = statements.into_iter().map(|s| self.scoped(s, env)).collect();
        self.run_all(statements).await
    }

    /// Connectivity plus a trivial read. Never errors.
    async fn health_check(&self) -> bool {
        if let Err(e) = self.verify_connectivity().await {
            warn!(error = %e, "Graph health check: store unreachable");
            return false;
        }
        match self.run(Statement::new("RETURN 1 AS ok"), AccessMode::Read).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Graph health check: trivial read failed");
                false
            }
        }
    }

    /// Node, relationship and per-label counts scoped to `env`.
    async fn statistics(&self, env: Environment) -> RegsyncResult<GraphStatistics> {
        let params = scope_params(self.prefixes(), env);

        let nodes = Statement::new(format!(
            "MATCH (n) WHERE {} RETURN count(n) AS count",
            scope_condition("n", self.prefixes(), env)
        ))
        .with_params(params.clone());
        let relationships = Statement::new(format!(
            "MATCH (a)-[r]->() WHERE {} RETURN count(r) AS count",
            scope_condition("a", self.prefixes(), env)
        ))
        .with_params(params);

        let nodes = first_count(&self.run(nodes, AccessMode::Read).await?, "count");
        let relationships = first_count(&self.run(relationships, AccessMode::Read).await?, "count");

        let label_rows = self
            .run(Statement::new("CALL db.labels() YIELD label RETURN label"), AccessMode::Read)
            .await?;

        let mut labels = BTreeMap::new();
        for row in label_rows {
            let Some(label) = row.get("label").and_then(Value::as_str) else {
                continue;
            };
            if !self.prefixes().in_scope(env, label) {
                continue;
            }
            let count_query = Statement::new(format!(
                "MATCH (n:{}) RETURN count(n) AS count",
                ident(label)
            ));
            let count = first_count(&self.run(count_query, AccessMode::Read).await?, "count");
            labels.insert(label.to_string(), count);
        }

        Ok(GraphStatistics {
            environment: Some(env),
            nodes,
            relationships,
            labels,
        })
    }
}

/// Neo4j-backed executor.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    prefixes: LabelPrefixes,
    acquire_timeout: Duration,
}

impl GraphClient {
    /// Create a client and ping the store.
    pub async fn connect(config: &GraphConfig, prefixes: LabelPrefixes) -> RegsyncResult<Self> {
        let client = Self::connect_lazy(config, prefixes).await?;
        client.verify_connectivity().await?;
        Ok(client)
    }

    /// Create a client without touching the store.
    ///
    /// neo4rs builds its pool lazily, so an unreachable store only shows up
    /// on the first statement or [`verify_connectivity`](GraphExecutor::verify_connectivity).
    pub async fn connect_lazy(config: &GraphConfig, prefixes: LabelPrefixes) -> RegsyncResult<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| RegsyncError::connection(format!("invalid Neo4j configuration: {e}")))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| RegsyncError::connection(format!("failed to create Neo4j pool: {e}")))?;

        Ok(Self {
            graph,
            prefixes,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Open a write transaction, bounded by the acquisition timeout.
    async fn begin(&self) -> RegsyncResult<Txn> {
        self.bounded("session acquisition", self.graph.start_txn()).await
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> RegsyncResult<T>
    where
        F: Future<Output = Result<T, neo4rs::Error>>,
    {
        match tokio::time::timeout(self.acquire_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(RegsyncError::connection(format!(
                "{what} timed out after {}s",
                self.acquire_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl GraphExecutor for GraphClient {
    async fn run(&self, statement: Statement, mode: AccessMode) -> RegsyncResult<Vec<GraphRow>> {
        debug!(mode = mode.as_str(), query = %statement.text, "Running statement");

        let rows = match mode {
            AccessMode::Read => {
                let mut stream = self
                    .bounded("read session", self.graph.execute(to_query(&statement)))
                    .await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await.map_err(classify)? {
                    rows.push(row);
                }
                rows
            }
            AccessMode::Write => {
                let mut txn = self.begin().await?;
                match collect_rows(&mut txn, to_query(&statement)).await {
                    Ok(rows) => {
                        txn.commit().await.map_err(classify)?;
                        rows
                    }
                    Err(e) => {
                        if let Err(rollback) = txn.rollback().await {
                            warn!(error = %rollback, "Rollback after failed statement also failed");
                        }
                        return Err(classify(e));
                    }
                }
            }
        };

        rows.iter()
            .map(|row| {
                row.to::<GraphRow>()
                    .map_err(|e| RegsyncError::query(format!("unreadable result row: {e}")))
            })
            .collect()
    }

    async fn run_all(&self, statements: Vec<Statement>) -> RegsyncResult<()> {
        if statements.is_empty() {
            return Ok(());
        }
        debug!(statements = statements.len(), "Running transaction");

        let mut txn = self.begin().await?;
        let queries: Vec<Query> = statements.iter().map(to_query).collect();
        match txn.run_queries(queries).await {
            Ok(()) => txn.commit().await.map_err(classify),
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback after failed transaction also failed");
                }
                Err(classify(e))
            }
        }
    }

    async fn verify_connectivity(&self) -> RegsyncResult<()> {
        self.bounded("connectivity check", self.graph.run(Query::new("RETURN 1".to_string())))
            .await
            .map_err(|e| match e {
                RegsyncError::Connection(_) => e,
                other => RegsyncError::connection(other.to_string()),
            })
    }

    fn prefixes(&self) -> &LabelPrefixes {
        &self.prefixes
    }
}

async fn collect_rows(txn: &mut Txn, query: Query) -> Result<Vec<neo4rs::Row>, neo4rs::Error> {
    let mut stream = txn.execute(query).await?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        rows.push(row);
    }
    Ok(rows)
}

fn classify(e: neo4rs::Error) -> RegsyncError {
    match e {
        neo4rs::Error::IOError { .. }
        | neo4rs::Error::ConnectionError
        | neo4rs::Error::AuthenticationError(_) => RegsyncError::connection(e.to_string()),
        other => RegsyncError::query(other.to_string()),
    }
}

fn to_query(statement: &Statement) -> Query {
    statement
        .params
        .iter()
        .fold(Query::new(statement.text.clone()), |query, (key, value)| {
            query.param(key, to_bolt(value))
        })
}

/// JSON parameter to its Bolt equivalent.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => {
            BoltType::List(BoltList::from(items.iter().map(to_bolt).collect::<Vec<_>>()))
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::new(key), to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_bolt_scalars() {
        assert_eq!(to_bolt(&json!(42)), BoltType::Integer(BoltInteger::new(42)));
        assert_eq!(to_bolt(&json!(true)), BoltType::Boolean(BoltBoolean::new(true)));
        assert_eq!(to_bolt(&json!("FDA")), BoltType::String(BoltString::new("FDA")));
        assert_eq!(to_bolt(&Value::Null), BoltType::Null(BoltNull));
    }

    #[test]
    fn test_to_bolt_nested() {
        let bolt = to_bolt(&json!([{"key": "FDA", "attributes": {"domain": "fda.gov"}}]));
        let BoltType::List(list) = bolt else {
            panic!("expected list");
        };
        assert_eq!(list.len(), 1);
    }
}
