//! Parameterized statements and result rows.

use std::collections::BTreeMap;

use serde_json::Value;

/// Session access mode a statement needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }
}

/// A Cypher statement with driver-bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params.extend(params);
        self
    }
}

/// One result row, keyed by the names in the statement's `RETURN` clause.
pub type GraphRow = serde_json::Map<String, Value>;

/// Integer field of a row; missing or non-integer reads as zero.
pub fn row_count(row: &GraphRow, field: &str) -> usize {
    row.get(field)
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as usize)
        .unwrap_or(0)
}

/// Integer field of the first row, zero when there are no rows.
pub fn first_count(rows: &[GraphRow], field: &str) -> usize {
    rows.first().map(|row| row_count(row, field)).unwrap_or(0)
}

/// Boolean field of a row; missing reads as false.
pub fn row_flag(row: &GraphRow, field: &str) -> bool {
    row.get(field).and_then(Value::as_bool).unwrap_or(false)
}
