//! SQLite connection handle for the curated source views.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

/// Source database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Source view not found: {0}")]
    ViewNotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported value in column '{column}': {reason}")]
    Conversion { column: String, reason: String },
}

/// Result type for source database operations.
pub type DbResult<T> = Result<T, DbError>;

/// One row of a curated view, keyed by column name.
pub type SourceRow = BTreeMap<String, serde_json::Value>;

/// Shared handle to the source database.
///
/// Cloning is cheap; all clones share one connection guarded by a mutex.
#[derive(Clone)]
pub struct SourcePool {
    conn: Arc<Mutex<Connection>>,
}

impl SourcePool {
    /// Open (or create) a database file.
    pub fn open(path: &str) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure with shared access to the connection.
    pub fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a closure with mutable access to the connection (migrations).
    pub fn with_conn_mut<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

/// Reject anything that is not a plain SQL identifier before it is spliced into SQL.
pub(crate) fn check_identifier(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_identifier() {
        assert!(check_identifier("v_approved_drugs").is_ok());
        assert!(check_identifier("_x1").is_ok());
        assert!(check_identifier("1abc").is_err());
        assert!(check_identifier("drugs; DROP TABLE drugs").is_err());
        assert!(check_identifier("").is_err());
    }
}
