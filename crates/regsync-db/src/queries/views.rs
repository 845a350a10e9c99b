//! Generic reads over curated views.
//!
//! The views are trusted to expose approved rows only; nothing here re-checks
//! review status.

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::pool::{check_identifier, DbError, DbResult, SourcePool, SourceRow};

/// Whether a view (or table) with this name exists.
pub fn view_exists(pool: &SourcePool, view: &str) -> DbResult<bool> {
    pool.with_conn(|conn| exists(conn, view))
}

fn exists(conn: &Connection, view: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('view', 'table') AND name = ?1",
        params![view],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn ensure_view(conn: &Connection, view: &str) -> DbResult<()> {
    check_identifier(view)?;
    if exists(conn, view)? {
        Ok(())
    } else {
        Err(DbError::ViewNotFound(view.to_string()))
    }
}

/// Fetch every row of a view, keyed by column name.
pub fn fetch_view(pool: &SourcePool, view: &str) -> DbResult<Vec<SourceRow>> {
    pool.with_conn(|conn| {
        ensure_view(conn, view)?;

        let mut stmt = conn.prepare(&format!("SELECT * FROM {view}"))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = SourceRow::new();
            for (i, column) in columns.iter().enumerate() {
                let value = to_json(column, row.get_ref(i)?)?;
                record.insert(column.clone(), value);
            }
            out.push(record);
        }
        Ok(out)
    })
}

/// Count the rows of a view.
pub fn count_view(pool: &SourcePool, view: &str) -> DbResult<usize> {
    pool.with_conn(|conn| {
        ensure_view(conn, view)?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {view}"), [], |row| row.get(0))?;
        Ok(count as usize)
    })
}

/// Distinct non-null values across several `(view, column)` pairs, as one SQL `UNION`.
///
/// Values come back as text, sorted.
pub fn distinct_values(pool: &SourcePool, sources: &[(String, String)]) -> DbResult<Vec<String>> {
    if sources.is_empty() {
        return Ok(Vec::new());
    }

    pool.with_conn(|conn| {
        let mut selects = Vec::with_capacity(sources.len());
        for (view, column) in sources {
            ensure_view(conn, view)?;
            check_identifier(column)?;
            selects.push(format!(
                "SELECT CAST({column} AS TEXT) AS value FROM {view} \
                 WHERE {column} IS NOT NULL AND TRIM({column}) <> ''"
            ));
        }
        let sql = format!("{} ORDER BY value", selects.join(" UNION "));

        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    })
}

fn to_json(column: &str, value: ValueRef<'_>) -> DbResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::from(i)),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| DbError::Conversion {
                column: column.to_string(),
                reason: format!("non-finite real {f}"),
            }),
        ValueRef::Text(bytes) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(DbError::Conversion {
            column: column.to_string(),
            reason: "blob columns are not supported in curated views".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn seeded() -> SourcePool {
        let pool = SourcePool::in_memory().unwrap();
        run_migrations(&pool).unwrap();
        pool.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO drugs (id, name, title, therapeutic_area, review_status, approved_by, approved_at)
                 VALUES ('d1', 'Lumora', 'Lumora tablets', 'oncology', 'APPROVED', 'rev-1', '2026-01-02T10:00:00Z'),
                        ('d2', 'Vexitan', 'Vexitan injection', 'Cardiology', 'PENDING', NULL, NULL),
                        ('d3', 'Orbavir', 'Orbavir capsules', NULL, 'APPROVED', NULL, NULL);
                 INSERT INTO decisions (id, title, drug_name, agency_code, review_status, approved_by, approved_at)
                 VALUES ('x1', 'Approval of Lumora', 'Lumora', 'fda', 'APPROVED', 'rev-2', '2026-01-03'),
                        ('x2', 'Rejected', 'Other', 'EMA', 'REJECTED', 'rev-2', '2026-01-03');
                 INSERT INTO guidance (id, title, agency_code, review_status, approved_by, approved_at)
                 VALUES ('g1', 'Guidance', 'EMA', 'APPROVED', 'rev-3', '2026-01-04'),
                        ('g2', 'Guidance 2', 'fda', 'APPROVED', 'rev-3', '2026-01-04');",
            )?;
            Ok(())
        })
        .unwrap();
        pool
    }

    #[test]
    fn test_fetch_view_only_exposes_approved_rows() {
        let pool = seeded();
        let rows = fetch_view(&pool, "v_approved_drugs").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::from("d1"));
        assert_eq!(rows[0]["approved_by"], Value::from("rev-1"));
        assert_eq!(rows[0]["generic_name"], Value::Null);
    }

    #[test]
    fn test_count_view() {
        let pool = seeded();
        assert_eq!(count_view(&pool, "v_approved_decisions").unwrap(), 1);
        assert_eq!(count_view(&pool, "v_approved_news").unwrap(), 0);
    }

    #[test]
    fn test_unknown_view() {
        let pool = seeded();
        assert!(matches!(fetch_view(&pool, "v_missing"), Err(DbError::ViewNotFound(_))));
        assert!(matches!(
            fetch_view(&pool, "drugs WHERE 1=1"),
            Err(DbError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_distinct_values_union() {
        let pool = seeded();
        let sources = vec![
            ("v_approved_decisions".to_string(), "agency_code".to_string()),
            ("v_approved_guidance".to_string(), "agency_code".to_string()),
        ];
        let values = distinct_values(&pool, &sources).unwrap();
        // Case differences survive; normalization is the caller's job.
        assert_eq!(values, vec!["EMA".to_string(), "fda".to_string()]);
    }

    #[test]
    fn test_distinct_values_empty_sources() {
        let pool = seeded();
        assert!(distinct_values(&pool, &[]).unwrap().is_empty());
    }
}
