//! Shared fixtures: a recording executor and a seeded source database.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use regsync_core::{GraphConfiguration, LabelPrefixes, RegsyncError, RegsyncResult};
use regsync_db::migrations::run_migrations;
use regsync_db::SourcePool;
use regsync_graph::{AccessMode, GraphExecutor, GraphRow, Statement};

pub const MODEL: &str = include_str!("../../../../config/regulatory_model.json");

pub fn configuration() -> Arc<GraphConfiguration> {
    Arc::new(GraphConfiguration::from_json(MODEL).expect("bundled model is valid"))
}

type Responder = dyn Fn(&Statement) -> Option<RegsyncResult<Vec<GraphRow>>> + Send + Sync;

/// Records every statement and answers with plausible rows.
pub struct RecordingExecutor {
    prefixes: LabelPrefixes,
    reachable: AtomicBool,
    log: Mutex<Vec<(Statement, AccessMode)>>,
    responder: Option<Box<Responder>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            prefixes: LabelPrefixes::default(),
            reachable: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
            responder: None,
        }
    }

    /// Override responses; returning `None` falls back to the defaults.
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&Statement) -> Option<RegsyncResult<Vec<GraphRow>>> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn writes(&self) -> Vec<Statement> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, mode)| *mode == AccessMode::Write)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Index of the first recorded statement containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.statements().iter().position(|s| s.text.contains(needle))
    }

    /// Index of the last recorded statement containing `needle`.
    pub fn last_position(&self, needle: &str) -> Option<usize> {
        self.statements().iter().rposition(|s| s.text.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.statements().iter().filter(|s| s.text.contains(needle)).count()
    }

    fn default_rows(statement: &Statement) -> Vec<GraphRow> {
        let text = &statement.text;
        let row = |value: Value| match value {
            Value::Object(map) => vec![map],
            _ => Vec::new(),
        };
        if text.contains("AS created") && text.starts_with("MERGE") {
            row(json!({"created": true}))
        } else if text.contains("AS total") {
            let items = statement
                .params
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            row(json!({"total": items, "created": items, "linked": items}))
        } else if text.contains("AS count") {
            row(json!({"count": 1}))
        } else if text.contains("AS ambiguous") {
            row(json!({"ambiguous": 0}))
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl GraphExecutor for RecordingExecutor {
    async fn run(&self, statement: Statement, mode: AccessMode) -> RegsyncResult<Vec<GraphRow>> {
        self.log.lock().unwrap().push((statement.clone(), mode));
        if let Some(answer) = self.responder.as_ref().and_then(|f| f(&statement)) {
            return answer;
        }
        Ok(Self::default_rows(&statement))
    }

    async fn run_all(&self, statements: Vec<Statement>) -> RegsyncResult<()> {
        for statement in statements {
            self.run(statement, AccessMode::Write).await?;
        }
        Ok(())
    }

    async fn verify_connectivity(&self) -> RegsyncResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegsyncError::connection("connection refused"))
        }
    }

    fn prefixes(&self) -> &LabelPrefixes {
        &self.prefixes
    }
}

/// Source database with the review schema applied and nothing approved.
pub fn empty_source() -> SourcePool {
    let pool = SourcePool::in_memory().unwrap();
    run_migrations(&pool).unwrap();
    pool
}

/// Three approved drugs and two approved decisions, one naming Keytruda.
pub fn seeded_source() -> SourcePool {
    let pool = empty_source();
    pool.with_conn(|conn| {
        conn.execute_batch(
            "INSERT INTO drugs (id, name, title, sponsor, therapeutic_area, first_approval_date, review_status, approved_by, approved_at) VALUES
                ('D-1', 'Keytruda', 'Keytruda (pembrolizumab)', 'Merck', 'oncology', '2014-09-04', 'APPROVED', 'ana@review', '2026-10-01T09:00:00Z'),
                ('D-2', 'Ozempic', 'Ozempic (semaglutide)', 'Novo Nordisk', 'endocrinology', '2017-12-05', 'APPROVED', 'ana@review', '2026-10-01T09:05:00Z'),
                ('D-3', 'Leqembi', 'Leqembi (lecanemab)', 'Eisai', 'neurology', '2023-01-06', 'APPROVED', 'ben@review', '2026-10-01T09:10:00Z'),
                ('D-4', 'Draftumab', 'Pending record', NULL, NULL, NULL, 'PENDING', NULL, NULL);
             INSERT INTO decisions (id, title, drug_name, agency_code, decision_type, decision_date, review_status, approved_by, approved_at) VALUES
                ('DEC-1', 'Keytruda label extension', 'KEYTRUDA (pembrolizumab)', 'fda', 'Approval', '2024-03-19', 'APPROVED', 'ana@review', '2026-10-02T10:00:00Z'),
                ('DEC-2', 'Variation of a generic', 'unrelated product', 'ema', 'variation', '2024-04-01', 'APPROVED', 'ben@review', '2026-10-02T11:00:00Z');",
        )?;
        Ok(())
    })
    .unwrap();
    pool
}

/// Adds a trial linked by drug id and a recall notice.
pub fn seed_trial_and_recall(pool: &SourcePool) {
    pool.with_conn(|conn| {
        conn.execute_batch(
            "INSERT INTO trials (id, registry, registry_id, title, intervention, phase, therapeutic_area, drug_id, review_status, approved_by, approved_at) VALUES
                ('T-1', 'CTGOV', 'NCT01234567', 'KEYNOTE-999', 'pembrolizumab (Keytruda)', 'Phase 3', 'Oncology', 'D-1', 'APPROVED', 'ana@review', '2026-10-03T08:00:00Z');
             INSERT INTO news (id, title, source_url, agency_code, category, published_at, review_status, approved_by, approved_at) VALUES
                ('N-1', 'Recall of Ozempic pens', 'https://www.fda.gov/safety/recalls/ozempic', 'FDA', 'Recall', '2026-09-30', 'APPROVED', 'ana@review', '2026-10-03T09:00:00Z'),
                ('N-2', 'Weekly roundup', 'https://www.ema.europa.eu/news/roundup', 'EMA', 'general', '2026-09-29', 'APPROVED', 'ben@review', '2026-10-03T09:30:00Z');",
        )?;
        Ok(())
    })
    .unwrap();
}
