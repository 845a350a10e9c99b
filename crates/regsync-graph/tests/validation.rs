mod common;

use serde_json::json;

use common::{configuration, RecordingExecutor};
use regsync_core::{Environment, RegsyncError};
use regsync_graph::{run_validation, BackfillPlan, GraphRow};

fn rows(value: serde_json::Value) -> Vec<GraphRow> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

/// Answers every check with zero findings unless `overrides` matches first.
fn executor(overrides: Vec<(&'static str, serde_json::Value)>) -> RecordingExecutor {
    RecordingExecutor::new().with_responder(move |statement| {
        for (needle, answer) in &overrides {
            if statement.text.contains(needle) {
                return Some(Ok(rows(answer.clone())));
            }
        }
        if statement.text.contains("AS keyValue") {
            return Some(Ok(Vec::new()));
        }
        Some(Ok(rows(json!([{"count": 0}]))))
    })
}

#[tokio::test]
async fn test_clean_graph_passes() {
    let executor = executor(vec![]);
    let config = configuration();

    let report = run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Staging)
        .await
        .unwrap();

    assert!(report.passed);
    assert_eq!(report.non_approved_count, 0);
    assert_eq!(report.incomplete_count, 0);
    assert_eq!(report.orphan_count, 0);
    assert!(report.duplicate_keys.is_empty());
}

#[tokio::test]
async fn test_rejected_node_fails_validation() {
    let executor = executor(vec![("<> 'APPROVED'", json!([{"count": 1}]))]);
    let config = configuration();

    let report = run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Staging)
        .await
        .unwrap();

    assert!(!report.passed);
    assert_eq!(report.non_approved_count, 1);
}

#[tokio::test]
async fn test_orphans_fail_validation() {
    let executor = executor(vec![("MATCH (a)-[r]->(b)", json!([{"count": 2}]))]);
    let config = configuration();

    let report = run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Production)
        .await
        .unwrap();

    assert!(!report.passed);
    assert_eq!(report.orphan_count, 2);
}

#[tokio::test]
async fn test_duplicates_are_advisory() {
    let executor = executor(vec![(
        "MATCH (n:Staging_Drug) WHERE n.drugId IS NOT NULL",
        json!([{"keyValue": "D-1", "count": 2}]),
    )]);
    let config = configuration();

    let report = run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Staging)
        .await
        .unwrap();

    assert!(report.passed);
    assert_eq!(report.duplicate_keys.len(), 1);
    let finding = &report.duplicate_keys[0];
    assert_eq!(finding.label, "Drug");
    assert_eq!(finding.key_property, "drugId");
    assert_eq!(finding.key_value, json!("D-1"));
    assert_eq!(finding.count, 2);
}

#[tokio::test]
async fn test_checks_are_scoped_and_read_only() {
    let executor = executor(vec![]);
    let config = configuration();

    run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Staging)
        .await
        .unwrap();

    assert!(executor.writes().is_empty());
    let statements = executor.statements();
    let approval = statements
        .iter()
        .find(|s| s.text.contains("<> 'APPROVED'"))
        .unwrap();
    assert!(approval.text.contains("STARTS WITH $scopePrefix"));
    assert_eq!(approval.params["scopePrefix"], "Staging_");
    // Agency, TherapeuticArea and SafetyAlert are checked alongside the model labels.
    assert_eq!(executor.count("AS keyValue"), 8);
}

#[tokio::test]
async fn test_store_failure_is_an_error() {
    let executor = RecordingExecutor::new()
        .with_responder(|_| Some(Err(RegsyncError::connection("connection reset"))));
    let config = configuration();

    let err = run_validation(&executor, &config.model, &BackfillPlan::regulatory(), Environment::Staging)
        .await
        .unwrap_err();
    assert!(err.is_connection());
}
