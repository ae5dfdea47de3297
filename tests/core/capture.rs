use evoledger::core::broker::DbBroker;
use evoledger::core::capture::{AuditAction, ChangeCapture, WriteContext};
use evoledger::core::config::{CaptureConfig, LedgerConfig};
use evoledger::core::db;
use evoledger::core::entity::{self, FieldMap};
use evoledger::core::error::LedgerError;
use evoledger::core::store::Store;
use evoledger::plugins::agents::{self, AgentStatus};
use evoledger::plugins::audit::{AuditQuery, get_audit_trail};
use evoledger::plugins::telemetry;
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

const NOW: i64 = 1_700_000_000;

fn setup(dir: &Path) -> Store {
    evoledger::init_project(dir, false).unwrap()
}

fn stored_row(store: &Store, kind: &str, id: &str) -> Option<FieldMap> {
    let conn = db::db_connect(&store.db_path().to_string_lossy()).unwrap();
    entity::load_row(&conn, kind, id).unwrap()
}

#[test]
fn test_create_captures_the_stored_row_exactly() {
    let tmp = tempdir().unwrap();
    let store = setup(tmp.path());
    let ctx = WriteContext::at(NOW).with_actor("CORE");

    let agent = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    let sample = telemetry::record_metric(
        &store,
        &ctx,
        &agent.id,
        "accuracy",
        0.1 + 0.2,
        Some(0.3),
        Some(json!({"suite": "regression"})),
    )
    .unwrap();

    let trail = get_audit_trail(
        &store,
        &AuditQuery::default().kind("performance_metrics").entity(&sample.id),
    )
    .unwrap();
    assert_eq!(trail.len(), 1);
    let record = &trail[0];
    assert_eq!(record.action, AuditAction::Create);
    assert_eq!(record.old_values, None);
    assert_eq!(record.actor.as_deref(), Some("CORE"));
    assert_eq!(record.created_at, NOW);

    let row = stored_row(&store, "performance_metrics", &sample.id).unwrap();
    assert_eq!(record.new_values.as_ref(), Some(&row));
    assert_eq!(
        row["current_value"].as_f64().unwrap().to_bits(),
        (0.1f64 + 0.2).to_bits()
    );
}

#[test]
fn test_update_and_delete_capture_before_and_after() {
    let tmp = tempdir().unwrap();
    let store = setup(tmp.path());
    let ctx = WriteContext::at(NOW);

    let agent = agents::register_agent(&store, &ctx, "LEARN", "collaborative", json!({})).unwrap();
    let before = stored_row(&store, "agents", &agent.id).unwrap();

    let later = WriteContext::at(NOW + 60);
    agents::set_agent_status(&store, &later, "LEARN", AgentStatus::Inactive).unwrap();
    let after = stored_row(&store, "agents", &agent.id).unwrap();

    agents::remove_agent(&store, &WriteContext::at(NOW + 120), &agent.id).unwrap();
    assert!(stored_row(&store, "agents", &agent.id).is_none());

    let trail = get_audit_trail(&store, &AuditQuery::default().entity(&agent.id)).unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Delete, AuditAction::Update, AuditAction::Create]
    );

    let update = &trail[1];
    assert_eq!(update.old_values.as_ref(), Some(&before));
    assert_eq!(update.new_values.as_ref(), Some(&after));
    assert_eq!(after["status"], json!("inactive"));
    assert_eq!(after["updated_at"], json!(NOW + 60));
    assert_eq!(update.entity_id, agent.id);

    let delete = &trail[0];
    assert_eq!(delete.old_values.as_ref(), Some(&after));
    assert_eq!(delete.new_values, None);
}

#[test]
fn test_rolled_back_mutation_leaves_no_audit() {
    let tmp = tempdir().unwrap();
    let store = setup(tmp.path());
    let ctx = WriteContext::at(NOW);
    let agent = agents::register_agent(&store, &ctx, "GUARD", "security", json!({})).unwrap();

    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    let result: Result<(), LedgerError> =
        broker.with_conn(&store.db_path(), "test", "test.rollback", |conn| {
            let mut patch = FieldMap::new();
            patch.insert("agent_type".into(), json!("sentinel"));
            capture.update(conn, "agents", &agent.id, &patch, &ctx)?;
            Err(LedgerError::ValidationError("later step failed".into()))
        });
    assert!(result.is_err());

    let row = stored_row(&store, "agents", &agent.id).unwrap();
    assert_eq!(row["agent_type"], json!("security"));
    let trail = get_audit_trail(&store, &AuditQuery::default().entity(&agent.id)).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::Create);
}

#[test]
fn test_failed_audit_append_rolls_back_the_mutation() {
    let tmp = tempdir().unwrap();
    let store = setup(tmp.path());
    let ctx = WriteContext::at(NOW);
    let agent = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();

    let conn = db::db_connect(&store.db_path().to_string_lossy()).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_audit BEFORE INSERT ON audit_log
         BEGIN SELECT RAISE(ABORT, 'audit store unavailable'); END;",
    )
    .unwrap();
    drop(conn);

    let err = telemetry::record_metric(&store, &ctx, &agent.id, "latency", 12.0, None, None)
        .unwrap_err();
    match err {
        LedgerError::AtomicityFailure { kind, .. } => assert_eq!(kind, "performance_metrics"),
        other => panic!("expected AtomicityFailure, got {:?}", other),
    }

    let conn = db::db_connect(&store.db_path().to_string_lossy()).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM performance_metrics", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_unobserved_kinds_are_mutated_without_audit() {
    let tmp = tempdir().unwrap();
    setup(tmp.path());
    let config = LedgerConfig {
        capture: CaptureConfig {
            kinds: vec!["agents".to_string()],
        },
        ..LedgerConfig::default()
    };
    let store = Store::with_config(evoledger::project_store_root(tmp.path()), config).unwrap();
    let ctx = WriteContext::at(NOW);

    let agent = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    let sample =
        telemetry::record_metric(&store, &ctx, &agent.id, "accuracy", 0.9, None, None).unwrap();
    assert!(stored_row(&store, "performance_metrics", &sample.id).is_some());

    let trail = get_audit_trail(&store, &AuditQuery::default()).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].entity_kind, "agents");
}

#[test]
fn test_update_of_missing_entity_is_not_found() {
    let tmp = tempdir().unwrap();
    let store = setup(tmp.path());
    let ctx = WriteContext::at(NOW);
    let capture = ChangeCapture::new(["agents"]);
    let broker = DbBroker::new(&store.root);

    let result = broker.with_conn(&store.db_path(), "test", "test.missing", |conn| {
        let mut patch = FieldMap::new();
        patch.insert("status".into(), json!("inactive"));
        capture.update(conn, "agents", "does-not-exist", &patch, &ctx)
    });
    assert!(matches!(result, Err(LedgerError::NotFound(_))));
    assert!(get_audit_trail(&store, &AuditQuery::default()).unwrap().is_empty());
}
