use evoledger::core::broker::DbBroker;
use evoledger::core::capture::WriteContext;
use evoledger::core::db;
use evoledger::core::error::LedgerError;
use evoledger::core::store::Store;
use evoledger::plugins::agents;
use evoledger::plugins::audit::{AuditQuery, get_audit_trail};
use evoledger::plugins::health::{get_health_report, get_health_score};
use evoledger::plugins::telemetry;
use evoledger::plugins::views::{
    get_collaboration_summary, get_performance_summary, get_security_summary,
};
use serde_json::json;
use std::fs;
use std::thread;
use tempfile::tempdir;

#[test]
fn test_initialize_is_idempotent() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    db::initialize_ledger_db(&store.root).unwrap();
    db::initialize_ledger_db(&store.root).unwrap();

    let conn = db::db_connect(&store.db_path().to_string_lossy()).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tables, 9);
}

#[test]
fn test_concurrent_writers_each_get_one_audit_record() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let agent = agents::register_agent(
        &store,
        &WriteContext::at(1_000),
        "CORE",
        "self_improving",
        json!({}),
    )
    .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            let agent_id = agent.id.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    let ctx = WriteContext::at(2_000 + i).with_actor(format!("worker-{}", worker));
                    telemetry::record_metric(&store, &ctx, &agent_id, "throughput", i as f64, None, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let trail = get_audit_trail(&store, &AuditQuery::default().kind("performance_metrics")).unwrap();
    assert_eq!(trail.len(), 20);
    let conn = db::db_connect(&store.db_path().to_string_lossy()).unwrap();
    let samples: i64 = conn
        .query_row("SELECT COUNT(*) FROM performance_metrics", [], |r| r.get(0))
        .unwrap();
    assert_eq!(samples, 20);
}

#[test]
fn test_write_closure_error_is_returned_unchanged() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let broker = DbBroker::new(&store.root);
    assert_eq!(broker.root(), store.root.as_path());

    let result: Result<(), LedgerError> = broker.with_conn(&store.db_path(), "test", "test.fail", |conn| {
        conn.execute(
            "INSERT INTO agents(id, name, agent_type, created_at, updated_at) VALUES('x', 'X', 't', 0, 0)",
            [],
        )?;
        Err(LedgerError::NotFound("nothing".into()))
    });
    assert!(matches!(result, Err(LedgerError::NotFound(_))));

    let count = broker
        .with_read(&store.db_path(), "test.count", |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM agents", [], |r| r.get::<_, i64>(0))?)
        })
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_store_reads_config_file() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    assert_eq!(store.config.retention.days, 30);

    fs::write(
        store.root.join("config.toml"),
        "[retention]\ndays = 7\n\n[health]\nperformance = 0.5\nsecurity = 0.3\ncollaboration = 0.2\n",
    )
    .unwrap();
    let reopened = Store::open(&store.root).unwrap();
    assert_eq!(reopened.config.retention.days, 7);
    assert_eq!(reopened.config.retention.audit_extra_days, 30);
    assert_eq!(reopened.config.health.performance, 0.5);

    fs::write(store.root.join("config.toml"), "[retention]\ndays = \"soon\"\n").unwrap();
    assert!(matches!(
        Store::open(&store.root),
        Err(LedgerError::ConfigError(_))
    ));
}

#[test]
fn test_reads_on_uninitialised_store_are_empty_and_create_nothing() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    let score = get_health_score(&store).unwrap();
    assert!((score - 0.4).abs() < 1e-12);
    let report = get_health_report(&store).unwrap();
    assert!(report.alerts.is_empty());
    assert!(get_performance_summary(&store).unwrap().is_empty());
    assert!(get_security_summary(&store).unwrap().is_empty());
    assert!(get_collaboration_summary(&store).unwrap().is_empty());
    assert!(get_audit_trail(&store, &AuditQuery::default()).unwrap().is_empty());

    assert!(!store.db_path().exists());
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}
