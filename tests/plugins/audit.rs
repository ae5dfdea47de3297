use evoledger::core::capture::{AuditAction, WriteContext};
use evoledger::core::error::LedgerError;
use evoledger::plugins::agents::{self, AgentStatus};
use evoledger::plugins::audit::{AuditQuery, get_audit_trail};
use evoledger::plugins::telemetry;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_audit_trail_filters_and_ordering() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();

    let core = agents::register_agent(&store, &WriteContext::at(100), "CORE", "self_improving", json!({})).unwrap();
    let guard = agents::register_agent(&store, &WriteContext::at(200), "GUARD", "security", json!({})).unwrap();
    let sample = telemetry::record_metric(
        &store,
        &WriteContext::at(300).with_actor("CORE"),
        &core.id,
        "accuracy",
        0.6,
        None,
        None,
    )
    .unwrap();
    agents::set_agent_status(&store, &WriteContext::at(400), &guard.id, AgentStatus::Suspended).unwrap();

    let all = get_audit_trail(&store, &AuditQuery::default()).unwrap();
    let stamps: Vec<i64> = all.iter().map(|r| r.created_at).collect();
    assert_eq!(stamps, vec![400, 300, 200, 100]);

    let agent_rows = get_audit_trail(&store, &AuditQuery::default().kind("agents")).unwrap();
    assert_eq!(agent_rows.len(), 3);
    assert!(agent_rows.iter().all(|r| r.entity_kind == "agents"));

    let guard_rows = get_audit_trail(&store, &AuditQuery::default().entity(&guard.id)).unwrap();
    assert_eq!(
        guard_rows.iter().map(|r| r.action).collect::<Vec<_>>(),
        vec![AuditAction::Update, AuditAction::Create]
    );

    let since = get_audit_trail(&store, &AuditQuery::default().since(300)).unwrap();
    assert_eq!(since.len(), 2);
    assert_eq!(since[1].entity_id, sample.id);
    assert_eq!(since[1].actor.as_deref(), Some("CORE"));

    let limited = get_audit_trail(&store, &AuditQuery::default().limit(1)).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].created_at, 400);

    let none = get_audit_trail(&store, &AuditQuery::default().kind("agents").entity(&sample.id)).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_unknown_kind_is_a_validation_error() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    assert!(matches!(
        get_audit_trail(&store, &AuditQuery::default().kind("sessions")),
        Err(LedgerError::ValidationError(_))
    ));
}
