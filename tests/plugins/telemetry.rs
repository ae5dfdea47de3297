use evoledger::core::capture::WriteContext;
use evoledger::core::error::LedgerError;
use evoledger::core::store::Store;
use evoledger::plugins::agents::{self, Agent};
use evoledger::plugins::audit::{AuditQuery, get_audit_trail};
use evoledger::plugins::telemetry::{
    Severity, record_interaction, record_metric, record_security_event, recent_metrics,
};
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn setup() -> (TempDir, Store, Agent, Agent) {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(1_000);
    let core = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    let learn = agents::register_agent(&store, &ctx, "LEARN", "collaborative", json!({})).unwrap();
    (tmp, store, core, learn)
}

#[test]
fn test_record_metric_derives_improvement() {
    let (_tmp, store, core, _) = setup();
    let ctx = WriteContext::at(2_000);

    let sample = record_metric(&store, &ctx, &core.id, "accuracy", 0.9, Some(0.6), None).unwrap();
    let improvement = sample.improvement_percentage.unwrap();
    assert!((improvement - 50.0).abs() < 1e-9);
    assert_eq!(sample.metadata, json!({}));

    let flat = record_metric(&store, &ctx, &core.id, "accuracy", 0.9, Some(0.0), None).unwrap();
    assert_eq!(flat.improvement_percentage, None);

    let recent = recent_metrics(&store, "CORE", 10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, flat.id);
}

#[test]
fn test_each_write_appends_exactly_one_audit_record() {
    let (_tmp, store, core, learn) = setup();
    let ctx = WriteContext::at(2_000);

    let sample = record_metric(&store, &ctx, &core.id, "latency_ms", 12.5, None, None).unwrap();
    let event = record_security_event(&store, &ctx, &core.id, Severity::High, 0.65, 2, 1).unwrap();
    let interaction = record_interaction(
        &store,
        &ctx,
        &core.id,
        std::slice::from_ref(&learn.id),
        45.0,
        3.0,
        json!({"shared_patterns": 4}),
    )
    .unwrap();

    for (kind, id) in [
        ("performance_metrics", &sample.id),
        ("security_logs", &event.id),
        ("agent_interactions", &interaction.id),
    ] {
        let trail = get_audit_trail(&store, &AuditQuery::default().kind(kind).entity(id)).unwrap();
        assert_eq!(trail.len(), 1, "{}", kind);
    }
    let trail = get_audit_trail(&store, &AuditQuery::default().entity(&interaction.id)).unwrap();
    let stored = trail[0].new_values.as_ref().unwrap();
    assert_eq!(stored["target_agents"], json!(format!("[\"{}\"]", learn.id)));
}

#[test]
fn test_invalid_input_is_rejected_before_any_write() {
    let (_tmp, store, core, _) = setup();
    let ctx = WriteContext::at(2_000);

    assert!(matches!(
        record_security_event(&store, &ctx, &core.id, Severity::Low, 1.5, 0, 0),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        record_security_event(&store, &ctx, &core.id, Severity::Low, 0.5, -1, 0),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        record_metric(&store, &ctx, &core.id, "", 1.0, None, None),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        record_metric(&store, &ctx, &core.id, "x", f64::NAN, None, None),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        record_interaction(&store, &ctx, &core.id, &[], 10.0, 1.0, json!({})),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        record_interaction(&store, &ctx, &core.id, std::slice::from_ref(&core.id), 10.0, -1.0, json!({})),
        Err(LedgerError::ValidationError(_))
    ));

    let trail = get_audit_trail(&store, &AuditQuery::default().since(2_000)).unwrap();
    assert!(trail.is_empty());
}

#[test]
fn test_unknown_agent_is_not_found() {
    let (_tmp, store, _, _) = setup();
    let ctx = WriteContext::at(2_000);
    assert!(matches!(
        record_metric(&store, &ctx, "01HZZZZZZZZZZZZZZZZZZZZZZZ", "accuracy", 0.5, None, None),
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        record_security_event(&store, &ctx, "ghost", Severity::Critical, 0.1, 1, 0),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_interaction_targets_must_exist_and_are_stored_once() {
    let (_tmp, store, core, learn) = setup();
    let ctx = WriteContext::at(3_000);

    assert!(matches!(
        record_interaction(&store, &ctx, &core.id, &["ghost".to_string(), "ghost".to_string()], 50.0, 1.0, json!({})),
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        record_interaction(&store, &ctx, &core.id, &["LEARN".to_string()], 50.0, 1.0, json!({})),
        Err(LedgerError::NotFound(_))
    ));
    assert!(get_audit_trail(&store, &AuditQuery::default().since(3_000)).unwrap().is_empty());

    let targets = vec![learn.id.clone(), core.id.clone(), learn.id.clone()];
    let record = record_interaction(&store, &ctx, &core.id, &targets, 50.0, 1.0, json!({})).unwrap();
    assert_eq!(record.target_agents, vec![learn.id.clone(), core.id.clone()]);

    let trail = get_audit_trail(&store, &AuditQuery::default().entity(&record.id)).unwrap();
    let stored = trail[0].new_values.as_ref().unwrap();
    assert_eq!(
        stored["target_agents"],
        json!(format!("[\"{}\",\"{}\"]", learn.id, core.id))
    );
}
