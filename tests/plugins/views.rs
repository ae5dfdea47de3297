use evoledger::core::capture::WriteContext;
use evoledger::plugins::agents::{self, AgentStatus};
use evoledger::plugins::telemetry::{self, Severity};
use evoledger::plugins::views::{
    get_collaboration_summary, get_performance_summary, get_security_summary,
};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_views_on_empty_store_are_empty() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    assert!(get_performance_summary(&store).unwrap().is_empty());
    assert!(get_security_summary(&store).unwrap().is_empty());
    assert!(get_collaboration_summary(&store).unwrap().is_empty());
}

#[test]
fn test_active_agents_without_rows_get_null_aggregates() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    agents::seed_default_fleet(&store, &WriteContext::at(10)).unwrap();

    let perf = get_performance_summary(&store).unwrap();
    let names: Vec<&str> = perf.iter().map(|p| p.agent_name.as_str()).collect();
    assert_eq!(names, vec!["CORE", "GUARD", "LEARN"]);
    for row in &perf {
        assert_eq!(row.sample_count, 0);
        assert_eq!(row.avg_value, None);
        assert_eq!(row.positive_improvements, 0);
        assert_eq!(row.last_sample_at, None);
    }

    let security = get_security_summary(&store).unwrap();
    assert_eq!(security.len(), 3);
    assert!(security.iter().all(|s| s.avg_score.is_none() && s.threats_detected.is_none()));
}

#[test]
fn test_performance_and_security_aggregates() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(10);
    let core = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();

    telemetry::record_metric(&store, &WriteContext::at(100), &core.id, "accuracy", 0.5, Some(0.4), None).unwrap();
    telemetry::record_metric(&store, &WriteContext::at(200), &core.id, "accuracy", 0.25, Some(0.5), None).unwrap();
    telemetry::record_metric(&store, &WriteContext::at(300), &core.id, "accuracy", 0.75, None, None).unwrap();

    let perf = get_performance_summary(&store).unwrap();
    assert_eq!(perf.len(), 1);
    let p = &perf[0];
    assert_eq!(p.sample_count, 3);
    assert_eq!(p.avg_value, Some(0.5));
    assert_eq!(p.max_value, Some(0.75));
    assert_eq!(p.min_value, Some(0.25));
    assert_eq!(p.positive_improvements, 1);
    assert_eq!(p.last_sample_at, Some(300));
    assert_eq!(p.last_value, Some(0.75));

    telemetry::record_security_event(&store, &WriteContext::at(100), &core.id, Severity::Low, 0.9, 1, 1).unwrap();
    telemetry::record_security_event(&store, &WriteContext::at(200), &core.id, Severity::Critical, 0.5, 3, 2).unwrap();

    let sec = get_security_summary(&store).unwrap();
    let s = &sec[0];
    assert_eq!(s.event_count, 2);
    assert!((s.avg_score.unwrap() - 0.7).abs() < 1e-12);
    assert_eq!(s.min_score, Some(0.5));
    assert_eq!(s.threats_detected, Some(4));
    assert_eq!(s.containment_actions, Some(3));
    assert_eq!(s.critical_events, 1);
    assert_eq!(s.incidents, 1);
    assert_eq!(s.last_score, Some(0.5));
}

#[test]
fn test_inactive_agents_are_excluded_from_every_view() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(10);
    let core = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    let learn = agents::register_agent(&store, &ctx, "LEARN", "collaborative", json!({})).unwrap();

    telemetry::record_metric(&store, &ctx, &learn.id, "accuracy", 0.9, None, None).unwrap();
    telemetry::record_security_event(&store, &ctx, &learn.id, Severity::Low, 0.9, 0, 0).unwrap();
    telemetry::record_interaction(&store, &ctx, &learn.id, std::slice::from_ref(&core.id), 80.0, 1.0, json!({}))
        .unwrap();
    agents::set_agent_status(&store, &ctx, &learn.id, AgentStatus::Inactive).unwrap();

    for names in [
        get_performance_summary(&store).unwrap().into_iter().map(|r| r.agent_name).collect::<Vec<_>>(),
        get_security_summary(&store).unwrap().into_iter().map(|r| r.agent_name).collect(),
        get_collaboration_summary(&store).unwrap().into_iter().map(|r| r.agent_name).collect(),
    ] {
        assert_eq!(names, vec!["CORE".to_string()]);
    }
}

#[test]
fn test_collaboration_threshold_is_inclusive_and_initiator_only() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(10);
    let core = agents::register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    let learn = agents::register_agent(&store, &ctx, "LEARN", "collaborative", json!({})).unwrap();
    let targets = std::slice::from_ref(&learn.id);

    telemetry::record_interaction(&store, &WriteContext::at(20), &core.id, targets, 30.0, 2.0, json!({})).unwrap();
    telemetry::record_interaction(&store, &WriteContext::at(30), &core.id, targets, 29.99, 4.0, json!({})).unwrap();

    let collab = get_collaboration_summary(&store).unwrap();
    let c = collab.iter().find(|r| r.agent_name == "CORE").unwrap();
    assert_eq!(c.interaction_count, 2);
    assert_eq!(c.successful_interactions, 1);
    assert_eq!(c.max_synergy, Some(30.0));
    assert_eq!(c.avg_duration_seconds, Some(3.0));
    assert_eq!(c.last_synergy, Some(29.99));

    let target = collab.iter().find(|r| r.agent_name == "LEARN").unwrap();
    assert_eq!(target.interaction_count, 0);
    assert_eq!(target.avg_synergy, None);
}
