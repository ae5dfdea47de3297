use evoledger::core::capture::WriteContext;
use evoledger::core::error::LedgerError;
use evoledger::plugins::agents::{
    AgentStatus, DEFAULT_FLEET, find_agent_by_name, get_agent, list_agents, register_agent,
    remove_agent, seed_default_fleet, set_agent_status, update_agent_state,
};
use evoledger::plugins::telemetry;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_seed_default_fleet_is_idempotent() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(100);

    let first = seed_default_fleet(&store, &ctx).unwrap();
    assert_eq!(first.len(), DEFAULT_FLEET.len());
    let second = seed_default_fleet(&store, &ctx).unwrap();
    assert!(second.is_empty());

    let names: Vec<String> = list_agents(&store).unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["CORE", "GUARD", "LEARN"]);
}

#[test]
fn test_register_rejects_duplicates_and_bad_input() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(100);

    register_agent(&store, &ctx, "CORE", "self_improving", json!({"lr": 0.01})).unwrap();
    assert!(matches!(
        register_agent(&store, &ctx, "CORE", "self_improving", json!({})),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        register_agent(&store, &ctx, "bad name", "x", json!({})),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        register_agent(&store, &ctx, "ECHO", "x", json!([1, 2])),
        Err(LedgerError::ValidationError(_))
    ));
}

#[test]
fn test_status_and_state_updates() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let agent = register_agent(&store, &WriteContext::at(100), "GUARD", "security", json!({})).unwrap();

    let updated = set_agent_status(&store, &WriteContext::at(200), "GUARD", AgentStatus::Suspended).unwrap();
    assert_eq!(updated.status, AgentStatus::Suspended);
    assert_eq!(updated.updated_at, 200);
    assert_eq!(updated.created_at, 100);

    let updated = update_agent_state(
        &store,
        &WriteContext::at(300),
        &agent.id,
        json!({"threat_model": "v2"}),
    )
    .unwrap();
    assert_eq!(updated.state, json!({"threat_model": "v2"}));
    assert_eq!(get_agent(&store, &agent.id).unwrap(), updated);

    assert!(matches!(
        set_agent_status(&store, &WriteContext::at(400), "NOBODY", AgentStatus::Active),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_remove_refuses_agents_with_records() {
    let tmp = tempdir().unwrap();
    let store = evoledger::init_project(tmp.path(), false).unwrap();
    let ctx = WriteContext::at(100);
    let agent = register_agent(&store, &ctx, "CORE", "self_improving", json!({})).unwrap();
    telemetry::record_metric(&store, &ctx, &agent.id, "accuracy", 0.5, None, None).unwrap();

    assert!(matches!(
        remove_agent(&store, &ctx, "CORE"),
        Err(LedgerError::ValidationError(_))
    ));

    let spare = register_agent(&store, &ctx, "SPARE", "collaborative", json!({})).unwrap();
    remove_agent(&store, &ctx, &spare.id).unwrap();
    assert!(find_agent_by_name(&store, "SPARE").unwrap().is_none());
    assert!(find_agent_by_name(&store, "CORE").unwrap().is_some());
}
