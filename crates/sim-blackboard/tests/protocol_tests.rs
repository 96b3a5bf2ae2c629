use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use sim_blackboard::{
    keys, AgentId, AuditAction, AuditFilter, Blackboard, BoardError, Caller, Grant, Phase,
    PhasePolicy,
};

fn outline() -> Value {
    json!({
        "schema_version": "1.0.0",
        "goals": [{
            "id": "g1",
            "description": "Contain the breach",
            "success_criteria": {"required_evidence": ["containment plan"]},
            "progress_tracking": {"milestones": [
                {"at": 0.33, "indicator": "names the risk"},
                {"at": 0.66, "indicator": "weighs options"},
                {"at": 1.0, "indicator": "commits"}
            ]}
        }]
    })
}

fn builder() -> AgentId {
    AgentId::new("builder")
}

fn runner() -> AgentId {
    AgentId::new("runner")
}

/// Board advanced to `phase` with a builder and a runner agent
fn board_in(phase: Phase) -> Blackboard {
    let board = Blackboard::standard().unwrap();
    board.grant_permission(
        builder(),
        Grant::new()
            .writes([keys::RAW_INPUT, keys::SCENARIO_OUTLINE, keys::DIRECTOR_SETTINGS])
            .reads_all(),
    );
    board.grant_permission(
        runner(),
        Grant::new()
            .writes([keys::TRANSCRIPT, keys::DIRECTOR_STATE])
            .reads_all(),
    );
    if phase == Phase::Idle {
        return board;
    }
    board.write(keys::RAW_INPUT, json!("narrative"), &builder()).unwrap();
    if phase == Phase::Building {
        return board;
    }
    board.write(keys::SCENARIO_OUTLINE, outline(), &builder()).unwrap();
    board.write(keys::DIRECTOR_SETTINGS, json!({}), &builder()).unwrap();
    board.transition(Phase::Running).unwrap();
    if phase == Phase::Terminated {
        board.transition(Phase::Terminated).unwrap();
    }
    board
}

#[test]
fn lifecycle_reaches_running_and_terminated() {
    let board = board_in(Phase::Running);
    assert_eq!(board.phase(), Phase::Running);
    board.write(keys::TRANSCRIPT, json!([]), &runner()).unwrap();

    board.transition(Phase::Terminated).unwrap();
    let err = board.write(keys::TRANSCRIPT, json!([]), &runner()).unwrap_err();
    assert!(err.is_phase_violation());
}

#[test]
fn running_rejects_targets_for_unknown_goals() {
    let board = board_in(Phase::Building);
    board.write(keys::SCENARIO_OUTLINE, outline(), &builder()).unwrap();
    board
        .write(
            keys::DIRECTOR_SETTINGS,
            json!({"learning_objective_targets": {"g7": {"threshold": 0.8}}}),
            &builder(),
        )
        .unwrap();
    let err = board.transition(Phase::Running).unwrap_err();
    match err {
        BoardError::PhaseViolation { detail, .. } => assert!(detail.contains("g7")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn bound_keys_reject_invalid_values() {
    let board = board_in(Phase::Building);
    let before = board.audit_log(&AuditFilter::all()).len();
    let err = board
        .write(keys::SCENARIO_OUTLINE, json!({"goals": []}), &builder())
        .unwrap_err();
    assert!(matches!(err, BoardError::Schema { .. }));
    assert_eq!(board.audit_log(&AuditFilter::all()).len(), before);
}

#[test]
fn bound_keys_store_normalized_values() {
    let board = board_in(Phase::Building);
    board.write(keys::DIRECTOR_SETTINGS, json!({}), &builder()).unwrap();
    let stored = board.read(keys::DIRECTOR_SETTINGS, &Caller::System).unwrap().unwrap();
    assert_eq!(stored["intensity"], json!("assist"));
    assert_eq!(stored["max_latency_ms"], json!(3500));
}

#[test]
fn write_records_before_and_after_hashes() {
    let board = board_in(Phase::Building);
    board.write(keys::RAW_INPUT, json!("second"), &builder()).unwrap();
    let writes = board.audit_log(
        &AuditFilter::all()
            .action(AuditAction::Write)
            .key(keys::RAW_INPUT),
    );
    assert_eq!(writes.len(), 2);
    assert!(writes[0].before_hash.is_none());
    assert_eq!(writes[1].before_hash, writes[0].after_hash);
    assert_ne!(writes[1].after_hash, writes[0].after_hash);
}

#[test]
fn snapshot_restores_and_detects_tampering() {
    let board = board_in(Phase::Running);
    let snapshot = board.snapshot();

    let restored = Blackboard::builder()
        .standard_bindings()
        .restore(snapshot.clone())
        .unwrap();
    assert_eq!(restored.phase(), Phase::Running);
    assert_eq!(restored.keys(), board.keys());
    assert!(restored.verify_integrity().is_ok());
    restored.write(keys::TRANSCRIPT, json!([]), &runner()).unwrap();

    let mut forged = snapshot;
    forged.audit_log[1].payload = Some(json!("forged"));
    let err = Blackboard::builder()
        .standard_bindings()
        .restore(forged)
        .unwrap_err();
    assert!(matches!(err, BoardError::IntegrityViolation { seq: 2 }));
}

#[test]
fn audit_seq_is_strictly_monotonic() {
    let board = board_in(Phase::Running);
    for i in 0..5 {
        board.write(keys::TRANSCRIPT, json!([]), &runner()).unwrap();
        board.broadcast("tick", json!(i), &runner()).unwrap();
        board.read(keys::TRANSCRIPT, &Caller::from(&runner())).unwrap();
    }
    let log = board.audit_log(&AuditFilter::all());
    assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));
    assert!(board.verify_integrity().is_ok());
}

const KEYS: [&str; 8] = [
    keys::RAW_INPUT,
    keys::INSTRUCTIONS,
    keys::PARSED_DATA,
    keys::SCENARIO_OUTLINE,
    keys::DIRECTOR_SETTINGS,
    keys::DIRECTOR_STATE,
    keys::TRANSCRIPT,
    keys::PENDING_INTERVENTION,
];

proptest! {
    #[test]
    fn prop_unpermitted_writes_are_rejected_without_audit(
        phase in prop_oneof![
            Just(Phase::Idle),
            Just(Phase::Building),
            Just(Phase::Running),
            Just(Phase::Terminated),
        ],
        writes in prop::collection::btree_set(0usize..KEYS.len(), 0..4),
        preserves in prop::collection::btree_set(0usize..KEYS.len(), 0..3),
        target in 0usize..KEYS.len(),
    ) {
        let board = board_in(phase);
        let agent = AgentId::new("probe");
        let grant = Grant::new()
            .writes(writes.iter().map(|i| KEYS[*i]))
            .preserves(preserves.iter().map(|i| KEYS[*i]));
        board.grant_permission(agent.clone(), grant.clone());

        let key = KEYS[target];
        let permitted = grant.can_write(key) && PhasePolicy::default().permits(phase, key);
        let before = board.audit_log(&AuditFilter::all());

        match board.write(key, json!("probe"), &agent) {
            Ok(_) => prop_assert!(permitted),
            Err(err) => {
                prop_assert_eq!(board.audit_log(&AuditFilter::all()), before);
                if !permitted {
                    prop_assert!(err.is_permission_denied() || err.is_phase_violation());
                }
            }
        }
    }
}
