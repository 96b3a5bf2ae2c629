//! Director evaluations against a running blackboard

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sim_agents::{LlmError, Purpose};
use sim_blackboard::{keys, AuditFilter, Blackboard, Caller};
use sim_director::{
    BudgetBreach, CadenceReason, Director, BUDGET_EXCEEDED_NOTE, CONVERSATION_CLEARED,
    DIRECTOR_EVALUATED,
};
use sim_schema::{
    DirectorState, Intensity, Intervention, InterventionKind, Role, ScenarioOutline, Transcript,
};
use sim_test_utils::*;

fn say(board: &Blackboard, role: Role, text: &str) {
    let mut transcript: Transcript = board
        .get(keys::TRANSCRIPT, &Caller::System)
        .unwrap()
        .unwrap_or_default();
    transcript.push(role, text);
    board
        .put(keys::TRANSCRIPT, &transcript, &fixture_agent())
        .unwrap();
}

fn exchange(board: &Blackboard, n: usize) {
    for i in 0..n {
        say(board, Role::Student, &format!("student message {i}"));
        say(board, Role::Advisor, &format!("advisor reply {i}"));
    }
}

fn state(board: &Blackboard) -> DirectorState {
    board
        .get(keys::DIRECTOR_STATE, &Caller::System)
        .unwrap()
        .unwrap()
}

fn evaluated(board: &Blackboard) -> Vec<Value> {
    board
        .audit_log(&AuditFilter::all().event(DIRECTOR_EVALUATED))
        .into_iter()
        .filter_map(|e| e.payload)
        .collect()
}

fn director(board: &Arc<Blackboard>, llm: Arc<ScriptedLlm>) -> Director {
    let director = Director::new(board.clone(), llm, "director-model");
    director.register();
    director
}

fn single_goal() -> ScenarioOutline {
    single_goal_outline()
}

#[tokio::test]
async fn off_intensity_never_intervenes() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Off, 2);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.1)], 0.9, 0.05))
        .shared();
    let director = director(&board, llm.clone());

    let mut ticks = 0;
    for i in 0..10 {
        exchange(&board, 1);
        if director.maybe_evaluate().await.unwrap().is_some() {
            ticks += 1;
        }
        assert_eq!(state(&board).evaluations, ticks, "after student turn {}", i + 1);
    }

    assert_eq!(ticks, 5);
    let events = evaluated(&board);
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|p| p["intervention"].is_null()));
    assert!(!board.contains(keys::PENDING_INTERVENTION));
    assert_eq!(llm.calls(Purpose::Verify), 0);
}

#[tokio::test]
async fn assertive_emits_one_verified_goal_shift() {
    let outline = single_goal();
    let settings = settings_for(&outline, Intensity::Assertive, 2).with_verification(2, Some(0.2));
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .with_json(Purpose::Score, score_json(&[("g1", 0.1)], 0.3, 0.5))
        .with_json(Purpose::Verify, verify_json(true))
        .shared();
    let director = director(&board, llm.clone());

    exchange(&board, 3);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();

    assert_eq!(
        evaluation.reason,
        CadenceReason::MessageInterval { since: 3 }
    );
    let Some(Intervention::GoalShift { goal_id, .. }) = &evaluation.intervention else {
        panic!("expected a goal shift, got {:?}", evaluation.intervention);
    };
    assert_eq!(goal_id, "g1");
    assert_eq!(llm.calls(Purpose::Verify), 1);
    assert_eq!(llm.calls(Purpose::Regenerate), 0);

    let pending: Intervention = board
        .get(keys::PENDING_INTERVENTION, &Caller::System)
        .unwrap()
        .unwrap();
    assert_eq!(pending.kind(), InterventionKind::GoalShift);

    let events = evaluated(&board);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["intervention"]["type"], "goal_shift");
    assert_eq!(events[0]["transcript_seq"], 6);

    let state = state(&board);
    assert_eq!(state.last_evaluated_message, 6);
    assert!(state.has_fired("stalled_g1"));
}

#[tokio::test]
async fn rejected_interventions_are_dropped() {
    let outline = single_goal();
    let settings = settings_for(&outline, Intensity::Assertive, 1).with_verification(1, None);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .with_json(Purpose::Score, score_json(&[("g1", 0.0)], 0.6, 0.5))
        .always(Purpose::Verify, verify_json(false))
        .with_handler(Purpose::Regenerate, |_| {
            Err(LlmError::Malformed("not an intervention".into()))
        })
        .shared();
    let director = director(&board, llm.clone());

    exchange(&board, 1);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();

    assert_eq!(evaluation.intervention, None);
    assert_eq!(llm.calls(Purpose::Verify), 2);
    assert!(!board.contains(keys::PENDING_INTERVENTION));
    assert!(state(&board)
        .notes
        .iter()
        .any(|n| n.starts_with("intervention_dropped")));
}

#[tokio::test]
async fn regeneration_naming_unknown_fact_is_discarded() {
    let outline = single_goal();
    let settings = settings_for(&outline, Intensity::Assertive, 2).with_verification(1, None);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .with_json(Purpose::Score, score_json(&[("g1", 0.1)], 0.3, 0.5))
        .with_json(Purpose::Verify, verify_json(false))
        .with_json(Purpose::Verify, verify_json(true))
        .with_json(
            Purpose::Regenerate,
            json!({
                "type": "hidden_info_reveal",
                "fact_id": "ghost",
                "fact": "The backups were never taken",
                "directive": "Let the student discover the missing backups."
            }),
        )
        .shared();
    let director = director(&board, llm.clone());

    exchange(&board, 3);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();

    assert_eq!(llm.calls(Purpose::Regenerate), 1);
    assert_eq!(llm.calls(Purpose::Verify), 2);
    let Some(Intervention::GoalShift { goal_id, .. }) = &evaluation.intervention else {
        panic!("expected the original goal shift, got {:?}", evaluation.intervention);
    };
    assert_eq!(goal_id, "g1");

    let state = state(&board);
    assert!(!state.has_revealed("ghost"));
    assert!(state.has_fired("stalled_g1"));
}

#[tokio::test]
async fn approved_regeneration_leaves_original_trigger_unfired() {
    let outline = single_goal();
    let settings = settings_for(&outline, Intensity::Assertive, 2).with_verification(1, None);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .with_json(Purpose::Score, score_json(&[("g1", 0.1)], 0.3, 0.5))
        .with_json(Purpose::Verify, verify_json(false))
        .with_json(Purpose::Verify, verify_json(true))
        .with_json(
            Purpose::Regenerate,
            json!({
                "type": "hidden_info_reveal",
                "fact_id": "h1",
                "fact": "Backups are partially corrupted",
                "directive": "Mention that the latest backups failed their integrity check."
            }),
        )
        .shared();
    let director = director(&board, llm.clone());

    exchange(&board, 3);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();

    let Some(Intervention::HiddenInfoReveal { fact_id, .. }) = &evaluation.intervention else {
        panic!("expected the regenerated reveal, got {:?}", evaluation.intervention);
    };
    assert_eq!(fact_id, "h1");

    let state = state(&board);
    assert!(state.has_revealed("h1"));
    assert!(!state.has_fired("stalled_g1"));
}

#[tokio::test]
async fn latency_breach_keeps_prior_state() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assertive, 1).with_max_latency_ms(100);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.9)], 0.9, 0.9))
        .with_delay(Duration::from_millis(200))
        .shared();
    let director = director(&board, llm);
    let before = state(&board);

    exchange(&board, 1);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();

    assert_eq!(
        evaluation.aborted,
        Some(BudgetBreach::Latency { limit_ms: 100 })
    );
    assert_eq!(evaluation.intervention, None);

    let after = state(&board);
    let mut expected = before;
    expected.note(BUDGET_EXCEEDED_NOTE);
    assert_eq!(after, expected);

    let events = evaluated(&board);
    assert_eq!(events.len(), 1);
    assert!(events[0]["aborted"].is_object());

    // the aborted position is not retried, the next turn is
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    exchange(&board, 1);
    assert!(director.maybe_evaluate().await.unwrap().is_some());
}

#[tokio::test]
async fn cost_breach_aborts() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assertive, 1).with_max_cost(0.001);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.2)], 0.5, 0.5))
        .with_cost(0.01)
        .shared();
    let director = director(&board, llm);

    exchange(&board, 1);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();
    assert!(matches!(evaluation.aborted, Some(BudgetBreach::Cost { .. })));
    assert_eq!(state(&board).progress("g1"), 0.0);
}

#[tokio::test]
async fn llm_failure_degrades_to_a_note() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assertive, 1);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new().shared();
    llm.push_json_error(Purpose::Score, LlmError::Transport("connection reset".into()));
    let director = director(&board, llm);

    exchange(&board, 1);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();
    assert!(evaluation.degraded.is_some());
    assert!(state(&board)
        .notes
        .iter()
        .any(|n| n.starts_with("director_error")));
}

#[tokio::test]
async fn never_evaluates_the_same_position_twice() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assist, 1);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.3)], 0.1, 0.5))
        .shared();
    let director = director(&board, llm.clone());

    assert!(director.maybe_evaluate().await.unwrap().is_none(), "empty transcript");
    exchange(&board, 1);
    assert!(director.maybe_evaluate().await.unwrap().is_some());
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    say(&board, Role::Advisor, "still thinking");
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    assert_eq!(llm.calls(Purpose::Score), 1);

    say(&board, Role::Student, "next question");
    assert!(director.maybe_evaluate().await.unwrap().is_some());
    assert_eq!(llm.calls(Purpose::Score), 2);
}

#[tokio::test]
async fn clearing_the_conversation_resets_cadence() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assist, 2);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.3)], 0.1, 0.5))
        .shared();
    let director = director(&board, llm);

    exchange(&board, 2);
    assert!(director.maybe_evaluate().await.unwrap().is_some());

    board
        .put(keys::TRANSCRIPT, &Transcript::new(), &fixture_agent())
        .unwrap();
    board
        .broadcast(CONVERSATION_CLEARED, Value::Null, &fixture_agent())
        .unwrap();
    let mut reset = state(&board);
    reset.last_evaluated_message = 0;
    board
        .put(keys::DIRECTOR_STATE, &reset, &fixture_agent())
        .unwrap();

    exchange(&board, 1);
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    exchange(&board, 1);
    let evaluation = director.maybe_evaluate().await.unwrap().unwrap();
    assert_eq!(evaluation.transcript_seq, 4);
}

#[tokio::test]
async fn idle_outside_running() {
    let board = open_board();
    let llm = ScriptedLlm::new().shared();
    let director = director(&board, llm.clone());
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    assert!(director.evaluate().await.unwrap().is_none());
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn forced_evaluation_ignores_cadence() {
    let outline = sample_outline();
    let settings = settings_for(&outline, Intensity::Assist, 50);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.5)], 0.1, 0.5))
        .shared();
    let director = director(&board, llm);

    exchange(&board, 1);
    assert!(director.maybe_evaluate().await.unwrap().is_none());
    let evaluation = director.evaluate().await.unwrap().unwrap();
    assert_eq!(evaluation.reason, CadenceReason::Forced);
    assert_eq!(state(&board).progress("g1"), 0.5);
}

#[tokio::test]
async fn board_audit_stays_intact() {
    let outline = single_goal();
    let settings = settings_for(&outline, Intensity::Assertive, 1);
    let board = running_board(&outline, &settings);
    let llm = ScriptedLlm::new()
        .always(Purpose::Score, score_json(&[("g1", 0.1)], 0.5, 0.5))
        .shared();
    let director = director(&board, llm);

    for _ in 0..3 {
        exchange(&board, 1);
        director.maybe_evaluate().await.unwrap();
    }
    board.verify_integrity().unwrap();
}
