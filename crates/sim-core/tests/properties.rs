//! Ordering properties of a live session

use proptest::prelude::*;
use serde_json::json;
use sim_agents::Purpose;
use sim_blackboard::AuditFilter;
use sim_core::{SessionConfig, SessionRegistry};
use sim_schema::{Intensity, Role};
use sim_test_utils::*;

#[derive(Debug, Clone)]
enum Step {
    Post(String),
    Event,
    Clear,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => "[a-z ]{1,24}".prop_map(Step::Post),
        1 => Just(Step::Event),
        1 => Just(Step::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn audit_and_transcript_stay_ordered(
        steps in prop::collection::vec(step(), 1..16),
        interval in 1u64..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let llm = ScriptedLlm::new()
                .always(Purpose::Score, score_json(&[("g1", 0.2)], 0.2, 0.4))
                .always(Purpose::Verify, verify_json(true))
                .shared();
            let registry = SessionRegistry::new(llm, SessionConfig::default());
            let outline = single_goal_outline();
            let session = registry
                .setup_compiled(&outline, &settings_for(&outline, Intensity::Assertive, interval))
                .unwrap();

            for step in steps {
                match step {
                    Step::Post(text) if text.trim().is_empty() => {}
                    Step::Post(text) => {
                        let turn = session.post_student(&text).await.unwrap();
                        assert_eq!(turn.advisor_seq, turn.student_seq + 1);
                    }
                    Step::Event => {
                        session.signal_event("market_shift", json!({})).await.unwrap();
                    }
                    Step::Clear => session.clear_conversation().await.unwrap(),
                }
            }

            let log = session.board().audit_log(&AuditFilter::all());
            assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));
            session.board().verify_integrity().unwrap();

            let transcript = session.view().unwrap().transcript;
            let turns = transcript.turns();
            assert!(turns.windows(2).all(|w| w[0].seq < w[1].seq));
            for (i, turn) in turns.iter().enumerate() {
                let expected = if i % 2 == 0 { Role::Student } else { Role::Advisor };
                assert_eq!(turn.role, expected);
            }
        });
    }
}
