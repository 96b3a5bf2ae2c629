//! Compiler output properties over arbitrary parsed scenarios

use proptest::prelude::*;
use serde_json::{json, Value};
use sim_agents::ScenarioCompiler;
use sim_schema::{check, ParsedActor, ParsedScenario};
use sim_test_utils::sample_parsed;

fn actor() -> impl Strategy<Value = ParsedActor> {
    ("[A-Z][a-z]{2,8}", "[a-z][a-z ]{2,15}").prop_map(|(name, role)| ParsedActor {
        role: role.clone(),
        name,
        description: format!("the {role}"),
    })
}

fn parsed() -> impl Strategy<Value = ParsedScenario> {
    (
        prop::collection::vec("[a-z][a-z ]{3,29}", 0..6),
        prop::collection::vec("[a-z][a-z ]{3,29}", 0..4),
        prop::collection::vec(actor(), 0..4),
    )
        .prop_map(|(objectives, key_challenges, actors)| ParsedScenario {
            objectives,
            key_challenges,
            actors,
            ..sample_parsed()
        })
}

fn raw_field() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(json!("a lone objective")),
        Just(json!(42)),
        Just(json!({"nested": true})),
        Just(json!(["one", "two"])),
    ]
}

proptest! {
    #[test]
    fn compiled_outlines_always_validate(parsed in parsed()) {
        let compilation = ScenarioCompiler::new().compile(&parsed, None, None);
        let outline = &compilation.outline;

        prop_assert!(check(outline).is_ok());
        prop_assert!(ScenarioCompiler::new().compile_checked(&parsed, None, None).is_ok());
        prop_assert!(!outline.goals.is_empty());

        let expected = if !parsed.objectives.is_empty() {
            parsed.objectives.len()
        } else if !parsed.key_challenges.is_empty() {
            parsed.key_challenges.len()
        } else {
            1
        };
        prop_assert_eq!(outline.goals.len(), expected);

        for (i, goal) in outline.goals.iter().enumerate() {
            prop_assert_eq!(&goal.id, &format!("g{}", i + 1));
            prop_assert_eq!(goal.priority as usize, i + 1);
            let milestones = &goal.progress_tracking.milestones;
            prop_assert!(milestones.windows(2).all(|w| w[0].at < w[1].at));
            prop_assert!(compilation.settings.threshold(&goal.id).is_some());
        }
        prop_assert_eq!(outline.actor_triggers.len(), outline.actors.len());
    }

    #[test]
    fn repaired_list_fields_are_always_arrays(
        objectives in raw_field(),
        constraints in raw_field(),
        actors in raw_field(),
    ) {
        let raw = json!({
            "scenario_type": "crisis",
            "objectives": objectives,
            "constraints": constraints,
            "actors": actors,
        });
        let scenario = ParsedScenario::repair(&raw).into_scenario();
        if !objectives.is_array() {
            prop_assert!(scenario.objectives.is_empty());
        }
        if !constraints.is_array() {
            prop_assert!(scenario.constraints.is_empty());
        }
        if !actors.is_array() {
            prop_assert!(scenario.actors.is_empty());
        }
        prop_assert!(check(&scenario).is_ok());
    }
}
