//! Policy step: which intervention, if any, this evaluation emits
//!
//! Candidates are derived in preference order, filtered to the allowed set
//! and gated by intensity:
//!
//! | intensity | emits when |
//! |-----------|------------|
//! | off | never |
//! | assist | a required goal is below threshold and divergence > 0.4 |
//! | assertive | progress lags the pacing, divergence > 0.25, or tension leaves [0.2, 0.8] |

use chrono::{DateTime, Utc};
use sim_schema::{
    ActorAction, ActorTrigger, DirectorSettings, DirectorState, Goal, Intensity, Intervention,
    InterventionKind, ScenarioOutline, StructurePhase,
};

/// Divergence above which `assist` may intervene
pub const ASSIST_DIVERGENCE: f64 = 0.4;
/// Divergence above which `assertive` intervenes
pub const ASSERTIVE_DIVERGENCE: f64 = 0.25;
/// Tension band `assertive` tries to keep
pub const TENSION_BAND: (f64, f64) = (0.2, 0.8);

/// Synthetic event observed when `goal_id` lags its pacing
#[must_use]
pub fn stalled_event(goal_id: &str) -> String {
    format!("goal_stalled:{goal_id}")
}

/// What the policy step looks at
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    /// Compiled scenario
    pub outline: &'a ScenarioOutline,
    /// Active settings
    pub settings: &'a DirectorSettings,
    /// State after scoring
    pub state: &'a DirectorState,
    /// Student messages so far
    pub student_messages: u64,
    /// Events broadcast since the last evaluation
    pub events: &'a [String],
    /// Clock
    pub now: DateTime<Utc>,
}

/// A proposed intervention and the trigger it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Proposed intervention
    pub intervention: Intervention,
    /// Outline trigger to mark as fired once emitted
    pub trigger_id: Option<String>,
}

impl Candidate {
    fn new(intervention: Intervention) -> Self {
        Self {
            intervention,
            trigger_id: None,
        }
    }

    /// Kind of the proposed intervention
    #[must_use]
    pub fn kind(&self) -> InterventionKind {
        self.intervention.kind()
    }
}

/// A required goal behind where it should be
#[derive(Debug, Clone, PartialEq)]
pub struct Lag {
    /// Goal id
    pub goal_id: String,
    /// Expected minus actual progress
    pub gap: f64,
}

fn threshold(settings: &DirectorSettings, goal: &Goal) -> f64 {
    settings.threshold(&goal.id).unwrap_or(1.0)
}

fn sorted(mut lags: Vec<(Lag, u32)>) -> Vec<Lag> {
    lags.sort_by(|(a, pa), (b, pb)| {
        b.gap
            .total_cmp(&a.gap)
            .then(pa.cmp(pb))
            .then_with(|| a.goal_id.cmp(&b.goal_id))
    });
    lags.into_iter().map(|(lag, _)| lag).collect()
}

/// Required goals below their learning-objective threshold, largest gap first
#[must_use]
pub fn below_threshold(input: &PolicyInput<'_>) -> Vec<Lag> {
    sorted(
        input
            .outline
            .goals
            .iter()
            .filter(|g| g.required)
            .filter_map(|g| {
                let gap = threshold(input.settings, g) - input.state.progress(&g.id);
                (gap > 0.0).then(|| (Lag { goal_id: g.id.clone(), gap }, g.priority))
            })
            .collect(),
    )
}

/// Required goals behind the pacing of the current structure block
///
/// Goals in focus of the current block are expected at the block's
/// `expected_progress`; in the end block every goal is expected at its
/// threshold. Without a suggested structure the threshold applies throughout.
#[must_use]
pub fn lagging_goals(input: &PolicyInput<'_>) -> Vec<Lag> {
    let block = input
        .outline
        .suggested_structure
        .as_ref()
        .map(|s| s.block_at(input.student_messages));
    sorted(
        input
            .outline
            .goals
            .iter()
            .filter(|g| g.required)
            .filter_map(|g| {
                let target = threshold(input.settings, g);
                let expected = match block {
                    None | Some((StructurePhase::End, _)) => target,
                    Some((_, block)) if block.goal_ids.contains(&g.id) => {
                        block.expected_progress.min(target)
                    }
                    Some(_) => 0.0,
                };
                let gap = expected - input.state.progress(&g.id);
                (gap > 0.0).then(|| (Lag { goal_id: g.id.clone(), gap }, g.priority))
            })
            .collect(),
    )
}

fn tension_out_of_band(state: &DirectorState) -> bool {
    state
        .tension_score
        .is_some_and(|t| t < TENSION_BAND.0 || t > TENSION_BAND.1)
}

/// Whether intensity lets this evaluation emit anything
#[must_use]
pub fn gate_open(input: &PolicyInput<'_>) -> bool {
    let divergence = input.state.divergence_score;
    match input.settings.intensity {
        Intensity::Off => false,
        Intensity::Assist => divergence > ASSIST_DIVERGENCE && !below_threshold(input).is_empty(),
        Intensity::Assertive => {
            divergence > ASSERTIVE_DIVERGENCE
                || tension_out_of_band(input.state)
                || !lagging_goals(input).is_empty()
        }
    }
}

fn goal_shift(outline: &ScenarioOutline, goal_id: &str) -> Option<Intervention> {
    let goal = outline.goal(goal_id)?;
    Some(Intervention::GoalShift {
        goal_id: goal.id.clone(),
        directive: format!(
            "Steer the next reply toward goal {}: {}. Invite the student to show: {}.",
            goal.id,
            goal.description,
            goal.success_criteria.required_evidence.join("; ")
        ),
    })
}

fn reveal(input: &PolicyInput<'_>, goal_id: Option<&str>) -> Option<Intervention> {
    let unrevealed = || {
        input
            .outline
            .hidden_information
            .iter()
            .filter(|f| !input.state.has_revealed(&f.id))
    };
    let fact = unrevealed()
        .find(|f| goal_id.is_some() && f.goal_id.as_deref() == goal_id)
        .or_else(|| unrevealed().next())?;
    Some(Intervention::HiddenInfoReveal {
        fact_id: fact.id.clone(),
        fact: fact.fact.clone(),
        directive: format!(
            "Work this previously withheld fact naturally into the next reply: {}",
            fact.fact
        ),
    })
}

fn actor_move(
    outline: &ScenarioOutline,
    actor_id: &str,
    action: ActorAction,
    directive: Option<&str>,
) -> Option<Intervention> {
    let actor = outline.actor(actor_id)?;
    let directive = directive.map_or_else(
        || match action {
            ActorAction::Enter => {
                format!("Bring {} ({}) into the conversation.", actor.name, actor.role)
            }
            ActorAction::Exit => format!("Have {} step out of the conversation.", actor.name),
        },
        str::to_string,
    );
    Some(Intervention::EnterExitActor {
        actor_id: actor.id.clone(),
        action,
        directive,
    })
}

fn tone(state: &DirectorState) -> Intervention {
    let (tone, directive) = match state.tension_score {
        Some(t) if t < TENSION_BAND.0 => (
            "more urgent",
            "Raise the stakes: remind the student of deadlines and consequences.",
        ),
        Some(t) if t > TENSION_BAND.1 => (
            "calmer",
            "Lower the pressure: acknowledge progress and slow the pace.",
        ),
        _ => (
            "more focused",
            "Keep the reply short and centred on the open decisions.",
        ),
    };
    Intervention::ToneAdjustment {
        tone: tone.to_string(),
        directive: directive.to_string(),
    }
}

fn due_event(input: &PolicyInput<'_>) -> Option<Intervention> {
    let event = input
        .state
        .pending_events
        .iter()
        .find(|e| e.is_due(input.student_messages, input.now))?;
    Some(Intervention::EventTrigger {
        event_id: event.id.clone(),
        description: event.description.clone(),
        directive: format!("Introduce this development: {}", event.description),
    })
}

/// Intervention of `kind`, aimed at `goal_id` where that applies
fn build(input: &PolicyInput<'_>, kind: InterventionKind, goal_id: Option<&str>) -> Option<Intervention> {
    match kind {
        InterventionKind::GoalShift => goal_shift(input.outline, goal_id?),
        InterventionKind::HiddenInfoReveal => reveal(input, goal_id),
        InterventionKind::EnterExitActor => {
            let actor = input
                .outline
                .actors
                .iter()
                .find(|a| !input.state.actor_engagement.contains_key(&a.id))
                .or_else(|| input.outline.actors.first())?;
            actor_move(input.outline, &actor.id, ActorAction::Enter, None)
        }
        InterventionKind::ToneAdjustment => Some(tone(input.state)),
        InterventionKind::EventTrigger => due_event(input),
    }
}

fn actor_trigger_ready(input: &PolicyInput<'_>, trigger: &ActorTrigger, observed: &[String]) -> bool {
    let c = &trigger.condition;
    c.after_message.map_or(true, |m| input.student_messages >= m)
        && match (&c.goal_id, c.progress_at_least) {
            (Some(goal), Some(p)) => input.state.progress(goal) >= p,
            _ => true,
        }
        && c.event.as_ref().map_or(true, |e| observed.contains(e))
}

/// Every applicable intervention, most preferred first, before filtering
#[must_use]
pub fn candidates(input: &PolicyInput<'_>) -> Vec<Candidate> {
    let lagging = lagging_goals(input);
    let focus = lagging
        .first()
        .map(|l| l.goal_id.clone())
        .or_else(|| below_threshold(input).into_iter().next().map(|l| l.goal_id));
    let observed: Vec<String> = input
        .events
        .iter()
        .cloned()
        .chain(lagging.iter().map(|l| stalled_event(&l.goal_id)))
        .collect();
    let state = input.state;
    let mut out = Vec::new();

    for trigger in &input.outline.director_triggers {
        if state.has_fired(&trigger.id) || !observed.contains(&trigger.event) {
            continue;
        }
        let goal = trigger.goal_id.as_deref().or(focus.as_deref());
        if let Some(intervention) = build(input, trigger.intervention, goal) {
            out.push(Candidate {
                intervention,
                trigger_id: Some(trigger.id.clone()),
            });
        }
    }

    if let Some(intervention) = focus.as_deref().and_then(|g| goal_shift(input.outline, g)) {
        out.push(Candidate::new(intervention));
    }

    for trigger in &input.outline.actor_triggers {
        if state.has_fired(&trigger.id) || !actor_trigger_ready(input, trigger, &observed) {
            continue;
        }
        if let Some(intervention) = actor_move(
            input.outline,
            &trigger.actor,
            trigger.action,
            trigger.directive.as_deref(),
        ) {
            out.push(Candidate {
                intervention,
                trigger_id: Some(trigger.id.clone()),
            });
        }
    }

    if let Some(intervention) = due_event(input) {
        out.push(Candidate::new(intervention));
    }
    if tension_out_of_band(state) {
        out.push(Candidate::new(tone(state)));
    }
    if let Some(intervention) = reveal(input, focus.as_deref()) {
        out.push(Candidate::new(intervention));
    }
    out
}

/// The intervention to emit, if the gate is open and an allowed candidate exists
#[must_use]
pub fn decide(input: &PolicyInput<'_>) -> Option<Candidate> {
    if !gate_open(input) {
        return None;
    }
    candidates(input)
        .into_iter()
        .find(|c| input.settings.allows(c.kind()))
}

/// Record the side effects of emitting `candidate`
pub fn record(state: &mut DirectorState, candidate: &Candidate) {
    if let Some(id) = &candidate.trigger_id {
        if !state.has_fired(id) {
            state.fired_triggers.push(id.clone());
        }
    }
    match &candidate.intervention {
        Intervention::HiddenInfoReveal { fact_id, .. } if !state.has_revealed(fact_id) => {
            state.revealed_facts.push(fact_id.clone());
        }
        Intervention::EventTrigger { event_id, .. } => state.mark_injected(event_id),
        _ => {}
    }
}
