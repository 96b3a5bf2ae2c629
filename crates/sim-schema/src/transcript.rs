//! Session transcript
//!
//! Append-only within a session; `seq` is strictly increasing. Sequence
//! numbers are shared with nothing else, so a cleared transcript restarts at 1.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{Validate, Violations};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The learner
    Student,
    /// The LLM-driven advisor
    Advisor,
    /// Session notices
    System,
    /// Director notes surfaced into the transcript
    DirectorNote,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Student => "student",
            Self::Advisor => "advisor",
            Self::System => "system",
            Self::DirectorNote => "director_note",
        })
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Turn {
    /// Position in the transcript, starting at 1
    pub seq: u64,
    /// Speaker
    pub role: Role,
    /// Outline actor voiced by the advisor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Text
    pub content: String,
    /// When the turn was committed
    pub ts: DateTime<Utc>,
}

/// Ordered turns of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    /// Empty transcript
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seq the next turn will receive
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.0.last().map_or(1, |t| t.seq + 1)
    }

    /// Append a turn with the next seq, returning it
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Turn {
        self.push_as(role, None, content)
    }

    /// Append a turn attributed to an outline actor
    pub fn push_as(
        &mut self,
        role: Role,
        actor_id: Option<String>,
        content: impl Into<String>,
    ) -> &Turn {
        let seq = self.next_seq();
        let idx = self.0.len();
        self.0.push(Turn {
            seq,
            role,
            actor_id,
            content: content.into(),
            ts: Utc::now(),
        });
        &self.0[idx]
    }

    /// All turns
    #[inline]
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    /// Number of turns
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no turns
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Seq of the last turn, zero when empty
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.0.last().map_or(0, |t| t.seq)
    }

    /// Turns with `seq > after`
    pub fn since(&self, after: u64) -> impl Iterator<Item = &Turn> {
        self.0.iter().filter(move |t| t.seq > after)
    }

    /// Student turns with `seq > after`
    #[must_use]
    pub fn student_turns_since(&self, after: u64) -> usize {
        self.since(after).filter(|t| t.role == Role::Student).count()
    }

    /// Student turns in total
    #[must_use]
    pub fn student_turns(&self) -> usize {
        self.student_turns_since(0)
    }

    /// Last turn by `role`
    #[must_use]
    pub fn last_by(&self, role: Role) -> Option<&Turn> {
        self.0.iter().rev().find(|t| t.role == role)
    }

    /// Drop every turn
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Plain-text rendering, one `[seq] role: content` line per turn
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for turn in &self.0 {
            let speaker = match &turn.actor_id {
                Some(actor) => format!("{} ({actor})", turn.role),
                None => turn.role.to_string(),
            };
            out.push_str(&format!("[{}] {speaker}: {}\n", turn.seq, turn.content));
        }
        out
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

impl Validate for Transcript {
    fn validate(&self, v: &mut Violations) {
        let mut previous = 0;
        for (i, turn) in self.0.iter().enumerate() {
            if turn.seq <= previous {
                v.push(
                    format!("[{i}].seq"),
                    format!("seq must be strictly increasing ({} after {previous})", turn.seq),
                );
            }
            previous = turn.seq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check;

    #[test]
    fn push_assigns_increasing_seq() {
        let mut t = Transcript::new();
        assert_eq!(t.push(Role::Student, "hello").seq, 1);
        assert_eq!(t.push(Role::Advisor, "hi").seq, 2);
        assert_eq!(t.student_turns(), 1);
        assert_eq!(t.student_turns_since(1), 0);
        assert_eq!(t.last_seq(), 2);
        assert!(check(&t).is_ok());
    }

    #[test]
    fn rejects_non_monotonic_seq() {
        let ts = Utc::now();
        let turn = |seq| Turn {
            seq,
            role: Role::Student,
            actor_id: None,
            content: "x".into(),
            ts,
        };
        let t = Transcript::from(vec![turn(1), turn(3), turn(3)]);
        let errors = check(&t).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "[2].seq");
    }

    #[test]
    fn text_export_names_actor() {
        let mut t = Transcript::new();
        t.push(Role::Student, "What now?");
        t.push_as(Role::Advisor, Some("cfo".into()), "Cut costs.");
        let text = t.to_text();
        assert_eq!(text, "[1] student: What now?\n[2] advisor (cfo): Cut costs.\n");
    }
}
