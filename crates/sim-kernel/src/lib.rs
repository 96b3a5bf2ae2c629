//! Scenario Kernel
//!
//! Offline tooling over the scenario contracts: validate payloads, compile
//! parsed scenarios, export JSON Schemas and verify persisted sessions.
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_kernel::{validate, Report};
//! use sim_schema::SchemaKind;
//!
//! let report = validate(SchemaKind::DirectorSettings, &payload);
//! println!("{}", report.generate_text());
//! std::process::exit(if report.passed() { 0 } else { 1 });
//! ```

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use sim_agents::ScenarioCompiler;
use sim_blackboard::{keys, Blackboard, Caller};
use sim_core::SessionSnapshot;
use sim_schema::{
    ParsedScenario, SchemaKind, SchemaRegistry, Transcript, Validation, NOT_SPECIFIED,
};
use tracing::{debug, info, warn};

/// Outcome of a check command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// What was checked
    pub subject: String,
    /// Findings, one per line
    pub findings: Vec<String>,
    /// Normalized or derived output
    pub output: Option<Value>,
    passed: bool,
}

impl Report {
    fn new(subject: impl Into<String>, passed: bool) -> Self {
        Self {
            subject: subject.into(),
            findings: Vec::new(),
            output: None,
            passed,
        }
    }

    /// Whether the check passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = format!(
            "{}: {}\n",
            self.subject,
            if self.passed { "PASSED" } else { "FAILED" }
        );
        for finding in &self.findings {
            out.push_str("  - ");
            out.push_str(finding);
            out.push('\n');
        }
        out
    }
}

/// Validate `payload` against the `kind` contract
#[must_use]
pub fn validate(kind: SchemaKind, payload: &Value) -> Report {
    match SchemaRegistry::new().validate(kind, payload) {
        Validation::Valid(normalized) => {
            debug!(%kind, "payload valid");
            let mut report = Report::new(kind.as_str(), true);
            report.output = Some(normalized);
            report
        }
        Validation::Invalid(errors) => {
            warn!(%kind, errors = errors.len(), "payload invalid");
            let mut report = Report::new(kind.as_str(), false);
            report.findings = errors.iter().map(ToString::to_string).collect();
            report
        }
    }
}

/// Repair a raw parser payload and compile it into outline and settings
///
/// # Errors
/// When a compiled artifact fails its contract.
pub fn compile(
    raw: &Value,
    narrative: Option<&str>,
    instructions: Option<&str>,
) -> anyhow::Result<Report> {
    let repaired = ParsedScenario::repair(raw);
    let findings: Vec<String> = repaired.repairs().iter().map(ToString::to_string).collect();
    let parsed = repaired.into_scenario();
    let (outline, settings) = ScenarioCompiler::new()
        .compile_checked(&parsed, narrative, instructions)
        .context("compiled scenario failed validation")?;
    info!(
        goals = outline["goals"].as_array().map_or(0, Vec::len),
        repairs = findings.len(),
        title = parsed.title.as_deref().unwrap_or(NOT_SPECIFIED),
        "scenario compiled"
    );

    let mut report = Report::new("compile", true);
    report.findings = findings;
    report.output = Some(json!({
        "scenario_outline": outline,
        "director_settings": settings,
    }));
    Ok(report)
}

/// JSON Schema of `kind`, or of every contract keyed by name
#[must_use]
pub fn schema(kind: Option<SchemaKind>) -> Value {
    match kind {
        Some(kind) => SchemaRegistry::json_schema(kind),
        None => Value::Object(
            SchemaKind::ALL
                .into_iter()
                .map(|k| (k.as_str().to_string(), SchemaRegistry::json_schema(k)))
                .collect(),
        ),
    }
}

/// Restore a persisted session onto a fresh board and check it
///
/// Restoring verifies the audit chain and re-validates every bound value.
///
/// # Errors
/// When `snapshot` is not a session snapshot at all.
pub fn verify_snapshot(snapshot: Value) -> anyhow::Result<Report> {
    let snapshot: SessionSnapshot =
        serde_json::from_value(snapshot).context("not a session snapshot")?;
    let subject = format!("session {}", snapshot.session_id);
    let audit_len = snapshot.board.audit_log.len();

    let board = match Blackboard::builder()
        .standard_bindings()
        .restore(snapshot.board)
    {
        Ok(board) => board,
        Err(e) => {
            warn!(error = %e, "snapshot rejected");
            let mut report = Report::new(subject, false);
            report.findings.push(e.to_string());
            return Ok(report);
        }
    };

    let mut report = Report::new(subject, true);
    report.findings.push(format!("phase {}", board.phase()));
    report
        .findings
        .push(format!("{audit_len} audit entries, chain intact"));
    report.findings.push(format!("keys: {}", board.keys().join(", ")));
    if let Ok(Some(transcript)) = board.get::<Transcript>(keys::TRANSCRIPT, &Caller::System) {
        report
            .findings
            .push(format!("{} transcript turns", transcript.len()));
    }
    info!(passed = report.passed, audit_len, "snapshot verified");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use sim_blackboard::AgentId;
    use sim_schema::{DirectorSettings, Intensity};
    use sim_test_utils::*;

    #[test]
    fn validate_reports_field_errors() {
        let report = validate(SchemaKind::DirectorSettings, &json!({"intensity": "loud"}));
        assert!(!report.passed());
        assert!(!report.findings.is_empty());
        assert!(report.generate_text().contains("FAILED"));

        let ok = validate(
            SchemaKind::DirectorSettings,
            &serde_json::to_value(DirectorSettings::default()).unwrap(),
        );
        assert!(ok.passed());
        assert!(ok.output.is_some());
    }

    #[test]
    fn compile_produces_both_artifacts() {
        let report = compile(&sample_parse_response(), Some(SAMPLE_NARRATIVE), None).unwrap();
        let output = report.output.unwrap();
        assert_eq!(output["scenario_outline"]["goals"].as_array().unwrap().len(), 3);
        assert!(validate(SchemaKind::DirectorSettings, &output["director_settings"]).passed());
    }

    #[test]
    fn schema_exports_every_kind() {
        let all = schema(None);
        assert_eq!(all.as_object().unwrap().len(), SchemaKind::ALL.len());
        assert!(schema(Some(SchemaKind::Transcript)).is_object());
    }

    fn snapshot_of(board: &Blackboard) -> Value {
        serde_json::to_value(SessionSnapshot {
            session_id: ulid::Ulid::new(),
            taken_at: Utc::now(),
            board: board.snapshot(),
            documents: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn verify_snapshot_detects_tampering() {
        let outline = single_goal_outline();
        let board = running_board(&outline, &settings_for(&outline, Intensity::Assist, 3));
        board
            .broadcast("board_meeting", json!({}), &AgentId::new(FIXTURE_AGENT))
            .unwrap();

        let intact = verify_snapshot(snapshot_of(&board)).unwrap();
        assert!(intact.passed(), "{}", intact.generate_text());

        let mut tampered = snapshot_of(&board);
        tampered["board"]["audit_log"][0]["agent"] = json!("intruder");
        let report = verify_snapshot(tampered).unwrap();
        assert!(!report.passed());

        assert!(verify_snapshot(json!({"not": "a snapshot"})).is_err());
    }
}
