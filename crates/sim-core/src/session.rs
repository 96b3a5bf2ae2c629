//! One simulation session
//!
//! A session owns a blackboard, a director and the advisor conversation.
//! Every operation that touches the conversation runs under one fair async
//! lock, so concurrent requests queue behind the turn in flight. A turn
//! commits only after the advisor answers: a cancelled or timed-out turn
//! leaves the transcript untouched.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use sim_agents::{
    AgentRunner, ChatMessage, LlmClient, LlmError, LlmRequest, ParserAgent, Purpose,
    ScenarioCompiler, TokenUsage,
};
use sim_blackboard::{keys, AgentId, Blackboard, Caller, Grant, Phase};
use sim_director::{Director, Evaluation, CONVERSATION_CLEARED, DIRECTOR_EVALUATED};
use sim_schema::{
    DirectorSettings, DirectorState, Intervention, InterventionKind, Role, ScenarioOutline,
    SchemaVersion, Transcript,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionId};
use crate::store::{Document, DocumentStore, SessionSnapshot};

/// Agent id the runtime writes under
pub const SESSION_AGENT: &str = "session";
/// Broadcast once the session enters RUNNING
pub const SESSION_STARTED: &str = "session_started";
/// Broadcast after an outline edit
pub const SCENARIO_EDITED: &str = "scenario_edited";
/// Broadcast just before the session terminates
pub const SESSION_CLOSED: &str = "session_closed";

/// Characters of each attached document shown to the advisor
const DOCUMENT_CHARS: usize = 6_000;

const ADVISOR_PERSONA: &str = "You are the advisor in an educational business simulation. Stay \
in character, ground every answer in the case, and help the student reason through decisions \
rather than handing them answers.";

/// How to start a session from an instructor's narrative
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSetup {
    /// Case narrative
    pub narrative: String,
    /// Behavioral instructions for the advisor
    pub instructions: Option<String>,
    /// Director settings replacing the compiled defaults
    pub settings: Option<DirectorSettings>,
    /// Documents to attach
    pub documents: Vec<Ulid>,
}

impl SessionSetup {
    /// Setup for `narrative`
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            ..Self::default()
        }
    }

    /// With advisor instructions
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// With director settings
    #[must_use]
    pub fn with_settings(mut self, settings: DirectorSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// With an attached document
    #[must_use]
    pub fn with_document(mut self, id: Ulid) -> Self {
        self.documents.push(id);
        self
    }
}

/// A partial outline edit; at least one field must be set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScenarioEdit {
    /// Replacement narrative
    pub scenario: Option<String>,
    /// Replacement instructions
    pub instructions: Option<String>,
}

/// Result of one student turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Advisor reply
    pub reply: String,
    /// Transcript seq of the student message
    pub student_seq: u64,
    /// Transcript seq of the advisor reply
    pub advisor_seq: u64,
    /// Whether attached documents were part of the advisor context
    pub document_context_used: bool,
    /// Kind of the intervention delivered with this turn
    pub intervention_applied: Option<InterventionKind>,
    /// Director evaluation that followed the turn
    pub evaluation: Option<Evaluation>,
    /// Advisor call usage
    pub usage: TokenUsage,
}

/// Read-only picture of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    /// Session id
    pub id: SessionId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Blackboard phase
    pub phase: Phase,
    /// Compiled scenario
    pub outline: Option<ScenarioOutline>,
    /// Director settings
    pub settings: Option<DirectorSettings>,
    /// Director state
    pub state: Option<DirectorState>,
    /// Conversation
    pub transcript: Transcript,
    /// Intervention waiting for the next advisor turn
    pub pending_intervention: Option<Intervention>,
    /// Attached documents
    pub documents: Vec<Ulid>,
    /// Audit log length
    pub audit_len: u64,
}

/// Export encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Pretty JSON of outline title, state and transcript
    #[default]
    Json,
    /// Plain transcript
    Text,
}

impl FromStr for ExportFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(SessionError::InvalidRequest(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    session_id: SessionId,
    exported_at: DateTime<Utc>,
    title: Option<&'a str>,
    schema_version: Option<SchemaVersion>,
    state: Option<&'a DirectorState>,
    transcript: &'a Transcript,
}

/// A running simulation
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    agent: AgentId,
    board: Arc<Blackboard>,
    llm: Arc<dyn LlmClient>,
    director: Director,
    documents: Arc<dyn DocumentStore>,
    attached: RwLock<Vec<Ulid>>,
    config: SessionConfig,
    turn: Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("board", &self.board)
            .field("director", &self.director)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Footprint of the runtime itself
    #[must_use]
    pub fn grant() -> Grant {
        Grant::new().reads_all().writes([
            keys::RAW_INPUT,
            keys::INSTRUCTIONS,
            keys::SCENARIO_OUTLINE,
            keys::DIRECTOR_SETTINGS,
            keys::DIRECTOR_STATE,
            keys::TRANSCRIPT,
            keys::PENDING_INTERVENTION,
        ])
    }

    fn assemble(
        id: SessionId,
        board: Arc<Blackboard>,
        llm: Arc<dyn LlmClient>,
        documents: Arc<dyn DocumentStore>,
        config: SessionConfig,
    ) -> Self {
        let agent = AgentId::new(SESSION_AGENT);
        board.grant_permission(agent.clone(), Self::grant());
        let director = Director::new(board.clone(), llm.clone(), config.models.director.clone());
        director.register();
        Self {
            id,
            created_at: Utc::now(),
            agent,
            board,
            llm,
            director,
            documents,
            attached: RwLock::new(Vec::new()),
            config,
            turn: Mutex::new(()),
        }
    }

    /// Parse and compile `setup.narrative`, then start the session
    ///
    /// # Errors
    /// Parser and compiler failures as [`SessionError::Agent`]; unknown
    /// documents as [`SessionError::Store`]; a failed RUNNING transition as
    /// [`SessionError::Board`].
    pub async fn start(
        id: SessionId,
        setup: SessionSetup,
        llm: Arc<dyn LlmClient>,
        documents: Arc<dyn DocumentStore>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if setup.narrative.trim().is_empty() {
            return Err(SessionError::InvalidRequest("scenario narrative is empty".into()));
        }
        let board = Arc::new(Blackboard::standard()?);
        let session = Self::assemble(id, board, llm, documents, config);
        for doc in &setup.documents {
            session.documents.get(*doc).await?;
        }
        *session.attached.write() = setup.documents;

        session
            .board
            .write(keys::RAW_INPUT, Value::String(setup.narrative), &session.agent)?;
        if let Some(instructions) = setup.instructions {
            session
                .board
                .write(keys::INSTRUCTIONS, Value::String(instructions), &session.agent)?;
        }

        let runner = AgentRunner::new(session.board.clone(), session.llm.clone());
        let parser = ParserAgent::new(session.config.models.parser.clone());
        let compiler = ScenarioCompiler::new();
        runner.register(&parser);
        runner.register(&compiler);
        runner.execute(&parser).await?;
        runner.execute(&compiler).await?;

        if let Some(settings) = setup.settings {
            session
                .board
                .put(keys::DIRECTOR_SETTINGS, &settings, &session.agent)?;
        }
        session.activate()?;
        Ok(session)
    }

    /// Start a session from an already compiled outline
    ///
    /// # Errors
    /// [`SessionError::Board`] when the outline or settings are rejected or
    /// the RUNNING preconditions fail.
    pub fn from_outline(
        id: SessionId,
        outline: &ScenarioOutline,
        settings: &DirectorSettings,
        llm: Arc<dyn LlmClient>,
        documents: Arc<dyn DocumentStore>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let board = Arc::new(Blackboard::standard()?);
        let session = Self::assemble(id, board, llm, documents, config);
        session
            .board
            .put(keys::SCENARIO_OUTLINE, outline, &session.agent)?;
        session
            .board
            .put(keys::DIRECTOR_SETTINGS, settings, &session.agent)?;
        session.activate()?;
        Ok(session)
    }

    /// Rebuild a session from a snapshot; the audit chain must verify
    ///
    /// # Errors
    /// [`SessionError::Board`] when the chain or a stored value is invalid.
    pub fn restore(
        snapshot: SessionSnapshot,
        llm: Arc<dyn LlmClient>,
        documents: Arc<dyn DocumentStore>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let board = Blackboard::builder()
            .standard_bindings()
            .restore(snapshot.board)?;
        let session = Self::assemble(snapshot.session_id, Arc::new(board), llm, documents, config);
        *session.attached.write() = snapshot.documents;
        info!(session = %session.id, phase = %session.board.phase(), "session restored");
        Ok(session)
    }

    /// BUILDING -> RUNNING with a fresh director state and transcript
    fn activate(&self) -> Result<(), SessionError> {
        self.board.transition(Phase::Running)?;
        let outline = self.outline()?;
        self.board.put(
            keys::DIRECTOR_STATE,
            &DirectorState::initial(&outline),
            &self.agent,
        )?;
        self.board
            .put(keys::TRANSCRIPT, &Transcript::new(), &self.agent)?;
        self.board.broadcast(
            SESSION_STARTED,
            json!({ "session_id": self.id.to_string(), "goals": outline.goals.len() }),
            &self.agent,
        )?;
        info!(session = %self.id, goals = outline.goals.len(), "session running");
        Ok(())
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session's blackboard
    #[must_use]
    pub fn board(&self) -> &Arc<Blackboard> {
        &self.board
    }

    /// The session's director
    #[must_use]
    pub fn director(&self) -> &Director {
        &self.director
    }

    fn caller(&self) -> Caller {
        Caller::from(&self.agent)
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        match self.board.phase() {
            Phase::Running => Ok(()),
            phase => Err(SessionError::NotRunning(phase)),
        }
    }

    fn outline(&self) -> Result<ScenarioOutline, SessionError> {
        self.board
            .get(keys::SCENARIO_OUTLINE, &self.caller())?
            .ok_or_else(|| SessionError::InvalidRequest("session has no scenario outline".into()))
    }

    fn transcript(&self) -> Result<Transcript, SessionError> {
        Ok(self
            .board
            .get(keys::TRANSCRIPT, &self.caller())?
            .unwrap_or_default())
    }

    async fn attached_documents(&self) -> Result<Vec<Document>, SessionError> {
        let ids = self.attached.read().clone();
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            documents.push(self.documents.get(id).await?);
        }
        Ok(documents)
    }

    /// Attach a stored document as advisor context
    ///
    /// # Errors
    /// [`SessionError::Store`] for an unknown document.
    pub async fn attach_document(&self, id: Ulid) -> Result<(), SessionError> {
        self.documents.get(id).await?;
        let mut attached = self.attached.write();
        if !attached.contains(&id) {
            attached.push(id);
        }
        Ok(())
    }

    /// Detach a document; returns whether it was attached
    pub fn detach_document(&self, id: Ulid) -> bool {
        let mut attached = self.attached.write();
        let before = attached.len();
        attached.retain(|d| *d != id);
        attached.len() != before
    }

    /// Post a student message and get the advisor's reply
    ///
    /// A pending intervention is delivered as a hidden system-prompt addendum
    /// and consumed. When auto-direction is on, the director runs after the
    /// reply is committed; if it fails the turn is still returned, with no
    /// evaluation.
    ///
    /// # Errors
    /// [`SessionError::InvalidRequest`] for a blank message,
    /// [`SessionError::NotRunning`] outside RUNNING,
    /// [`SessionError::TranscriptFull`] at the cap,
    /// [`SessionError::TurnTimeout`] or [`SessionError::Llm`] when the advisor
    /// fails; none of these commit anything.
    pub async fn post_student(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidRequest("student message is empty".into()));
        }
        let _turn = self.turn.lock().await;
        self.ensure_running()?;

        let outline = self.outline()?;
        let mut transcript = self.transcript()?;
        let limit = self.config.max_transcript_turns;
        if transcript.len() + 2 > limit {
            return Err(SessionError::TranscriptFull { limit });
        }
        let pending: Option<Intervention> =
            self.board.get(keys::PENDING_INTERVENTION, &self.caller())?;
        let documents = self.attached_documents().await?;

        let request = advisor_request(
            &self.config.models.advisor,
            &outline,
            &transcript,
            text,
            &documents,
            pending.as_ref(),
        );
        debug!(session = %self.id, prompt_chars = request.prompt_chars(), "advisor call");
        let ms = self.config.turn_timeout_ms;
        let response = tokio::time::timeout(Duration::from_millis(ms), self.llm.complete(request))
            .await
            .map_err(|_| SessionError::TurnTimeout { ms })??;
        let reply = response.value.trim().to_string();
        if reply.is_empty() {
            return Err(LlmError::Malformed("empty advisor reply".into()).into());
        }

        let student_seq = transcript.push(Role::Student, text).seq;
        let advisor_seq = transcript.push(Role::Advisor, reply.as_str()).seq;
        self.board.put(keys::TRANSCRIPT, &transcript, &self.agent)?;
        if pending.is_some() {
            self.board.remove(keys::PENDING_INTERVENTION, &self.agent)?;
        }
        info!(
            session = %self.id,
            student_seq,
            advisor_seq,
            intervention = pending.as_ref().map(|i| i.kind().as_str()),
            "turn committed"
        );

        // turn already committed
        let evaluation = if self.config.auto_direct {
            match self.direct(false).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(session = %self.id, error = %e, "director failed after turn commit");
                    None
                }
            }
        } else {
            None
        };

        Ok(TurnOutcome {
            reply,
            student_seq,
            advisor_seq,
            document_context_used: !documents.is_empty(),
            intervention_applied: pending.map(|i| i.kind()),
            evaluation,
            usage: response.usage,
        })
    }

    async fn direct(&self, force: bool) -> Result<Option<Evaluation>, SessionError> {
        let result = if force {
            self.director.evaluate().await
        } else {
            self.director.maybe_evaluate().await
        };
        match result {
            Ok(evaluation) => Ok(evaluation),
            Err(e) if e.degrades() => {
                warn!(session = %self.id, error = %e, "director degraded");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the director if its cadence is due
    ///
    /// # Errors
    /// Blackboard and schema failures from the director.
    pub async fn maybe_run_director(&self) -> Result<Option<Evaluation>, SessionError> {
        let _turn = self.turn.lock().await;
        self.direct(false).await
    }

    /// Run the director now regardless of cadence
    ///
    /// # Errors
    /// As [`Session::maybe_run_director`].
    pub async fn force_director(&self) -> Result<Option<Evaluation>, SessionError> {
        let _turn = self.turn.lock().await;
        self.direct(true).await
    }

    /// Overwrite narrative and/or instructions, bumping the outline's patch
    /// version; director progress is kept
    ///
    /// # Errors
    /// [`SessionError::InvalidRequest`] when the edit is empty;
    /// [`SessionError::NotRunning`] outside RUNNING.
    pub async fn edit(&self, edit: ScenarioEdit) -> Result<SchemaVersion, SessionError> {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
        if blank(&edit.scenario) && blank(&edit.instructions) {
            return Err(SessionError::InvalidRequest(
                "an edit needs a scenario or instructions".into(),
            ));
        }
        let _turn = self.turn.lock().await;
        self.ensure_running()?;

        let mut outline = self.outline()?;
        let mut fields = Vec::new();
        if let Some(narrative) = edit.scenario.filter(|s| !s.trim().is_empty()) {
            outline.narrative = Some(narrative);
            fields.push("scenario");
        }
        let instructions = edit.instructions.filter(|s| !s.trim().is_empty());
        if let Some(instructions) = &instructions {
            outline.instructions = Some(instructions.clone());
            fields.push("instructions");
        }
        outline.schema_version = outline.schema_version.bump_patch();
        self.board
            .put(keys::SCENARIO_OUTLINE, &outline, &self.agent)?;
        // mirrored only once the outline carrying it is accepted
        if let Some(instructions) = instructions {
            self.board
                .write(keys::INSTRUCTIONS, Value::String(instructions), &self.agent)?;
        }
        self.board.broadcast(
            SCENARIO_EDITED,
            json!({ "fields": fields, "schema_version": outline.schema_version.to_string() }),
            &self.agent,
        )?;
        info!(session = %self.id, version = %outline.schema_version, ?fields, "scenario edited");
        Ok(outline.schema_version)
    }

    /// Replace the narrative
    ///
    /// # Errors
    /// As [`Session::edit`].
    pub async fn edit_scenario(&self, narrative: impl Into<String>) -> Result<SchemaVersion, SessionError> {
        self.edit(ScenarioEdit {
            scenario: Some(narrative.into()),
            instructions: None,
        })
        .await
    }

    /// Replace the advisor instructions
    ///
    /// # Errors
    /// As [`Session::edit`].
    pub async fn edit_instructions(
        &self,
        instructions: impl Into<String>,
    ) -> Result<SchemaVersion, SessionError> {
        self.edit(ScenarioEdit {
            scenario: None,
            instructions: Some(instructions.into()),
        })
        .await
    }

    /// Truncate the conversation and reset director progress
    ///
    /// # Errors
    /// [`SessionError::NotRunning`] outside RUNNING.
    pub async fn clear_conversation(&self) -> Result<(), SessionError> {
        let _turn = self.turn.lock().await;
        self.ensure_running()?;

        let outline = self.outline()?;
        let mut state: DirectorState = self
            .board
            .get(keys::DIRECTOR_STATE, &self.caller())?
            .unwrap_or_else(|| DirectorState::initial(&outline));
        state.reset_progress();
        state.sync_goals(&outline);

        self.board
            .put(keys::TRANSCRIPT, &Transcript::new(), &self.agent)?;
        self.board.put(keys::DIRECTOR_STATE, &state, &self.agent)?;
        self.board.remove(keys::PENDING_INTERVENTION, &self.agent)?;
        self.board
            .broadcast(CONVERSATION_CLEARED, Value::Null, &self.agent)?;
        info!(session = %self.id, "conversation cleared");
        Ok(())
    }

    /// Broadcast a scenario event for the director's event cadence
    ///
    /// # Errors
    /// [`SessionError::InvalidRequest`] for blank or reserved names.
    pub async fn signal_event(&self, name: &str, payload: Value) -> Result<u64, SessionError> {
        let name = name.trim();
        let reserved = [
            DIRECTOR_EVALUATED,
            CONVERSATION_CLEARED,
            SESSION_STARTED,
            SESSION_CLOSED,
            SCENARIO_EDITED,
        ];
        if name.is_empty() || reserved.contains(&name) {
            return Err(SessionError::InvalidRequest(format!(
                "'{name}' cannot be signalled"
            )));
        }
        let _turn = self.turn.lock().await;
        self.ensure_running()?;
        let seq = self.board.broadcast(name, payload, &self.agent)?;
        debug!(session = %self.id, event = name, seq, "scenario event");
        Ok(seq)
    }

    /// Current state of the session
    ///
    /// # Errors
    /// [`SessionError::Board`] when a stored value no longer decodes.
    pub fn view(&self) -> Result<SessionView, SessionError> {
        let system = Caller::System;
        Ok(SessionView {
            id: self.id,
            created_at: self.created_at,
            phase: self.board.phase(),
            outline: self.board.get(keys::SCENARIO_OUTLINE, &system)?,
            settings: self.board.get(keys::DIRECTOR_SETTINGS, &system)?,
            state: self.board.get(keys::DIRECTOR_STATE, &system)?,
            transcript: self
                .board
                .get(keys::TRANSCRIPT, &system)?
                .unwrap_or_default(),
            pending_intervention: self.board.get(keys::PENDING_INTERVENTION, &system)?,
            documents: self.attached.read().clone(),
            audit_len: self.board.last_seq(),
        })
    }

    /// Export the conversation
    ///
    /// # Errors
    /// [`SessionError::Encode`] when JSON encoding fails.
    pub fn export(&self, format: ExportFormat) -> Result<String, SessionError> {
        let view = self.view()?;
        let title = view.outline.as_ref().and_then(|o| o.title.as_deref());
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&ExportDocument {
                session_id: self.id,
                exported_at: Utc::now(),
                title,
                schema_version: view.outline.as_ref().map(|o| o.schema_version),
                state: view.state.as_ref(),
                transcript: &view.transcript,
            })?),
            ExportFormat::Text => {
                let mut out = format!(
                    "Scenario: {}\nSession: {}\nExported: {}\n\n",
                    title.unwrap_or("untitled"),
                    self.id,
                    Utc::now().to_rfc3339()
                );
                out.push_str(&view.transcript.to_text());
                Ok(out)
            }
        }
    }

    /// Serializable copy of the session
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            taken_at: Utc::now(),
            board: self.board.snapshot(),
            documents: self.attached.read().clone(),
        }
    }

    /// Terminate the session; later writes are rejected
    ///
    /// # Errors
    /// [`SessionError::Board`] when the session is not RUNNING.
    pub async fn close(&self) -> Result<(), SessionError> {
        let _turn = self.turn.lock().await;
        self.ensure_running()?;
        let transcript = self.transcript()?;
        self.board.broadcast(
            SESSION_CLOSED,
            json!({ "turns": transcript.len() }),
            &self.agent,
        )?;
        self.board.transition(Phase::Terminated)?;
        info!(session = %self.id, turns = transcript.len(), "session closed");
        Ok(())
    }
}

fn document_context(documents: &[Document]) -> String {
    let mut out = String::from("Reference documents available to the advisor:");
    for doc in documents {
        let excerpt: String = doc.content.chars().take(DOCUMENT_CHARS).collect();
        out.push_str("\n\n## ");
        out.push_str(&doc.name);
        out.push('\n');
        out.push_str(&excerpt);
    }
    out
}

/// Advisor prompt: persona, instructions, narrative, documents, hidden
/// addendum, then the conversation so far and the new message
fn advisor_request(
    model: &str,
    outline: &ScenarioOutline,
    transcript: &Transcript,
    student_text: &str,
    documents: &[Document],
    pending: Option<&Intervention>,
) -> LlmRequest {
    let mut request = LlmRequest::new(Purpose::Advise, model).system(ADVISOR_PERSONA);
    if let Some(instructions) = &outline.instructions {
        request = request.system(format!("Instructions:\n{instructions}"));
    }
    if let Some(narrative) = &outline.narrative {
        request = request.system(format!("Case:\n{narrative}"));
    }
    if !documents.is_empty() {
        request = request.system(document_context(documents));
    }
    if let Some(intervention) = pending {
        request = request.system(intervention.addendum());
    }
    let history = transcript.turns().iter().filter_map(|t| match t.role {
        Role::Student => Some(ChatMessage::user(t.content.as_str())),
        Role::Advisor => Some(ChatMessage::assistant(t.content.as_str())),
        Role::System | Role::DirectorNote => None,
    });
    request.messages(history).user(student_text)
}
