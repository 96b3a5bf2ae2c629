//! The blackboard
//!
//! All operations are synchronous and serialized by one internal lock, so
//! operations commit in call order and audit `seq` follows commit order.
//! Broadcast subscribers run after the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sim_schema::{DirectorSettings, ScenarioOutline, SchemaKind, SchemaRegistry, ValueHash};
use tracing::{debug, info, warn};

use crate::audit::{verify_chain, AuditAction, AuditEntry, AuditFilter, AuditLog, Record};
use crate::error::BoardError;
use crate::keys::{DIRECTOR_SETTINGS, SCENARIO_OUTLINE, STANDARD_BINDINGS};
use crate::permission::Grant;
use crate::phase::{validate_transition, Phase, PhasePolicy};
use crate::types::{Access, AgentId, Caller};

/// A stored value with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Current value
    pub value: Value,
    /// Agent that wrote it
    pub writer: AgentId,
    /// Audit seq of the write
    pub seq: u64,
    /// Wall-clock time of the write
    pub ts: DateTime<Utc>,
    /// Contract bound to the key, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaKind>,
}

/// A broadcast delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    /// Audit seq of the broadcast
    pub seq: u64,
    /// Event name
    pub event: String,
    /// Event payload
    pub payload: Value,
    /// Broadcasting agent
    pub agent: AgentId,
    /// Commit time
    pub ts: DateTime<Utc>,
}

/// Broadcast callback
pub type Subscriber = Arc<dyn Fn(&BoardEvent) + Send + Sync>;

/// Handle returned by [`Blackboard::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Serializable copy of a blackboard's contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Phase at snapshot time
    pub phase: Phase,
    /// Stored entries
    pub entries: BTreeMap<String, Entry>,
    /// Grants per agent
    pub grants: BTreeMap<AgentId, Grant>,
    /// Full audit log
    pub audit_log: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
struct BoardState {
    phase: Phase,
    entries: HashMap<String, Entry>,
    grants: HashMap<AgentId, Grant>,
    audit: AuditLog,
}

/// Configures and builds a [`Blackboard`]
#[derive(Debug, Clone, Default)]
pub struct BlackboardBuilder {
    bindings: Vec<(String, SchemaKind)>,
    policy: PhasePolicy,
    registry: SchemaRegistry,
}

impl BlackboardBuilder {
    /// Builder with no bindings and the default phase policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to a contract; writes to it are validated and normalized
    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, kind: SchemaKind) -> Self {
        self.bindings.push((key.into(), kind));
        self
    }

    /// Bind every well-known key to its contract
    #[must_use]
    pub fn standard_bindings(mut self) -> Self {
        for (key, kind) in STANDARD_BINDINGS {
            self.bindings.push((key.to_string(), kind));
        }
        self
    }

    /// Replace the phase policy
    #[inline]
    #[must_use]
    pub fn policy(mut self, policy: PhasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the schema registry
    #[inline]
    #[must_use]
    pub fn registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build an empty blackboard in IDLE
    ///
    /// # Errors
    /// Returns [`BoardError::DuplicateBinding`] when a key is bound twice.
    pub fn build(self) -> Result<Blackboard, BoardError> {
        let mut bindings = HashMap::with_capacity(self.bindings.len());
        for (key, kind) in self.bindings {
            if bindings.insert(key.clone(), kind).is_some() {
                return Err(BoardError::DuplicateBinding(key));
            }
        }
        Ok(Blackboard {
            state: Mutex::new(BoardState::default()),
            bindings,
            policy: self.policy,
            registry: self.registry,
            subscribers: RwLock::new(Vec::new()),
            next_subscription: Mutex::new(0),
        })
    }

    /// Build a blackboard holding `snapshot`
    ///
    /// # Errors
    /// Returns [`BoardError::IntegrityViolation`] when the audit chain does not
    /// verify, [`BoardError::Schema`] when a stored value no longer satisfies
    /// its binding, or any error from [`BlackboardBuilder::build`].
    pub fn restore(self, snapshot: BoardSnapshot) -> Result<Blackboard, BoardError> {
        verify_chain(&snapshot.audit_log)?;
        let board = self.build()?;
        for (key, entry) in &snapshot.entries {
            if let Some(kind) = board.bindings.get(key) {
                board
                    .registry
                    .strict(*kind, &entry.value)
                    .map_err(|source| BoardError::Schema {
                        key: key.clone(),
                        source,
                    })?;
            }
        }
        {
            let mut state = board.state.lock();
            state.phase = snapshot.phase;
            state.entries = snapshot.entries.into_iter().collect();
            state.grants = snapshot.grants.into_iter().collect();
            state.audit = AuditLog::from_entries(snapshot.audit_log);
        }
        info!(phase = %snapshot.phase, "blackboard restored");
        Ok(board)
    }
}

/// Permissioned, phase-gated, audited key-value space
pub struct Blackboard {
    state: Mutex<BoardState>,
    bindings: HashMap<String, SchemaKind>,
    policy: PhasePolicy,
    registry: SchemaRegistry,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: Mutex<u64>,
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Blackboard")
            .field("phase", &state.phase)
            .field("keys", &state.entries.len())
            .field("audit_len", &state.audit.entries().len())
            .finish_non_exhaustive()
    }
}

fn rejected(err: BoardError) -> BoardError {
    warn!(error = %err, "blackboard operation rejected");
    err
}

impl Blackboard {
    /// Start configuring a blackboard
    #[inline]
    #[must_use]
    pub fn builder() -> BlackboardBuilder {
        BlackboardBuilder::new()
    }

    /// Blackboard with the standard bindings and default policy
    ///
    /// # Errors
    /// Never fails for the standard bindings; kept fallible for symmetry with
    /// [`BlackboardBuilder::build`].
    pub fn standard() -> Result<Self, BoardError> {
        Self::builder().standard_bindings().build()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Contract bound to `key`
    #[must_use]
    pub fn binding(&self, key: &str) -> Option<SchemaKind> {
        self.bindings.get(key).copied()
    }

    /// Registry used for bound keys
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Grant permissions to `agent`, unioned with any existing grant
    pub fn grant_permission(&self, agent: impl Into<AgentId>, grant: Grant) {
        let agent = agent.into();
        let mut state = self.state.lock();
        let payload = serde_json::to_value(&grant).ok();
        state.grants.entry(agent.clone()).or_default().merge(grant);
        state.audit.append(
            AuditAction::Grant,
            Record {
                agent: Some(agent.clone()),
                payload,
                ..Record::default()
            },
        );
        debug!(agent = %agent, "permission granted");
    }

    /// Effective grant of `agent`
    #[must_use]
    pub fn grant_of(&self, agent: &AgentId) -> Option<Grant> {
        self.state.lock().grants.get(agent).cloned()
    }

    /// Read `key`
    ///
    /// Agent reads are audited; system reads are not.
    ///
    /// # Errors
    /// Returns [`BoardError::PermissionDenied`] when an agent caller lacks
    /// `key` in its `reads`.
    pub fn read(&self, key: &str, caller: &Caller) -> Result<Option<Value>, BoardError> {
        let mut state = self.state.lock();
        let value = state.entries.get(key).map(|e| e.value.clone());
        if let Caller::Agent(agent) = caller {
            if !state.grants.get(agent).is_some_and(|g| g.can_read(key)) {
                return Err(rejected(BoardError::PermissionDenied {
                    agent: agent.clone(),
                    key: key.to_string(),
                    access: Access::Read,
                }));
            }
            state.audit.append(
                AuditAction::Read,
                Record {
                    agent: Some(agent.clone()),
                    key: Some(key.to_string()),
                    after_hash: value.as_ref().map(ValueHash::of_value),
                    ..Record::default()
                },
            );
        }
        Ok(value)
    }

    /// Read `key` and decode it as `T`
    ///
    /// # Errors
    /// As [`Blackboard::read`], plus [`BoardError::Decode`] when the stored
    /// value does not decode.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        caller: &Caller,
    ) -> Result<Option<T>, BoardError> {
        self.read(key, caller)?
            .map(|v| {
                serde_json::from_value(v).map_err(|e| BoardError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Stored entry with provenance, read as the system
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<Entry> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Whether `key` holds a value
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Stored keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Write `value` to `key` as `agent`, returning the audit seq
    ///
    /// Bound keys store the normalized value. The first accepted write moves
    /// an IDLE board to BUILDING.
    ///
    /// # Errors
    /// [`BoardError::PermissionDenied`] when `key ∉ writes ∖ preserves`,
    /// [`BoardError::PhaseViolation`] when the phase forbids `key`, or
    /// [`BoardError::Schema`] when the bound contract rejects `value`.
    pub fn write(&self, key: &str, value: Value, agent: &AgentId) -> Result<u64, BoardError> {
        let schema = self.bindings.get(key).copied();
        let mut state = self.state.lock();
        self.check_write(&state, key, agent)?;

        let value = match schema {
            Some(kind) => self.registry.strict(kind, &value).map_err(|source| {
                rejected(BoardError::Schema {
                    key: key.to_string(),
                    source,
                })
            })?,
            None => value,
        };

        if state.phase == Phase::Idle {
            Self::change_phase(&mut state, Phase::Building, Some(agent.clone()));
        }

        let before_hash = state.entries.get(key).map(|e| ValueHash::of_value(&e.value));
        let after_hash = ValueHash::of_value(&value);
        let seq = state
            .audit
            .append(
                AuditAction::Write,
                Record {
                    agent: Some(agent.clone()),
                    key: Some(key.to_string()),
                    before_hash,
                    after_hash: Some(after_hash),
                    payload: Some(value.clone()),
                    ..Record::default()
                },
            )
            .seq;
        let ts = Utc::now();
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                writer: agent.clone(),
                seq,
                ts,
                schema,
            },
        );
        debug!(key, agent = %agent, seq, "write committed");
        Ok(seq)
    }

    /// Encode `value` and write it
    ///
    /// # Errors
    /// As [`Blackboard::write`], plus [`BoardError::Decode`] if `value` does
    /// not serialize.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, agent: &AgentId) -> Result<u64, BoardError> {
        let value = serde_json::to_value(value).map_err(|e| BoardError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.write(key, value, agent)
    }

    /// Remove `key` as `agent`, returning the previous value
    ///
    /// Audited as a write with no after-hash. Removing an absent key is a
    /// no-op and leaves no record.
    ///
    /// # Errors
    /// Same permission and phase rules as [`Blackboard::write`].
    pub fn remove(&self, key: &str, agent: &AgentId) -> Result<Option<Value>, BoardError> {
        let mut state = self.state.lock();
        self.check_write(&state, key, agent)?;
        let Some(previous) = state.entries.remove(key) else {
            return Ok(None);
        };
        state.audit.append(
            AuditAction::Write,
            Record {
                agent: Some(agent.clone()),
                key: Some(key.to_string()),
                before_hash: Some(ValueHash::of_value(&previous.value)),
                ..Record::default()
            },
        );
        debug!(key, agent = %agent, "key removed");
        Ok(Some(previous.value))
    }

    /// Record `event` and deliver it to every subscriber
    ///
    /// # Errors
    /// [`BoardError::PermissionDenied`] when `agent` holds no grant, or
    /// [`BoardError::PhaseViolation`] once TERMINATED.
    pub fn broadcast(&self, event: &str, payload: Value, agent: &AgentId) -> Result<u64, BoardError> {
        let board_event = {
            let mut state = self.state.lock();
            if !state.grants.contains_key(agent) {
                return Err(rejected(BoardError::PermissionDenied {
                    agent: agent.clone(),
                    key: event.to_string(),
                    access: Access::Broadcast,
                }));
            }
            if state.phase == Phase::Terminated {
                return Err(rejected(BoardError::phase(
                    state.phase,
                    format!("broadcast '{event}'"),
                )));
            }
            let entry = state.audit.append(
                AuditAction::Broadcast,
                Record {
                    agent: Some(agent.clone()),
                    event: Some(event.to_string()),
                    payload: Some(payload.clone()),
                    ..Record::default()
                },
            );
            BoardEvent {
                seq: entry.seq,
                event: event.to_string(),
                payload,
                agent: agent.clone(),
                ts: entry.ts,
            }
        };

        info!(event, agent = %agent, seq = board_event.seq, "broadcast");
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(&board_event);
        }
        Ok(board_event.seq)
    }

    /// Register a broadcast subscriber
    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = {
            let mut next = self.next_subscription.lock();
            *next += 1;
            SubscriptionId(*next)
        };
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Move to `to`
    ///
    /// Entering RUNNING requires a valid `scenario_outline` and
    /// `director_settings`, and every targeted goal must exist in the outline.
    ///
    /// # Errors
    /// [`BoardError::PhaseViolation`] for illegal transitions or unmet
    /// preconditions.
    pub fn transition(&self, to: Phase) -> Result<(), BoardError> {
        let mut state = self.state.lock();
        let from = state.phase;
        validate_transition(from, to).map_err(rejected)?;
        if to == Phase::Running {
            self.check_ready(&state).map_err(rejected)?;
        }
        Self::change_phase(&mut state, to, None);
        Ok(())
    }

    /// Copy of the audit entries selected by `filter`
    #[must_use]
    pub fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.state
            .lock()
            .audit
            .entries()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Seq of the latest audit entry
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.state.lock().audit.last_seq()
    }

    /// Verify the audit hash chain
    ///
    /// # Errors
    /// Returns [`BoardError::IntegrityViolation`] naming the first bad entry.
    pub fn verify_integrity(&self) -> Result<(), BoardError> {
        self.state.lock().audit.verify_integrity()
    }

    /// Values written to `key` over time, oldest first; `None` marks a removal
    #[must_use]
    pub fn value_history(&self, key: &str) -> Vec<(u64, Option<Value>)> {
        let filter = AuditFilter::all().action(AuditAction::Write).key(key);
        self.state
            .lock()
            .audit
            .entries()
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| (e.seq, e.payload.clone()))
            .collect()
    }

    /// Serializable copy of the whole board
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.lock();
        BoardSnapshot {
            phase: state.phase,
            entries: state
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            grants: state
                .grants
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            audit_log: state.audit.entries().to_vec(),
        }
    }

    fn check_write(&self, state: &BoardState, key: &str, agent: &AgentId) -> Result<(), BoardError> {
        if !state.grants.get(agent).is_some_and(|g| g.can_write(key)) {
            return Err(rejected(BoardError::PermissionDenied {
                agent: agent.clone(),
                key: key.to_string(),
                access: Access::Write,
            }));
        }
        if !self.policy.permits(state.phase, key) {
            return Err(rejected(BoardError::phase(
                state.phase,
                format!("write to '{key}'"),
            )));
        }
        Ok(())
    }

    fn check_ready(&self, state: &BoardState) -> Result<(), BoardError> {
        let not_ready = |detail: String| BoardError::phase(state.phase, detail);
        let outline_value = state
            .entries
            .get(SCENARIO_OUTLINE)
            .ok_or_else(|| not_ready(format!("'{SCENARIO_OUTLINE}' is missing")))?;
        let settings_value = state
            .entries
            .get(DIRECTOR_SETTINGS)
            .ok_or_else(|| not_ready(format!("'{DIRECTOR_SETTINGS}' is missing")))?;

        let outline: ScenarioOutline = self
            .registry
            .parse(&outline_value.value)
            .map_err(|e| not_ready(format!("'{SCENARIO_OUTLINE}' is invalid: {e}")))?;
        let settings: DirectorSettings = self
            .registry
            .parse(&settings_value.value)
            .map_err(|e| not_ready(format!("'{DIRECTOR_SETTINGS}' is invalid: {e}")))?;

        let unknown: Vec<&str> = settings
            .learning_objective_targets
            .keys()
            .map(String::as_str)
            .filter(|g| outline.goal(g).is_none())
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(not_ready(format!(
                "targets reference unknown goals: {}",
                unknown.join(", ")
            )))
        }
    }

    fn change_phase(state: &mut BoardState, to: Phase, agent: Option<AgentId>) {
        let from = state.phase;
        state.phase = to;
        state.audit.append(
            AuditAction::PhaseChange,
            Record {
                agent,
                payload: Some(json!({"from": from, "to": to})),
                ..Record::default()
            },
        );
        info!(%from, %to, "phase changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{RAW_INPUT, TRANSCRIPT};
    use parking_lot::Mutex as PlMutex;

    fn board_with_intake() -> (Blackboard, AgentId) {
        let board = Blackboard::standard().unwrap();
        let intake = AgentId::new("intake");
        board.grant_permission(intake.clone(), Grant::new().writes([RAW_INPUT]));
        (board, intake)
    }

    #[test]
    fn first_write_enters_building() {
        let (board, intake) = board_with_intake();
        assert_eq!(board.phase(), Phase::Idle);
        board.write(RAW_INPUT, json!("TechCorp..."), &intake).unwrap();
        assert_eq!(board.phase(), Phase::Building);

        let changes = board.audit_log(&AuditFilter::all().action(AuditAction::PhaseChange));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn rejected_write_leaves_audit_unchanged() {
        let (board, intake) = board_with_intake();
        let before = board.audit_log(&AuditFilter::all());
        let err = board.write(TRANSCRIPT, json!([]), &intake).unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(board.audit_log(&AuditFilter::all()), before);
    }

    #[test]
    fn duplicate_binding_fails_build() {
        let err = Blackboard::builder()
            .standard_bindings()
            .bind(TRANSCRIPT, SchemaKind::Transcript)
            .build()
            .unwrap_err();
        assert_eq!(err, BoardError::DuplicateBinding(TRANSCRIPT.to_string()));
    }

    #[test]
    fn agent_reads_are_audited_system_reads_are_not() {
        let (board, intake) = board_with_intake();
        board.write(RAW_INPUT, json!("text"), &intake).unwrap();
        let reader = AgentId::new("parser");
        board.grant_permission(reader.clone(), Grant::new().reads([RAW_INPUT]));

        let len = board.audit_log(&AuditFilter::all()).len();
        board.read(RAW_INPUT, &Caller::System).unwrap();
        assert_eq!(board.audit_log(&AuditFilter::all()).len(), len);

        assert_eq!(
            board.read(RAW_INPUT, &Caller::from(&reader)).unwrap(),
            Some(json!("text"))
        );
        let reads = board.audit_log(&AuditFilter::all().action(AuditAction::Read));
        assert_eq!(reads.len(), 1);
        assert!(board.read(TRANSCRIPT, &Caller::from(&reader)).is_err());
    }

    #[test]
    fn subscribers_receive_broadcasts() {
        let (board, intake) = board_with_intake();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = board.subscribe(Arc::new(move |e: &BoardEvent| sink.lock().push(e.event.clone())));

        board.broadcast("ping", json!({}), &intake).unwrap();
        assert!(board.unsubscribe(id));
        board.broadcast("pong", json!({}), &intake).unwrap();
        assert_eq!(*seen.lock(), vec!["ping".to_string()]);
    }

    #[test]
    fn broadcast_requires_a_grant() {
        let board = Blackboard::standard().unwrap();
        let err = board
            .broadcast("hello", json!(null), &AgentId::new("stranger"))
            .unwrap_err();
        assert!(err.is_permission_denied());
        assert!(board.audit_log(&AuditFilter::all()).is_empty());
    }

    #[test]
    fn running_requires_outline_and_settings() {
        let (board, intake) = board_with_intake();
        board.write(RAW_INPUT, json!("text"), &intake).unwrap();
        let err = board.transition(Phase::Running).unwrap_err();
        assert!(err.is_phase_violation());
        assert_eq!(board.phase(), Phase::Building);
    }

    #[test]
    fn value_history_tracks_overwrites_and_removal() {
        let (board, intake) = board_with_intake();
        board.write(RAW_INPUT, json!("v1"), &intake).unwrap();
        board.write(RAW_INPUT, json!("v2"), &intake).unwrap();
        board.remove(RAW_INPUT, &intake).unwrap();
        let history: Vec<_> = board
            .value_history(RAW_INPUT)
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(history, vec![Some(json!("v1")), Some(json!("v2")), None]);
    }
}
