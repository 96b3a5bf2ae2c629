//! Append-only, hash-chained audit log
//!
//! Every accepted mutation, agent read, grant, broadcast and phase change is
//! recorded. Each entry's hash covers its content and the previous entry's
//! hash, so editing or dropping an entry breaks the chain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sim_schema::ValueHash;

use crate::error::BoardError;
use crate::types::AgentId;

const GENESIS: [u8; 32] = [0u8; 32];

/// Audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Agent read
    Read,
    /// Write or removal
    Write,
    /// Event broadcast
    Broadcast,
    /// Permission grant
    Grant,
    /// Phase transition
    PhaseChange,
}

impl AuditAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Broadcast => "broadcast",
            Self::Grant => "grant",
            Self::PhaseChange => "phase_change",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Strictly increasing sequence number, starting at 1
    pub seq: u64,
    /// Commit time
    pub ts: DateTime<Utc>,
    /// Acting agent; `None` for system operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    /// Operation
    pub action: AuditAction,
    /// Key touched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Event broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Hash of the value before a write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_hash: Option<ValueHash>,
    /// Hash of the value after a write (or at a read)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_hash: Option<ValueHash>,
    /// Written value, broadcast payload, grant or phase change details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Hex hash of the previous entry
    pub prev_hash: String,
    /// Hex hash of this entry
    pub hash: String,
}

/// Fields of an entry before it is sequenced and chained
#[derive(Debug, Clone, Default)]
pub(crate) struct Record {
    pub(crate) agent: Option<AgentId>,
    pub(crate) key: Option<String>,
    pub(crate) event: Option<String>,
    pub(crate) before_hash: Option<ValueHash>,
    pub(crate) after_hash: Option<ValueHash>,
    pub(crate) payload: Option<Value>,
}

/// Selects audit entries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    agent: Option<AgentId>,
    action: Option<AuditAction>,
    key: Option<String>,
    event: Option<String>,
    after_seq: Option<u64>,
}

impl AuditFilter {
    /// Match everything
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Only entries by `agent`
    #[must_use]
    pub fn agent(mut self, agent: impl Into<AgentId>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Only entries with `action`
    #[must_use]
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Only entries touching `key`
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Only broadcasts of `event`
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Only entries with `seq > after`
    #[must_use]
    pub fn after_seq(mut self, after: u64) -> Self {
        self.after_seq = Some(after);
        self
    }

    /// Whether `entry` is selected
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.agent
            .as_ref()
            .map_or(true, |a| entry.agent.as_ref() == Some(a))
            && self.action.map_or(true, |a| entry.action == a)
            && self
                .key
                .as_deref()
                .map_or(true, |k| entry.key.as_deref() == Some(k))
            && self
                .event
                .as_deref()
                .map_or(true, |e| entry.event.as_deref() == Some(e))
            && self.after_seq.map_or(true, |s| entry.seq > s)
    }
}

/// The chained log
#[derive(Debug, Clone, Default)]
pub(crate) struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub(crate) fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    /// Seq of the last entry, zero when empty
    pub(crate) fn last_seq(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.seq)
    }

    pub(crate) fn append(&mut self, action: AuditAction, record: Record) -> &AuditEntry {
        let prev_hash = self
            .entries
            .last()
            .map_or_else(|| hex::encode(GENESIS), |e| e.hash.clone());
        let mut entry = AuditEntry {
            seq: self.last_seq() + 1,
            ts: Utc::now(),
            agent: record.agent,
            action,
            key: record.key,
            event: record.event,
            before_hash: record.before_hash,
            after_hash: record.after_hash,
            payload: record.payload,
            prev_hash,
            hash: String::new(),
        };
        entry.hash = compute_hash(&entry);
        let idx = self.entries.len();
        self.entries.push(entry);
        &self.entries[idx]
    }

    pub(crate) fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub(crate) fn verify_integrity(&self) -> Result<(), BoardError> {
        verify_chain(&self.entries)
    }
}

/// Verify a sequence of entries forms an intact chain from genesis
///
/// # Errors
/// Returns [`BoardError::IntegrityViolation`] naming the first bad entry.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), BoardError> {
    let mut prev = hex::encode(GENESIS);
    let mut prev_seq = 0;
    for e in entries {
        if e.prev_hash != prev || e.seq <= prev_seq || e.hash != compute_hash(e) {
            return Err(BoardError::IntegrityViolation { seq: e.seq });
        }
        prev.clone_from(&e.hash);
        prev_seq = e.seq;
    }
    Ok(())
}

fn compute_hash(entry: &AuditEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.seq.to_le_bytes());
    hasher.update(entry.ts.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(entry.agent.as_ref().map_or("", AgentId::as_str).as_bytes());
    hasher.update([0]);
    hasher.update(entry.action.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.key.as_deref().unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(entry.event.as_deref().unwrap_or("").as_bytes());
    hasher.update([0]);
    for hash in [&entry.before_hash, &entry.after_hash] {
        match hash {
            Some(h) => hasher.update(h.as_bytes()),
            None => hasher.update([0u8; 32]),
        }
    }
    if let Some(payload) = &entry.payload {
        hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    }
    hasher.update([0]);
    hasher.update(entry.prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_with(n: usize) -> AuditLog {
        let mut log = AuditLog::default();
        for i in 0..n {
            log.append(
                AuditAction::Write,
                Record {
                    agent: Some(AgentId::new("parser")),
                    key: Some(format!("k{i}")),
                    after_hash: Some(ValueHash::of_value(&json!(i))),
                    payload: Some(json!(i)),
                    ..Record::default()
                },
            );
        }
        log
    }

    #[test]
    fn chain_links_entries() {
        let log = log_with(3);
        let entries = log.entries();
        assert_eq!(entries[0].prev_hash, hex::encode(GENESIS));
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(entries[2].seq, 3);
        assert!(log.verify_integrity().is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let log = log_with(3);
        let mut entries = log.entries().to_vec();
        entries[1].payload = Some(json!("forged"));
        assert_eq!(
            verify_chain(&entries),
            Err(BoardError::IntegrityViolation { seq: 2 })
        );

        let mut dropped = log.entries().to_vec();
        dropped.remove(0);
        assert!(verify_chain(&dropped).is_err());
    }

    #[test]
    fn filter_selects_entries() {
        let log = log_with(3);
        let f = AuditFilter::all().key("k1");
        let hits: Vec<_> = log.entries().iter().filter(|e| f.matches(e)).collect();
        assert_eq!(hits.len(), 1);

        let f = AuditFilter::all().action(AuditAction::Write).after_seq(1);
        assert_eq!(log.entries().iter().filter(|e| f.matches(e)).count(), 2);
    }
}
