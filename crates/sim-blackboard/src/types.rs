//! Identity types for blackboard callers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an agent holding a permission grant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who is reading
///
/// The system (session bootstrap, operators, tests) reads without a grant and
/// without leaving an audit record; agents need the key in their `reads`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    /// Unrestricted, unaudited access
    System,
    /// A registered agent
    Agent(AgentId),
}

impl Caller {
    /// Agent caller
    #[inline]
    pub fn agent(id: impl Into<AgentId>) -> Self {
        Self::Agent(id.into())
    }
}

impl From<&AgentId> for Caller {
    fn from(id: &AgentId) -> Self {
        Self::Agent(id.clone())
    }
}

/// Kind of access being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Read a key
    Read,
    /// Write or remove a key
    Write,
    /// Broadcast an event
    Broadcast,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Broadcast => "broadcast",
        })
    }
}
