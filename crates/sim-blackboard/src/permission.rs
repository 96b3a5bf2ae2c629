//! Per-agent permission grants
//!
//! A grant lists the keys an agent may read, write and must preserve.
//! Preserved keys are never writable, even when also listed in `writes`.
//! Grants for the same agent are additive.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::keys::ANY_KEY;

/// Keys an agent may read, write and must leave untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Readable keys; [`ANY_KEY`] matches every key
    #[serde(default)]
    pub reads: BTreeSet<String>,
    /// Writable keys
    #[serde(default)]
    pub writes: BTreeSet<String>,
    /// Keys the agent must not modify
    #[serde(default)]
    pub preserves: BTreeSet<String>,
}

fn to_set<I, S>(keys: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter().map(Into::into).collect()
}

impl Grant {
    /// Empty grant
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add readable keys
    #[must_use]
    pub fn reads<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(to_set(keys));
        self
    }

    /// Allow reading every key
    #[must_use]
    pub fn reads_all(mut self) -> Self {
        self.reads.insert(ANY_KEY.to_string());
        self
    }

    /// Add writable keys
    #[must_use]
    pub fn writes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes.extend(to_set(keys));
        self
    }

    /// Add preserved keys
    #[must_use]
    pub fn preserves<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserves.extend(to_set(keys));
        self
    }

    /// Whether `key` may be read
    #[must_use]
    pub fn can_read(&self, key: &str) -> bool {
        self.reads.contains(ANY_KEY) || self.reads.contains(key)
    }

    /// Whether `key` may be written (`writes ∖ preserves`)
    #[must_use]
    pub fn can_write(&self, key: &str) -> bool {
        self.writes.contains(key) && !self.preserves.contains(key)
    }

    /// Union `other` into `self`
    pub fn merge(&mut self, other: Grant) {
        self.reads.extend(other.reads);
        self.writes.extend(other.writes);
        self.preserves.extend(other.preserves);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_dominates_writes() {
        let g = Grant::new().writes(["a", "b"]).preserves(["b"]);
        assert!(g.can_write("a"));
        assert!(!g.can_write("b"));
        assert!(!g.can_write("c"));
    }

    #[test]
    fn wildcard_reads() {
        let g = Grant::new().reads_all();
        assert!(g.can_read("transcript"));
        assert!(!Grant::new().reads(["x"]).can_read("y"));
    }

    #[test]
    fn merge_is_a_union() {
        let mut g = Grant::new().reads(["a"]).writes(["w"]);
        g.merge(Grant::new().reads(["b"]).preserves(["w"]));
        assert!(g.can_read("a") && g.can_read("b"));
        assert!(!g.can_write("w"));
    }
}
