//! Semantic versions for schema contracts
//!
//! Documents declare the contract version they were written against. A
//! document is accepted when its major version matches the registry's;
//! anything else is rejected as incompatible.

use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// `major.minor.patch` version of a schema contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    /// Breaking changes
    pub major: u16,
    /// Additive changes
    pub minor: u16,
    /// Content revisions of a single document
    pub patch: u16,
}

/// Result of comparing a document version against the registry version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    /// Same major, document not newer than the registry
    Compatible,
    /// Same major, document written against a newer minor/patch
    Newer,
    /// Different major
    Incompatible(Vec<String>),
}

impl Compatibility {
    /// Whether a document with this compatibility may be accepted
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Incompatible(_))
    }
}

impl SchemaVersion {
    /// Create a version
    #[inline]
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next patch revision
    #[inline]
    #[must_use]
    pub const fn bump_patch(self) -> Self {
        Self {
            patch: self.patch.saturating_add(1),
            ..self
        }
    }

    /// Compare a document version (`self`) against the `current` contract
    #[must_use]
    pub fn check_compatibility(&self, current: &SchemaVersion) -> Compatibility {
        if self.major != current.major {
            return Compatibility::Incompatible(vec![format!(
                "major version mismatch: document={self} registry={current}"
            )]);
        }

        if (self.minor, self.patch) <= (current.minor, current.patch) {
            Compatibility::Compatible
        } else {
            Compatibility::Newer
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        crate::registry::OUTLINE_VERSION
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SchemaError::MalformedVersion(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u16, SchemaError> {
            parts
                .next()
                .ok_or_else(malformed)?
                .parse::<u16>()
                .map_err(|_| malformed())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(version)
    }
}

impl serde::Serialize for SchemaVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SchemaVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl schemars::JsonSchema for SchemaVersion {
    fn schema_name() -> String {
        "SchemaVersion".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v: SchemaVersion = "1.4.2".parse().unwrap();
        assert_eq!(v, SchemaVersion::new(1, 4, 2));
        assert_eq!(v.to_string(), "1.4.2");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "1", "1.2", "1.2.3.4", "a.b.c", "1.-2.3"] {
            assert!(
                matches!(bad.parse::<SchemaVersion>(), Err(SchemaError::MalformedVersion(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn same_major_is_accepted() {
        let current = SchemaVersion::new(1, 2, 0);
        assert_eq!(
            SchemaVersion::new(1, 0, 9).check_compatibility(&current),
            Compatibility::Compatible
        );
        assert_eq!(
            SchemaVersion::new(1, 3, 0).check_compatibility(&current),
            Compatibility::Newer
        );
        assert!(SchemaVersion::new(1, 3, 0)
            .check_compatibility(&current)
            .is_accepted());
    }

    #[test]
    fn different_major_is_rejected() {
        let current = SchemaVersion::new(1, 0, 0);
        let compat = SchemaVersion::new(2, 0, 0).check_compatibility(&current);
        assert!(!compat.is_accepted());
    }

    #[test]
    fn bump_patch_increments_only_patch() {
        assert_eq!(
            SchemaVersion::new(1, 2, 3).bump_patch(),
            SchemaVersion::new(1, 2, 4)
        );
    }
}
