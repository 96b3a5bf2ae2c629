//! Error types for schema validation
//!
//! Provides:
//! - [`FieldError`]: a single violation with the JSON path it applies to
//! - [`SchemaError`]: the failure returned by strict validation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::SchemaKind;
use crate::version::SchemaVersion;

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field (`$` for the document root)
    pub path: String,
    /// Human-readable description
    pub message: String,
}

impl FieldError {
    /// Create a field error
    #[inline]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Schema validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// Payload failed structural or semantic validation
    #[error("{kind} failed validation: {}", join_errors(.errors))]
    Invalid {
        /// Contract that was checked
        kind: SchemaKind,
        /// Every violation found
        errors: Vec<FieldError>,
    },

    /// Document written against a different major version
    #[error("incompatible schema version: registry is {expected}, document is {found}")]
    IncompatibleSchemaVersion {
        /// Version the registry implements
        expected: SchemaVersion,
        /// Version the document declares
        found: SchemaVersion,
    },

    /// Version string is not `major.minor.patch`
    #[error("malformed schema version '{0}'")]
    MalformedVersion(String),
}

impl SchemaError {
    /// Create an invalid-payload error
    #[inline]
    pub fn invalid(kind: SchemaKind, errors: Vec<FieldError>) -> Self {
        Self::Invalid { kind, errors }
    }

    /// Violations carried by this error, if any
    #[must_use]
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Invalid { errors, .. } => errors.clone(),
            Self::IncompatibleSchemaVersion { .. } | Self::MalformedVersion(_) => {
                vec![FieldError::new("schema_version", self.to_string())]
            }
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_display_lists_every_violation() {
        let err = SchemaError::invalid(
            SchemaKind::DirectorSettings,
            vec![
                FieldError::new("max_latency_ms", "must be in [100, 10000]"),
                FieldError::new("adaptation_flexibility", "must be in [0, 100]"),
            ],
        );
        let text = err.to_string();
        assert!(text.starts_with("director_settings failed validation"));
        assert!(text.contains("max_latency_ms: must be in [100, 10000]"));
        assert!(text.contains("adaptation_flexibility"));
    }

    #[test]
    fn version_errors_surface_as_field_errors() {
        let err = SchemaError::IncompatibleSchemaVersion {
            expected: SchemaVersion::new(1, 0, 0),
            found: SchemaVersion::new(2, 0, 0),
        };
        let errors = err.field_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "schema_version");
    }
}
