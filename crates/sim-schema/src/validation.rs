//! Semantic validation beyond what deserialization enforces
//!
//! Deserialization checks shape and applies defaults; [`Validate`] checks
//! ranges, ordering and cross-references. Implementations push every
//! violation they find into a [`Violations`] collector instead of stopping at
//! the first one.

use crate::error::FieldError;

/// Semantic checks for a deserialized contract
pub trait Validate {
    /// Record every violation found in `self`
    fn validate(&self, violations: &mut Violations);
}

/// Collector for validation failures
#[derive(Debug, Default)]
pub struct Violations {
    errors: Vec<FieldError>,
}

impl Violations {
    /// Create an empty collector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    /// Require `value` to lie in `[0, 1]`
    pub fn unit_interval(&mut self, path: impl Into<String>, value: f64) {
        self.range(path, value, 0.0, 1.0);
    }

    /// Require `value` to lie in `[min, max]` (and be finite)
    pub fn range(&mut self, path: impl Into<String>, value: f64, min: f64, max: f64) {
        if !value.is_finite() || value < min || value > max {
            self.push(path, format!("must be in [{min}, {max}], got {value}"));
        }
    }

    /// Require a string to contain something other than whitespace
    pub fn non_blank(&mut self, path: impl Into<String>, value: &str) {
        if value.trim().is_empty() {
            self.push(path, "must not be empty");
        }
    }

    /// Whether no violations were recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume into the recorded violations
    #[inline]
    #[must_use]
    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }
}

/// Run [`Validate`] and return the violations, if any
///
/// # Errors
/// Returns every violation recorded by `value.validate`.
pub fn check<T: Validate + ?Sized>(value: &T) -> Result<(), Vec<FieldError>> {
    let mut violations = Violations::new();
    value.validate(&mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.into_errors())
    }
}
