//! Error types.

use std::any::Any;

use thiserror::Error;

use crate::outcome::{FieldValidation, OutcomeKey};

/// A custom or asynchronous rule failed to produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for RuleError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RuleError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A listener panicked while an event was being emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener for '{event}' panicked: {message}")]
pub struct ListenerPanic {
    /// Name of the emitter.
    pub event: &'static str,
    pub message: String,
}

/// A rule failure tied to the field (and rule, when known) it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}'{}: {error}", rule_suffix(.key))]
pub struct RuleFailure {
    pub field: String,
    /// `None` when a whole rule group failed, e.g. its listener panicked.
    pub key: Option<OutcomeKey>,
    pub error: RuleError,
}

fn rule_suffix(key: &Option<OutcomeKey>) -> String {
    key.map(|key| format!(" rule {key}")).unwrap_or_default()
}

/// Failure of a top-level validate operation.
#[derive(Debug, Clone, Error)]
pub enum FormError {
    /// Some rules failed. Every other result was still merged and is
    /// carried here.
    #[error("{} rule(s) failed during validation", .failures.len())]
    RuleFailures {
        failures: Vec<RuleFailure>,
        validations: Vec<FieldValidation>,
    },
}

impl FormError {
    pub fn failures(&self) -> &[RuleFailure] {
        match self {
            Self::RuleFailures { failures, .. } => failures,
        }
    }

    /// The merged results of the pass that failed.
    pub fn validations(&self) -> &[FieldValidation] {
        match self {
            Self::RuleFailures { validations, .. } => validations,
        }
    }
}

/// A rule selector that is not part of the recognized set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rule selector '{0}'")]
pub struct SelectorError(pub String);

/// Invalid `pattern` constraint on an input.
#[derive(Debug, Error)]
#[error("invalid pattern for input '{input}': {source}")]
pub struct PatternError {
    pub input: String,
    #[source]
    pub source: regex::Error,
}

/// Extract a human-readable message from a panic payload.
pub fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::GroupKey;

    #[test]
    fn test_panic_message_variants() {
        let panic: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&panic), "static message");

        let panic: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(&panic), "owned message");

        let panic: Box<dyn Any + Send> = Box::new(42i32);
        assert_eq!(panic_message(&panic), "Unknown panic");
    }

    #[test]
    fn test_rule_failure_display() {
        let failure = RuleFailure {
            field: "username".to_string(),
            key: Some(OutcomeKey::new(GroupKey(0), 2)),
            error: RuleError::new("network down"),
        };
        assert_eq!(failure.to_string(), "field 'username' rule 0.2: network down");

        let failure = RuleFailure {
            key: None,
            ..failure
        };
        assert_eq!(failure.to_string(), "field 'username': network down");
    }
}
