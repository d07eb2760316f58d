//! Individual rules and their evaluation against a field snapshot.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;

use crate::emitter::BoxFuture;
use crate::error::{RuleError, SelectorError, panic_message};
use crate::input::{Constraint, FieldSnapshot};
use crate::outcome::{Feedback, FeedbackKind};

/// Result of an asynchronous check: a feedback to show, or nothing.
pub type AsyncVerdict = Result<Option<Feedback>, RuleError>;

/// Type alias for sync predicate closures.
type SyncPredicate = Arc<dyn Fn(&str) -> Result<bool, RuleError> + Send + Sync>;

/// Type alias for async check closures.
type AsyncCheck = Arc<dyn Fn(String) -> BoxFuture<'static, AsyncVerdict> + Send + Sync>;

/// When a rule fires.
#[derive(Clone)]
pub enum When {
    /// The input violates this constraint.
    Constraint(Constraint),
    /// The input violates any constraint (`"*"`).
    Any,
    /// The group ended up with no error (`"valid"`).
    Valid,
    /// The predicate returns true for the current value.
    Predicate(SyncPredicate),
    /// The check resolves to a feedback.
    Async(AsyncCheck),
}

impl fmt::Debug for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constraint(c) => write!(f, "Constraint({c})"),
            Self::Any => write!(f, "Any"),
            Self::Valid => write!(f, "Valid"),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
            Self::Async(_) => write!(f, "Async(..)"),
        }
    }
}

impl FromStr for When {
    type Err = SelectorError;

    /// Parse `"*"`, `"valid"` or a constraint name such as `"tooShort"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(Self::Any),
            "valid" => Ok(Self::Valid),
            other => other.parse().map(Self::Constraint),
        }
    }
}

/// Whether a rule still runs after the group has found an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Skipped once an earlier rule produced an error.
    WhileValid,
    /// Always evaluated.
    Always,
}

/// What evaluating one rule produced.
pub enum Evaluation {
    /// The rule fired with this kind and message.
    Fired(FeedbackKind, Option<String>),
    /// The rule did not match.
    NotFired,
    /// The predicate failed.
    Failed(RuleError),
    /// Resolves later.
    Pending(BoxFuture<'static, AsyncVerdict>),
    /// Decided once the rest of the group is known.
    WhenValid(Option<String>),
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fired(kind, message) => write!(f, "Fired({kind:?}, {message:?})"),
            Self::NotFired => write!(f, "NotFired"),
            Self::Failed(err) => write!(f, "Failed({err})"),
            Self::Pending(_) => write!(f, "Pending(..)"),
            Self::WhenValid(message) => write!(f, "WhenValid({message:?})"),
        }
    }
}

/// One declarative validation rule.
///
/// # Example
///
/// ```ignore
/// let rules = vec![
///     Rule::when("tooShort")?.message("Too short"),
///     Rule::any(),
///     Rule::predicate(|v| !v.chars().any(|c| c.is_ascii_digit()))
///         .warning()
///         .message("Should contain numbers"),
///     Rule::valid().message("Looks good!"),
/// ];
/// ```
#[derive(Clone, Debug)]
pub struct Rule {
    when: When,
    kind: FeedbackKind,
    message: Option<String>,
    gate: Option<Gate>,
}

impl Rule {
    pub fn new(when: When) -> Self {
        let kind = match when {
            When::Valid => FeedbackKind::WhenValid,
            _ => FeedbackKind::Error,
        };
        Self {
            when,
            kind,
            message: None,
            gate: None,
        }
    }

    /// Build a rule from a selector string.
    pub fn when(selector: &str) -> Result<Self, SelectorError> {
        selector.parse().map(Self::new)
    }

    pub fn constraint(constraint: Constraint) -> Self {
        Self::new(When::Constraint(constraint))
    }

    /// Catch-all for any remaining constraint violation.
    pub fn any() -> Self {
        Self::new(When::Any)
    }

    pub fn valid() -> Self {
        Self::new(When::Valid)
    }

    /// Fires when `predicate` returns true.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(When::Predicate(Arc::new(move |value| Ok(predicate(value)))))
    }

    /// Fires when `predicate` returns `Ok(true)`; an `Err` is reported as a failure.
    pub fn try_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> Result<bool, RuleError> + Send + Sync + 'static,
    {
        Self::new(When::Predicate(Arc::new(predicate)))
    }

    /// Asynchronous check that decides its own feedback.
    pub fn check_async<F, Fut>(check: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AsyncVerdict> + Send + 'static,
    {
        Self::new(When::Async(Arc::new(move |value| Box::pin(check(value)))))
    }

    /// Asynchronous check whose result is mapped to a feedback by `then`.
    pub fn async_then<F, Fut, T, Then>(promise: F, then: Then) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RuleError>> + Send + 'static,
        Then: Fn(T) -> Option<Feedback> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let then = Arc::new(then);
        Self::check_async(move |value| {
            let future = promise(value);
            let then = Arc::clone(&then);
            async move { future.await.map(|result| then(result)) }
        })
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(mut self) -> Self {
        self.kind = FeedbackKind::Error;
        self
    }

    pub fn warning(mut self) -> Self {
        self.kind = FeedbackKind::Warning;
        self
    }

    pub fn info(mut self) -> Self {
        self.kind = FeedbackKind::Info;
        self
    }

    /// Override the default gate.
    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn selector(&self) -> &When {
        &self.when
    }

    pub fn kind(&self) -> FeedbackKind {
        self.kind
    }

    /// Error rules and async checks stop at the first error; warnings and
    /// infos always run.
    pub fn effective_gate(&self) -> Gate {
        if let Some(gate) = self.gate {
            return gate;
        }
        match (&self.when, self.kind) {
            (When::Async(_), _) => Gate::WhileValid,
            (_, FeedbackKind::Warning | FeedbackKind::Info) => Gate::Always,
            _ => Gate::WhileValid,
        }
    }

    /// Evaluate against a snapshot. Panics inside predicates and checks are
    /// turned into failures.
    pub fn evaluate(&self, snapshot: &FieldSnapshot) -> Evaluation {
        match &self.when {
            When::Constraint(constraint) => self.fire_if(snapshot.validity.has(*constraint), snapshot),
            When::Any => self.fire_if(!snapshot.validity.is_valid(), snapshot),
            When::Valid => Evaluation::WhenValid(self.message.clone()),
            When::Predicate(predicate) => {
                match catch_unwind(AssertUnwindSafe(|| predicate(&snapshot.value))) {
                    Ok(Ok(fired)) => self.fire_if(fired, snapshot),
                    Ok(Err(err)) => Evaluation::Failed(err),
                    Err(panic) => Evaluation::Failed(RuleError::new(panic_message(&panic))),
                }
            }
            When::Async(check) => {
                let value = snapshot.value.clone();
                match catch_unwind(AssertUnwindSafe(|| check(value))) {
                    Ok(future) => Evaluation::Pending(Box::pin(
                        AssertUnwindSafe(future).catch_unwind().map(|result| match result {
                            Ok(verdict) => verdict,
                            Err(panic) => Err(RuleError::new(panic_message(&panic))),
                        }),
                    )),
                    Err(panic) => Evaluation::Failed(RuleError::new(panic_message(&panic))),
                }
            }
        }
    }

    fn fire_if(&self, fired: bool, snapshot: &FieldSnapshot) -> Evaluation {
        if !fired {
            return Evaluation::NotFired;
        }
        let message = match (&self.message, &self.when) {
            (Some(message), _) => Some(message.clone()),
            (None, When::Constraint(_) | When::Any) if !snapshot.validation_message.is_empty() => {
                Some(snapshot.validation_message.clone())
            }
            _ => None,
        };
        Evaluation::Fired(self.kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ValidityState;

    fn snapshot(value: &str, violation: Option<Constraint>) -> FieldSnapshot {
        let mut validity = ValidityState::default();
        if let Some(constraint) = violation {
            validity.set(constraint, true);
        }
        FieldSnapshot {
            name: "field".to_string(),
            value: value.to_string(),
            validity,
            validation_message: violation
                .map(|c| format!("violates {c}"))
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_selector_parsing() {
        assert!(matches!("*".parse::<When>(), Ok(When::Any)));
        assert!(matches!("valid".parse::<When>(), Ok(When::Valid)));
        assert!(matches!(
            "patternMismatch".parse::<When>(),
            Ok(When::Constraint(Constraint::PatternMismatch))
        ));
        assert_eq!(
            Rule::when("nope").unwrap_err(),
            SelectorError("nope".to_string())
        );
    }

    #[test]
    fn test_constraint_rule_uses_validation_message_by_default() {
        let rule = Rule::constraint(Constraint::ValueMissing);
        match rule.evaluate(&snapshot("", Some(Constraint::ValueMissing))) {
            Evaluation::Fired(FeedbackKind::Error, Some(message)) => {
                assert_eq!(message, "violates valueMissing")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            rule.evaluate(&snapshot("x", None)),
            Evaluation::NotFired
        ));
    }

    #[test]
    fn test_any_matches_whatever_is_violated() {
        let rule = Rule::any().message("Invalid");
        assert!(matches!(
            rule.evaluate(&snapshot("x", Some(Constraint::TypeMismatch))),
            Evaluation::Fired(FeedbackKind::Error, Some(_))
        ));
        assert!(matches!(
            rule.evaluate(&snapshot("x", None)),
            Evaluation::NotFired
        ));
    }

    #[test]
    fn test_default_gates() {
        assert_eq!(Rule::any().effective_gate(), Gate::WhileValid);
        assert_eq!(
            Rule::predicate(|_| true).warning().effective_gate(),
            Gate::Always
        );
        assert_eq!(
            Rule::check_async(|_| async { Ok(None) }).info().effective_gate(),
            Gate::WhileValid
        );
        assert_eq!(
            Rule::predicate(|_| true).gate(Gate::Always).effective_gate(),
            Gate::Always
        );
    }

    #[test]
    fn test_failing_and_panicking_predicates() {
        let failing = Rule::try_predicate(|_| Err(RuleError::new("bad regex")));
        assert!(matches!(
            failing.evaluate(&snapshot("x", None)),
            Evaluation::Failed(err) if err.message == "bad regex"
        ));

        let panicking = Rule::predicate(|_| panic!("predicate exploded"));
        assert!(matches!(
            panicking.evaluate(&snapshot("x", None)),
            Evaluation::Failed(err) if err.message == "predicate exploded"
        ));
    }

    #[test]
    fn test_async_then_maps_result() {
        let rule = Rule::async_then(
            |value: String| async move { Ok::<_, RuleError>(value == "free") },
            |available| {
                Some(if available {
                    Feedback::info("Username available")
                } else {
                    Feedback::error("Username already taken")
                })
            },
        );

        let Evaluation::Pending(future) = rule.evaluate(&snapshot("free", None)) else {
            panic!("expected a pending evaluation");
        };
        let verdict = futures::executor::block_on(future);
        assert_eq!(verdict, Ok(Some(Feedback::info("Username available"))));
    }
}
