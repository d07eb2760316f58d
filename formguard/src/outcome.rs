//! Outcome model: what a single rule said about a field during one pass.

use std::fmt;

use serde::Serialize;

/// Identifies a rule group within a form.
///
/// Keys are handed out by [`Form`](crate::form::Form) in attach order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub u32);

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of one rule: its group plus its index in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OutcomeKey {
    pub group: GroupKey,
    pub index: usize,
}

impl OutcomeKey {
    pub fn new(group: GroupKey, index: usize) -> Self {
        Self { group, index }
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.index)
    }
}

/// Severity of a feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackKind {
    #[default]
    Error,
    Warning,
    Info,
    /// Shown only when the field ended up valid.
    WhenValid,
}

/// A verdict produced by an asynchronous check: a kind and the text to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl Feedback {
    pub fn new(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Info, message)
    }
}

/// The verdict of one rule for one field during one validation pass.
///
/// Outcomes that did not fire (`applicable == false`) are still produced so
/// that keys stay aligned with rule order; they never count as an error,
/// warning or info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub field: String,
    pub key: OutcomeKey,
    pub kind: FeedbackKind,
    pub applicable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Outcome {
    /// A rule that fired.
    pub fn fired(
        field: impl Into<String>,
        key: OutcomeKey,
        kind: FeedbackKind,
        message: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            key,
            kind,
            applicable: true,
            message,
        }
    }

    /// A rule that declined to fire.
    pub fn skipped(field: impl Into<String>, key: OutcomeKey, kind: FeedbackKind) -> Self {
        Self {
            field: field.into(),
            key,
            kind,
            applicable: false,
            message: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.applicable && self.kind == FeedbackKind::Error
    }

    pub fn is_warning(&self) -> bool {
        self.applicable && self.kind == FeedbackKind::Warning
    }

    pub fn is_info(&self) -> bool {
        self.applicable && self.kind == FeedbackKind::Info
    }
}

/// Merged result of one validation pass for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValidation {
    pub field_name: String,
    pub outcomes: Vec<Outcome>,
}

impl FieldValidation {
    pub fn new(field_name: impl Into<String>, outcomes: Vec<Outcome>) -> Self {
        Self {
            field_name: field_name.into(),
            outcomes,
        }
    }

    /// True when no applicable error outcome is present.
    pub fn is_valid(&self) -> bool {
        !self.outcomes.iter().any(Outcome::is_error)
    }

    /// Withdraw every when-valid marker if any group reported an error for
    /// the field. Groups decide their markers alone; the field decides last.
    pub fn settle_when_valid(mut self) -> Self {
        if !self.is_valid() {
            for outcome in &mut self.outcomes {
                if outcome.kind == FeedbackKind::WhenValid {
                    outcome.applicable = false;
                    outcome.message = None;
                }
            }
        }
        self
    }

    /// Outcomes that fired, in document order.
    pub fn applicable(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.applicable)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_warning())
    }

    pub fn infos(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_info())
    }

    /// Messages of the outcomes that fired.
    pub fn messages(&self) -> Vec<&str> {
        self.applicable()
            .filter_map(|o| o.message.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: usize) -> OutcomeKey {
        OutcomeKey::new(GroupKey(0), index)
    }

    #[test]
    fn test_key_display() {
        assert_eq!(OutcomeKey::new(GroupKey(3), 1).to_string(), "3.1");
    }

    #[test]
    fn test_skipped_error_does_not_invalidate() {
        let validation = FieldValidation::new(
            "username",
            vec![
                Outcome::skipped("username", key(0), FeedbackKind::Error),
                Outcome::fired("username", key(1), FeedbackKind::Warning, None),
            ],
        );
        assert!(validation.is_valid());
        assert_eq!(validation.warnings().count(), 1);
        assert_eq!(validation.applicable().count(), 1);
    }

    #[test]
    fn test_error_in_one_group_withdraws_when_valid_of_another() {
        let other = OutcomeKey::new(GroupKey(1), 0);
        let validation = FieldValidation::new(
            "pw",
            vec![
                Outcome::fired("pw", key(0), FeedbackKind::Error, Some("Too short".to_string())),
                Outcome::fired("pw", other, FeedbackKind::WhenValid, Some("Looks good!".to_string())),
            ],
        )
        .settle_when_valid();

        assert_eq!(validation.messages(), vec!["Too short"]);
        assert!(!validation.outcomes[1].applicable);
    }

    #[test]
    fn test_when_valid_kept_for_valid_field() {
        let validation = FieldValidation::new(
            "pw",
            vec![Outcome::fired("pw", key(0), FeedbackKind::WhenValid, Some("Looks good!".to_string()))],
        )
        .settle_when_valid();

        assert_eq!(validation.messages(), vec!["Looks good!"]);
    }

    #[test]
    fn test_fired_error_invalidates() {
        let validation = FieldValidation::new(
            "username",
            vec![Outcome::fired(
                "username",
                key(0),
                FeedbackKind::Error,
                Some("Too short".to_string()),
            )],
        );
        assert!(!validation.is_valid());
        assert_eq!(validation.messages(), vec!["Too short"]);
    }
}
