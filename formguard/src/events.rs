//! The validate protocol: the three event channels a form owns.

use crate::emitter::{EventEmitter, ListenerResult};
use crate::error::RuleFailure;
use crate::input::FieldSnapshot;
use crate::outcome::{FieldValidation, Outcome};

/// Fired at the start of a pass, after the registry entry was cleared.
///
/// Rule groups for the field answer with their outcomes; every other
/// listener should drop cached state for the field and return
/// [`ListenerResult::None`].
#[derive(Debug, Clone)]
pub struct FieldWillValidate {
    pub field_name: String,
    pub snapshot: FieldSnapshot,
}

/// What one rule group produced for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    /// One outcome per rule, in rule order.
    pub outcomes: Vec<Outcome>,
    pub failures: Vec<RuleFailure>,
}

impl GroupReport {
    pub fn is_valid(&self) -> bool {
        !self.outcomes.iter().any(Outcome::is_error)
    }
}

/// Event channels shared by a form, its rule groups and display collaborators.
pub struct ValidateEvents {
    pub field_will_validate: EventEmitter<FieldWillValidate, ListenerResult<GroupReport>>,
    /// Fired with the merged result once a pass for a field completes.
    pub field_did_validate: EventEmitter<FieldValidation>,
    pub reset: EventEmitter<()>,
}

impl ValidateEvents {
    pub fn new() -> Self {
        Self {
            field_will_validate: EventEmitter::new("field_will_validate"),
            field_did_validate: EventEmitter::new("field_did_validate"),
            reset: EventEmitter::new("reset"),
        }
    }
}

impl Default for ValidateEvents {
    fn default() -> Self {
        Self::new()
    }
}
