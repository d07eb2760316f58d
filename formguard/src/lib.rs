//! Form validation engine.
//!
//! A [`Form`](form::Form) owns a registry of per-field results and three
//! event channels. [`RuleGroup`](group::RuleGroup)s subscribe to the form,
//! one per field, and answer validate requests by folding their
//! [`Rule`](rule::Rule)s over a snapshot of the field, some synchronously
//! and some through async checks. The form waits for every answer, merges
//! them in order and broadcasts the result.
//!
//! # Example
//!
//! ```ignore
//! use formguard::prelude::*;
//!
//! let form = Form::new();
//! let username = Arc::new(TextInput::new("username").required().min_length(3));
//! form.add_input(&username);
//!
//! let _username_rules = RuleGroup::for_field("username")
//!     .rule(Rule::when("tooShort")?.message("Too short"))
//!     .rule(Rule::any())
//!     .rule(Rule::async_then(check_availability, |available| {
//!         Some(if available {
//!             Feedback::info("Username available")
//!         } else {
//!             Feedback::error("Username already taken")
//!         })
//!     }))
//!     .rule(Rule::valid().message("Looks good!"))
//!     .attach(&form);
//!
//! username.set_value("jo");
//! form.field_changed(&username).await?;
//! assert!(!form.is_valid());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod emitter;
pub mod error;
pub mod events;
pub mod form;
pub mod group;
pub mod input;
pub mod outcome;
pub mod registry;
pub mod rule;
pub mod status;

pub use form::Form;

pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::emitter::{EventEmitter, ListenerResult, Subscription};
    pub use crate::error::{FormError, RuleError, RuleFailure};
    pub use crate::events::{FieldWillValidate, GroupReport, ValidateEvents};
    pub use crate::form::{FieldRef, Form, FormConfig, ValidityPolicy};
    pub use crate::group::{RuleGroup, StopPolicy};
    pub use crate::input::{Constraint, FieldInput, InputType, TextInput, ValidityState};
    pub use crate::outcome::{Feedback, FeedbackKind, FieldValidation, Outcome, OutcomeKey};
    pub use crate::registry::FieldEntry;
    pub use crate::rule::{Gate, Rule, When};
    pub use crate::status::{FieldStatus, StatusTracker};
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
