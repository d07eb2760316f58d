//! Per-field status for display collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::emitter::{ListenerResult, Subscription};
use crate::form::Form;
use crate::lock;

/// Where a field stands from a renderer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    /// A pass is running; previous feedback should be hidden.
    Pending,
    Valid,
    Invalid,
}

/// Tracks [`FieldStatus`] per field by listening to a form's events.
///
/// Fields that were never validated, or were reset, have no status.
pub struct StatusTracker {
    statuses: Arc<Mutex<HashMap<String, FieldStatus>>>,
    _subscriptions: Vec<Subscription>,
}

impl StatusTracker {
    pub fn attach(form: &Form) -> Self {
        let statuses: Arc<Mutex<HashMap<String, FieldStatus>>> = Arc::default();
        let events = form.events();

        let will_validate = Arc::clone(&statuses);
        let did_validate = Arc::clone(&statuses);
        let reset = Arc::clone(&statuses);

        let subscriptions = vec![
            events.field_will_validate.subscribe(move |event| {
                lock(&will_validate).insert(event.field_name.clone(), FieldStatus::Pending);
                ListenerResult::None
            }),
            events.field_did_validate.subscribe(move |validation| {
                let status = if validation.is_valid() {
                    FieldStatus::Valid
                } else {
                    FieldStatus::Invalid
                };
                lock(&did_validate).insert(validation.field_name.clone(), status);
            }),
            events.reset.subscribe(move |_| lock(&reset).clear()),
        ];

        Self {
            statuses,
            _subscriptions: subscriptions,
        }
    }

    pub fn status(&self, field_name: &str) -> Option<FieldStatus> {
        lock(&self.statuses).get(field_name).copied()
    }

    /// `Some` once the latest pass for the field has completed.
    pub fn is_valid(&self, field_name: &str) -> Option<bool> {
        match self.status(field_name)? {
            FieldStatus::Pending => None,
            FieldStatus::Valid => Some(true),
            FieldStatus::Invalid => Some(false),
        }
    }

    pub fn is_pending(&self, field_name: &str) -> bool {
        self.status(field_name) == Some(FieldStatus::Pending)
    }
}
