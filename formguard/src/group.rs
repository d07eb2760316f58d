//! Rule groups: the ordered rules of one field and how a pass folds them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use log::{debug, trace};

use crate::emitter::{BoxFuture, ListenerResult, Subscription};
use crate::error::{RuleError, RuleFailure};
use crate::events::{FieldWillValidate, GroupReport};
use crate::form::Form;
use crate::input::FieldSnapshot;
use crate::lock;
use crate::outcome::{FeedbackKind, GroupKey, Outcome, OutcomeKey};
use crate::rule::{AsyncVerdict, Evaluation, Gate, Rule, When};

/// How far a group keeps going once it found an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// Skip [`Gate::WhileValid`] rules after the first error.
    #[default]
    FirstError,
    /// Evaluate every rule.
    No,
}

/// One rule's place in a pass before pending checks resolve.
enum Slot {
    Ready(Outcome),
    Failed {
        key: OutcomeKey,
        kind: FeedbackKind,
        error: RuleError,
    },
    Pending {
        key: OutcomeKey,
        kind: FeedbackKind,
        future: BoxFuture<'static, AsyncVerdict>,
    },
    /// A pending slot whose future was moved out to be awaited.
    Awaiting {
        key: OutcomeKey,
        kind: FeedbackKind,
    },
    WhenValid {
        key: OutcomeKey,
        message: Option<String>,
    },
}

/// Move pending futures out of `slots`, remembering their positions.
fn take_pending(slots: Vec<Slot>) -> (Vec<Slot>, Vec<(usize, BoxFuture<'static, AsyncVerdict>)>) {
    let mut kept = Vec::with_capacity(slots.len());
    let mut pending = Vec::new();
    for (position, slot) in slots.into_iter().enumerate() {
        match slot {
            Slot::Pending { key, kind, future } => {
                pending.push((position, future));
                kept.push(Slot::Awaiting { key, kind });
            }
            other => kept.push(other),
        }
    }
    (kept, pending)
}

/// Accumulator threaded through the rules of a group, in document order.
struct Fold {
    still_valid: bool,
    slots: Vec<Slot>,
}

impl Fold {
    fn new() -> Self {
        Self {
            still_valid: true,
            slots: Vec::new(),
        }
    }

    fn step(mut self, group: &GroupState, index: usize, rule: &Rule, snapshot: &FieldSnapshot) -> Self {
        let key = OutcomeKey::new(group.key, index);
        let field = &group.field_name;

        let gated = group.stop == StopPolicy::FirstError
            && !self.still_valid
            && rule.effective_gate() == Gate::WhileValid
            && !matches!(rule.selector(), When::Valid);
        if gated {
            trace!("Rule {} on '{}' skipped after earlier error", key, field);
            self.slots.push(Slot::Ready(Outcome::skipped(field, key, rule.kind())));
            return self;
        }

        let slot = match rule.evaluate(snapshot) {
            Evaluation::Fired(kind, message) => {
                trace!("Rule {} on '{}' fired ({:?})", key, field, kind);
                if kind == FeedbackKind::Error {
                    self.still_valid = false;
                }
                Slot::Ready(Outcome::fired(field, key, kind, message))
            }
            Evaluation::NotFired => Slot::Ready(Outcome::skipped(field, key, rule.kind())),
            Evaluation::Failed(error) => Slot::Failed {
                key,
                kind: rule.kind(),
                error,
            },
            Evaluation::Pending(future) => Slot::Pending {
                key,
                kind: rule.kind(),
                future,
            },
            Evaluation::WhenValid(message) => Slot::WhenValid { key, message },
        };
        self.slots.push(slot);
        self
    }
}

/// Shared state of an attached group, captured by its listeners.
struct GroupState {
    key: GroupKey,
    field_name: String,
    stop: StopPolicy,
    rules: Vec<Rule>,
    pass: AtomicU64,
    last_report: Mutex<Option<GroupReport>>,
}

impl GroupState {
    fn on_will_validate(self: &Arc<Self>, event: &FieldWillValidate) -> ListenerResult<GroupReport> {
        if event.field_name != self.field_name {
            return ListenerResult::None;
        }

        let pass = self.pass.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.last_report) = None;

        let fold = self
            .rules
            .iter()
            .enumerate()
            .fold(Fold::new(), |fold, (index, rule)| {
                fold.step(self, index, rule, &event.snapshot)
            });

        let (slots, pending) = take_pending(fold.slots);

        if pending.is_empty() {
            let report = self.finish(slots, HashMap::new());
            self.store(pass, &report);
            return ListenerResult::Value(report);
        }

        debug!(
            "Group {} for '{}' waiting on {} async rule(s)",
            self.key,
            self.field_name,
            pending.len()
        );

        let state = Arc::clone(self);
        ListenerResult::Pending(Box::pin(async move {
            let (positions, futures): (Vec<usize>, Vec<_>) = pending.into_iter().unzip();
            let verdicts = join_all(futures).await;
            let resolved = positions.into_iter().zip(verdicts).collect();
            let report = state.finish(slots, resolved);
            state.store(pass, &report);
            report
        }))
    }

    /// Resolve async verdicts and when-valid markers into a report.
    fn finish(&self, slots: Vec<Slot>, mut resolved: HashMap<usize, AsyncVerdict>) -> GroupReport {
        let field = &self.field_name;
        let mut outcomes = Vec::with_capacity(slots.len());
        let mut failures = Vec::new();
        let mut when_valid = Vec::new();

        for (position, slot) in slots.into_iter().enumerate() {
            let outcome = match slot {
                Slot::Ready(outcome) => outcome,
                Slot::Failed { key, kind, error } => {
                    failures.push(RuleFailure {
                        field: field.clone(),
                        key: Some(key),
                        error,
                    });
                    Outcome::skipped(field, key, kind)
                }
                Slot::Awaiting { key, kind } | Slot::Pending { key, kind, .. } => {
                    match resolved.remove(&position) {
                        Some(Ok(Some(feedback))) => {
                            Outcome::fired(field, key, feedback.kind, Some(feedback.message))
                        }
                        Some(Ok(None)) | None => Outcome::skipped(field, key, kind),
                        Some(Err(error)) => {
                            failures.push(RuleFailure {
                                field: field.clone(),
                                key: Some(key),
                                error,
                            });
                            Outcome::skipped(field, key, kind)
                        }
                    }
                }
                Slot::WhenValid { key, message } => {
                    when_valid.push((position, message));
                    Outcome::skipped(field, key, FeedbackKind::WhenValid)
                }
            };
            outcomes.push(outcome);
        }

        // Valid for this group only; the form withdraws the markers if
        // another group for the field reported an error.
        if !outcomes.iter().any(Outcome::is_error) {
            for (position, message) in when_valid {
                let outcome = &mut outcomes[position];
                outcome.applicable = true;
                outcome.message = message;
            }
        }

        GroupReport { outcomes, failures }
    }

    fn store(&self, pass: u64, report: &GroupReport) {
        if self.pass.load(Ordering::SeqCst) == pass {
            *lock(&self.last_report) = Some(report.clone());
        }
    }

    fn clear(&self) {
        self.pass.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_report) = None;
    }
}

/// Builder for a [`RuleGroup`].
///
/// # Example
///
/// ```ignore
/// let group = RuleGroup::for_field("password")
///     .rule(Rule::constraint(Constraint::ValueMissing))
///     .rule(Rule::valid().message("Looks good!"))
///     .linked("passwordConfirm")
///     .attach(&form);
/// ```
pub struct RuleGroupBuilder {
    field_name: String,
    rules: Vec<Rule>,
    linked: Option<String>,
    stop: StopPolicy,
}

impl RuleGroupBuilder {
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Also revalidate `field_name` whenever this group's field is validated.
    pub fn linked(mut self, field_name: impl Into<String>) -> Self {
        self.linked = Some(field_name.into());
        self
    }

    pub fn stop(mut self, stop: StopPolicy) -> Self {
        self.stop = stop;
        self
    }

    /// Subscribe the group to `form`. It stays subscribed until dropped.
    pub fn attach(self, form: &Form) -> RuleGroup {
        let state = Arc::new(GroupState {
            key: form.next_group_key(),
            field_name: self.field_name,
            stop: self.stop,
            rules: self.rules,
            pass: AtomicU64::new(0),
            last_report: Mutex::new(None),
        });

        let events = form.events();
        let mut subscriptions = Vec::with_capacity(3);

        let will_validate = Arc::clone(&state);
        subscriptions.push(
            events
                .field_will_validate
                .subscribe(move |event| will_validate.on_will_validate(event)),
        );

        let reset = Arc::clone(&state);
        subscriptions.push(events.reset.subscribe(move |_| reset.clear()));

        if let Some(linked) = &self.linked {
            subscriptions.push(form.link(&state.field_name, linked));
        }

        debug!(
            "Attached group {} for '{}' ({} rule(s))",
            state.key,
            state.field_name,
            state.rules.len()
        );

        RuleGroup {
            state,
            linked: self.linked,
            _subscriptions: subscriptions,
        }
    }
}

/// The rules governing one field, subscribed to a form.
///
/// Dropping the group unsubscribes it from every event and removes its link.
pub struct RuleGroup {
    state: Arc<GroupState>,
    linked: Option<String>,
    _subscriptions: Vec<Subscription>,
}

impl RuleGroup {
    pub fn for_field(field_name: impl Into<String>) -> RuleGroupBuilder {
        RuleGroupBuilder {
            field_name: field_name.into(),
            rules: Vec::new(),
            linked: None,
            stop: StopPolicy::default(),
        }
    }

    pub fn key(&self) -> GroupKey {
        self.state.key
    }

    pub fn field_name(&self) -> &str {
        &self.state.field_name
    }

    pub fn linked(&self) -> Option<&str> {
        self.linked.as_deref()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.state.rules
    }

    /// Report of the latest completed pass, if no newer pass or reset happened since.
    pub fn last_report(&self) -> Option<GroupReport> {
        lock(&self.state.last_report).clone()
    }

    /// Unsubscribe now.
    pub fn detach(self) {
        debug!(
            "Detaching group {} for '{}'",
            self.state.key, self.state.field_name
        );
    }
}
