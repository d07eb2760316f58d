//! The form: owns the registry and the validate protocol, and runs passes.
//!
//! A pass for one field goes:
//!
//! 1. bump the field's pass generation and clear its registry entry
//! 2. emit *field-will-validate*; rule groups answer with ready or pending reports
//! 3. await every pending report
//! 4. merge the outcomes, in subscription order, into the registry; when-valid
//!    markers stay only if no group reported an error for the field
//! 5. emit *field-did-validate* with the merged result
//!
//! Steps 1 and 2 run when the validate call is made; the returned future
//! covers the rest.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::join_all;
use log::{debug, warn};

use crate::emitter::{BoxFuture, Subscription};
use crate::error::{FormError, RuleError, RuleFailure};
use crate::events::{FieldWillValidate, ValidateEvents};
use crate::input::{FieldInput, FieldSnapshot};
use crate::lock;
use crate::outcome::{FieldValidation, GroupKey};
use crate::registry::{FieldEntry, FieldRegistry};

/// How [`Form::is_valid`] treats fields that were never validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidityPolicy {
    /// Never-validated fields count as valid.
    #[default]
    Optimistic,
    /// Any input in the document without a completed pass makes the form invalid.
    RequireValidated,
}

/// Per-form configuration.
#[derive(Debug, Clone)]
pub struct FormConfig {
    pub validity: ValidityPolicy,

    /// Drop the result of a pass when a newer pass for the same field (or a
    /// reset) started before it finished.
    pub discard_stale: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validity: ValidityPolicy::Optimistic,
            discard_stale: true,
        }
    }
}

impl FormConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validity(mut self, policy: ValidityPolicy) -> Self {
        self.validity = policy;
        self
    }

    /// Let results of superseded passes overwrite the registry when they
    /// finish last.
    pub fn keep_stale(mut self) -> Self {
        self.discard_stale = false;
        self
    }
}

/// A field to validate: an input handle or a field name.
#[derive(Clone)]
pub enum FieldRef {
    Input(Arc<dyn FieldInput>),
    Name(String),
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(input) => write!(f, "Input({})", input.name()),
            Self::Name(name) => write!(f, "Name({name})"),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Arc<dyn FieldInput>> for FieldRef {
    fn from(input: Arc<dyn FieldInput>) -> Self {
        Self::Input(input)
    }
}

impl<T: FieldInput + 'static> From<&Arc<T>> for FieldRef {
    fn from(input: &Arc<T>) -> Self {
        Self::Input(Arc::clone(input) as Arc<dyn FieldInput>)
    }
}

/// "Also validate `linked` whenever `field` is validated."
struct Link {
    id: u64,
    field: String,
    linked: String,
}

/// What one pass hands back to the validate call that started it.
type PassResult = (FieldValidation, Vec<RuleFailure>);

/// Counters a pass captured when it started.
#[derive(Debug, Clone, Copy)]
struct PassTicket {
    generation: u64,
    /// Change count of the field at pass start.
    changes: u64,
}

struct FormInner {
    config: FormConfig,
    registry: Mutex<FieldRegistry>,
    inputs: Mutex<Vec<Arc<dyn FieldInput>>>,
    links: Mutex<Vec<Link>>,
    next_link: Mutex<u64>,
    generations: Mutex<HashMap<String, u64>>,
    changes: Mutex<HashMap<String, u64>>,
    validated: Mutex<HashSet<String>>,
    events: ValidateEvents,
    next_group: AtomicU32,
}

impl FormInner {
    /// Record a change to `name` and mark it dirty.
    fn note_change(&self, name: &str) {
        let mut changes = lock(&self.changes);
        *changes.entry(name.to_string()).or_insert(0) += 1;
        lock(&self.registry).mark_dirty(name);
    }

    /// Start a pass: bump the generation and clear the registry entry.
    fn begin_pass(&self, name: &str) -> PassTicket {
        let mut generations = lock(&self.generations);
        let generation = generations.entry(name.to_string()).or_insert(0);
        *generation += 1;
        let changes = lock(&self.changes).get(name).copied().unwrap_or(0);
        lock(&self.registry).clear(name);
        PassTicket {
            generation: *generation,
            changes,
        }
    }

    /// Merge a finished pass. Returns false when it was discarded as stale.
    ///
    /// The field stays dirty if it changed after the pass took its snapshot.
    fn merge(&self, validation: &FieldValidation, ticket: PassTicket) -> bool {
        let name = &validation.field_name;
        let generations = lock(&self.generations);
        let current = generations.get(name).copied() == Some(ticket.generation);
        if !current && self.config.discard_stale {
            return false;
        }
        let unchanged = lock(&self.changes).get(name).copied().unwrap_or(0) == ticket.changes;

        let mut registry = lock(&self.registry);
        registry.clear(name);
        for outcome in &validation.outcomes {
            registry.record_outcome(outcome);
        }
        if current && unchanged {
            registry.mark_clean(name);
        }
        lock(&self.validated).insert(name.clone());
        true
    }
}

/// Validation orchestrator.
///
/// Cheap to clone; clones share the same registry, document and events.
///
/// # Example
///
/// ```ignore
/// let form = Form::new();
/// let username = Arc::new(TextInput::new("username").required().min_length(3));
/// form.add_input(&username);
///
/// let _group = RuleGroup::for_field("username")
///     .rule(Rule::constraint(Constraint::TooShort).message("Too short"))
///     .rule(Rule::valid().message("Looks good!"))
///     .attach(&form);
///
/// username.set_value("jo");
/// let results = form.field_changed(&username).await?;
/// assert!(!form.is_valid());
/// ```
#[derive(Clone)]
pub struct Form {
    inner: Arc<FormInner>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self::with_config(FormConfig::default())
    }

    pub fn with_config(config: FormConfig) -> Self {
        Self {
            inner: Arc::new(FormInner {
                config,
                registry: Mutex::new(FieldRegistry::new()),
                inputs: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
                next_link: Mutex::new(0),
                generations: Mutex::new(HashMap::new()),
                changes: Mutex::new(HashMap::new()),
                validated: Mutex::new(HashSet::new()),
                events: ValidateEvents::new(),
                next_group: AtomicU32::new(0),
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    /// Event channels, for display collaborators.
    pub fn events(&self) -> &ValidateEvents {
        &self.inner.events
    }

    pub(crate) fn next_group_key(&self) -> GroupKey {
        GroupKey(self.inner.next_group.fetch_add(1, Ordering::SeqCst))
    }

    /// Register `linked` to be validated along with `field`, until the
    /// returned guard is dropped.
    pub(crate) fn link(&self, field: &str, linked: &str) -> Subscription {
        let id = {
            let mut next = lock(&self.inner.next_link);
            *next += 1;
            *next
        };
        lock(&self.inner.links).push(Link {
            id,
            field: field.to_string(),
            linked: linked.to_string(),
        });

        let inner: Weak<FormInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.links).retain(|link| link.id != id);
            }
        })
    }

    // -------------------------------------------------------------------------
    // Document
    // -------------------------------------------------------------------------

    /// Append an input to the document.
    pub fn add_input<T: FieldInput + 'static>(&self, input: &Arc<T>) {
        self.add_shared_input(Arc::clone(input) as Arc<dyn FieldInput>);
    }

    pub fn add_shared_input(&self, input: Arc<dyn FieldInput>) {
        debug!("Adding input '{}'", input.name());
        lock(&self.inner.inputs).push(input);
    }

    /// Remove every input named `name`. Returns false if none was present.
    pub fn remove_input(&self, name: &str) -> bool {
        let mut inputs = lock(&self.inner.inputs);
        let before = inputs.len();
        inputs.retain(|input| input.name() != name);
        before != inputs.len()
    }

    /// First input named `name`, in document order.
    pub fn input(&self, name: &str) -> Option<Arc<dyn FieldInput>> {
        lock(&self.inner.inputs)
            .iter()
            .find(|input| input.name() == name)
            .cloned()
    }

    /// Resolve targets to inputs: explicit inputs first, then name lookups
    /// in document order, then linked fields. No targets means the whole
    /// document. Names are deduplicated, first occurrence wins.
    fn resolve(&self, targets: Vec<FieldRef>) -> Vec<Arc<dyn FieldInput>> {
        let document = lock(&self.inner.inputs).clone();
        let whole_document = targets.is_empty();

        let mut resolved = Vec::new();
        let mut names = Vec::new();
        for target in targets {
            match target {
                FieldRef::Input(input) => resolved.push(input),
                FieldRef::Name(name) => names.push(name),
            }
        }

        if whole_document {
            resolved.extend(document.iter().cloned());
        } else if !names.is_empty() {
            for name in &names {
                if !document.iter().any(|input| &input.name() == name) {
                    debug!("No input named '{}' in the document", name);
                }
            }
            resolved.extend(
                document
                    .iter()
                    .filter(|input| names.contains(&input.name()))
                    .cloned(),
            );
        }

        let requested: Vec<String> = resolved.iter().map(|input| input.name()).collect();
        let linked: Vec<String> = {
            let links = lock(&self.inner.links);
            requested
                .iter()
                .flat_map(|name| {
                    links
                        .iter()
                        .filter(move |link| &link.field == name)
                        .map(|link| link.linked.clone())
                })
                .collect()
        };
        resolved.extend(
            document
                .iter()
                .filter(|input| linked.contains(&input.name()))
                .cloned(),
        );

        let mut seen = HashSet::new();
        resolved.retain(|input| seen.insert(input.name()));
        resolved
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Validate the given fields, or every field in the document when
    /// `targets` is empty.
    ///
    /// Registry entries are cleared and rule groups are notified before this
    /// returns. The future resolves once the slowest async rule of every
    /// requested field has resolved. If any rule failed, the error still
    /// carries every merged result.
    pub fn validate_fields<I, T>(&self, targets: I) -> BoxFuture<'static, Result<Vec<FieldValidation>, FormError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldRef>,
    {
        let inputs = self.resolve(targets.into_iter().map(Into::into).collect());
        self.run_passes(inputs)
    }

    /// Validate every field in the document.
    pub fn validate_all_fields(&self) -> BoxFuture<'static, Result<Vec<FieldValidation>, FormError>> {
        self.validate_fields(Vec::<FieldRef>::new())
    }

    /// Validate every field that is dirty or was never validated.
    ///
    /// A field with a completed pass and no change since cannot have become
    /// invalid, so its rules are not run again.
    pub fn validate_form(&self) -> BoxFuture<'static, Result<Vec<FieldValidation>, FormError>> {
        let inputs: Vec<Arc<dyn FieldInput>> = {
            let registry = lock(&self.inner.registry);
            let validated = lock(&self.inner.validated);
            self.resolve(Vec::new())
                .into_iter()
                .filter(|input| {
                    let name = input.name();
                    let skip = validated.contains(&name) && !registry.is_dirty(&name);
                    if skip {
                        debug!("Skipping clean field '{}'", name);
                    }
                    !skip
                })
                .collect()
        };
        self.run_passes(inputs)
    }

    /// Record a change without validating; the next [`Form::validate_form`] picks it up.
    pub fn mark_dirty(&self, name: &str) {
        self.inner.note_change(name);
    }

    /// A field changed: mark it dirty and validate it with its linked fields.
    pub fn field_changed(&self, target: impl Into<FieldRef>) -> BoxFuture<'static, Result<Vec<FieldValidation>, FormError>> {
        let target = target.into();
        let name = match &target {
            FieldRef::Input(input) => input.name(),
            FieldRef::Name(name) => name.clone(),
        };
        self.inner.note_change(&name);
        self.validate_fields([target])
    }

    /// Validate what needs validating, then report whether the form is valid.
    pub async fn submit(&self) -> Result<bool, FormError> {
        self.validate_form().await?;
        Ok(self.is_valid())
    }

    fn run_passes(&self, inputs: Vec<Arc<dyn FieldInput>>) -> BoxFuture<'static, Result<Vec<FieldValidation>, FormError>> {
        let passes: Vec<BoxFuture<'static, PassResult>> =
            inputs.into_iter().map(|input| self.start_pass(input)).collect();

        Box::pin(async move {
            let mut validations = Vec::with_capacity(passes.len());
            let mut failures = Vec::new();
            for (validation, pass_failures) in join_all(passes).await {
                validations.push(validation);
                failures.extend(pass_failures);
            }

            if failures.is_empty() {
                Ok(validations)
            } else {
                warn!("{} rule failure(s) during validation", failures.len());
                Err(FormError::RuleFailures {
                    failures,
                    validations,
                })
            }
        })
    }

    fn start_pass(&self, input: Arc<dyn FieldInput>) -> BoxFuture<'static, PassResult> {
        let snapshot = FieldSnapshot::capture(input.as_ref());
        let name = snapshot.name.clone();
        let ticket = self.inner.begin_pass(&name);
        debug!("Validating '{}' (pass {})", name, ticket.generation);

        let event = FieldWillValidate {
            field_name: name.clone(),
            snapshot,
        };

        let mut failures = Vec::new();
        let mut reports = Vec::new();
        for result in self.inner.events.field_will_validate.emit(&event) {
            match result {
                Ok(answer) => reports.extend(answer.into_future()),
                Err(panic) => failures.push(RuleFailure {
                    field: name.clone(),
                    key: None,
                    error: RuleError::new(panic.to_string()),
                }),
            }
        }

        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut outcomes = Vec::new();
            for report in join_all(reports).await {
                outcomes.extend(report.outcomes);
                failures.extend(report.failures);
            }

            let validation = FieldValidation::new(name, outcomes).settle_when_valid();
            if inner.merge(&validation, ticket) {
                for result in inner.events.field_did_validate.emit(&validation) {
                    if let Err(panic) = result {
                        failures.push(RuleFailure {
                            field: validation.field_name.clone(),
                            key: None,
                            error: RuleError::new(panic.to_string()),
                        });
                    }
                }
            } else {
                warn!(
                    "Discarding stale pass {} for '{}'",
                    ticket.generation, validation.field_name
                );
            }

            (validation, failures)
        })
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// True if no known field has an error.
    ///
    /// Lazy: reflects the last merged pass of each field. Under
    /// [`ValidityPolicy::Optimistic`] a field that was never validated is
    /// considered valid.
    pub fn is_valid(&self) -> bool {
        if lock(&self.inner.registry).has_errors(&[]) {
            return false;
        }
        match self.inner.config.validity {
            ValidityPolicy::Optimistic => true,
            ValidityPolicy::RequireValidated => {
                let validated = lock(&self.inner.validated);
                lock(&self.inner.inputs)
                    .iter()
                    .all(|input| validated.contains(&input.name()))
            }
        }
    }

    /// True if any of `names` has an error; with no names, any known field.
    pub fn has_errors(&self, names: &[&str]) -> bool {
        lock(&self.inner.registry).has_errors(names)
    }

    /// True if any field currently shows an error, warning or info.
    pub fn has_feedbacks(&self) -> bool {
        lock(&self.inner.registry).has_feedbacks()
    }

    pub fn field(&self, name: &str) -> Option<FieldEntry> {
        lock(&self.inner.registry).get(name).cloned()
    }

    /// Every known field entry, sorted by name.
    pub fn fields_snapshot(&self) -> Vec<FieldEntry> {
        lock(&self.inner.registry).entries()
    }

    /// Forget every result and dirty flag, and tell collaborators to do the same.
    ///
    /// Passes still in flight are discarded when they finish.
    pub fn reset(&self) {
        debug!("Resetting form");
        {
            let mut generations = lock(&self.inner.generations);
            for generation in generations.values_mut() {
                *generation += 1;
            }
            lock(&self.inner.registry).reset();
        }
        lock(&self.inner.validated).clear();
        for result in self.inner.events.reset.emit(&()) {
            if let Err(panic) = result {
                warn!("{}", panic);
            }
        }
    }
}
