//! Field registry: the per-field record of which outcomes fired.

use std::collections::HashMap;

use serde::Serialize;

use crate::outcome::{FeedbackKind, Outcome, OutcomeKey};

/// Registry record for one field.
///
/// The three buckets are disjoint and keep the document order of the pass
/// that filled them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    pub name: String,
    pub dirty: bool,
    pub errors: Vec<OutcomeKey>,
    pub warnings: Vec<OutcomeKey>,
    pub infos: Vec<OutcomeKey>,
}

impl FieldEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_infos(&self) -> bool {
        !self.infos.is_empty()
    }

    pub fn has_feedbacks(&self) -> bool {
        self.has_errors() || self.has_warnings() || self.has_infos()
    }
}

/// Maps field name to [`FieldEntry`].
///
/// Fields appear lazily, the first time they are cleared, recorded or
/// marked dirty. An absent field is valid and clean.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldEntry>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the buckets of `name`, keeping its dirty flag.
    pub fn clear(&mut self, name: &str) {
        let dirty = self.fields.get(name).is_some_and(|entry| entry.dirty);
        let mut entry = FieldEntry::new(name);
        entry.dirty = dirty;
        self.fields.insert(name.to_string(), entry);
    }

    /// Append an outcome key to the bucket matching its kind.
    ///
    /// The caller must have cleared the field earlier in the same pass.
    /// Outcomes that did not fire, and when-valid markers, only make sure
    /// the entry exists.
    pub fn record_outcome(&mut self, outcome: &Outcome) {
        let entry = self
            .fields
            .entry(outcome.field.clone())
            .or_insert_with(|| FieldEntry::new(&outcome.field));

        if !outcome.applicable {
            return;
        }

        match outcome.kind {
            FeedbackKind::Error => entry.errors.push(outcome.key),
            FeedbackKind::Warning => entry.warnings.push(outcome.key),
            FeedbackKind::Info => entry.infos.push(outcome.key),
            FeedbackKind::WhenValid => {}
        }
    }

    /// True if any of `names` has an error. With no names, checks every known field.
    pub fn has_errors(&self, names: &[&str]) -> bool {
        if names.is_empty() {
            return self.fields.values().any(FieldEntry::has_errors);
        }
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .any(FieldEntry::has_errors)
    }

    /// True if any known field has an error, warning or info.
    pub fn has_feedbacks(&self) -> bool {
        self.fields.values().any(FieldEntry::has_feedbacks)
    }

    /// Record a user change. Creates the entry if needed.
    pub fn mark_dirty(&mut self, name: &str) {
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| FieldEntry::new(name))
            .dirty = true;
    }

    /// Record that the field's latest change has been validated.
    pub fn mark_clean(&mut self, name: &str) {
        if let Some(entry) = self.fields.get_mut(name) {
            entry.dirty = false;
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|entry| entry.dirty)
    }

    /// Known field names, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// Entries sorted by name, for summaries.
    pub fn entries(&self) -> Vec<FieldEntry> {
        let mut entries: Vec<FieldEntry> = self.fields.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Forget every field, which also clears every dirty flag.
    pub fn reset(&mut self) {
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::GroupKey;

    fn outcome(field: &str, index: usize, kind: FeedbackKind) -> Outcome {
        Outcome::fired(field, OutcomeKey::new(GroupKey(0), index), kind, None)
    }

    #[test]
    fn test_unknown_field_is_valid_and_clean() {
        let registry = FieldRegistry::new();
        assert!(!registry.has_errors(&["username"]));
        assert!(!registry.is_dirty("username"));
        assert!(!registry.has_errors(&[]));
    }

    #[test]
    fn test_record_outcome_buckets_by_kind() {
        let mut registry = FieldRegistry::new();
        registry.clear("password");
        registry.record_outcome(&outcome("password", 0, FeedbackKind::Error));
        registry.record_outcome(&outcome("password", 1, FeedbackKind::Warning));
        registry.record_outcome(&outcome("password", 2, FeedbackKind::Warning));
        registry.record_outcome(&outcome("password", 3, FeedbackKind::Info));
        registry.record_outcome(&outcome("password", 4, FeedbackKind::WhenValid));

        let entry = registry.get("password").unwrap();
        assert_eq!(entry.errors.len(), 1);
        assert_eq!(
            entry.warnings,
            vec![
                OutcomeKey::new(GroupKey(0), 1),
                OutcomeKey::new(GroupKey(0), 2)
            ]
        );
        assert_eq!(entry.infos.len(), 1);
        assert!(registry.has_errors(&["password"]));
        assert!(registry.has_errors(&[]));
    }

    #[test]
    fn test_skipped_outcome_only_creates_entry() {
        let mut registry = FieldRegistry::new();
        let skipped = Outcome::skipped("email", OutcomeKey::new(GroupKey(1), 0), FeedbackKind::Error);
        registry.record_outcome(&skipped);

        assert!(registry.is_known("email"));
        assert!(!registry.has_errors(&["email"]));
        assert!(!registry.has_feedbacks());
    }

    #[test]
    fn test_clear_keeps_dirty_flag() {
        let mut registry = FieldRegistry::new();
        registry.mark_dirty("username");
        registry.record_outcome(&outcome("username", 0, FeedbackKind::Error));
        registry.clear("username");

        let entry = registry.get("username").unwrap();
        assert!(entry.dirty);
        assert!(!entry.has_feedbacks());
    }

    #[test]
    fn test_has_errors_ignores_other_fields() {
        let mut registry = FieldRegistry::new();
        registry.record_outcome(&outcome("username", 0, FeedbackKind::Error));
        registry.record_outcome(&outcome("password", 0, FeedbackKind::Warning));

        assert!(!registry.has_errors(&["password"]));
        assert!(registry.has_errors(&["password", "username"]));
        assert!(!registry.has_errors(&["missing"]));
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut registry = FieldRegistry::new();
        registry.mark_dirty("username");
        registry.record_outcome(&outcome("username", 0, FeedbackKind::Error));
        registry.reset();

        assert!(!registry.has_errors(&[]));
        assert!(!registry.is_dirty("username"));
        assert!(registry.field_names().is_empty());
    }
}
