// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Custom-field store with definition filtering and recency-based merge.
//!
//! One bag exists per thread (contact scope) and one per session (customer
//! scope). Incoming values for idents the channel does not define are
//! dropped; for defined idents, the variant with the newer `updated_at`
//! wins.

use std::collections::HashMap;

use tracing::debug;

use parlor_core::{CustomField, CustomFieldDefinition};

/// A key/value store of custom fields for one scope.
#[derive(Debug, Clone, Default)]
pub struct FieldBag {
    fields: HashMap<String, CustomField>,
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges incoming fields, filtering against `definitions` and keeping
    /// the newer variant per ident.
    pub fn merge(
        &mut self,
        incoming: impl IntoIterator<Item = CustomField>,
        definitions: &[CustomFieldDefinition],
    ) {
        for field in incoming {
            if !definitions.iter().any(|d| d.ident == field.ident) {
                debug!(ident = %field.ident, "dropping custom field with no definition");
                continue;
            }
            match self.fields.get(&field.ident) {
                Some(existing) if existing.updated_at >= field.updated_at => {}
                _ => {
                    self.fields.insert(field.ident.clone(), field);
                }
            }
        }
    }

    /// Non-empty value for an ident, if stored.
    pub fn value(&self, ident: &str) -> Option<&str> {
        self.fields
            .get(ident)
            .map(|f| f.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// All stored fields, ordered by ident for deterministic payloads.
    pub fn values(&self) -> Vec<CustomField> {
        let mut fields: Vec<CustomField> = self.fields.values().cloned().collect();
        fields.sort_by(|a, b| a.ident.cmp(&b.ident));
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn def(ident: &str) -> CustomFieldDefinition {
        CustomFieldDefinition {
            ident: ident.into(),
            label: None,
            is_required: false,
        }
    }

    fn field_at(ident: &str, value: &str, offset_secs: i64) -> CustomField {
        CustomField {
            ident: ident.into(),
            value: value.into(),
            updated_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn undefined_idents_are_dropped() {
        let mut bag = FieldBag::new();
        bag.merge(
            vec![field_at("email", "a@b.c", 0), field_at("ghost", "boo", 0)],
            &[def("email")],
        );
        assert_eq!(bag.value("email"), Some("a@b.c"));
        assert!(bag.value("ghost").is_none());
        assert_eq!(bag.values().len(), 1);
    }

    #[test]
    fn newer_value_wins() {
        let mut bag = FieldBag::new();
        bag.merge(vec![field_at("email", "old@x", 0)], &[def("email")]);
        bag.merge(vec![field_at("email", "new@x", 10)], &[def("email")]);
        assert_eq!(bag.value("email"), Some("new@x"));
    }

    #[test]
    fn older_incoming_value_is_ignored() {
        let mut bag = FieldBag::new();
        bag.merge(vec![field_at("email", "current@x", 0)], &[def("email")]);
        bag.merge(vec![field_at("email", "stale@x", -60)], &[def("email")]);
        assert_eq!(bag.value("email"), Some("current@x"));
    }

    #[test]
    fn empty_values_are_stored_but_not_surfaced() {
        let mut bag = FieldBag::new();
        bag.merge(vec![field_at("email", "", 0)], &[def("email")]);
        assert!(bag.value("email").is_none());
        assert_eq!(bag.values().len(), 1);
    }

    #[test]
    fn values_are_sorted_by_ident() {
        let mut bag = FieldBag::new();
        bag.merge(
            vec![field_at("zeta", "1", 0), field_at("alpha", "2", 0)],
            &[def("zeta"), def("alpha")],
        );
        let idents: Vec<String> = bag.values().into_iter().map(|f| f.ident).collect();
        assert_eq!(idents, vec!["alpha", "zeta"]);
    }
}
