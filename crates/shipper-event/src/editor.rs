// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Copy-on-write transactional editing of an [`Event`].
//!
//! An [`EventEditor`] borrows the original event and collects every change in a lazily
//! allocated `pending` event. Root-level branches of the original are cloned into
//! `pending` the first time they are written or read as a mapping ("checkout"). Once a
//! root is checked out every read and write for it is served from `pending`. Root-level
//! deletions are tracked separately and only reach the original on [`EventEditor::apply`].
//!
//! Branches that are never checked out are never cloned, so after `apply` the original
//! keeps the very same allocation for them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::constants::{
    ERROR_FIELD_KEY, METADATA_FIELD_KEY, METADATA_KEY_PREFIX, TAGS_KEY, TIMESTAMP_FIELD_KEY,
};
use crate::errors::{FieldError, ProcessingError};
use crate::event::{to_timestamp, Event};
use crate::path::{root_segment, FieldPath, Namespace, RootKey};
use crate::value::{flatten_value, Map, Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkout {
    OnlyMaps,
    IncludeScalars,
}

/// Transactional overlay over a borrowed [`Event`].
#[derive(Debug)]
pub struct EventEditor<'a> {
    original: &'a mut Event,
    pending: Option<Event>,
    deletions: HashSet<RootKey>,
}

impl<'a> EventEditor<'a> {
    pub fn new(original: &'a mut Event) -> Self {
        Self {
            original,
            pending: None,
            deletions: HashSet::new(),
        }
    }

    /// The event as it was before any of the pending changes.
    #[must_use]
    pub fn original(&self) -> &Event {
        self.original
    }

    /// Whether there are changes waiting for [`EventEditor::apply`].
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Gets the value at a dotted key.
    ///
    /// Mappings are always returned from the checked-out copy, never from the original.
    pub fn get_value(&mut self, key: &str) -> Result<Value, FieldError> {
        let (namespace, sub) = match FieldPath::parse(key) {
            FieldPath::Timestamp => return Ok(Value::Timestamp(self.timestamp())),
            FieldPath::MetadataRoot => return Err(FieldError::MetadataAccessDenied),
            path => match path.namespaced() {
                Some(namespaced) => namespaced,
                None => return Err(FieldError::not_found(key)),
            },
        };
        let Some(root) = self.visible_root(namespace, sub) else {
            return Err(FieldError::not_found(sub));
        };

        if let Some(pending) = &self.pending {
            let pending = pending.namespace(namespace);
            if pending.contains_key(root) {
                return pending.get_value(sub).cloned();
            }
        }

        let value = self.lookup_original(namespace, root, sub)?;
        if !value.is_map() {
            return Ok(value.clone());
        }

        self.checkout_root(namespace, root, Checkout::OnlyMaps);
        self.pending_mut().namespace(namespace).get_value(sub).cloned()
    }

    /// Stores a value at a dotted key and returns the value it replaced.
    pub fn put_value(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, FieldError> {
        let (namespace, sub) = match FieldPath::parse(key) {
            FieldPath::Timestamp => {
                let timestamp = to_timestamp(&value.into())?;
                let pending = self.pending_mut();
                let previous = std::mem::replace(&mut pending.timestamp, timestamp);
                return Ok(Some(Value::Timestamp(previous)));
            }
            FieldPath::MetadataRoot => return Err(FieldError::MetadataMutationDenied),
            path => match path.namespaced() {
                Some(namespaced) => namespaced,
                None => return Err(FieldError::MetadataMutationDenied),
            },
        };

        self.checkout(namespace, sub, Checkout::IncludeScalars);
        self.pending_mut()
            .namespace_mut(namespace)
            .put_value(sub, value)
    }

    /// Deletes the value at a dotted key.
    ///
    /// Root-level keys of the original are only marked and disappear on apply. Nested
    /// keys are removed from a checked-out copy of their root. Keys resolve to a root the
    /// same way reads do.
    pub fn delete(&mut self, key: &str) -> Result<(), FieldError> {
        let (namespace, sub) = match FieldPath::parse(key) {
            FieldPath::Timestamp => return Err(FieldError::TimestampDeletionDenied),
            FieldPath::MetadataRoot => return Err(FieldError::MetadataMutationDenied),
            path => match path.namespaced() {
                Some(namespaced) => namespaced,
                None => return Err(FieldError::MetadataMutationDenied),
            },
        };

        let Some(root) = self.visible_root(namespace, sub) else {
            return Err(FieldError::not_found(key));
        };
        if root == sub {
            if self.original.namespace(namespace).contains_key(root) {
                self.mark_deleted(RootKey::new(namespace, root));
            }
            self.pending_mut().namespace_mut(namespace).remove(root);
            return Ok(());
        }

        let in_pending = self
            .pending
            .as_ref()
            .is_some_and(|p| p.namespace(namespace).contains_key(root));
        if !in_pending {
            self.lookup_original(namespace, root, sub)?;
            self.checkout_root(namespace, root, Checkout::OnlyMaps);
        }
        self.pending_mut()
            .namespace_mut(namespace)
            .delete(sub)
            .map(drop)
    }

    pub fn has_key(&mut self, key: &str) -> Result<bool, FieldError> {
        match self.get_value(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Recursively merges `update` into the event, replacing existing values.
    /// See [`Event::deep_update`] for how entries are routed.
    pub fn deep_update(&mut self, update: &Map) {
        self.merge(update, true);
    }

    /// Recursively merges `update` into the event, keeping existing values.
    pub fn deep_update_no_overwrite(&mut self, update: &Map) {
        self.merge(update, false);
    }

    fn merge(&mut self, update: &Map, overwrite: bool) {
        if update.is_empty() {
            return;
        }
        let mode = if overwrite {
            Checkout::OnlyMaps
        } else {
            Checkout::IncludeScalars
        };

        for (key, value) in update.iter() {
            match key.as_str() {
                TIMESTAMP_FIELD_KEY => {}
                METADATA_FIELD_KEY => {
                    if let Value::Map(meta) = value {
                        for inner in meta.keys() {
                            self.checkout_root(Namespace::Metadata, inner, mode);
                        }
                    }
                }
                // update entries are root-level keys, dots are literal
                _ => self.checkout_root(Namespace::Fields, key, mode),
            }
        }

        self.pending_mut().merge(update, overwrite);
    }

    /// Commits every pending change into the original event.
    pub fn apply(&mut self) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };

        self.original.timestamp = pending.timestamp;
        for root in self.deletions.drain() {
            self.original.namespace_mut(root.namespace()).remove(root.key());
        }
        for (key, value) in pending.meta.drain() {
            self.original.meta.insert(key, value);
        }
        for (key, value) in pending.fields.drain() {
            self.original.fields.insert(key, value);
        }
    }

    /// Discards every pending change.
    pub fn reset(&mut self) {
        self.pending = None;
        self.deletions.clear();
    }

    /// Current computed state of the fields, original untouched.
    #[must_use]
    pub fn fields(&self) -> Map {
        let mut fields = self.original.fields.clone();
        for root in &self.deletions {
            if let RootKey::Field(key) = root {
                fields.remove(key);
            }
        }
        if let Some(pending) = &self.pending {
            for (key, value) in pending.fields.iter() {
                fields.insert(key.as_str(), value.clone());
            }
        }
        fields
    }

    /// Every dotted leaf key of the current computed state, sorted. Metadata keys carry
    /// the `@metadata.` prefix.
    #[must_use]
    pub fn flatten_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for namespace in [Namespace::Metadata, Namespace::Fields] {
            let prefix = match namespace {
                Namespace::Metadata => METADATA_KEY_PREFIX,
                Namespace::Fields => "",
            };
            let pending = self.pending.as_ref().map(|p| p.namespace(namespace));
            for (root, value) in self.original.namespace(namespace).iter() {
                let shadowed = pending.is_some_and(|p| p.contains_key(root));
                if shadowed || self.is_deleted(namespace, root) {
                    continue;
                }
                flatten_value(format!("{prefix}{root}"), value, &mut keys);
            }
            if let Some(pending) = pending {
                for (root, value) in pending.iter() {
                    flatten_value(format!("{prefix}{root}"), value, &mut keys);
                }
            }
        }
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Discards pending changes and marks every root-level key of the original for deletion.
    pub fn delete_all(&mut self) {
        self.reset();
        let mut roots = Vec::new();
        for namespace in [Namespace::Metadata, Namespace::Fields] {
            roots.extend(
                self.original
                    .namespace(namespace)
                    .keys()
                    .map(|key| RootKey::new(namespace, key)),
            );
        }
        for root in roots {
            self.mark_deleted(root);
        }
    }

    /// Appends `tags` to the `tags` field, creating it when missing.
    pub fn add_tags<I, S>(&mut self, tags: I) -> Result<(), FieldError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_tags_with_key(TAGS_KEY, tags)
    }

    /// Appends `tags` to the list at `key`, creating it when missing.
    pub fn add_tags_with_key<I, S>(&mut self, key: &str, tags: I) -> Result<(), FieldError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<Value> = tags
            .into_iter()
            .map(|tag| Value::String(tag.into()))
            .collect();
        if tags.is_empty() {
            return Ok(());
        }
        let (namespace, sub) = match FieldPath::parse(key) {
            FieldPath::Timestamp => {
                return Err(FieldError::ExpectedList {
                    key: key.to_owned(),
                    found: ValueKind::Timestamp,
                })
            }
            FieldPath::MetadataRoot => return Err(FieldError::MetadataMutationDenied),
            path => match path.namespaced() {
                Some(namespaced) => namespaced,
                None => return Err(FieldError::MetadataMutationDenied),
            },
        };

        self.checkout(namespace, sub, Checkout::IncludeScalars);
        let target = self.pending_mut().namespace_mut(namespace);
        match target.get_value_mut(sub) {
            Ok(Value::List(items)) => {
                items.extend(tags);
                Ok(())
            }
            Ok(other) => Err(FieldError::ExpectedList {
                key: key.to_owned(),
                found: other.kind(),
            }),
            Err(e) if e.is_not_found() => target.put_value(sub, tags).map(drop),
            Err(e) => Err(e),
        }
    }

    /// Records processing errors under the `error` field.
    ///
    /// A single error is stored as a map and several as a list. An existing list is always
    /// extended. Any other error already present becomes the first item of the list.
    /// Errors without a message are skipped.
    pub fn add_error<I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = ProcessingError>,
    {
        let errors: Vec<Value> = errors
            .into_iter()
            .filter(|e| !e.message.is_empty())
            .map(|e| Value::from(e.to_map()))
            .collect();
        if errors.is_empty() {
            return;
        }

        self.checkout(Namespace::Fields, ERROR_FIELD_KEY, Checkout::IncludeScalars);
        let fields = &mut self.pending_mut().fields;
        let (mut list, was_list) = match fields.remove(ERROR_FIELD_KEY) {
            None => (Vec::with_capacity(errors.len()), false),
            Some(Value::List(items)) => (items, true),
            Some(Value::String(message)) => (
                vec![Value::from(ProcessingError::new(message).to_map())],
                false,
            ),
            Some(existing) => (vec![existing], false),
        };
        list.extend(errors);

        // a lone error is stored as a map unless the field already was a list
        let value = if list.len() == 1 && !was_list {
            list.remove(0)
        } else {
            Value::List(list)
        };
        fields.insert(ERROR_FIELD_KEY, value);
    }

    fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.pending
            .as_ref()
            .map_or(self.original.timestamp, |pending| pending.timestamp)
    }

    fn pending_mut(&mut self) -> &mut Event {
        let timestamp = self.original.timestamp;
        self.pending.get_or_insert_with(|| Event::new(timestamp))
    }

    fn is_deleted(&self, namespace: Namespace, root: &str) -> bool {
        !self.deletions.is_empty() && self.deletions.contains(&RootKey::new(namespace, root))
    }

    fn mark_deleted(&mut self, root: RootKey) {
        self.pending_mut();
        self.deletions.insert(root);
    }

    /// Root-level key holding `key` in the state `apply` would produce: pending roots and
    /// the original roots not marked for deletion.
    fn visible_root<'k>(&self, namespace: Namespace, key: &'k str) -> Option<&'k str> {
        let pending = self.pending.as_ref().map(|p| p.namespace(namespace));
        let original = self.original.namespace(namespace);
        root_segment(key, |root| {
            pending.is_some_and(|p| p.contains_key(root))
                || (original.contains_key(root) && !self.is_deleted(namespace, root))
        })
    }

    /// Looks `key` up under `root` of the original, ignoring any other root it matches.
    fn lookup_original(
        &self,
        namespace: Namespace,
        root: &str,
        key: &str,
    ) -> Result<&Value, FieldError> {
        match self.original.namespace(namespace).get(root) {
            Some(value) if root == key => Ok(value),
            Some(Value::Map(inner)) => inner.lookup(&key[root.len() + 1..], key),
            Some(other) => Err(FieldError::type_conflict(root, other.kind())),
            None => Err(FieldError::not_found(key)),
        }
    }

    /// Clones the root branch holding `key` from the original into `pending`.
    fn checkout(&mut self, namespace: Namespace, key: &str, mode: Checkout) {
        if let Some(root) = self.visible_root(namespace, key) {
            self.checkout_root(namespace, root, mode);
        }
    }

    fn checkout_root(&mut self, namespace: Namespace, root: &str, mode: Checkout) {
        if self.is_deleted(namespace, root) {
            return;
        }
        if let Some(pending) = &self.pending {
            if pending.namespace(namespace).contains_key(root) {
                return;
            }
        }
        let value = match self.original.namespace(namespace).get(root) {
            Some(Value::Map(map)) => Value::Map(Arc::new(map.deep_clone())),
            Some(scalar) if mode == Checkout::IncludeScalars => scalar.clone(),
            _ => return,
        };
        self.pending_mut().namespace_mut(namespace).insert(root, value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn nested(level: &str, prefix: &str) -> Map {
        Map::from([
            (format!("{prefix}Level1Value"), Value::from(format!("{level}2"))),
            (
                format!("{prefix}Level1Map"),
                Value::from(Map::from([(
                    format!("{prefix}Level2Value"),
                    Value::from(format!("{level}3")),
                )])),
            ),
        ])
    }

    fn fixture() -> Event {
        Event::new(ts("2024-01-01T00:00:00Z"))
            .with_meta(Map::from([
                ("metaLevel0Value", Value::from("metavalue1")),
                ("metaLevel0Map", Value::from(nested("metavalue", "meta"))),
                ("a.b", Value::from("c")),
            ]))
            .with_fields(Map::from([
                ("fieldsLevel0Value", Value::from("fieldsvalue1")),
                ("fieldsLevel0Map", Value::from(nested("fieldsvalue", "fields"))),
                ("a.b", Value::from("c")),
            ]))
    }

    #[test]
    fn test_get_timestamp() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.get_value("@timestamp").unwrap(),
            Value::Timestamp(ts("2024-01-01T00:00:00Z"))
        );
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_get_bare_metadata_denied() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.get_value("@metadata").unwrap_err(),
            FieldError::MetadataAccessDenied
        );
    }

    #[test]
    fn test_get_scalar_does_not_checkout() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.get_value("@metadata.metaLevel0Value").unwrap(),
            Value::from("metavalue1")
        );
        assert_eq!(
            editor
                .get_value("fieldsLevel0Map.fieldsLevel1Map.fieldsLevel2Value")
                .unwrap(),
            Value::from("fieldsvalue3")
        );
        assert_eq!(editor.get_value("a.b").unwrap(), Value::from("c"));
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_get_map_returns_checked_out_clone() {
        let mut event = fixture();
        let original = event.meta.get("metaLevel0Map").unwrap().clone();
        let mut editor = EventEditor::new(&mut event);

        let first = editor.get_value("@metadata.metaLevel0Map").unwrap();
        assert_eq!(first, original);
        assert!(!first.ptr_eq(&original));
        assert!(editor.is_dirty());

        // repeated reads are served by the same checked-out copy
        let second = editor.get_value("@metadata.metaLevel0Map").unwrap();
        assert!(first.ptr_eq(&second));

        let nested = editor
            .get_value("@metadata.metaLevel0Map.metaLevel1Map")
            .unwrap();
        let original_nested = original.as_map().unwrap().get("metaLevel1Map").unwrap();
        assert!(!nested.ptr_eq(original_nested));
    }

    #[test]
    fn test_get_missing() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert!(editor.get_value("wrong").unwrap_err().is_not_found());
        assert!(editor.get_value("wrong.key").unwrap_err().is_not_found());
        assert!(editor
            .get_value("fieldsLevel0Map.wrong")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_get_type_conflict() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        let err = editor.get_value("fieldsLevel0Value.x").unwrap_err();
        assert_eq!(
            err,
            FieldError::TypeConflict {
                key: "fieldsLevel0Value".to_string(),
                found: ValueKind::String
            }
        );
    }

    #[test]
    fn test_put_timestamp() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        let previous = editor
            .put_value("@timestamp", ts("2024-06-01T00:00:00Z"))
            .unwrap();
        assert_eq!(previous, Some(Value::Timestamp(ts("2024-01-01T00:00:00Z"))));
        assert_eq!(
            editor.get_value("@timestamp").unwrap(),
            Value::Timestamp(ts("2024-06-01T00:00:00Z"))
        );
        assert_eq!(editor.original().timestamp, ts("2024-01-01T00:00:00Z"));

        editor.apply();
        drop(editor);
        assert_eq!(event.timestamp, ts("2024-06-01T00:00:00Z"));
    }

    #[test]
    fn test_put_bare_metadata_denied() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.put_value("@metadata", "some").unwrap_err(),
            FieldError::MetadataMutationDenied
        );
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_put_new_root_value() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(editor.put_value("@metadata.new", "value").unwrap(), None);
        assert_eq!(
            editor.get_value("@metadata.new").unwrap(),
            Value::from("value")
        );
        assert!(editor
            .original()
            .get_value("@metadata.new")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_put_existing_root_dot_key() {
        let mut event = fixture();
        let replacement = Value::from(Map::from([("some", Value::from("value"))]));
        let mut editor = EventEditor::new(&mut event);

        let previous = editor
            .put_value("@metadata.a.b", replacement.clone())
            .unwrap();
        assert_eq!(previous, Some(Value::from("c")));
        assert_eq!(editor.get_value("@metadata.a.b").unwrap(), replacement);
        assert_eq!(
            editor.original().get_value("@metadata.a.b").unwrap(),
            Value::from("c")
        );
    }

    #[test]
    fn test_put_nested_value_checks_out_root() {
        let mut event = fixture();
        let original = event.fields.get("fieldsLevel0Map").unwrap().clone();
        let mut editor = EventEditor::new(&mut event);

        let key = "fieldsLevel0Map.fieldsLevel1Map.new";
        assert_eq!(editor.put_value(key, "newvalue").unwrap(), None);
        assert_eq!(editor.get_value(key).unwrap(), Value::from("newvalue"));
        assert!(editor.original().get_value(key).unwrap_err().is_not_found());

        let checked_out = editor.get_value("fieldsLevel0Map").unwrap();
        assert!(!checked_out.ptr_eq(&original));
    }

    #[test]
    fn test_put_replacing_nested_value() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        let key = "@metadata.metaLevel0Map.metaLevel1Map.metaLevel2Value";

        let previous = editor.put_value(key, "new").unwrap();
        assert_eq!(previous, Some(Value::from("metavalue3")));
        assert_eq!(editor.get_value(key).unwrap(), Value::from("new"));
        assert_eq!(
            editor.original().get_value(key).unwrap(),
            Value::from("metavalue3")
        );
    }

    #[test]
    fn test_put_absolutely_new_nested_value() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.put_value("new1.new2.new3", "newvalue").unwrap();
        assert_eq!(
            editor.get_value("new1.new2.new3").unwrap(),
            Value::from("newvalue")
        );
        assert!(editor.get_value("new1.new2").unwrap().is_map());
    }

    #[test]
    fn test_put_type_conflict() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        let err = editor.put_value("fieldsLevel0Value.x", 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "key=fieldsLevel0Value: expected map but type is string"
        );
    }

    #[test]
    fn test_delete_timestamp_and_metadata_denied() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.delete("@timestamp").unwrap_err(),
            FieldError::TimestampDeletionDenied
        );
        assert_eq!(
            editor.delete("@metadata").unwrap_err(),
            FieldError::MetadataMutationDenied
        );
    }

    #[test]
    fn test_delete_missing() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        assert!(editor.delete("wrong").unwrap_err().is_not_found());
        assert!(editor.delete("wrong.key").unwrap_err().is_not_found());
        assert!(editor.delete("@metadata.wrong").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_root_values() {
        for key in [
            "fieldsLevel0Value",
            "a.b",
            "fieldsLevel0Map",
            "@metadata.metaLevel0Value",
            "@metadata.a.b",
            "@metadata.metaLevel0Map",
        ] {
            let mut event = fixture();
            let before = event.get_value(key).unwrap();
            let mut editor = EventEditor::new(&mut event);

            editor.delete(key).unwrap();
            assert!(editor.get_value(key).unwrap_err().is_not_found(), "{key}");
            assert!(!editor.has_key(key).unwrap());

            let after = editor.original().get_value(key).unwrap();
            assert_eq!(before, after);
            if before.is_map() {
                assert!(before.ptr_eq(&after));
            }

            // a root cannot be deleted twice
            assert!(editor.delete(key).unwrap_err().is_not_found(), "{key}");

            editor.apply();
            drop(editor);
            assert!(event.get_value(key).unwrap_err().is_not_found(), "{key}");
        }
    }

    #[test]
    fn test_delete_nested() {
        let mut event = fixture();
        let original = event.fields.get("fieldsLevel0Map").unwrap().clone();
        let mut editor = EventEditor::new(&mut event);
        let key = "fieldsLevel0Map.fieldsLevel1Map";

        editor.delete(key).unwrap();
        assert!(editor.get_value(key).unwrap_err().is_not_found());
        assert!(editor.delete(key).unwrap_err().is_not_found());

        let from_original = editor.original().get_value(key).unwrap();
        assert!(from_original.ptr_eq(original.as_map().unwrap().get("fieldsLevel1Map").unwrap()));
    }

    #[test]
    fn test_delete_nested_under_deleted_root() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.delete("fieldsLevel0Map").unwrap();
        assert!(editor
            .get_value("fieldsLevel0Map.fieldsLevel1Value")
            .unwrap_err()
            .is_not_found());
        assert!(editor
            .delete("fieldsLevel0Map.fieldsLevel1Value")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_delete_then_put_root() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.delete("fieldsLevel0Value").unwrap();
        assert_eq!(editor.put_value("fieldsLevel0Value", 5).unwrap(), None);
        assert_eq!(editor.get_value("fieldsLevel0Value").unwrap(), Value::from(5));

        editor.apply();
        drop(editor);
        assert_eq!(event.get_value("fieldsLevel0Value").unwrap(), Value::from(5));
    }

    #[test]
    fn test_delete_pending_only_value() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.put_value("fresh", 1).unwrap();
        editor.delete("fresh").unwrap();
        assert!(!editor.has_key("fresh").unwrap());
    }

    #[test]
    fn test_hierarchy_escalation() {
        let mut event = Event::default().with_fields(Map::from([("a.b", Value::from(1))]));
        let mut editor = EventEditor::new(&mut event);

        editor.delete("a.b").unwrap();
        editor.put_value("a.b.c", 1).unwrap();
        assert_eq!(editor.get_value("a.b.c").unwrap(), Value::from(1));
        editor.apply();
        drop(editor);

        let expected = Map::from([(
            "a",
            Value::from(Map::from([(
                "b",
                Value::from(Map::from([("c", Value::from(1))])),
            )])),
        )]);
        assert_eq!(event.fields, expected);
    }

    #[test]
    fn test_deep_update() {
        let mut event = fixture();
        let untouched = event.fields.get("fieldsLevel0Map").unwrap().clone();
        let mut editor = EventEditor::new(&mut event);

        editor.deep_update(&Map::from([
            ("@timestamp", Value::from(ts("2024-02-02T00:00:00Z"))),
            (
                "@metadata",
                Value::from(Map::from([(
                    "metaLevel0Map",
                    Value::from(Map::from([("new", Value::from(1))])),
                )])),
            ),
            ("fieldsLevel0Value", Value::from("replaced")),
        ]));

        assert_eq!(
            editor.get_value("@metadata.metaLevel0Map.new").unwrap(),
            Value::from(1)
        );
        assert_eq!(
            editor
                .get_value("@metadata.metaLevel0Map.metaLevel1Value")
                .unwrap(),
            Value::from("metavalue2")
        );
        assert!(editor
            .original()
            .get_value("@metadata.metaLevel0Map.new")
            .is_err());

        editor.apply();
        drop(editor);
        assert_eq!(event.timestamp, ts("2024-02-02T00:00:00Z"));
        assert_eq!(
            event.get_value("fieldsLevel0Value").unwrap(),
            Value::from("replaced")
        );
        assert!(event.fields.get("fieldsLevel0Map").unwrap().ptr_eq(&untouched));
    }

    #[test]
    fn test_deep_update_no_overwrite() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);

        editor.deep_update_no_overwrite(&Map::from([
            ("@timestamp", Value::from(ts("2024-02-02T00:00:00Z"))),
            ("fieldsLevel0Value", Value::from("ignored")),
            (
                "fieldsLevel0Map",
                Value::from(Map::from([
                    ("fieldsLevel1Value", Value::from("ignored")),
                    ("new", Value::from(true)),
                ])),
            ),
            ("brand", Value::from("new")),
        ]));
        editor.apply();
        drop(editor);

        assert_eq!(event.timestamp, ts("2024-01-01T00:00:00Z"));
        assert_eq!(
            event.get_value("fieldsLevel0Value").unwrap(),
            Value::from("fieldsvalue1")
        );
        assert_eq!(
            event.get_value("fieldsLevel0Map.fieldsLevel1Value").unwrap(),
            Value::from("fieldsvalue2")
        );
        assert_eq!(
            event.get_value("fieldsLevel0Map.new").unwrap(),
            Value::from(true)
        );
        assert_eq!(event.get_value("brand").unwrap(), Value::from("new"));
    }

    #[test]
    fn test_deep_update_dotted_key_reads_back() {
        let mut event = Event::default().with_fields(Map::from([(
            "a",
            Value::from(Map::from([("b", Value::from(0))])),
        )]));
        let mut direct = event.clone();
        direct.deep_update(&Map::from([("a.b", Value::from(1))]));

        let mut editor = EventEditor::new(&mut event);
        editor.deep_update(&Map::from([("a.b", Value::from(1))]));
        assert_eq!(editor.get_value("a.b").unwrap(), Value::from(1));
        assert_eq!(editor.get_value("a.b").unwrap(), direct.get_value("a.b").unwrap());
        assert!(editor.has_key("a.b").unwrap());
        // the nested branch is still reachable through its own root
        assert_eq!(
            editor.get_value("a").unwrap(),
            Value::from(Map::from([("b", Value::from(0))]))
        );

        editor.apply();
        drop(editor);
        assert_eq!(event, direct);
        assert_eq!(event.get_value("a.b").unwrap(), Value::from(1));
    }

    #[test]
    fn test_dotted_root_visible_under_deleted_prefix() {
        let mut event = Event::default().with_fields(Map::from([(
            "a",
            Value::from(Map::from([(
                "b",
                Value::from(Map::from([("c", Value::from(0))])),
            )])),
        )]));
        let mut editor = EventEditor::new(&mut event);
        editor.delete("a").unwrap();
        editor.deep_update(&Map::from([(
            "a.b",
            Value::from(Map::from([("c", Value::from(1))])),
        )]));

        assert_eq!(editor.get_value("a.b.c").unwrap(), Value::from(1));
        assert!(editor.get_value("a").unwrap_err().is_not_found());

        editor.apply();
        drop(editor);
        assert_eq!(event.get_value("a.b.c").unwrap(), Value::from(1));
        assert!(!event.fields.contains_key("a"));
    }

    #[test]
    fn test_writes_skip_deleted_prefix() {
        let mut event = Event::default().with_fields(Map::from([
            ("a", Value::from(Map::from([("x", Value::from(1))]))),
            ("a.b", Value::from(Map::from([("c", Value::from(0))]))),
        ]));
        let mut direct = event.clone();
        direct.delete("a").unwrap();
        direct.put_value("a.b.c", 5).unwrap();
        direct.delete("a.b.d").unwrap_err();

        let mut editor = EventEditor::new(&mut event);
        editor.delete("a").unwrap();
        assert_eq!(editor.put_value("a.b.c", 5).unwrap(), Some(Value::from(0)));
        assert!(editor.delete("a.b.d").unwrap_err().is_not_found());
        assert_eq!(editor.get_value("a.b.c").unwrap(), Value::from(5));

        editor.apply();
        drop(editor);
        assert_eq!(event, direct);
        assert_eq!(event.fields.flatten_keys(), vec!["a.b.c"]);
    }

    #[test]
    fn test_delete_nested_under_scalar_root() {
        let mut event = Event::default().with_fields(Map::from([
            ("a", Value::from(5)),
            ("a.b", Value::from(Map::from([("c", Value::from(0))]))),
        ]));
        let mut editor = EventEditor::new(&mut event);
        assert_eq!(
            editor.delete("a.b.c").unwrap_err(),
            FieldError::TypeConflict {
                key: "a".to_string(),
                found: ValueKind::Int,
            }
        );
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_apply_keeps_untouched_identity() {
        let mut event = fixture();
        let meta_map = event.meta.get("metaLevel0Map").unwrap().clone();
        let fields_map = event.fields.get("fieldsLevel0Map").unwrap().clone();
        let mut editor = EventEditor::new(&mut event);

        editor
            .put_value("fieldsLevel0Map.fieldsLevel1Map.x", 1)
            .unwrap();
        editor.apply();
        editor.apply();
        drop(editor);

        assert!(event.meta.get("metaLevel0Map").unwrap().ptr_eq(&meta_map));
        assert!(!event.fields.get("fieldsLevel0Map").unwrap().ptr_eq(&fields_map));
        assert_eq!(
            event.get_value("fieldsLevel0Map.fieldsLevel1Map.x").unwrap(),
            Value::from(1)
        );
        // the handle taken before the edit still sees the old tree
        assert!(fields_map
            .as_map()
            .unwrap()
            .get_value("fieldsLevel1Map.x")
            .is_err());
    }

    #[test]
    fn test_reset() {
        let mut event = fixture();
        let snapshot = event.clone();
        let mut editor = EventEditor::new(&mut event);

        editor.put_value("fieldsLevel0Map.x", 1).unwrap();
        editor.delete("fieldsLevel0Value").unwrap();
        editor.put_value("@timestamp", ts("2030-01-01T00:00:00Z")).unwrap();
        editor.reset();
        editor.reset();
        assert!(!editor.is_dirty());

        assert!(editor.get_value("fieldsLevel0Map.x").unwrap_err().is_not_found());
        assert_eq!(
            editor.get_value("fieldsLevel0Value").unwrap(),
            Value::from("fieldsvalue1")
        );
        assert_eq!(
            editor.get_value("@timestamp").unwrap(),
            Value::Timestamp(snapshot.timestamp)
        );
        editor.apply();
        drop(editor);
        assert_eq!(event, snapshot);
    }

    #[test]
    fn test_fields_snapshot() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.delete("a.b").unwrap();
        editor.put_value("fieldsLevel0Map.new", 1).unwrap();
        editor.put_value("brand", "new").unwrap();

        let fields = editor.fields();
        assert!(!fields.contains_key("a.b"));
        assert_eq!(fields.get_value("fieldsLevel0Map.new").unwrap(), &Value::from(1));
        assert_eq!(
            fields
                .get_value("fieldsLevel0Map.fieldsLevel1Map.fieldsLevel2Value")
                .unwrap(),
            &Value::from("fieldsvalue3")
        );
        assert_eq!(fields.get("brand"), Some(&Value::from("new")));
        assert!(editor.original().fields.contains_key("a.b"));
    }

    #[test]
    fn test_flatten_keys() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.delete("@metadata.metaLevel0Map").unwrap();
        editor.delete("fieldsLevel0Map.fieldsLevel1Map").unwrap();
        editor.put_value("new.key", 1).unwrap();

        assert_eq!(
            editor.flatten_keys(),
            vec![
                "@metadata.a.b",
                "@metadata.metaLevel0Value",
                "a.b",
                "fieldsLevel0Map.fieldsLevel1Value",
                "fieldsLevel0Value",
                "new.key",
            ]
        );
    }

    #[test]
    fn test_delete_all() {
        let mut event = fixture();
        let timestamp = event.timestamp;
        let mut editor = EventEditor::new(&mut event);
        editor.put_value("fresh", 1).unwrap();
        editor.delete_all();
        assert!(editor.is_dirty());
        assert!(editor.flatten_keys().is_empty());
        assert!(editor.fields().is_empty());

        editor.apply();
        drop(editor);
        assert!(event.meta.is_empty());
        assert!(event.fields.is_empty());
        assert_eq!(event.timestamp, timestamp);
    }

    #[test]
    fn test_add_tags() {
        let mut event = fixture();
        let mut editor = EventEditor::new(&mut event);
        editor.add_tags(Vec::<String>::new()).unwrap();
        assert!(!editor.is_dirty());

        editor.add_tags(["one"]).unwrap();
        editor.add_tags(["two", "three"]).unwrap();
        assert_eq!(
            editor.get_value("tags").unwrap(),
            Value::List(vec!["one".into(), "two".into(), "three".into()])
        );

        editor.add_tags_with_key("@metadata.labels", ["x"]).unwrap();
        assert_eq!(
            editor.get_value("@metadata.labels").unwrap(),
            Value::List(vec!["x".into()])
        );

        let err = editor
            .add_tags_with_key("fieldsLevel0Value", ["x"])
            .unwrap_err();
        assert_eq!(
            err,
            FieldError::ExpectedList {
                key: "fieldsLevel0Value".to_string(),
                found: ValueKind::String
            }
        );
    }

    #[test]
    fn test_add_tags_appends_to_original_list() {
        let mut event =
            Event::default().with_fields(Map::from([("tags", Value::List(vec!["a".into()]))]));
        let mut editor = EventEditor::new(&mut event);
        editor.add_tags(["b"]).unwrap();
        assert_eq!(
            editor.original().get_value("tags").unwrap(),
            Value::List(vec!["a".into()])
        );
        editor.apply();
        drop(editor);
        assert_eq!(
            event.get_value("tags").unwrap(),
            Value::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_add_error_single() {
        let mut event = Event::default();
        let mut editor = EventEditor::new(&mut event);
        editor.add_error([ProcessingError::new("")]);
        assert!(!editor.is_dirty());

        editor.add_error([ProcessingError::new("boom").with_processor("p")]);
        let error = editor.get_value("error").unwrap();
        assert_eq!(
            error,
            Value::from(ProcessingError::new("boom").with_processor("p").to_map())
        );
    }

    #[test]
    fn test_add_error_converts_existing_to_list() {
        let mut event =
            Event::default().with_fields(Map::from([("error", Value::from("legacy"))]));
        let mut editor = EventEditor::new(&mut event);
        editor.add_error([ProcessingError::new("first"), ProcessingError::new("second")]);
        editor.add_error([ProcessingError::new("third")]);
        editor.apply();
        drop(editor);

        let errors = event.get_value("error").unwrap();
        let messages: Vec<&str> = errors
            .as_list()
            .unwrap()
            .iter()
            .map(|e| e.as_map().unwrap().get("message").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(messages, vec!["legacy", "first", "second", "third"]);
    }

    #[test]
    fn test_add_error_keeps_existing_list() {
        let mut event = Event::default().with_fields(Map::from([(
            "error",
            Value::List(Vec::new()),
        )]));
        let mut editor = EventEditor::new(&mut event);
        editor.add_error([ProcessingError::new("only")]);
        editor.apply();
        drop(editor);

        let errors = event.get_value("error").unwrap();
        let errors = errors.as_list().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            Value::from(ProcessingError::new("only").to_map())
        );
    }
}
