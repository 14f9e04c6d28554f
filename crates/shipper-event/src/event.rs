// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::constants::{ID_METADATA_KEY, METADATA_FIELD_KEY, TIMESTAMP_FIELD_KEY};
use crate::errors::FieldError;
use crate::path::{FieldPath, Namespace};
use crate::value::{Map, Value};

/// A single record flowing through the pipeline.
///
/// Every key resolves into exactly one of the timestamp, the pipeline-internal `meta`
/// mapping (addressed as `@metadata.<key>`) or the user-visible `fields` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub meta: Map,
    pub fields: Map,
}

impl Event {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            meta: Map::new(),
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Map) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn namespace(&self, namespace: Namespace) -> &Map {
        match namespace {
            Namespace::Metadata => &self.meta,
            Namespace::Fields => &self.fields,
        }
    }

    pub fn namespace_mut(&mut self, namespace: Namespace) -> &mut Map {
        match namespace {
            Namespace::Metadata => &mut self.meta,
            Namespace::Fields => &mut self.fields,
        }
    }

    /// Gets the value at a dotted key. Nested mappings are returned as shared handles.
    pub fn get_value(&self, key: &str) -> Result<Value, FieldError> {
        match FieldPath::parse(key) {
            FieldPath::Timestamp => Ok(Value::Timestamp(self.timestamp)),
            FieldPath::MetadataRoot => Err(FieldError::MetadataAccessDenied),
            FieldPath::Metadata(sub) => self.meta.get_value(sub).cloned(),
            FieldPath::Field(sub) => self.fields.get_value(sub).cloned(),
        }
    }

    /// Stores a value at a dotted key and returns the one it replaced.
    pub fn put_value(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, FieldError> {
        match FieldPath::parse(key) {
            FieldPath::Timestamp => {
                let timestamp = to_timestamp(&value.into())?;
                let previous = std::mem::replace(&mut self.timestamp, timestamp);
                Ok(Some(Value::Timestamp(previous)))
            }
            FieldPath::MetadataRoot => Err(FieldError::MetadataMutationDenied),
            FieldPath::Metadata(sub) => self.meta.put_value(sub, value),
            FieldPath::Field(sub) => self.fields.put_value(sub, value),
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<(), FieldError> {
        match FieldPath::parse(key) {
            FieldPath::Timestamp => Err(FieldError::TimestampDeletionDenied),
            FieldPath::MetadataRoot => Err(FieldError::MetadataMutationDenied),
            FieldPath::Metadata(sub) => self.meta.delete(sub).map(drop),
            FieldPath::Field(sub) => self.fields.delete(sub).map(drop),
        }
    }

    pub fn has_key(&self, key: &str) -> Result<bool, FieldError> {
        match self.get_value(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Recursively merges `update` into the event, replacing existing values.
    ///
    /// `@timestamp` sets the timestamp, a mapping under `@metadata` merges into `meta`
    /// and every other entry merges into `fields`. Entries of the wrong shape are skipped.
    pub fn deep_update(&mut self, update: &Map) {
        self.merge(update, true);
    }

    /// Like [`Event::deep_update`] but keeps every existing value. The timestamp is only
    /// set while it still holds the zero instant.
    pub fn deep_update_no_overwrite(&mut self, update: &Map) {
        self.merge(update, false);
    }

    pub(crate) fn merge(&mut self, update: &Map, overwrite: bool) {
        for (key, value) in update.iter() {
            match key.as_str() {
                TIMESTAMP_FIELD_KEY => {
                    if let Ok(timestamp) = to_timestamp(value) {
                        if overwrite || self.timestamp == DateTime::<Utc>::default() {
                            self.timestamp = timestamp;
                        }
                    }
                }
                METADATA_FIELD_KEY => {
                    if let Value::Map(meta) = value {
                        self.meta.merge(meta, overwrite);
                    }
                }
                _ => self.fields.merge_entry(key, value, overwrite),
            }
        }
    }

    /// Stores the document id used by the sink under `@metadata._id`.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.meta.insert(ID_METADATA_KEY, id.into());
    }
}

/// Accepts a timestamp value or an RFC 3339 string.
pub(crate) fn to_timestamp(value: &Value) -> Result<DateTime<Utc>, FieldError> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| FieldError::NotATimestamp {
                found: value.kind(),
            }),
        other => Err(FieldError::NotATimestamp {
            found: other.kind(),
        }),
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let has_meta = !self.meta.is_empty();
        let len = 1 + usize::from(has_meta) + self.fields.len();
        let mut doc = serializer.serialize_map(Some(len))?;
        doc.serialize_entry(TIMESTAMP_FIELD_KEY, &Value::Timestamp(self.timestamp))?;
        if has_meta {
            doc.serialize_entry(METADATA_FIELD_KEY, &self.meta)?;
        }
        for (key, value) in self.fields.iter() {
            doc.serialize_entry(key, value)?;
        }
        doc.end()
    }
}
