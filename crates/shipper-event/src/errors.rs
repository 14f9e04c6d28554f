// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::value::{Map, ValueKind};

/// Errors returned by event accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("key={key}: expected map but type is {found}")]
    TypeConflict { key: String, found: ValueKind },

    #[error("accessing the @metadata key directly is not supported")]
    MetadataAccessDenied,

    #[error("altering the @metadata key directly is not supported")]
    MetadataMutationDenied,

    #[error("@timestamp must be a timestamp, got {found}")]
    NotATimestamp { found: ValueKind },

    #[error("the @timestamp field cannot be deleted")]
    TimestampDeletionDenied,

    #[error("key={key}: expected list but type is {found}")]
    ExpectedList { key: String, found: ValueKind },
}

impl FieldError {
    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub(crate) fn type_conflict(key: impl Into<String>, found: ValueKind) -> Self {
        Self::TypeConflict {
            key: key.into(),
            found,
        }
    }

    /// Whether the error reports a missing key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

/// A processing failure recorded on the event itself under the `error` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingError {
    pub message: String,
    pub field: String,
    pub data: String,
    pub processor: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = processor.into();
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Renders the non-empty parts as a map suitable for the `error` field.
    pub fn to_map(&self) -> Map {
        let mut map = Map::new();
        map.insert("message", self.message.as_str());
        if !self.data.is_empty() {
            map.insert("data", self.data.as_str());
        }
        if !self.field.is_empty() {
            map.insert("field", self.field.as_str());
        }
        if !self.processor.is_empty() {
            map.insert("processor", self.processor.as_str());
        }
        map
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.processor.is_empty() {
            write!(f, "[processor={}] ", self.processor)?;
        }
        if !self.field.is_empty() {
            write!(f, "[field={:?}] ", self.field)?;
        }
        if !self.data.is_empty() {
            write!(f, "[data={}] ", self.data)?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProcessingError {}
