// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{METADATA_FIELD_KEY, METADATA_KEY_PREFIX, TIMESTAMP_FIELD_KEY};

/// The two mappings of an event addressable by dotted keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Metadata,
    Fields,
}

/// A key classified into the part of the event it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath<'k> {
    /// `@timestamp`
    Timestamp,
    /// `@metadata` itself, which cannot be read or written directly.
    MetadataRoot,
    /// A key inside the metadata mapping, without the `@metadata.` prefix.
    Metadata(&'k str),
    /// A key inside the fields mapping.
    Field(&'k str),
}

impl<'k> FieldPath<'k> {
    #[must_use]
    pub fn parse(key: &'k str) -> Self {
        if key == TIMESTAMP_FIELD_KEY {
            return FieldPath::Timestamp;
        }
        if key == METADATA_FIELD_KEY {
            return FieldPath::MetadataRoot;
        }
        match key.strip_prefix(METADATA_KEY_PREFIX) {
            Some("") => FieldPath::MetadataRoot,
            Some(sub) => FieldPath::Metadata(sub),
            None => FieldPath::Field(key),
        }
    }

    /// The namespace and the key relative to it, for paths that address a mapping entry.
    #[must_use]
    pub fn namespaced(self) -> Option<(Namespace, &'k str)> {
        match self {
            FieldPath::Metadata(sub) => Some((Namespace::Metadata, sub)),
            FieldPath::Field(sub) => Some((Namespace::Fields, sub)),
            FieldPath::Timestamp | FieldPath::MetadataRoot => None,
        }
    }
}

/// A root-level key of one of the event namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootKey {
    Metadata(String),
    Field(String),
}

impl RootKey {
    #[must_use]
    pub fn new(namespace: Namespace, key: &str) -> Self {
        match namespace {
            Namespace::Metadata => RootKey::Metadata(key.to_owned()),
            Namespace::Fields => RootKey::Field(key.to_owned()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match self {
            RootKey::Metadata(_) => Namespace::Metadata,
            RootKey::Field(_) => Namespace::Fields,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            RootKey::Metadata(key) | RootKey::Field(key) => key,
        }
    }
}

/// Reduces a dotted key to the root-level key it lives under.
///
/// A key stored verbatim is its own root. Otherwise the shortest dot-delimited prefix for
/// which `contains` holds wins. `None` means no root-level entry can hold the key.
pub fn root_segment<'k>(key: &'k str, contains: impl Fn(&str) -> bool) -> Option<&'k str> {
    if contains(key) {
        return Some(key);
    }
    key.match_indices('.')
        .map(|(idx, _)| &key[..idx])
        .find(|&prefix| contains(prefix))
}
