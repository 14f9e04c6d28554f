// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Value tree backing one event.
//!
//! Nested mappings are stored behind an [`Arc`] so that unchanged branches can be shared
//! between an event and its copies, and so that branch identity is observable. Every
//! mutation of a nested mapping goes through [`Arc::make_mut`]: a branch that is shared
//! with someone else is copied (one level at a time) before it is written.
//!
//! Keys are addressed in dot-notation. At every level the remaining key is first looked
//! up verbatim, which keeps keys containing literal dots (e.g. `"a.b"`) addressable, and
//! only then split at the shortest prefix present in the mapping.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::Display;
use hashbrown::HashMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::errors::FieldError;

/// Name of a [`Value`] variant, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ValueKind {
    #[display("null")]
    Null,
    #[display("bool")]
    Bool,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("string")]
    String,
    #[display("timestamp")]
    Timestamp,
    #[display("list")]
    List,
    #[display("map")]
    Map,
}

/// A single value stored in an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(Arc<Map>),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` when both values are mappings backed by the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Copies the value, giving every nested mapping a fresh allocation.
    #[must_use]
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Map(map) => Value::Map(Arc::new(map.deep_clone())),
            Value::List(items) => Value::List(items.iter().map(Value::deep_clone).collect()),
            other => other.clone(),
        }
    }
}

/// A mapping from string keys to [`Value`]s with dot-notation accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map(HashMap<String, Value>);

impl Map {
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self(HashMap::with_capacity(capacity))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Root-level lookup; dots are not interpreted.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Root-level insert; dots are not interpreted.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Root-level removal; dots are not interpreted.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (String, Value)> + '_ {
        self.0.drain()
    }

    /// Gets the value at a dotted key.
    pub fn get_value(&self, key: &str) -> Result<&Value, FieldError> {
        self.lookup(key, key)
    }

    /// Gets a mutable reference to the value at a dotted key, un-sharing every nested
    /// mapping on the way down.
    pub fn get_value_mut(&mut self, key: &str) -> Result<&mut Value, FieldError> {
        self.lookup_mut(key, key)
    }

    /// Stores `value` at a dotted key, creating missing intermediate mappings, and
    /// returns the value it replaced.
    pub fn put_value(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, FieldError> {
        self.store(key, value.into(), key)
    }

    /// Removes the value at a dotted key and returns it.
    pub fn delete(&mut self, key: &str) -> Result<Value, FieldError> {
        self.remove_at(key, key)
    }

    /// Whether a dotted key resolves to a value. Type conflicts are still reported.
    pub fn has_key(&self, key: &str) -> Result<bool, FieldError> {
        match self.get_value(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Recursively merges `other` into this map, replacing existing values.
    pub fn deep_update(&mut self, other: &Map) {
        self.merge(other, true);
    }

    /// Recursively merges `other` into this map, keeping existing values.
    pub fn deep_update_no_overwrite(&mut self, other: &Map) {
        self.merge(other, false);
    }

    /// Copies the map, giving every nested mapping a fresh allocation.
    #[must_use]
    pub fn deep_clone(&self) -> Map {
        Map(self
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.deep_clone()))
            .collect())
    }

    /// Returns every leaf key in dot-notation, sorted. Empty mappings count as leaves.
    #[must_use]
    pub fn flatten_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for (key, value) in &self.0 {
            flatten_value(key.clone(), value, &mut keys);
        }
        keys.sort_unstable();
        keys
    }

    /// Position of the first dot whose prefix is a key of this map.
    fn existing_prefix(&self, key: &str) -> Option<usize> {
        key.match_indices('.')
            .map(|(idx, _)| idx)
            .find(|&idx| self.0.contains_key(&key[..idx]))
    }

    pub(crate) fn lookup<'m>(&'m self, key: &str, full: &str) -> Result<&'m Value, FieldError> {
        if let Some(value) = self.0.get(key) {
            return Ok(value);
        }
        let Some(dot) = self.existing_prefix(key) else {
            return Err(FieldError::not_found(full));
        };
        let (head, rest) = (&key[..dot], &key[dot + 1..]);
        match self.0.get(head) {
            Some(Value::Map(inner)) => inner.lookup(rest, full),
            Some(other) => Err(FieldError::type_conflict(
                conflict_key(full, key, head),
                other.kind(),
            )),
            None => Err(FieldError::not_found(full)),
        }
    }

    fn lookup_mut<'m>(&'m mut self, key: &str, full: &str) -> Result<&'m mut Value, FieldError> {
        if self.0.contains_key(key) {
            return self.0.get_mut(key).ok_or_else(|| FieldError::not_found(full));
        }
        let Some(dot) = self.existing_prefix(key) else {
            return Err(FieldError::not_found(full));
        };
        let (head, rest) = (&key[..dot], &key[dot + 1..]);
        match self.0.get_mut(head) {
            Some(Value::Map(inner)) => {
                inner.lookup(rest, full)?;
                Arc::make_mut(inner).lookup_mut(rest, full)
            }
            Some(other) => Err(FieldError::type_conflict(
                conflict_key(full, key, head),
                other.kind(),
            )),
            None => Err(FieldError::not_found(full)),
        }
    }

    fn store(&mut self, key: &str, value: Value, full: &str) -> Result<Option<Value>, FieldError> {
        if let Some(slot) = self.0.get_mut(key) {
            return Ok(Some(std::mem::replace(slot, value)));
        }
        if let Some(dot) = self.existing_prefix(key) {
            let (head, rest) = (&key[..dot], &key[dot + 1..]);
            return match self.0.get_mut(head) {
                Some(Value::Map(inner)) => Arc::make_mut(inner).store(rest, value, full),
                Some(other) => Err(FieldError::type_conflict(
                    conflict_key(full, key, head),
                    other.kind(),
                )),
                None => Err(FieldError::not_found(full)),
            };
        }
        match key.split_once('.') {
            Some((head, rest)) => {
                let mut inner = Map::new();
                inner.store(rest, value, full)?;
                self.0.insert(head.to_owned(), Value::Map(Arc::new(inner)));
            }
            None => {
                self.0.insert(key.to_owned(), value);
            }
        }
        Ok(None)
    }

    fn remove_at(&mut self, key: &str, full: &str) -> Result<Value, FieldError> {
        if let Some(value) = self.0.remove(key) {
            return Ok(value);
        }
        let Some(dot) = self.existing_prefix(key) else {
            return Err(FieldError::not_found(full));
        };
        let (head, rest) = (&key[..dot], &key[dot + 1..]);
        match self.0.get_mut(head) {
            Some(Value::Map(inner)) => {
                // probe first so a miss does not un-share the branch
                inner.lookup(rest, full)?;
                Arc::make_mut(inner).remove_at(rest, full)
            }
            Some(other) => Err(FieldError::type_conflict(
                conflict_key(full, key, head),
                other.kind(),
            )),
            None => Err(FieldError::not_found(full)),
        }
    }

    pub(crate) fn merge(&mut self, other: &Map, overwrite: bool) {
        for (key, update) in &other.0 {
            self.merge_entry(key, update, overwrite);
        }
    }

    /// Merges a single root-level entry; `key` is taken literally.
    pub(crate) fn merge_entry(&mut self, key: &str, update: &Value, overwrite: bool) {
        let Some(current) = self.0.get_mut(key) else {
            self.0.insert(key.to_owned(), update.clone());
            return;
        };
        match (current, update) {
            (Value::Map(current), Value::Map(incoming)) => {
                Arc::make_mut(current).merge(incoming, overwrite);
            }
            (current, _) if overwrite => *current = update.clone(),
            _ => {}
        }
    }
}

/// Pushes the dotted leaf keys of `value`, rooted at `path`, onto `out`.
pub(crate) fn flatten_value(path: String, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Map(inner) if !inner.is_empty() => {
            for (key, nested) in &inner.0 {
                flatten_value(format!("{path}.{key}"), nested, out);
            }
        }
        _ => out.push(path),
    }
}

/// The prefix of `full` up to and including `head`, where `key` is the suffix of `full`
/// being resolved at the current level.
fn conflict_key(full: &str, key: &str, head: &str) -> String {
    let consumed = full.len() - key.len();
    full[..consumed + head.len()].to_owned()
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Map(iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect())
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Map {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<Arc<Map>> for Value {
    fn from(map: Arc<Map>) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::from(entries.into_iter().collect::<Map>()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

impl Serialize for Map {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any event value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
        Ok(Value::Int(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
        Ok(i64::try_from(u).map_or(Value::Float(u as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Value, E> {
        Ok(Value::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<Value, A::Error> {
        MapVisitor.visit_map(access).map(Value::from)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct MapVisitor;

impl<'de> Visitor<'de> for MapVisitor {
    type Value = Map;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Map, A::Error> {
        let mut map = Map::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.0.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for Map {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MapVisitor)
    }
}
