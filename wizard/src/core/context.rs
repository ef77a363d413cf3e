//! Context records carried from step to step.
//!
//! A context is a flat key/value map. It is never mutated once it belongs to a
//! position: every transition builds a new map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Key/value record threaded through the trace.
pub type Context = BTreeMap<String, Value>;

/// Per-position scratch owned by the rendering layer.
pub type ScratchState = BTreeMap<String, String>;

/// Tagged domain record referenced from a context.
///
/// Two entities denote the same logical record when `type_name` and `id`
/// match; `state` flags may differ between copies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub state: BTreeSet<String>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            state: BTreeSet::new(),
        }
    }

    pub fn with_state(mut self, flag: impl Into<String>) -> Self {
        self.state.insert(flag.into());
        self
    }

    pub fn has_state(&self, flag: &str) -> bool {
        self.state.contains(flag)
    }

    /// True if both refer to the same logical record.
    pub fn same_entity(&self, other: &Entity) -> bool {
        self.type_name == other.type_name && self.id == other.id
    }
}

/// Context value: a scalar, an entity, or an explicit null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Entity(Entity),
    Text(String),
    Null,
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Replace `prev` with `next` if this value is a copy of `prev`.
    pub fn substitute(&self, prev: &Entity, next: &Entity) -> Value {
        match self {
            Value::Entity(entity) if entity.same_entity(prev) => Value::Entity(next.clone()),
            other => other.clone(),
        }
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::Entity(entity)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

/// Shallow merge: keys in `update` win.
pub fn merge(base: &Context, update: &Context) -> Context {
    let mut merged = base.clone();
    for (key, value) in update {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Replace every copy of `prev` in `context` with `next`.
pub fn substitute_entity(context: &Context, prev: &Entity, next: &Entity) -> Context {
    context
        .iter()
        .map(|(key, value)| (key.clone(), value.substitute(prev, next)))
        .collect()
}

/// Keep only the entries whose key is in `keys`.
pub fn restrict(context: &Context, keys: &BTreeSet<&str>) -> Context {
    context
        .iter()
        .filter(|(key, _)| keys.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Entries of `update` that would change `base` when merged into it.
pub fn delta(base: &Context, update: &Context) -> Context {
    update
        .iter()
        .filter(|(key, value)| base.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
