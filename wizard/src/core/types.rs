//! Record types and the structural match that gates every step.
//!
//! Matching is monotonic in context growth: adding keys a record type does not
//! mention never turns a successful match into a failure.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::context::{Context, Entity, Value};

/// Required type of a single context key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Type {
    /// Matches any present value.
    Any,
    /// Matches any non-null value. `name` is descriptive only.
    Value {
        #[serde(default)]
        name: String,
    },
    /// Matches an entity of type `name`, optionally in state `state`.
    Entity {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
}

impl Type {
    pub fn value(name: impl Into<String>) -> Self {
        Type::Value { name: name.into() }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Type::Entity {
            name: name.into(),
            state: None,
        }
    }

    pub fn entity_in_state(name: impl Into<String>, state: impl Into<String>) -> Self {
        Type::Entity {
            name: name.into(),
            state: Some(state.into()),
        }
    }

    pub fn matches(&self, value: &Value, domain: &Domain) -> bool {
        if value.is_null() {
            return false;
        }
        match self {
            Type::Any | Type::Value { .. } => true,
            Type::Entity { name, state } => {
                let Some(entity) = value.as_entity() else {
                    return false;
                };
                if entity.type_name != *name {
                    return false;
                }
                match state {
                    None => true,
                    Some(state) => {
                        entity.has_state(state) || domain.evaluate(entity, state).unwrap_or(false)
                    }
                }
            }
        }
    }
}

/// One row of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowType {
    pub ty: Type,
}

impl From<Type> for RowType {
    fn from(ty: Type) -> Self {
        Self { ty }
    }
}

/// Per-key requirements on a context.
///
/// `open` is recorded but not enforced: extra context keys are always
/// accepted, even for closed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    #[serde(default)]
    pub rows: BTreeMap<String, RowType>,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl Default for RecordType {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            open: true,
        }
    }
}

impl RecordType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, key: impl Into<String>, ty: Type) -> Self {
        self.rows.insert(key.into(), ty.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }
}

/// Check `context` against every row of `record`.
pub fn matches(context: &Context, record: &RecordType, domain: &Domain) -> bool {
    record.rows.iter().all(|(key, row)| match context.get(key) {
        Some(value) => row.ty.matches(value, domain),
        None => false,
    })
}

/// Derived state predicate over an entity.
pub type StateExpression = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Derived entity states, consulted when an entity lacks an explicit flag.
#[derive(Clone, Default)]
pub struct Domain {
    states: BTreeMap<String, BTreeMap<String, StateExpression>>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<F>(mut self, type_name: &str, state: &str, expression: F) -> Self
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        self.insert(type_name, state, Arc::new(expression));
        self
    }

    pub fn insert(&mut self, type_name: &str, state: &str, expression: StateExpression) {
        self.states
            .entry(type_name.to_string())
            .or_default()
            .insert(state.to_string(), expression);
    }

    /// Evaluate the derived `state` for `entity`, if the domain defines one.
    pub fn evaluate(&self, entity: &Entity, state: &str) -> Option<bool> {
        self.states
            .get(&entity.type_name)
            .and_then(|states| states.get(state))
            .map(|expression| expression(entity))
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (type_name, states) in &self.states {
            map.entry(type_name, &states.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// Declarative form of a derived state, as written in flow documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateRule {
    /// The entity carries this explicit flag.
    Flag(String),
    AllOf(Vec<StateRule>),
    AnyOf(Vec<StateRule>),
    Not(Box<StateRule>),
    /// The entity id is one of the listed ids.
    IdIn(Vec<String>),
}

impl StateRule {
    pub fn evaluate(&self, entity: &Entity) -> bool {
        match self {
            StateRule::Flag(flag) => entity.has_state(flag),
            StateRule::AllOf(rules) => rules.iter().all(|rule| rule.evaluate(entity)),
            StateRule::AnyOf(rules) => rules.iter().any(|rule| rule.evaluate(entity)),
            StateRule::Not(rule) => !rule.evaluate(entity),
            StateRule::IdIn(ids) => ids.iter().any(|id| *id == entity.id),
        }
    }

    pub fn into_expression(self) -> StateExpression {
        Arc::new(move |entity: &Entity| self.evaluate(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(entries: &[(&str, Value)]) -> Context {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn missing_and_null_keys_fail_every_row_type() {
        let record = RecordType::new().with_row("a", Type::Any);
        let domain = Domain::new();
        assert!(!matches(&Context::new(), &record, &domain));
        assert!(!matches(&ctx(&[("a", Value::Null)]), &record, &domain));
        assert!(matches(&ctx(&[("a", Value::text("x"))]), &record, &domain));
    }

    #[test]
    fn entity_type_checks_type_name() {
        let record = RecordType::new().with_row("who", Type::entity("individual"));
        let domain = Domain::new();
        let right = ctx(&[("who", Entity::new("individual", "1").into())]);
        let wrong = ctx(&[("who", Entity::new("household", "1").into())]);
        let scalar = ctx(&[("who", Value::text("1"))]);
        assert!(matches(&right, &record, &domain));
        assert!(!matches(&wrong, &record, &domain));
        assert!(!matches(&scalar, &record, &domain));
    }

    /// An explicit flag wins; otherwise the domain expression decides.
    #[test]
    fn entity_state_falls_back_to_domain_expression() {
        let record =
            RecordType::new().with_row("who", Type::entity_in_state("individual", "enrolled"));
        let domain =
            Domain::new().with_state("individual", "enrolled", |entity| entity.id == "7");

        let flagged = ctx(&[(
            "who",
            Entity::new("individual", "1").with_state("enrolled").into(),
        )]);
        let derived = ctx(&[("who", Entity::new("individual", "7").into())]);
        let neither = ctx(&[("who", Entity::new("individual", "2").into())]);

        assert!(matches(&flagged, &record, &domain));
        assert!(matches(&derived, &record, &domain));
        assert!(!matches(&neither, &record, &domain));
        assert!(!matches(&derived, &record, &Domain::new()));
    }

    #[test]
    fn matching_is_monotonic_in_unrelated_keys() {
        let record = RecordType::new()
            .with_row("who", Type::entity("individual"))
            .with_row("note", Type::value("note"));
        let domain = Domain::new();
        let base = ctx(&[
            ("who", Entity::new("individual", "1").into()),
            ("note", Value::text("x")),
        ]);
        assert!(matches(&base, &record, &domain));

        let mut grown = base.clone();
        grown.insert("extra".to_string(), Value::text("y"));
        grown.insert("other".to_string(), Entity::new("household", "3").into());
        assert!(matches(&grown, &record, &domain));
    }

    /// Closed records still accept extra keys.
    #[test]
    fn closed_records_are_not_enforced() {
        let mut record = RecordType::new().with_row("a", Type::Any);
        record.open = false;
        let context = ctx(&[("a", Value::text("1")), ("b", Value::text("2"))]);
        assert!(matches(&context, &record, &Domain::new()));
    }

    #[test]
    fn state_rules_compose() {
        let rule = StateRule::AllOf(vec![
            StateRule::Flag("active".to_string()),
            StateRule::Not(Box::new(StateRule::IdIn(vec!["9".to_string()]))),
        ]);
        let active = Entity::new("individual", "1").with_state("active");
        let banned = Entity::new("individual", "9").with_state("active");
        assert!(rule.evaluate(&active));
        assert!(!rule.evaluate(&banned));
        assert!(!rule.evaluate(&Entity::new("individual", "1")));
    }

    #[test]
    fn record_types_deserialize_from_toml() {
        let record: RecordType = toml::from_str(
            r#"
            [rows.who]
            type = "entity"
            name = "individual"
            state = "enrolled"

            [rows.note]
            type = "value"
            "#,
        )
        .expect("parse record type");
        assert!(record.open);
        assert_eq!(
            record.rows.get("who").map(|row| &row.ty),
            Some(&Type::entity_in_state("individual", "enrolled"))
        );
        assert_eq!(
            record.rows.get("note").map(|row| &row.ty),
            Some(&Type::value(""))
        );
    }
}
