//! Named context mutators attached to actions, and their argument codecs.
//!
//! Commands receive already-typed arguments. String parsing only happens when
//! a path is decoded; the same [`ArgumentType`] also renders arguments back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::context::{Context, Entity, Value, merge, substitute_entity};
use crate::core::error::{EngineError, EngineResult};
use crate::core::escape::{escape, join, split, unescape};
use crate::core::instruction::ActionSpec;

/// Reserved command that merges an object argument into the context.
pub const CONTEXT_COMMAND: &str = "context";
/// Command name assumed when a path segment carries arguments but no name.
pub const DEFAULT_COMMAND: &str = "default";

const TAG: char = '~';

/// Static author-supplied properties of an action.
pub type Props = BTreeMap<String, String>;

/// Typed command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Value(Value),
    Object(Context),
}

impl Argument {
    pub fn substitute(&self, prev: &Entity, next: &Entity) -> Argument {
        match self {
            Argument::Value(value) => Argument::Value(value.substitute(prev, next)),
            Argument::Object(object) => Argument::Object(substitute_entity(object, prev, next)),
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<Entity> for Argument {
    fn from(entity: Entity) -> Self {
        Argument::Value(Value::Entity(entity))
    }
}

/// Codec for one positional argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentType {
    /// Plain value; `~` encodes null.
    Value,
    /// Entity written as `type:id` with optional `!state,...`.
    Entity,
    /// Entity whose type name is read from the action prop `prop`.
    ConfigurableEntity { prop: String },
    /// Comma-separated `key=value` pairs.
    Object,
}

impl ArgumentType {
    pub fn parse(&self, props: &Props, raw: &str) -> EngineResult<Argument> {
        match self {
            ArgumentType::Value => decode_value(raw).map(Argument::Value),
            ArgumentType::Entity => {
                let (head, state) = decode_entity_parts(raw)?;
                let parts = split(&head, ':');
                let [type_name, id] = parts.as_slice() else {
                    return Err(EngineError::invalid_argument(raw, "expected 'type:id'"));
                };
                Ok(Argument::Value(Value::Entity(Entity {
                    type_name: type_name.clone(),
                    id: id.clone(),
                    state,
                })))
            }
            ArgumentType::ConfigurableEntity { prop } => {
                let type_name = configured_type(props, prop, raw)?;
                let (id, state) = decode_entity_parts(raw)?;
                Ok(Argument::Value(Value::Entity(Entity {
                    type_name: type_name.to_string(),
                    id,
                    state,
                })))
            }
            ArgumentType::Object => decode_object(raw).map(Argument::Object),
        }
    }

    pub fn stringify(&self, props: &Props, argument: &Argument) -> EngineResult<String> {
        match (self, argument) {
            (ArgumentType::Value, Argument::Value(value)) => Ok(encode_value(value)),
            (ArgumentType::Entity, Argument::Value(Value::Entity(entity))) => Ok(
                encode_entity_parts(join(&[&entity.type_name, &entity.id], ':'), entity),
            ),
            (ArgumentType::ConfigurableEntity { prop }, Argument::Value(Value::Entity(entity))) => {
                let type_name = configured_type(props, prop, &entity.id)?;
                if entity.type_name != type_name {
                    return Err(EngineError::invalid_argument(
                        &entity.id,
                        format!(
                            "entity type '{}' does not match configured '{}'",
                            entity.type_name, type_name
                        ),
                    ));
                }
                Ok(encode_entity_parts(entity.id.clone(), entity))
            }
            (ArgumentType::Object, Argument::Object(object)) => encode_object(object),
            (ty, argument) => Err(EngineError::invalid_argument(
                &format!("{argument:?}"),
                format!("cannot encode as {ty:?}"),
            )),
        }
    }
}

fn configured_type<'a>(props: &'a Props, prop: &str, raw: &str) -> EngineResult<&'a str> {
    props
        .get(prop)
        .map(String::as_str)
        .ok_or_else(|| EngineError::invalid_argument(raw, format!("action prop '{prop}' unset")))
}

fn encode_entity_parts(head: String, entity: &Entity) -> String {
    if entity.state.is_empty() {
        return escape(&head, '!');
    }
    let states: Vec<&str> = entity.state.iter().map(String::as_str).collect();
    join(&[head, join(&states, ',')], '!')
}

fn decode_entity_parts(raw: &str) -> EngineResult<(String, BTreeSet<String>)> {
    let mut parts = split(raw, '!').into_iter();
    let head = parts.next().unwrap_or_default();
    let state = match (parts.next(), parts.next()) {
        (None, _) => BTreeSet::new(),
        (Some(states), None) => {
            let flags = split(&states, ',');
            if flags.iter().any(String::is_empty) {
                return Err(EngineError::invalid_argument(raw, "empty state flag"));
            }
            flags.into_iter().collect()
        }
        (Some(_), Some(_)) => {
            return Err(EngineError::invalid_argument(raw, "more than one '!'"));
        }
    };
    if head.is_empty() {
        return Err(EngineError::invalid_argument(raw, "missing entity id"));
    }
    Ok((head, state))
}

/// Encode a context value: `~` is null, `~type:id` an entity, anything else text.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => TAG.to_string(),
        Value::Entity(entity) => format!(
            "{TAG}{}",
            encode_entity_parts(join(&[&entity.type_name, &entity.id], ':'), entity)
        ),
        Value::Text(text) => escape(text, TAG),
    }
}

pub fn decode_value(raw: &str) -> EngineResult<Value> {
    let Some(tagged) = raw.strip_prefix(TAG) else {
        return Ok(Value::Text(unescape(raw, TAG)));
    };
    if tagged.is_empty() {
        return Ok(Value::Null);
    }
    match ArgumentType::Entity.parse(&Props::new(), tagged)? {
        Argument::Value(value) => Ok(value),
        Argument::Object(_) => Err(EngineError::invalid_argument(raw, "expected entity")),
    }
}

fn encode_object(object: &Context) -> EngineResult<String> {
    let pairs: Vec<String> = object
        .iter()
        .map(|(key, value)| join(&[key.clone(), encode_value(value)], '='))
        .collect();
    Ok(join(&pairs, ','))
}

fn decode_object(raw: &str) -> EngineResult<Context> {
    let mut object = Context::new();
    if raw.is_empty() {
        return Ok(object);
    }
    for pair in split(raw, ',') {
        let parts = split(&pair, '=');
        let [key, value] = parts.as_slice() else {
            return Err(EngineError::invalid_argument(&pair, "expected 'key=value'"));
        };
        if key.is_empty() {
            return Err(EngineError::invalid_argument(&pair, "empty key"));
        }
        object.insert(key.clone(), decode_value(value)?);
    }
    Ok(object)
}

/// Body of a command: `(props, context, args) -> context`.
pub type CommandFn =
    Arc<dyn Fn(&Props, &Context, &[Argument]) -> EngineResult<Context> + Send + Sync>;

/// Named, argument-typed context mutator.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub argument_types: Vec<ArgumentType>,
    execute: CommandFn,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("argument_types", &self.argument_types)
            .finish_non_exhaustive()
    }
}

impl Command {
    pub fn new<F>(name: impl Into<String>, argument_types: Vec<ArgumentType>, execute: F) -> Self
    where
        F: Fn(&Props, &Context, &[Argument]) -> EngineResult<Context> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            argument_types,
            execute: Arc::new(execute),
        }
    }

    /// Command that stores each argument under its key; object arguments
    /// (key `None`) are merged into the context instead.
    pub fn assign(name: impl Into<String>, slots: Vec<(Option<String>, ArgumentType)>) -> Self {
        let argument_types = slots.iter().map(|(_, ty)| ty.clone()).collect();
        let keys: Vec<Option<String>> = slots.into_iter().map(|(key, _)| key).collect();
        Self::new(name, argument_types, move |_props, context, args| {
            let mut next = context.clone();
            for (key, argument) in keys.iter().zip(args) {
                match (key, argument) {
                    (Some(key), Argument::Value(value)) => {
                        next.insert(key.clone(), value.clone());
                    }
                    (_, Argument::Object(object)) => next = merge(&next, object),
                    (None, Argument::Value(value)) => {
                        return Err(EngineError::invalid_argument(
                            &encode_value(value),
                            "value argument without a context key",
                        ));
                    }
                }
            }
            Ok(next)
        })
    }

    /// The reserved `context` command.
    pub fn context() -> Self {
        Self::new(
            CONTEXT_COMMAND,
            vec![ArgumentType::Object],
            |_props, context, args| match args {
                [Argument::Object(object)] => Ok(merge(context, object)),
                _ => Err(EngineError::invalid_argument(
                    &format!("{args:?}"),
                    "context command takes one object",
                )),
            },
        )
    }

    pub fn execute(
        &self,
        props: &Props,
        context: &Context,
        args: &[Argument],
    ) -> EngineResult<Context> {
        if args.len() != self.argument_types.len() {
            return Err(EngineError::ArgumentCount {
                command: self.name.clone(),
                expected: self.argument_types.len(),
                actual: args.len(),
            });
        }
        (self.execute)(props, context, args)
    }

    pub fn parse_args(&self, props: &Props, raw: &[String]) -> EngineResult<Vec<Argument>> {
        if raw.len() != self.argument_types.len() {
            return Err(EngineError::ArgumentCount {
                command: self.name.clone(),
                expected: self.argument_types.len(),
                actual: raw.len(),
            });
        }
        self.argument_types
            .iter()
            .zip(raw)
            .map(|(ty, raw)| ty.parse(props, raw))
            .collect()
    }

    pub fn stringify_args(&self, props: &Props, args: &[Argument]) -> EngineResult<Vec<String>> {
        if args.len() != self.argument_types.len() {
            return Err(EngineError::ArgumentCount {
                command: self.name.clone(),
                expected: self.argument_types.len(),
                actual: args.len(),
            });
        }
        self.argument_types
            .iter()
            .zip(args)
            .map(|(ty, argument)| ty.stringify(props, argument))
            .collect()
    }
}

/// Resolve `name` on `action`, including the reserved `context` command.
pub fn get_command(action: &ActionSpec, name: &str) -> Option<Command> {
    if name == CONTEXT_COMMAND {
        return Some(Command::context());
    }
    action.commands.get(name).cloned()
}

/// A command invocation recorded on a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub name: String,
    pub args: Vec<Argument>,
}

impl CommandInvocation {
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn context(update: Context) -> Self {
        Self::new(CONTEXT_COMMAND, vec![Argument::Object(update)])
    }

    pub fn is_context(&self) -> bool {
        self.name == CONTEXT_COMMAND
    }

    /// The object carried by a `context` invocation.
    pub fn context_update(&self) -> Option<&Context> {
        match (self.is_context(), self.args.as_slice()) {
            (true, [Argument::Object(object)]) => Some(object),
            _ => None,
        }
    }

    pub fn substitute(&self, prev: &Entity, next: &Entity) -> CommandInvocation {
        CommandInvocation {
            name: self.name.clone(),
            args: self
                .args
                .iter()
                .map(|argument| argument.substitute(prev, next))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Short strings dense in every delimiter the value codec nests.
    const TRICKY: &str = "[a-c:!,=~/\\]\\\\]{0,5}";

    fn entity_strategy() -> impl Strategy<Value = Entity> {
        (
            TRICKY,
            TRICKY,
            prop::collection::btree_set("[a-c:!,=~\\\\]{1,4}", 0..4),
        )
            .prop_map(|(type_name, id, state)| Entity {
                type_name,
                id,
                state,
            })
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            "\\PC*".prop_map(Value::Text),
            TRICKY.prop_map(Value::Text),
            entity_strategy().prop_map(Value::Entity),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode_for_any_value(value in value_strategy()) {
            prop_assert_eq!(decode_value(&encode_value(&value)).expect("decode"), value);
        }

        #[test]
        fn object_codec_round_trips(
            object in prop::collection::btree_map("[a-c,=!\\\\]{1,4}", value_strategy(), 0..4),
        ) {
            let argument = Argument::Object(object);
            let encoded = ArgumentType::Object
                .stringify(&Props::new(), &argument)
                .expect("encode");
            prop_assert_eq!(
                ArgumentType::Object.parse(&Props::new(), &encoded).expect("parse"),
                argument
            );
        }
    }

    fn props(entries: &[(&str, &str)]) -> Props {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn value_argument_encodes_null_and_escapes_tag() {
        let ty = ArgumentType::Value;
        let none = Props::new();
        assert_eq!(
            ty.stringify(&none, &Argument::Value(Value::Null)).expect("null"),
            "~"
        );
        let tricky = Argument::Value(Value::text("~x"));
        let encoded = ty.stringify(&none, &tricky).expect("encode");
        assert_eq!(encoded, "\\~x");
        assert_eq!(ty.parse(&none, &encoded).expect("parse"), tricky);
        assert_eq!(ty.parse(&none, "~").expect("parse"), Argument::Value(Value::Null));
    }

    #[test]
    fn entity_argument_encodes_type_id_and_states() {
        let ty = ArgumentType::Entity;
        let entity = Entity::new("individual", "1")
            .with_state("enrolled")
            .with_state("active");
        let encoded = ty
            .stringify(&Props::new(), &entity.clone().into())
            .expect("encode");
        assert_eq!(encoded, "individual:1!active,enrolled");
        assert_eq!(
            ty.parse(&Props::new(), &encoded).expect("parse"),
            Argument::from(entity)
        );
        assert_eq!(
            ty.stringify(&Props::new(), &Entity::new("individual", "1").into())
                .expect("plain"),
            "individual:1"
        );
    }

    #[test]
    fn entity_argument_rejects_missing_type() {
        let err = ArgumentType::Entity
            .parse(&Props::new(), "justid")
            .expect_err("expected error");
        assert!(err.to_string().contains("type:id"));
    }

    /// The entity type comes from the action props, not the encoded string.
    #[test]
    fn configurable_entity_reads_type_from_props() {
        let ty = ArgumentType::ConfigurableEntity {
            prop: "entity".to_string(),
        };
        let props = props(&[("entity", "household")]);
        let parsed = ty.parse(&props, "42").expect("parse");
        assert_eq!(parsed, Argument::from(Entity::new("household", "42")));
        assert_eq!(ty.stringify(&props, &parsed).expect("encode"), "42");

        let wrong = Argument::from(Entity::new("individual", "42"));
        assert!(ty.stringify(&props, &wrong).is_err());
        assert!(ty.parse(&Props::new(), "42").is_err());
    }

    #[test]
    fn object_argument_round_trips_mixed_values() {
        let mut object = Context::new();
        object.insert("who".to_string(), Entity::new("individual", "1").into());
        object.insert("note".to_string(), Value::text("a=b,c"));
        object.insert("gone".to_string(), Value::Null);
        let argument = Argument::Object(object);

        let encoded = ArgumentType::Object
            .stringify(&Props::new(), &argument)
            .expect("encode");
        let parsed = ArgumentType::Object
            .parse(&Props::new(), &encoded)
            .expect("parse");
        assert_eq!(parsed, argument);
    }

    #[test]
    fn empty_object_encodes_as_empty_string() {
        let argument = Argument::Object(Context::new());
        let encoded = ArgumentType::Object
            .stringify(&Props::new(), &argument)
            .expect("encode");
        assert_eq!(encoded, "");
        assert_eq!(
            ArgumentType::Object.parse(&Props::new(), "").expect("parse"),
            argument
        );
    }

    #[test]
    fn assign_command_stores_arguments_under_keys() {
        let command = Command::assign(
            "default",
            vec![(Some("who".to_string()), ArgumentType::Entity)],
        );
        let next = command
            .execute(
                &Props::new(),
                &Context::new(),
                &[Entity::new("individual", "1").into()],
            )
            .expect("execute");
        assert_eq!(
            next.get("who"),
            Some(&Value::Entity(Entity::new("individual", "1")))
        );
    }

    #[test]
    fn execute_checks_arity() {
        let command = Command::assign(
            "default",
            vec![(Some("who".to_string()), ArgumentType::Entity)],
        );
        let err = command
            .execute(&Props::new(), &Context::new(), &[])
            .expect_err("expected arity error");
        assert_eq!(
            err,
            EngineError::ArgumentCount {
                command: "default".to_string(),
                expected: 1,
                actual: 0,
            }
        );
    }

    #[test]
    fn context_command_merges_object() {
        let mut base = Context::new();
        base.insert("a".to_string(), Value::text("1"));
        let mut update = Context::new();
        update.insert("b".to_string(), Value::text("2"));

        let next = Command::context()
            .execute(&Props::new(), &base, &[Argument::Object(update)])
            .expect("execute");
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn invocation_substitution_reaches_context_objects() {
        let prev = Entity::new("individual", "1");
        let next = Entity::new("individual", "1").with_state("deleted");
        let mut update = Context::new();
        update.insert("who".to_string(), prev.clone().into());
        let invocation = CommandInvocation::context(update);

        let substituted = invocation.substitute(&prev, &next);
        let object = substituted.context_update().expect("context object");
        assert_eq!(object.get("who"), Some(&Value::Entity(next)));
    }
}
