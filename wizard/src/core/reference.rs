//! Replace references: `("../")* action ("?" key=value ("/" key=value)*)? ("/" action)*`.
//!
//! A leading `/` anchors the reference at the root of the trace instead of
//! walking back from the current position.

use std::collections::BTreeMap;

use crate::core::context::{Context, Value};
use crate::core::error::{EngineError, EngineResult};
use crate::core::instruction::is_identifier;

/// Where a replace reference starts walking forward from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The root position of the trace.
    Root,
    /// This many positions back from the current one.
    Back(usize),
}

/// Context update value: a literal, or `$key` copied from the resolving context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateValue {
    Literal(String),
    Copy(String),
}

impl UpdateValue {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('$') {
            Some(key) => UpdateValue::Copy(key.to_string()),
            None => UpdateValue::Literal(raw.to_string()),
        }
    }

    pub fn resolve(&self, original: &Context) -> Value {
        match self {
            UpdateValue::Literal(text) => Value::Text(text.clone()),
            UpdateValue::Copy(key) => original.get(key).cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraverseStep {
    pub action_id: String,
    pub context_update: BTreeMap<String, UpdateValue>,
}

impl TraverseStep {
    fn new(action_id: &str) -> Self {
        Self {
            action_id: action_id.to_string(),
            context_update: BTreeMap::new(),
        }
    }

    /// Resolve this step's update against the context the jump started from.
    pub fn resolve_update(&self, original: &Context) -> Context {
        self.context_update
            .iter()
            .map(|(key, value)| (key.clone(), value.resolve(original)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: String,
    pub anchor: Anchor,
    pub traverse: Vec<TraverseStep>,
}

impl Reference {
    pub fn target(&self) -> &str {
        self.traverse
            .last()
            .map(|step| step.action_id.as_str())
            .unwrap_or_default()
    }
}

pub fn parse_reference(source: &str) -> EngineResult<Reference> {
    let (anchor, rest) = match source.strip_prefix('/') {
        Some(rest) => (Anchor::Root, rest),
        None => {
            let mut rest = source;
            let mut back = 0;
            while let Some(stripped) = rest.strip_prefix("../") {
                back += 1;
                rest = stripped;
            }
            (Anchor::Back(back), rest)
        }
    };
    if rest.is_empty() {
        return Err(EngineError::malformed_reference(source, "no target action"));
    }

    let mut traverse: Vec<TraverseStep> = Vec::new();
    // True while tokens continue a `?` update list.
    let mut in_update = false;
    for token in rest.split('/') {
        let pair = match token.split_once('?') {
            Some((action_id, pair)) => {
                traverse.push(step(source, action_id)?);
                in_update = true;
                Some(pair)
            }
            None if in_update && token.contains('=') => Some(token),
            None if token.contains('=') => {
                return Err(EngineError::malformed_reference(
                    source,
                    format!("update '{token}' must follow '?'"),
                ));
            }
            None => {
                traverse.push(step(source, token)?);
                in_update = false;
                None
            }
        };
        let Some(pair) = pair else { continue };
        if traverse.len() > 1 {
            return Err(EngineError::malformed_reference(
                source,
                format!("update '{pair}' must follow the first action"),
            ));
        }
        let Some(current) = traverse.last_mut() else {
            return Err(EngineError::malformed_reference(
                source,
                format!("update '{pair}' before any action"),
            ));
        };
        let Some((key, value)) = pair.split_once('=') else {
            return Err(EngineError::malformed_reference(
                source,
                format!("expected key=value, got '{pair}'"),
            ));
        };
        if key.is_empty() {
            return Err(EngineError::malformed_reference(source, "empty update key"));
        }
        current
            .context_update
            .insert(key.to_string(), UpdateValue::parse(value));
    }

    Ok(Reference {
        source: source.to_string(),
        anchor,
        traverse,
    })
}

fn step(source: &str, action_id: &str) -> EngineResult<TraverseStep> {
    if !is_identifier(action_id) {
        return Err(EngineError::malformed_reference(
            source,
            format!("invalid action id '{action_id}'"),
        ));
    }
    Ok(TraverseStep::new(action_id))
}
