//! Orchestration for one `wizard` CLI invocation.
//!
//! Loads config and flow, replays the incoming path, applies a single engine
//! operation and renders the result.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::core::command::{Argument, ArgumentType, Props, decode_value, get_command};
use crate::core::context::{Context as WizardContext, Entity, ScratchState, Value};
use crate::core::graph::Graph;
use crate::core::instruction::Program;
use crate::core::path::{from_path, to_path};
use crate::core::position::{Candidate, Position};
use crate::io::config::{WizardConfig, load_config};
use crate::io::flow_store::load_program;
use crate::io::init::WizardPaths;

/// Loaded project: config plus compiled program.
#[derive(Debug, Clone)]
pub struct Session {
    pub paths: WizardPaths,
    pub config: WizardConfig,
    pub program: Arc<Program>,
}

/// One engine operation, with arguments still in their textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Advance {
        action: Option<String>,
        /// `key=value` pairs, values in path value encoding.
        set: Vec<String>,
    },
    Exec {
        command: String,
        args: Vec<String>,
    },
    Close {
        key_path: Option<String>,
    },
    ReturnTo {
        key_path: String,
    },
    Replace {
        key_path: String,
        next: String,
        /// Overrides `auto_advance` from the config.
        try_advance: Option<bool>,
    },
    UpdateEntity {
        prev: String,
        next: String,
    },
    SetState {
        key_path: Option<String>,
        set: Vec<String>,
    },
}

impl Session {
    /// Load `.wizard/config.toml` under `root` and compile the flow it names
    /// (or `flow_override`).
    pub fn open(root: &Path, flow_override: Option<&Path>) -> Result<Self> {
        let paths = WizardPaths::new(root);
        let config = load_config(&paths.config_path)?;
        let flow_path = match flow_override {
            Some(path) => path.to_path_buf(),
            None => paths.flow_path(&config),
        };
        let program = load_program(&flow_path)?;
        debug!(flow = %flow_path.display(), instructions = program.len(), "session opened");
        Ok(Self {
            paths,
            config,
            program: Arc::new(program),
        })
    }

    pub fn replay(&self, path: &str) -> Result<Graph> {
        from_path(
            Arc::clone(&self.program),
            self.config.initial_context.clone(),
            path,
        )
        .with_context(|| format!("replay path '{path}'"))
    }

    pub fn apply(&self, graph: &Graph, operation: &Operation) -> Result<Graph> {
        debug!(?operation, "apply operation");
        let next = match operation {
            Operation::Advance { action, set } => {
                let update = parse_context(set)?;
                let update = (!update.is_empty()).then_some(&update);
                match action {
                    Some(action) => match update {
                        Some(_) => graph.advance(Some(action), update),
                        None => graph.advance_to(action),
                    },
                    None => graph.advance(None, update),
                }
            }
            Operation::Exec { command, args } => {
                let tail = graph.current();
                let action = tail.action(graph.program())?;
                let resolved = get_command(action, command).ok_or_else(|| {
                    anyhow!("action '{}' has no command '{command}'", action.id)
                })?;
                let parsed = resolved.parse_args(&action.props, args)?;
                graph.execute_command(command, parsed)
            }
            Operation::Close { key_path } => graph.close(key_path.as_deref()),
            Operation::ReturnTo { key_path } => graph.return_to(key_path),
            Operation::Replace {
                key_path,
                next,
                try_advance,
            } => graph.replace(
                key_path,
                next,
                try_advance.unwrap_or(self.config.auto_advance),
            ),
            Operation::UpdateEntity { prev, next } => {
                graph.update_entity(&parse_entity(prev)?, &parse_entity(next)?)
            }
            Operation::SetState { key_path, set } => {
                graph.set_state(key_path.as_deref(), parse_state(set)?)
            }
        };
        next.with_context(|| format!("{} failed", operation.name()))
    }

    pub fn summarize(&self, graph: &Graph) -> Result<Summary> {
        let path = to_path(graph).context("encode path")?;
        let positions = graph.trace()[1..]
            .iter()
            .map(|position| PositionSummary::new(graph.program(), position))
            .collect();
        let next = graph
            .next_actions()?
            .iter()
            .map(|candidate| CandidateSummary::new(graph.program(), candidate))
            .collect();
        Ok(Summary {
            path,
            current: graph.current().execute_id.clone(),
            positions,
            next,
        })
    }
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Advance { .. } => "advance",
            Operation::Exec { .. } => "exec",
            Operation::Close { .. } => "close",
            Operation::ReturnTo { .. } => "return-to",
            Operation::Replace { .. } => "replace",
            Operation::UpdateEntity { .. } => "update-entity",
            Operation::SetState { .. } => "set-state",
        }
    }
}

/// JSON view of a state, printed by `wizard show`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub path: String,
    pub current: Option<String>,
    pub positions: Vec<PositionSummary>,
    pub next: Vec<CandidateSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PositionSummary {
    pub key_path: String,
    pub action: String,
    pub context: WizardContext,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "ScratchState::is_empty")]
    pub state: ScratchState,
}

impl PositionSummary {
    fn new(program: &Program, position: &Position) -> Self {
        Self {
            key_path: position.key_path(),
            action: action_name(program, position),
            context: position.context.clone(),
            commands: position
                .commands
                .iter()
                .map(|command| command.name.clone())
                .collect(),
            state: position.state.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CandidateSummary {
    pub execute_id: String,
    pub action: String,
    pub jump: bool,
}

impl CandidateSummary {
    fn new(program: &Program, candidate: &Candidate) -> Self {
        Self {
            execute_id: candidate.execute_id().to_string(),
            action: action_name(program, candidate.target()),
            jump: candidate.is_jump(),
        }
    }
}

fn action_name(program: &Program, position: &Position) -> String {
    position
        .action(program)
        .map(|action| action.name.clone())
        .unwrap_or_default()
}

/// Parse `key=value` pairs; values use the path value encoding
/// (`~` null, `~type:id` entity, anything else text).
pub fn parse_context(pairs: &[String]) -> Result<WizardContext> {
    let mut context = WizardContext::new();
    for pair in pairs {
        let (key, raw) = split_pair(pair)?;
        let value: Value =
            decode_value(raw).with_context(|| format!("decode value for '{key}'"))?;
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

fn parse_state(pairs: &[String]) -> Result<ScratchState> {
    pairs
        .iter()
        .map(|pair| split_pair(pair).map(|(key, value)| (key.to_string(), value.to_string())))
        .collect()
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(anyhow!("expected key=value, got '{pair}'")),
    }
}

/// Parse an entity written as `type:id` with optional `!state,...`.
pub fn parse_entity(raw: &str) -> Result<Entity> {
    let argument = ArgumentType::Entity
        .parse(&Props::new(), raw)
        .with_context(|| format!("parse entity '{raw}'"))?;
    match argument {
        Argument::Value(Value::Entity(entity)) => Ok(entity),
        _ => Err(anyhow!("expected entity, got '{raw}'")),
    }
}
