//! Compiled instruction graph.
//!
//! Instructions live in a flat arena owned by [`Program`] and refer to each
//! other by [`InstructionId`]. The arena is built once by
//! [`crate::core::compile`] and never changes afterwards.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::command::{Command, Props};
use crate::core::error::{EngineError, EngineResult};
use crate::core::reference::Reference;
use crate::core::types::{Domain, RecordType};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// True for action, execute and command identifiers usable in paths.
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Index of an instruction inside its [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Start {
        then: Vec<InstructionId>,
    },
    Execute {
        /// Identity of this occurrence; defaults to the action id.
        id: String,
        action: String,
        then: Vec<InstructionId>,
    },
    Include {
        include: Vec<InstructionId>,
        then: Vec<InstructionId>,
    },
    Repeat {
        repeat: Vec<InstructionId>,
        then: Vec<InstructionId>,
    },
    Replace {
        reference: Reference,
    },
}

impl Instruction {
    pub fn then(&self) -> &[InstructionId] {
        match self {
            Instruction::Start { then }
            | Instruction::Execute { then, .. }
            | Instruction::Include { then, .. }
            | Instruction::Repeat { then, .. } => then,
            Instruction::Replace { .. } => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Start { .. } => "start",
            Instruction::Execute { .. } => "execute",
            Instruction::Include { .. } => "include",
            Instruction::Repeat { .. } => "repeat",
            Instruction::Replace { .. } => "replace",
        }
    }
}

/// Author-time instruction description, as written in flow documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreInstruction {
    Execute {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        then: Vec<PreInstruction>,
    },
    Include {
        include: Vec<PreInstruction>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        then: Vec<PreInstruction>,
    },
    Repeat {
        repeat: Vec<PreInstruction>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        then: Vec<PreInstruction>,
    },
    Replace {
        replace: String,
    },
}

/// Declared input and output record types of an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTypes {
    #[serde(default)]
    pub input: RecordType,
    #[serde(default)]
    pub output: RecordType,
}

/// Resolved action: static props, type contract and command table.
///
/// The rendered element stays with the rendering layer, keyed by `id`.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub id: String,
    pub name: String,
    pub props: Props,
    pub context_types: ContextTypes,
    pub commands: BTreeMap<String, Command>,
}

impl ActionSpec {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            props: Props::new(),
            context_types: ContextTypes::default(),
            commands: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, input: RecordType) -> Self {
        self.context_types.input = input;
        self
    }

    pub fn with_output(mut self, output: RecordType) -> Self {
        self.context_types.output = output;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.insert(command.name.clone(), command);
        self
    }

    pub fn input(&self) -> &RecordType {
        &self.context_types.input
    }

    /// Keys named by either the input or the output type.
    pub fn declared_keys(&self) -> impl Iterator<Item = &str> {
        self.context_types
            .input
            .keys()
            .chain(self.context_types.output.keys())
    }
}

/// Immutable instruction arena plus the actions and domain it references.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) root: InstructionId,
    pub(crate) actions: BTreeMap<String, ActionSpec>,
    pub(crate) domain: Domain,
}

impl Program {
    pub fn root(&self) -> InstructionId {
        self.root
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id.0]
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    pub fn action(&self, id: &str) -> EngineResult<&ActionSpec> {
        self.actions
            .get(id)
            .ok_or_else(|| EngineError::UnknownAction(id.to_string()))
    }

    /// Execute id and action of `id`, or `None` for non-execute instructions.
    pub fn execute(&self, id: InstructionId) -> Option<(&str, &ActionSpec)> {
        match self.instruction(id) {
            Instruction::Execute { id, action, .. } => {
                self.actions.get(action).map(|spec| (id.as_str(), spec))
            }
            _ => None,
        }
    }

    /// True if some execute instruction carries this execute id.
    pub fn has_execute_id(&self, execute_id: &str) -> bool {
        self.instructions.iter().any(
            |instruction| matches!(instruction, Instruction::Execute { id, .. } if id == execute_id),
        )
    }
}
