//! Compile pre-instructions into an immutable [`Program`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::command::CONTEXT_COMMAND;
use crate::core::error::{EngineError, EngineResult};
use crate::core::instruction::{
    ActionSpec, Instruction, InstructionId, PreInstruction, Program, is_identifier,
};
use crate::core::reference::parse_reference;
use crate::core::types::Domain;

/// Compile `flow` (the children of the implicit start instruction).
///
/// Fails fast on unknown actions, invalid or duplicate identifiers, empty
/// include/repeat bodies and replace references naming no execute instruction.
pub fn parse_instruction(
    flow: &[PreInstruction],
    actions: BTreeMap<String, ActionSpec>,
    domain: Domain,
) -> EngineResult<Program> {
    validate_actions(&actions)?;

    let mut builder = Builder {
        instructions: vec![Instruction::Start { then: Vec::new() }],
        actions: &actions,
        execute_ids: BTreeSet::new(),
    };
    let then = builder.compile_all(flow)?;
    builder.instructions[0] = Instruction::Start { then };
    let instructions = builder.instructions;

    let program = Program {
        instructions,
        root: InstructionId(0),
        actions,
        domain,
    };
    validate_references(&program)?;
    debug!(instructions = program.len(), "compiled instruction graph");
    Ok(program)
}

struct Builder<'a> {
    instructions: Vec<Instruction>,
    actions: &'a BTreeMap<String, ActionSpec>,
    execute_ids: BTreeSet<String>,
}

impl Builder<'_> {
    fn compile_all(&mut self, items: &[PreInstruction]) -> EngineResult<Vec<InstructionId>> {
        items.iter().map(|item| self.compile(item)).collect()
    }

    fn compile(&mut self, item: &PreInstruction) -> EngineResult<InstructionId> {
        let instruction = match item {
            PreInstruction::Execute { action, id, then } => {
                if !self.actions.contains_key(action) {
                    return Err(EngineError::UnknownAction(action.clone()));
                }
                let id = id.clone().unwrap_or_else(|| action.clone());
                if !is_identifier(&id) {
                    return Err(EngineError::InvalidInstruction(format!(
                        "invalid execute id '{id}'"
                    )));
                }
                if !self.execute_ids.insert(id.clone()) {
                    return Err(EngineError::InvalidInstruction(format!(
                        "duplicate execute id '{id}' (set an explicit id)"
                    )));
                }
                Instruction::Execute {
                    id,
                    action: action.clone(),
                    then: self.compile_all(then)?,
                }
            }
            PreInstruction::Include { include, then } => {
                if include.is_empty() {
                    return Err(EngineError::InvalidInstruction(
                        "include body must not be empty".to_string(),
                    ));
                }
                Instruction::Include {
                    include: self.compile_all(include)?,
                    then: self.compile_all(then)?,
                }
            }
            PreInstruction::Repeat { repeat, then } => {
                if repeat.is_empty() {
                    return Err(EngineError::InvalidInstruction(
                        "repeat body must not be empty".to_string(),
                    ));
                }
                Instruction::Repeat {
                    repeat: self.compile_all(repeat)?,
                    then: self.compile_all(then)?,
                }
            }
            PreInstruction::Replace { replace } => Instruction::Replace {
                reference: parse_reference(replace)?,
            },
        };
        self.instructions.push(instruction);
        Ok(InstructionId(self.instructions.len() - 1))
    }
}

fn validate_actions(actions: &BTreeMap<String, ActionSpec>) -> EngineResult<()> {
    for (key, action) in actions {
        if *key != action.id {
            return Err(EngineError::InvalidInstruction(format!(
                "action registered as '{key}' has id '{}'",
                action.id
            )));
        }
        if !is_identifier(key) {
            return Err(EngineError::InvalidInstruction(format!(
                "invalid action id '{key}'"
            )));
        }
        for (name, command) in &action.commands {
            if *name != command.name || !is_identifier(name) {
                return Err(EngineError::InvalidInstruction(format!(
                    "action '{key}': invalid command name '{name}'"
                )));
            }
            if name == CONTEXT_COMMAND {
                return Err(EngineError::InvalidInstruction(format!(
                    "action '{key}': command name '{CONTEXT_COMMAND}' is reserved"
                )));
            }
        }
    }
    Ok(())
}

fn validate_references(program: &Program) -> EngineResult<()> {
    for instruction in &program.instructions {
        let Instruction::Replace { reference } = instruction else {
            continue;
        };
        for step in &reference.traverse {
            if !program.has_execute_id(&step.action_id) {
                return Err(EngineError::malformed_reference(
                    &reference.source,
                    format!("no execute instruction '{}'", step.action_id),
                ));
            }
        }
    }
    Ok(())
}
