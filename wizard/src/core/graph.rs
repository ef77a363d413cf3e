//! Traversal state: the trace of visited positions over a compiled program.
//!
//! A [`Graph`] is an immutable value. Every operation returns a new graph or
//! fails before producing one; any prefix of a trace is itself a valid state.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::command::{Argument, CommandInvocation, get_command};
use crate::core::context::{Context, Entity, ScratchState, merge, substitute_entity};
use crate::core::error::{EngineError, EngineResult};
use crate::core::instruction::Program;
use crate::core::position::{Candidate, Position, candidates, next};

#[derive(Debug, Clone)]
pub struct Graph {
    program: Arc<Program>,
    trace: Vec<Position>,
}

impl Graph {
    /// Root-only state carrying `initial_context`.
    pub fn new(program: Arc<Program>, initial_context: Context) -> Self {
        let root = Position::root(&program, initial_context);
        Self {
            program,
            trace: vec![root],
        }
    }

    /// Root state advanced to its first allowed position.
    pub fn start(program: Arc<Program>, initial_context: Context) -> EngineResult<Self> {
        Self::new(program, initial_context).advance(None, None)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn shared_program(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }

    pub fn trace(&self) -> &[Position] {
        &self.trace
    }

    pub fn current(&self) -> &Position {
        // The root is never removed, so the trace is never empty.
        &self.trace[self.trace.len() - 1]
    }

    pub fn context(&self) -> &Context {
        &self.current().context
    }

    pub fn key_paths(&self) -> Vec<String> {
        self.trace[1..].iter().map(Position::key_path).collect()
    }

    pub fn position(&self, key_path: &str) -> EngineResult<&Position> {
        self.index_of(key_path).map(|index| &self.trace[index])
    }

    fn index_of(&self, key_path: &str) -> EngineResult<usize> {
        self.trace
            .iter()
            .position(|position| !position.is_root() && position.key_path() == key_path)
            .ok_or_else(|| EngineError::UnknownKeyPath(key_path.to_string()))
    }

    fn with_trace(&self, trace: Vec<Position>) -> Self {
        Self {
            program: Arc::clone(&self.program),
            trace,
        }
    }

    /// Every candidate after the current position, allowed or not.
    pub fn then(&self) -> EngineResult<Vec<Candidate>> {
        candidates(&self.program, &self.trace)
    }

    /// Allowed candidates after the current position.
    pub fn next_actions(&self) -> EngineResult<Vec<Candidate>> {
        next(&self.program, &self.trace)
    }

    /// Allowed alternatives to the current position, itself included.
    pub fn sibling_actions(&self) -> EngineResult<Vec<Candidate>> {
        if self.trace.len() < 2 {
            return Ok(Vec::new());
        }
        next(&self.program, &self.trace[..self.trace.len() - 1])
    }

    /// Merge `context_update` into the current position, then move to the
    /// first allowed candidate (restricted to `action_id` when given).
    ///
    /// Returns the state unchanged when nothing is reachable.
    pub fn advance(
        &self,
        action_id: Option<&str>,
        context_update: Option<&Context>,
    ) -> EngineResult<Self> {
        let (trace, chosen) = self.choose(action_id, context_update)?;
        let Some(candidate) = chosen else {
            debug!(action = ?action_id, "advance: no reachable candidate");
            return Ok(self.with_trace(trace));
        };
        debug!(
            target = %candidate.target().key_path(),
            jump = candidate.is_jump(),
            "advance"
        );
        Ok(self.with_trace(apply(trace, candidate)))
    }

    /// Like [`Graph::advance`] with an action id, but failing when the action
    /// is not currently reachable.
    pub fn advance_to(&self, action_id: &str) -> EngineResult<Self> {
        let (trace, chosen) = self.choose(Some(action_id), None)?;
        let candidate = chosen.ok_or_else(|| EngineError::Unreachable(action_id.to_string()))?;
        Ok(self.with_trace(apply(trace, candidate)))
    }

    fn choose(
        &self,
        action_id: Option<&str>,
        context_update: Option<&Context>,
    ) -> EngineResult<(Vec<Position>, Option<Candidate>)> {
        if let Some(action_id) = action_id
            && !self.program.has_execute_id(action_id)
        {
            return Err(EngineError::UnknownAction(action_id.to_string()));
        }

        let mut trace = self.trace.clone();
        if let Some(update) = context_update
            && !update.is_empty()
        {
            let tail = self.current();
            if tail.is_root() {
                return Err(EngineError::RootPosition);
            }
            let last = trace.len() - 1;
            trace[last] = record_context_update(tail, update);
        }
        let tail = &trace[trace.len() - 1];
        if !tail.allowed(&self.program) {
            return Err(EngineError::DisallowedPosition(tail.key_path()));
        }

        let chosen = next(&self.program, &trace)?
            .into_iter()
            .find(|candidate| action_id.is_none_or(|id| candidate.execute_id() == id));
        Ok((trace, chosen))
    }

    /// Drop the position at `key_path` (default: the current one) and
    /// everything after it.
    pub fn close(&self, key_path: Option<&str>) -> EngineResult<Self> {
        let index = match key_path {
            Some(key_path) => self.index_of(key_path)?,
            None => self.trace.len() - 1,
        };
        if index == 0 {
            return Err(EngineError::RootPosition);
        }
        debug!(key_path = ?key_path, trace_len = index, "close");
        Ok(self.with_trace(self.trace[..index].to_vec()))
    }

    /// Close `key_path`, advance to `next_action_id`, then optionally take
    /// one more default step.
    pub fn replace(
        &self,
        key_path: &str,
        next_action_id: &str,
        try_advance: bool,
    ) -> EngineResult<Self> {
        let replaced = self
            .close(Some(key_path))?
            .advance(Some(next_action_id), None)?;
        if try_advance {
            return replaced.advance(None, None);
        }
        Ok(replaced)
    }

    /// Keep the trace up to and including `key_path`.
    pub fn return_to(&self, key_path: &str) -> EngineResult<Self> {
        let index = self.index_of(key_path)?;
        debug!(key_path, trace_len = index + 1, "return to");
        Ok(self.with_trace(self.trace[..=index].to_vec()))
    }

    /// Run a command on the current position and record it, without moving.
    ///
    /// Fails if the command leaves the position's input type unsatisfied.
    pub fn apply_command(&self, name: &str, args: Vec<Argument>) -> EngineResult<Self> {
        let tail = self.current();
        let action = tail.action(&self.program)?;
        let command = get_command(action, name).ok_or_else(|| EngineError::UnknownCommand {
            action: action.id.clone(),
            command: name.to_string(),
        })?;
        let context = command.execute(&action.props, &tail.context, &args)?;
        debug!(key_path = %tail.key_path(), command = name, "apply command");

        let mut position = tail.with_context(context);
        position.commands.push(CommandInvocation::new(name, args));
        if !position.allowed(&self.program) {
            return Err(EngineError::DisallowedPosition(position.key_path()));
        }
        let mut trace = self.trace.clone();
        let last = trace.len() - 1;
        trace[last] = position;
        Ok(self.with_trace(trace))
    }

    /// Run a command on the current position, then advance.
    pub fn execute_command(&self, name: &str, args: Vec<Argument>) -> EngineResult<Self> {
        self.apply_command(name, args)?.advance(None, None)
    }

    /// Replace every copy of `prev` in the trace with `next`, truncating at
    /// the first position the substitution disallows.
    pub fn update_entity(&self, prev: &Entity, next: &Entity) -> EngineResult<Self> {
        let mut trace = Vec::with_capacity(self.trace.len());
        for position in &self.trace {
            let substituted = Position {
                context: substitute_entity(&position.context, prev, next),
                commands: position
                    .commands
                    .iter()
                    .map(|command| command.substitute(prev, next))
                    .collect(),
                ..position.clone()
            };
            if !substituted.allowed(&self.program) {
                info!(
                    key_path = %substituted.key_path(),
                    entity = %format!("{}:{}", prev.type_name, prev.id),
                    "entity update disallows position; truncating trace"
                );
                break;
            }
            trace.push(substituted);
        }
        Ok(self.with_trace(trace))
    }

    /// Replace the UI scratch state of `key_path` (default: current).
    pub fn set_state(&self, key_path: Option<&str>, state: ScratchState) -> EngineResult<Self> {
        let index = match key_path {
            Some(key_path) => self.index_of(key_path)?,
            None => self.trace.len() - 1,
        };
        let mut trace = self.trace.clone();
        trace[index].state = state;
        Ok(self.with_trace(trace))
    }

    /// Append an already-validated position.
    pub(crate) fn pushed(&self, position: Position) -> Self {
        let mut trace = self.trace.clone();
        trace.push(position);
        self.with_trace(trace)
    }
}

fn apply(mut trace: Vec<Position>, candidate: Candidate) -> Vec<Position> {
    match candidate {
        Candidate::Step(position) => trace.push(position),
        Candidate::Jump(jump) => {
            trace.truncate(jump.base + 1);
            trace.extend(jump.via);
            trace.push(jump.destination);
        }
    }
    trace
}

/// Merge `update` into `position` and record it as a `context` invocation,
/// folded into the last one when that is already a `context` invocation.
fn record_context_update(position: &Position, update: &Context) -> Position {
    let mut next = position.with_context(merge(&position.context, update));
    let folded = next
        .commands
        .last()
        .and_then(|last| last.context_update())
        .map(|previous| merge(previous, update));
    match folded {
        Some(object) => {
            let last = next.commands.len() - 1;
            next.commands[last] = CommandInvocation::context(object);
        }
        None => next.commands.push(CommandInvocation::context(update.clone())),
    }
    next
}
