//! Positions and candidate derivation.
//!
//! A position is one concrete execute occurrence (or the synthetic root) with
//! the context it was entered with. Include and repeat instructions never
//! become positions: they are flattened into the frame stack of the positions
//! they contain. Every function here is a pure function of the program and the
//! positions passed in.

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::command::CommandInvocation;
use crate::core::context::{Context, ScratchState, delta, merge, restrict};
use crate::core::error::{EngineError, EngineResult};
use crate::core::instruction::{ActionSpec, Instruction, InstructionId, Program};
use crate::core::reference::{Anchor, Reference};
use crate::core::types::matches;

/// Enclosing include or repeat of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Include(InstructionId),
    Repeat {
        instruction: InstructionId,
        iteration: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub instruction: InstructionId,
    /// Execute id, `None` for the root.
    pub execute_id: Option<String>,
    pub frames: Vec<Frame>,
    pub context: Context,
    pub state: ScratchState,
    /// Commands run on this position, in order.
    pub commands: Vec<CommandInvocation>,
}

impl Position {
    pub fn root(program: &Program, context: Context) -> Self {
        Self {
            instruction: program.root(),
            execute_id: None,
            frames: Vec::new(),
            context,
            state: ScratchState::new(),
            commands: Vec::new(),
        }
    }

    fn at(
        program: &Program,
        instruction: InstructionId,
        frames: Vec<Frame>,
        context: Context,
    ) -> Self {
        let execute_id = program.execute(instruction).map(|(id, _)| id.to_string());
        Self {
            instruction,
            execute_id,
            frames,
            context,
            state: ScratchState::new(),
            commands: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.execute_id.is_none()
    }

    /// Stable identity: enclosing repeat iterations followed by the execute id.
    pub fn key_path(&self) -> String {
        let mut parts: Vec<String> = self
            .frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Repeat { iteration, .. } => Some(iteration.to_string()),
                Frame::Include(_) => None,
            })
            .collect();
        parts.push(self.execute_id.clone().unwrap_or_default());
        parts.join(".")
    }

    pub fn action<'a>(&self, program: &'a Program) -> EngineResult<&'a ActionSpec> {
        program
            .execute(self.instruction)
            .map(|(_, action)| action)
            .ok_or(EngineError::RootPosition)
    }

    /// True if the context satisfies the action's input type. The root is
    /// always allowed.
    pub fn allowed(&self, program: &Program) -> bool {
        match program.execute(self.instruction) {
            Some((_, action)) => matches(&self.context, action.input(), program.domain()),
            None => true,
        }
    }

    pub fn last_command(&self) -> Option<&CommandInvocation> {
        self.commands.last()
    }

    pub fn with_context(&self, context: Context) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }
}

/// Structural successor, before type filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Successor {
    Execute(InstructionId, Vec<Frame>),
    Replace(InstructionId),
}

/// Realized successors of `position`, in instruction order.
fn successors(program: &Program, position: &Position) -> Vec<Successor> {
    let mut out = Vec::new();
    let then = program.instruction(position.instruction).then();
    if then.is_empty() {
        exit(program, &position.frames, &mut out);
    } else {
        for child in then {
            realize(program, *child, &position.frames, &mut out);
        }
    }
    out
}

fn realize(program: &Program, id: InstructionId, frames: &[Frame], out: &mut Vec<Successor>) {
    match program.instruction(id) {
        Instruction::Execute { .. } => out.push(Successor::Execute(id, frames.to_vec())),
        Instruction::Replace { .. } => out.push(Successor::Replace(id)),
        Instruction::Include { include, .. } => {
            let inner = pushed(frames, Frame::Include(id));
            for child in include {
                realize(program, *child, &inner, out);
            }
        }
        Instruction::Repeat { repeat, .. } => {
            let inner = pushed(
                frames,
                Frame::Repeat {
                    instruction: id,
                    iteration: 0,
                },
            );
            for child in repeat {
                realize(program, *child, &inner, out);
            }
        }
        // Start is only ever the root and never appears as a child.
        Instruction::Start { .. } => {}
    }
}

/// Successors once the innermost frame's body is exhausted.
fn exit(program: &Program, frames: &[Frame], out: &mut Vec<Successor>) {
    let Some((frame, rest)) = frames.split_last() else {
        return;
    };
    let owner = match *frame {
        Frame::Include(instruction) => instruction,
        Frame::Repeat {
            instruction,
            iteration,
        } => {
            if let Instruction::Repeat { repeat, .. } = program.instruction(instruction) {
                let looped = pushed(
                    rest,
                    Frame::Repeat {
                        instruction,
                        iteration: iteration + 1,
                    },
                );
                for child in repeat {
                    realize(program, *child, &looped, out);
                }
            }
            instruction
        }
    };
    let then = program.instruction(owner).then();
    if then.is_empty() {
        exit(program, rest, out);
    } else {
        for child in then {
            realize(program, *child, rest, out);
        }
    }
}

fn pushed(frames: &[Frame], frame: Frame) -> Vec<Frame> {
    let mut next = frames.to_vec();
    next.push(frame);
    next
}

/// Trace rewrite produced by following a replace instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jump {
    pub replace: InstructionId,
    /// Index of the last trace entry kept.
    pub base: usize,
    /// Positions walked through between `base` and `destination`.
    pub via: Vec<Position>,
    pub destination: Position,
}

impl Jump {
    /// Positions appended after `base`, destination last.
    pub fn steps(&self) -> impl Iterator<Item = &Position> {
        self.via.iter().chain(std::iter::once(&self.destination))
    }
}

/// Candidate next move from the tail of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Step(Position),
    Jump(Jump),
}

impl Candidate {
    /// The concrete position this candidate lands on.
    pub fn target(&self) -> &Position {
        match self {
            Candidate::Step(position) => position,
            Candidate::Jump(jump) => &jump.destination,
        }
    }

    pub fn execute_id(&self) -> &str {
        self.target().execute_id.as_deref().unwrap_or_default()
    }

    /// A jump is allowed only if every position it appends is.
    pub fn allowed(&self, program: &Program) -> bool {
        match self {
            Candidate::Step(position) => position.allowed(program),
            Candidate::Jump(jump) => jump.steps().all(|position| position.allowed(program)),
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Candidate::Jump(_))
    }
}

/// Every candidate after the last entry of `trace`, allowed or not.
///
/// Children inherit the tail's context. Replace children are resolved
/// immediately so they can be filtered on their destination.
pub fn candidates(program: &Program, trace: &[Position]) -> EngineResult<Vec<Candidate>> {
    let tail = trace.last().ok_or(EngineError::RootPosition)?;
    successors(program, tail)
        .into_iter()
        .map(|successor| match successor {
            Successor::Execute(id, frames) => Ok(Candidate::Step(Position::at(
                program,
                id,
                frames,
                tail.context.clone(),
            ))),
            Successor::Replace(id) => match program.instruction(id) {
                Instruction::Replace { reference } => {
                    resolve_reference(program, trace, id, reference).map(Candidate::Jump)
                }
                other => Err(EngineError::InvalidInstruction(format!(
                    "expected replace, found {}",
                    other.kind()
                ))),
            },
        })
        .collect()
}

/// Allowed candidates after the last entry of `trace`.
pub fn next(program: &Program, trace: &[Position]) -> EngineResult<Vec<Candidate>> {
    Ok(candidates(program, trace)?
        .into_iter()
        .filter(|candidate| candidate.allowed(program))
        .collect())
}

/// Execute successor of `position` with the given execute id, if any.
pub(crate) fn step_to(
    program: &Program,
    position: &Position,
    execute_id: &str,
) -> Option<Position> {
    successors(program, position)
        .into_iter()
        .find_map(|successor| match successor {
            Successor::Execute(id, frames)
                if program.execute(id).map(|(eid, _)| eid) == Some(execute_id) =>
            {
                Some(Position::at(program, id, frames, position.context.clone()))
            }
            _ => None,
        })
}

/// Follow `reference` from the tail of `trace`.
///
/// Walks back to the anchor, then forward through the named executes. The
/// first step merges the reference's update, with `$key` values read from the
/// tail's context. The destination additionally keeps the tail's values for
/// every key its action declares. Whatever a step changes is recorded on it
/// as a `context` invocation.
pub fn resolve_reference(
    program: &Program,
    trace: &[Position],
    replace: InstructionId,
    reference: &Reference,
) -> EngineResult<Jump> {
    let last = trace.len().checked_sub(1).ok_or(EngineError::RootPosition)?;
    let original = &trace[last].context;
    let base = match reference.anchor {
        Anchor::Root => 0,
        Anchor::Back(back) => last.checked_sub(back).ok_or_else(|| {
            EngineError::malformed_reference(
                &reference.source,
                format!("cannot walk back {back} step(s) from a trace of {}", trace.len()),
            )
        })?,
    };

    let mut cursor = trace[base].clone();
    let mut steps = Vec::with_capacity(reference.traverse.len());
    for (index, step) in reference.traverse.iter().enumerate() {
        let mut position = step_to(program, &cursor, &step.action_id).ok_or_else(|| {
            EngineError::malformed_reference(
                &reference.source,
                format!(
                    "'{}' is not reachable from '{}'",
                    step.action_id,
                    cursor.key_path()
                ),
            )
        })?;
        let mut update = if index == 0 {
            step.resolve_update(original)
        } else {
            Context::new()
        };
        if index + 1 == reference.traverse.len() {
            let keys: BTreeSet<&str> = position.action(program)?.declared_keys().collect();
            update = merge(&restrict(original, &keys), &update);
        }
        let changed = delta(&cursor.context, &update);
        position.context = merge(&cursor.context, &changed);
        if !changed.is_empty() {
            position.commands.push(CommandInvocation::context(changed));
        }
        steps.push(position.clone());
        cursor = position;
    }
    let Some(destination) = steps.pop() else {
        return Err(EngineError::malformed_reference(
            &reference.source,
            "no target action",
        ));
    };

    debug!(
        reference = %reference.source,
        base,
        target = %destination.key_path(),
        "resolved replace reference"
    );
    Ok(Jump {
        replace,
        base,
        via: steps,
        destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Value;
    use crate::core::types::{RecordType, Type};
    use crate::test_support::{ProgramFixture, execute, include, repeat, replace};

    fn ids(candidates: &[Candidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|candidate| candidate.target().key_path())
            .collect()
    }

    #[test]
    fn root_successors_follow_start_children() {
        let program = ProgramFixture::new(&["a", "b"])
            .flow(vec![execute("a", vec![]), execute("b", vec![])])
            .build();
        let trace = vec![Position::root(&program, Context::new())];
        let next = next(&program, &trace).expect("next");
        assert_eq!(ids(&next), vec!["a", "b"]);
    }

    /// Include bodies are spliced in place, then the include's own `then`.
    #[test]
    fn include_flattens_body_then_continues() {
        let program = ProgramFixture::new(&["a", "b", "c"])
            .flow(vec![include(
                vec![execute("a", vec![execute("b", vec![])])],
                vec![execute("c", vec![])],
            )])
            .build();
        let root = Position::root(&program, Context::new());
        let first = next(&program, &[root.clone()]).expect("next");
        assert_eq!(ids(&first), vec!["a"]);

        let a = first[0].target().clone();
        let after_a = next(&program, &[root.clone(), a.clone()]).expect("next");
        assert_eq!(ids(&after_a), vec!["b"]);

        let b = after_a[0].target().clone();
        let after_b = next(&program, &[root, a, b]).expect("next");
        assert_eq!(ids(&after_b), vec!["c"]);
        assert!(after_b[0].target().frames.is_empty());
    }

    /// The end of a repeat body offers the next iteration before the exit.
    #[test]
    fn repeat_offers_loop_then_exit() {
        let program = ProgramFixture::new(&["item", "done"])
            .flow(vec![repeat(
                vec![execute("item", vec![])],
                vec![execute("done", vec![])],
            )])
            .build();
        let root = Position::root(&program, Context::new());
        let first = next(&program, &[root.clone()]).expect("next");
        assert_eq!(ids(&first), vec!["0.item"]);

        let item = first[0].target().clone();
        let after = next(&program, &[root, item]).expect("next");
        assert_eq!(ids(&after), vec!["1.item", "done"]);
    }

    #[test]
    fn nested_frames_exit_outward() {
        let program = ProgramFixture::new(&["inner", "outer"])
            .flow(vec![include(
                vec![repeat(vec![execute("inner", vec![])], vec![])],
                vec![execute("outer", vec![])],
            )])
            .build();
        let root = Position::root(&program, Context::new());
        let inner = next(&program, &[root.clone()]).expect("next")[0]
            .target()
            .clone();
        let after = next(&program, &[root, inner]).expect("next");
        assert_eq!(ids(&after), vec!["1.inner", "outer"]);
    }

    #[test]
    fn candidates_are_filtered_by_input_type() {
        let program = ProgramFixture::new(&["open", "gated"])
            .input("gated", RecordType::new().with_row("who", Type::entity("individual")))
            .flow(vec![execute("open", vec![]), execute("gated", vec![])])
            .build();
        let trace = vec![Position::root(&program, Context::new())];
        assert_eq!(candidates(&program, &trace).expect("candidates").len(), 2);
        assert_eq!(ids(&next(&program, &trace).expect("next")), vec!["open"]);
    }

    #[test]
    fn replace_walks_back_and_applies_update() {
        let program = ProgramFixture::new(&["a", "b"])
            .input("b", RecordType::new().with_row("flag", Type::value("flag")))
            .flow(vec![
                execute("a", vec![replace("../b?flag=yes")]),
                execute("b", vec![]),
            ])
            .build();
        let root = Position::root(&program, Context::new());
        let a = next(&program, &[root.clone()]).expect("next")[0]
            .target()
            .clone();

        let after_a = next(&program, &[root, a]).expect("next");
        assert_eq!(after_a.len(), 1);
        let Candidate::Jump(jump) = &after_a[0] else {
            panic!("expected a jump, got {:?}", after_a[0]);
        };
        assert_eq!(jump.base, 0);
        let target = after_a[0].target();
        assert_eq!(target.key_path(), "b");
        assert_eq!(target.context.get("flag"), Some(&Value::text("yes")));
        assert!(target.last_command().is_some_and(CommandInvocation::is_context));
    }

    /// `g` needs `k`, so walking through it to `x` is not a valid move.
    #[test]
    fn replace_through_disallowed_step_is_filtered() {
        let flow = |reference: &str| {
            vec![
                execute("a", vec![replace(reference)]),
                execute("g", vec![execute("x", vec![])]),
            ]
        };
        let gated = |fixture: ProgramFixture| {
            fixture.input("g", RecordType::new().with_row("k", Type::value("k")))
        };
        let trace_at_a = |program: &Program| {
            let root = Position::root(program, Context::new());
            let a = next(program, &[root.clone()]).expect("next")[0]
                .target()
                .clone();
            vec![root, a]
        };
        let program = gated(ProgramFixture::new(&["a", "g", "x"]))
            .flow(flow("/g/x"))
            .build();
        let trace = trace_at_a(&program);
        let all = candidates(&program, &trace).expect("candidates");
        assert_eq!(ids(&all), vec!["x"]);
        assert!(all[0].target().allowed(&program));
        assert!(!all[0].allowed(&program));
        assert!(next(&program, &trace).expect("next").is_empty());

        let program = gated(ProgramFixture::new(&["a", "g", "x"]))
            .flow(flow("/g?k=1/x"))
            .build();
        let allowed = next(&program, &trace_at_a(&program)).expect("next");
        let Candidate::Jump(jump) = &allowed[0] else {
            panic!("expected a jump, got {:?}", allowed[0]);
        };
        assert_eq!(jump.via[0].context.get("k"), Some(&Value::text("1")));
        assert_eq!(jump.destination.key_path(), "x");
    }

    #[test]
    fn replace_copies_referenced_values() {
        let program = ProgramFixture::new(&["a", "b"])
            .flow(vec![
                execute("a", vec![replace("../b?copy=$note")]),
                execute("b", vec![]),
            ])
            .build();
        let mut context = Context::new();
        context.insert("note".to_string(), Value::text("kept"));
        let root = Position::root(&program, Context::new());
        let a = next(&program, &[root.clone()]).expect("next")[0]
            .target()
            .with_context(context);

        let after_a = next(&program, &[root, a]).expect("next");
        let target = after_a[0].target();
        assert_eq!(target.context.get("copy"), Some(&Value::text("kept")));
        assert_eq!(target.context.get("note"), None);
    }

    #[test]
    fn replace_walking_past_root_is_an_error() {
        let program = ProgramFixture::new(&["a"])
            .flow(vec![execute("a", vec![replace("../../../a")])])
            .build();
        let root = Position::root(&program, Context::new());
        let a = next(&program, &[root.clone()]).expect("next")[0]
            .target()
            .clone();
        let err = next(&program, &[root, a]).expect_err("expected error");
        assert!(matches!(err, EngineError::MalformedReference { .. }));
    }
}
