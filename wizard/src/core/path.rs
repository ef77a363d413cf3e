//! Textual encoding of a trace.
//!
//! A path is `/` followed by one segment per non-root position:
//! `execute_id` then one `[.command][[arg,arg]]` group per recorded command,
//! in the order they ran. Segments are escape-joined on `/`, arguments on `,`,
//! and each argument list is escaped on `]` so groups can be chained. The
//! `.default` command name is left out whenever the group carries arguments.

use std::sync::Arc;

use tracing::debug;

use crate::core::command::{CONTEXT_COMMAND, DEFAULT_COMMAND, CommandInvocation, get_command};
use crate::core::context::Context;
use crate::core::error::{EngineError, EngineResult};
use crate::core::escape::{escape, join, split, unescape};
use crate::core::graph::Graph;
use crate::core::instruction::{Program, is_identifier};
use crate::core::position::{Position, step_to};

const CLOSE: char = ']';

/// Render the trace of `graph`. The root-only state renders as `/`.
pub fn to_path(graph: &Graph) -> EngineResult<String> {
    let segments = graph.trace()[1..]
        .iter()
        .map(|position| encode_segment(graph.program(), position))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(format!("/{}", join(&segments, '/')))
}

fn encode_segment(program: &Program, position: &Position) -> EngineResult<String> {
    let mut segment = position.execute_id.clone().unwrap_or_default();
    if position.commands.is_empty() {
        return Ok(segment);
    }
    let action = position.action(program)?;
    for invocation in &position.commands {
        let command =
            get_command(action, &invocation.name).ok_or_else(|| EngineError::UnknownCommand {
                action: action.id.clone(),
                command: invocation.name.clone(),
            })?;
        let args = command.stringify_args(&action.props, &invocation.args)?;
        if invocation.name != DEFAULT_COMMAND || args.is_empty() {
            segment.push('.');
            segment.push_str(&invocation.name);
        }
        if !args.is_empty() {
            segment.push('[');
            segment.push_str(&escape(&join(&args, ','), CLOSE));
            segment.push(CLOSE);
        }
    }
    Ok(segment)
}

/// One decoded path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    execute_id: String,
    commands: Vec<(String, Vec<String>)>,
}

fn parse_segment(path: &str, raw: &str) -> EngineResult<Segment> {
    let head_end = raw.find(['.', '[']).unwrap_or(raw.len());
    let execute_id = &raw[..head_end];
    if !is_identifier(execute_id) {
        return Err(EngineError::malformed_path(
            path,
            format!("invalid execute id '{execute_id}'"),
        ));
    }

    let mut commands = Vec::new();
    let mut rest = &raw[head_end..];
    while !rest.is_empty() {
        let mut name = None;
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            let candidate = &after_dot[..end];
            if !is_identifier(candidate) {
                return Err(EngineError::malformed_path(
                    path,
                    format!("invalid command name '{candidate}'"),
                ));
            }
            name = Some(candidate);
            rest = &after_dot[end..];
        }
        let mut args = None;
        if let Some(after_open) = rest.strip_prefix('[') {
            let close = closing_bracket(after_open).ok_or_else(|| {
                EngineError::malformed_path(path, format!("unclosed arguments in '{raw}'"))
            })?;
            args = Some(split(&unescape(&after_open[..close], CLOSE), ','));
            rest = &after_open[close + CLOSE.len_utf8()..];
        }
        if name.is_none() && args.is_none() {
            return Err(EngineError::malformed_path(
                path,
                format!("unexpected '{rest}' in '{raw}'"),
            ));
        }
        commands.push((
            name.unwrap_or(DEFAULT_COMMAND).to_string(),
            args.unwrap_or_default(),
        ));
    }
    Ok(Segment {
        execute_id: execute_id.to_string(),
        commands,
    })
}

/// Byte offset of the first `]` in `body` not preceded by an escape.
fn closing_bracket(body: &str) -> Option<usize> {
    let mut chars = body.char_indices();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            CLOSE => return Some(index),
            _ => {}
        }
    }
    None
}

/// Rebuild a state from `path`.
///
/// The empty path means "start": the root state advanced once. `/` is the
/// root-only state. Anything else replays its segments in order; a segment
/// that is unreachable, disallowed or carries bad arguments fails the whole
/// decode.
pub fn from_path(
    program: Arc<Program>,
    initial_context: Context,
    path: &str,
) -> EngineResult<Graph> {
    let mut graph = Graph::new(program, initial_context);
    if path.is_empty() {
        return graph.advance(None, None);
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| EngineError::malformed_path(path, "must start with '/'"))?;
    if rest.is_empty() {
        return Ok(graph);
    }
    for raw in split(rest, '/') {
        let segment = parse_segment(path, &raw)?;
        let position = replay(&graph, segment)?;
        graph = graph.pushed(position);
    }
    debug!(path, positions = graph.trace().len(), "decoded path");
    Ok(graph)
}

fn replay(graph: &Graph, segment: Segment) -> EngineResult<Position> {
    let program = graph.program();
    let mut position = step_to(program, graph.current(), &segment.execute_id)
        .ok_or_else(|| EngineError::Unreachable(segment.execute_id.clone()))?;
    for (name, raw) in segment.commands {
        let action = position.action(program)?;
        let command = get_command(action, &name).ok_or_else(|| EngineError::UnknownCommand {
            action: action.id.clone(),
            command: name.clone(),
        })?;
        // A `context` invocation can be what makes its position reachable, so
        // it is only checked after being applied.
        if name != CONTEXT_COMMAND && !position.allowed(program) {
            return Err(EngineError::DisallowedPosition(position.key_path()));
        }
        let args = command.parse_args(&action.props, &raw)?;
        position.context = command.execute(&action.props, &position.context, &args)?;
        position.commands.push(CommandInvocation::new(name, args));
    }
    if !position.allowed(program) {
        return Err(EngineError::DisallowedPosition(position.key_path()));
    }
    Ok(position)
}
