//! Precondition failures raised by the engine.
//!
//! Type-mismatch filtering is not an error: a position whose context does not
//! satisfy its input type is simply absent from candidate lists. Everything in
//! this module signals caller misuse or an inconsistent instruction graph.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no position with key path '{0}' in the current trace")]
    UnknownKeyPath(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' has no command '{command}'")]
    UnknownCommand { action: String, command: String },

    #[error("command '{command}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        command: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid argument '{raw}': {reason}")]
    InvalidArgument { raw: String, reason: String },

    #[error("position '{0}' is not allowed by its input type")]
    DisallowedPosition(String),

    #[error("action '{0}' is not reachable from the current position")]
    Unreachable(String),

    #[error("malformed replace reference '{reference}': {reason}")]
    MalformedReference { reference: String, reason: String },

    #[error("invalid instruction graph: {0}")]
    InvalidInstruction(String),

    #[error("the root position has no action")]
    RootPosition,

    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },
}

impl EngineError {
    pub(crate) fn invalid_argument(raw: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_reference(reference: &str, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_path(path: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
