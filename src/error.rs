//! Core error taxonomy shared across the intelligence subsystem.

use std::time::SystemTime;
use thiserror::Error;

use crate::fsm::ToolKind;

/// Top-level error type returned by the public core APIs.
///
/// Individual components keep their own narrower error enum (`FindingsError`,
/// `TriggerError`, `IncidentError`, ...) and convert into this one at the
/// facade boundary, the way the teacher's subsystems each own a `*Error`
/// type that rolls up into `RuntimeError`.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("tool call blocked by session state machine: {reason}")]
    FsmBlocked { reason: String, blocked_kind: ToolKind },

    #[error("tool '{tool}' execution failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("provider error ({retryable}): {message}")]
    ProviderError { message: String, retryable: bool },

    #[error("persistence failed: {message}")]
    PersistenceError { message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("investigation budget exhausted, resets {reset_at:?}")]
    BudgetExhausted { reset_at: SystemTime },
}

pub type CoreResult<T> = Result<T, CoreError>;
