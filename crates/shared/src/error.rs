use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PreconditionFailed,
    Validation,
    ReentrantTransition,
    HistoryUnavailable,
    HistoryExhausted,
    AwaitingTutorial,
    AlreadyInitialized,
    ShutDown,
    UnknownStep,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::PreconditionFailed => "precondition_failed",
            ErrorCode::Validation => "validation",
            ErrorCode::ReentrantTransition => "reentrant_transition",
            ErrorCode::HistoryUnavailable => "history_unavailable",
            ErrorCode::HistoryExhausted => "history_exhausted",
            ErrorCode::AwaitingTutorial => "awaiting_tutorial",
            ErrorCode::AlreadyInitialized => "already_initialized",
            ErrorCode::ShutDown => "shut_down",
            ErrorCode::UnknownStep => "unknown_step",
        }
    }
}

/// Every way a flow action can be turned down. None of these leave the flow
/// on an undefined step: the rejected action simply has no effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("cannot enter {target} from {current}: precondition not met")]
    PreconditionFailed { target: Step, current: Step },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("another transition is already in progress")]
    ReentrantTransition,
    #[error("platform history is unavailable; back/forward navigation is disabled")]
    HistoryUnavailable,
    #[error("platform history has no frame in that direction")]
    HistoryExhausted,
    #[error("flow is waiting for the tutorial to complete")]
    AwaitingTutorial,
    #[error("flow was already initialized")]
    AlreadyInitialized,
    #[error("flow controller has been shut down")]
    ShutDown,
    #[error("unknown step '{0}'")]
    UnknownStep(String),
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FlowError::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            FlowError::Validation(_) => ErrorCode::Validation,
            FlowError::ReentrantTransition => ErrorCode::ReentrantTransition,
            FlowError::HistoryUnavailable => ErrorCode::HistoryUnavailable,
            FlowError::HistoryExhausted => ErrorCode::HistoryExhausted,
            FlowError::AwaitingTutorial => ErrorCode::AwaitingTutorial,
            FlowError::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            FlowError::ShutDown => ErrorCode::ShutDown,
            FlowError::UnknownStep(_) => ErrorCode::UnknownStep,
        }
    }
}

/// Serializable form of a rejected action, handed to the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&FlowError> for ErrorReport {
    fn from(value: &FlowError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}

impl From<FlowError> for ErrorReport {
    fn from(value: FlowError) -> Self {
        Self::from(&value)
    }
}
