//! Core error type for the Flowline engine.
//!
//! Every component returns `EngineError`, a single structured error carrying
//! an `ErrorKind`, a message and an optional cause. Transport-specific shapes
//! (the `StepScheduleException` wire enum, CLI exit messages) are derived
//! from the kind at the boundary only.

use std::fmt;

use crate::models::messages::StepScheduleException;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An execution with the same id already exists.
    DuplicateExecution,
    /// The stored execution is inconsistent with the operation being applied.
    MissingExecutionData,
    /// The task is unknown to the task service.
    TaskNotFound,
    /// A step argument is not declared by the task.
    TaskParamNotExists,
    /// A required task parameter has no argument.
    TaskParamMissing,
    /// Handing the step to its task agent failed.
    TaskDispatchError,
    /// The execution store could not be reached or rejected the operation.
    StorageUnavailable,
    /// A step output could not be read or written.
    OutputRead,
    /// A direct lookup found nothing.
    NotFound,
    /// A message transport failed.
    Transport,
    /// An inbound payload could not be decoded or is semantically invalid.
    InvalidMessage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateExecution => "DUPLICATE_EXECUTION",
            Self::MissingExecutionData => "MISSING_EXECUTION_DATA",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::TaskParamNotExists => "TASK_PARAM_NOT_EXISTS",
            Self::TaskParamMissing => "TASK_PARAM_MISSING",
            Self::TaskDispatchError => "TASK_DISPATCH_ERROR",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::OutputRead => "OUTPUT_READ",
            Self::NotFound => "NOT_FOUND",
            Self::Transport => "TRANSPORT",
            Self::InvalidMessage => "INVALID_MESSAGE",
        }
    }

    /// Wire representation for the scheduler failure family.
    pub fn schedule_exception(&self) -> Option<StepScheduleException> {
        match self {
            Self::TaskNotFound => Some(StepScheduleException::TaskNotExists),
            Self::TaskParamNotExists => Some(StepScheduleException::TaskParamNotExists),
            Self::TaskParamMissing => Some(StepScheduleException::TaskParamMissing),
            Self::TaskDispatchError => Some(StepScheduleException::TaskError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Cause>,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn missing_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingExecutionData, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageUnavailable, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidMessage, message)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

// ---------------------------------------------------------------------------
// Conversions from library errors
// ---------------------------------------------------------------------------

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::with_cause(ErrorKind::StorageUnavailable, "Database error", e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::with_cause(ErrorKind::OutputRead, "Output store I/O error", e)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_cause(ErrorKind::InvalidMessage, "Malformed JSON", e)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        Self::with_cause(ErrorKind::Transport, "HTTP request failed", e)
    }
}
