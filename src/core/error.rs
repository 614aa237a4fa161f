// src/core/error.rs
//! Library error types. Everything that reaches the host is converted into a
//! [`Diagnostic`] first.

use serde::Serialize;
use thiserror::Error;

use crate::core::diagnostics::{Diagnostic, ErrorKind, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuntimeErrorKind {
    UndefinedVariable,
    DivisionByZero,
    TypeMismatch,
    LoopBoundExceeded,
    NotCallable,
    ArityMismatch,
    CallDepthExceeded,
    IndexOutOfBounds,
    UndefinedMember,
    InvalidOperation,
    Timeout,
    Aborted,
    Input,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub location: Location,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self { kind, message: message.into(), location }
    }

    pub fn undefined_variable(name: &str, location: Location) -> Self {
        Self::new(RuntimeErrorKind::UndefinedVariable, format!("Undefined variable '{}'", name), location)
    }

    pub fn type_mismatch(message: impl Into<String>, location: Location) -> Self {
        Self::new(RuntimeErrorKind::TypeMismatch, message, location)
    }

    pub fn division_by_zero(location: Location) -> Self {
        Self::new(RuntimeErrorKind::DivisionByZero, "Division by zero", location)
    }

    pub fn timeout(budget_ms: u64, location: Location) -> Self {
        Self::new(RuntimeErrorKind::Timeout, format!("Execution exceeded time budget of {}ms", budget_ms), location)
    }

    pub fn aborted(location: Location) -> Self {
        Self::new(RuntimeErrorKind::Aborted, "Execution aborted", location)
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let kind = match self.kind {
            RuntimeErrorKind::Timeout => ErrorKind::Timeout,
            RuntimeErrorKind::Input => ErrorKind::Input,
            _ => ErrorKind::Runtime,
        };
        Diagnostic::error(kind, self.message.clone(), self.location)
    }
}

impl From<InputError> for RuntimeError {
    fn from(e: InputError) -> Self {
        RuntimeError::new(RuntimeErrorKind::Input, e.to_string(), Location::default())
    }
}

/// Misuse of the debugger/engine API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active debug session")]
    NoActiveSession,
    #[error("a debug session is already active")]
    SessionActive,
    #[error("an execution is already running")]
    AlreadyRunning,
    #[error("execution is not running")]
    NotRunning,
    #[error("execution is not paused")]
    NotPaused,
    #[error("no breakpoint on line {0}")]
    NoBreakpoint(usize),
    #[error("invalid expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },
}

impl SessionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(ErrorKind::Session, self.to_string(), Location::default())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("input rejected: {0}")]
    Rejected(String),
    #[error("input request timed out after {0}ms")]
    TimedOut(u64),
    #[error("input request cancelled")]
    Cancelled,
    #[error("no pending input request")]
    NoPendingRequest,
}

impl InputError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(ErrorKind::Input, self.to_string(), Location::default())
    }
}
