//! Error types for the document model

use folio_common::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Root not found: {0}")]
    RootNotFound(String),

    #[error("Operation precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Would create cycle")]
    CycleDetected,

    #[error("Node is not an element")]
    NotAnElement,

    #[error("Operation based on version {found:?}, document is at {expected}")]
    StaleVersion { expected: u64, found: Option<u64> },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Post-fixers still reporting changes after {passes} passes")]
    PostFixerLoop { passes: usize },
}

impl ModelError {
    pub(crate) fn invalid_position(message: impl Into<String>) -> Self {
        ModelError::InvalidPosition(message.into())
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        ModelError::PreconditionFailed(message.into())
    }
}

impl Classify for ModelError {
    fn class(&self) -> ErrorClass {
        match self {
            ModelError::InvalidPosition(_)
            | ModelError::RootNotFound(_)
            | ModelError::PreconditionFailed(_)
            | ModelError::CycleDetected
            | ModelError::NotAnElement
            | ModelError::StaleVersion { .. } => ErrorClass::IncorrectOperation,
            ModelError::InvariantViolation(_) | ModelError::PostFixerLoop { .. } => {
                ErrorClass::InvariantViolation
            }
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
