//! Error types for the render tree

use crate::node::ViewNodeId;
use folio_common::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("Render node not found: {0}")]
    NodeNotFound(ViewNodeId),

    #[error("Invalid render position: {0}")]
    InvalidPosition(String),

    #[error("Render node {0} cannot hold children")]
    NotAContainer(ViewNodeId),

    #[error("Render root not found: {0}")]
    RootNotFound(String),

    #[error("Render post-fixers still reporting changes after {passes} passes")]
    PostFixerLoop { passes: usize },

    #[error("Renderer failed: {0}")]
    Renderer(String),
}

impl ViewError {
    pub(crate) fn invalid_position(message: impl Into<String>) -> Self {
        ViewError::InvalidPosition(message.into())
    }
}

impl Classify for ViewError {
    fn class(&self) -> ErrorClass {
        match self {
            ViewError::NodeNotFound(_)
            | ViewError::InvalidPosition(_)
            | ViewError::NotAContainer(_)
            | ViewError::RootNotFound(_) => ErrorClass::IncorrectOperation,
            ViewError::PostFixerLoop { .. } | ViewError::Renderer(_) => ErrorClass::InvariantViolation,
        }
    }
}

pub type ViewResult<T> = Result<T, ViewError>;
