//! Error types for conversion and the editor

use folio_common::{Classify, ErrorClass};
use folio_model::{ModelError, NodeId};
use folio_view::ViewError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("No converter registered for {0}")]
    NoConverter(String),

    #[error("No converter claimed {0}")]
    Unclaimed(String),

    #[error("Model node {0} has no render counterpart")]
    Unmapped(NodeId),

    #[error("Render position has no model counterpart: {0}")]
    UnmappedPosition(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Render error: {0}")]
    View(#[from] ViewError),
}

impl Classify for ConversionError {
    fn class(&self) -> ErrorClass {
        match self {
            ConversionError::NoConverter(_) | ConversionError::Unclaimed(_) | ConversionError::Unmapped(_) => {
                ErrorClass::Configuration
            }
            ConversionError::UnmappedPosition(_) => ErrorClass::IncorrectOperation,
            ConversionError::Model(error) => error.class(),
            ConversionError::View(error) => error.class(),
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Render error: {0}")]
    View(#[from] ViewError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Editor is read-only")]
    ReadOnly,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Classify for EditorError {
    fn class(&self) -> ErrorClass {
        match self {
            EditorError::Model(error) => error.class(),
            EditorError::View(error) => error.class(),
            EditorError::Conversion(error) => error.class(),
            EditorError::ReadOnly => ErrorClass::IncorrectOperation,
            EditorError::Config(_) | EditorError::Io(_) | EditorError::Json(_) => ErrorClass::Configuration,
        }
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
