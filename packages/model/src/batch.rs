//! # Batches
//!
//! A batch groups the operations of one outermost change block. It is the
//! unit of undo: undoable batches are recorded by the undo stack, transparent
//! ones (undo/redo themselves, remote changes) are not.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchKind {
    /// Recorded by the undo stack
    Undoable,
    /// Never recorded (undo steps, replayed or remote changes)
    Transparent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub kind: BatchKind,
    operations: Vec<Operation>,
    /// Optional description shown by tooling
    pub description: Option<String>,
}

impl Batch {
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            operations: Vec::new(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_undoable(&self) -> bool {
        self.kind == BatchKind::Undoable
    }

    /// Whether any operation changes document data
    pub fn is_data_changing(&self) -> bool {
        self.operations.iter().any(Operation::affects_data)
    }

    /// Batches that only touched presentation state
    pub fn is_selection_only(&self) -> bool {
        !self.is_data_changing()
    }

    /// Version of the document before the first operation
    pub fn base_version(&self) -> Option<u64> {
        self.operations.first().and_then(|operation| operation.base_version)
    }

    /// Version of the document after the last operation
    pub fn end_version(&self) -> Option<u64> {
        self.operations
            .last()
            .and_then(|operation| operation.base_version)
            .map(|version| version + 1)
    }

    pub(crate) fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub(crate) fn truncate(&mut self, len: usize) -> Vec<Operation> {
        self.operations.split_off(len.min(self.operations.len()))
    }
}
