//! # Operations
//!
//! Atomic, invertible changes to the document. Everything that mutates the
//! model (the writer, undo, collaboration) ends up as a sequence of these.
//!
//! ## Kinds
//!
//! - **Insert**: put a fragment at a position
//! - **Move**: relocate a flat range; removal is a move into the graveyard
//! - **Attribute**: change one key on every item of a flat range
//! - **Rename**: change an element's name
//! - **Marker**: create, update or remove a named live range
//! - **Root**: attach or detach a named root
//! - **NoOp**: placeholder left behind by transformation
//!
//! ## Versioning
//!
//! `base_version` is the document version an operation was created against.
//! Applying an operation whose `base_version` is set but stale fails, so
//! rebased operations must be transformed first (see [`transform`]).

mod apply;
pub mod transform;

pub use apply::AppliedEffect;
pub use transform::{transform, transform_sets};

use crate::node::{Fragment, GRAVEYARD};
use crate::position::Position;
use crate::range::Range;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    #[serde(flatten)]
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    #[serde(rename_all = "camelCase")]
    Insert { position: Position, nodes: Fragment },

    #[serde(rename_all = "camelCase")]
    Move {
        source: Position,
        how_many: usize,
        target: Position,
    },

    #[serde(rename_all = "camelCase")]
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },

    #[serde(rename_all = "camelCase")]
    Rename {
        position: Position,
        old_name: String,
        new_name: String,
    },

    #[serde(rename_all = "camelCase")]
    Marker {
        name: String,
        old_range: Option<Range>,
        new_range: Option<Range>,
        affects_data: bool,
    },

    #[serde(rename_all = "camelCase")]
    Root {
        name: String,
        element_name: String,
        attach: bool,
    },

    NoOp,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            base_version: None,
            kind,
        }
    }

    pub fn insert(position: Position, nodes: impl Into<Fragment>) -> Self {
        Self::new(OperationKind::Insert {
            position,
            nodes: nodes.into(),
        })
    }

    pub fn move_range(source: Position, how_many: usize, target: Position) -> Self {
        Self::new(OperationKind::Move {
            source,
            how_many,
            target,
        })
    }

    /// Move into the graveyard
    pub fn remove(source: Position, how_many: usize) -> Self {
        Self::move_range(source, how_many, Position::new(GRAVEYARD, vec![0]))
    }

    pub fn attribute(range: Range, key: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self::new(OperationKind::Attribute {
            range,
            key: key.into(),
            old_value,
            new_value,
        })
    }

    pub fn rename(position: Position, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::new(OperationKind::Rename {
            position,
            old_name: old_name.into(),
            new_name: new_name.into(),
        })
    }

    pub fn marker(name: impl Into<String>, old_range: Option<Range>, new_range: Option<Range>, affects_data: bool) -> Self {
        Self::new(OperationKind::Marker {
            name: name.into(),
            old_range,
            new_range,
            affects_data,
        })
    }

    pub fn root(name: impl Into<String>, element_name: impl Into<String>, attach: bool) -> Self {
        Self::new(OperationKind::Root {
            name: name.into(),
            element_name: element_name.into(),
            attach,
        })
    }

    pub fn no_op() -> Self {
        Self::new(OperationKind::NoOp)
    }

    pub fn with_base_version(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    /// Short kind name used in logs
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Move { target, .. } if target.root == GRAVEYARD => "remove",
            OperationKind::Move { source, .. } if source.root == GRAVEYARD => "reinsert",
            OperationKind::Move { .. } => "move",
            OperationKind::Attribute { .. } => "attribute",
            OperationKind::Rename { .. } => "rename",
            OperationKind::Marker { .. } => "marker",
            OperationKind::Root { .. } => "root",
            OperationKind::NoOp => "noop",
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// Whether the operation changes document data (as opposed to
    /// presentation-only markers and no-ops)
    pub fn affects_data(&self) -> bool {
        match &self.kind {
            OperationKind::Marker { affects_data, .. } => *affects_data,
            OperationKind::NoOp => false,
            _ => true,
        }
    }

    /// The operation that undoes this one. Computed from operation data
    /// alone; the inverse is based on the version after this operation.
    pub fn invert(&self) -> Operation {
        let kind = match &self.kind {
            OperationKind::Insert { position, nodes } => OperationKind::Move {
                source: position.clone(),
                how_many: nodes.offset_size(),
                target: Position::new(GRAVEYARD, vec![0]),
            },
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let moved_start = Position::moved_range_start(source, target, *how_many);
                OperationKind::Move {
                    source: moved_start.clone(),
                    how_many: *how_many,
                    target: source.transformed_by_insertion(&moved_start, *how_many, false),
                }
            }
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => OperationKind::Attribute {
                range: range.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => OperationKind::Rename {
                position: position.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
            OperationKind::Marker {
                name,
                old_range,
                new_range,
                affects_data,
            } => OperationKind::Marker {
                name: name.clone(),
                old_range: new_range.clone(),
                new_range: old_range.clone(),
                affects_data: *affects_data,
            },
            OperationKind::Root {
                name,
                element_name,
                attach,
            } => OperationKind::Root {
                name: name.clone(),
                element_name: element_name.clone(),
                attach: !attach,
            },
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Operation {
            base_version: self.base_version.map(|version| version + 1),
            kind,
        }
    }
}
