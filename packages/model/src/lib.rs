//! # Folio Model
//!
//! In-memory document model with tracked mutations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Model: change blocks + post-fixers          │
//! │  - Writer decomposes edits into operations  │
//! │  - Batches group one block's operations     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Document: tree, roots, markers, selection   │
//! │  - Operations validated, applied, versioned │
//! │  - Live ranges follow every operation       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Differ: minimal change set per block        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Operations are the only mutation**: every change is invertible and
//!    stamped with the version it was based on
//! 2. **Removal is a move**: removed content lives on in the graveyard root so
//!    undo can bring it back
//! 3. **Change sets are derived**: the differ reports the net effect of a
//!    block, never the individual steps
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_model::{Document, Model, Node};
//!
//! let mut model = Model::new(Document::with_roots(&["main"])?);
//! model.change(|writer| {
//!     let root = writer.document().root("main").unwrap();
//!     writer.append(Node::element("paragraph").with_child(Node::text("Hello")), root)?;
//!     Ok(())
//! })?;
//!
//! for change_set in model.take_change_sets() {
//!     println!("{} changes", change_set.changes.len());
//! }
//! ```

pub mod batch;
pub mod differ;
pub mod document;
pub mod errors;
pub mod markers;
pub mod model;
pub mod node;
pub mod operation;
pub mod position;
pub mod range;
pub mod selection;
pub mod tree;
pub mod writer;

pub use batch::{Batch, BatchKind};
pub use differ::{Change, ChangeSet, Differ, DifferState, MarkerRange, RootChange};
pub use document::{Document, DocumentEvent, DEFAULT_ROOT_ELEMENT};
pub use errors::{ModelError, ModelResult};
pub use markers::{marker_group, Marker, MarkerCollection};
pub use model::{ChangeBlock, FnPostFixer, Model, ModelPostFixer, PostFixerId, DEFAULT_MAX_POST_FIXER_PASSES};
pub use node::{Attributes, Fragment, Node, NodeId, GRAVEYARD, GRAVEYARD_NAME, TEXT_NAME};
pub use operation::{transform, transform_sets, AppliedEffect, Operation, OperationKind};
pub use position::{Position, PositionRelation};
pub use range::Range;
pub use selection::Selection;
pub use tree::{NodeRef, Tree};
pub use writer::Writer;
