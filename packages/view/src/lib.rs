//! # Folio View
//!
//! Render tree for Folio documents: a presentation-shaped mirror of the
//! model that converters build and a renderer displays.
//!
//! ## Architecture
//!
//! ```text
//! converters ──► ViewWriter ──► ViewTree ──► post-fixers
//!                                  │
//!                                  ▼
//!                             Reconciler ──► Patch[] ──► Renderer
//! ```
//!
//! ## Node kinds
//!
//! - **Container**: structural, never split
//! - **Attribute**: formatting wrapper, split by `break_attributes` and
//!   joined by `merge_attributes`
//! - **Empty**: leaf element
//! - **Ui**: presentation-only, ignored by position mapping and data output
//! - **Text**
//!
//! ## Usage
//!
//! ```rust
//! use folio_view::{RecordingRenderer, View, ViewPosition};
//!
//! let mut view = View::new();
//! view.change(|writer| {
//!     let root = writer.create_root("main", "div")?;
//!     let paragraph = writer.create_container("p", &[]);
//!     writer.insert(ViewPosition::new(root, 0), paragraph)?;
//!     let text = writer.create_text("Hello");
//!     writer.insert(ViewPosition::new(paragraph, 0), text)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let mut renderer = RecordingRenderer::new();
//! view.render(&mut renderer).unwrap();
//! assert_eq!(renderer.to_html(), "<div><p>Hello</p></div>");
//! ```

pub mod errors;
pub mod node;
pub mod position;
pub mod post_fixers;
pub mod reconciler;
pub mod renderer;
pub mod stringify;
pub mod tree;
pub mod view;
pub mod writer;

pub use errors::{ViewError, ViewResult};
pub use node::{RenderNode, ViewKind, ViewNodeId, DEFAULT_PRIORITY};
pub use position::{ViewPosition, ViewRange, ViewSelection};
pub use post_fixers::{
    BlockFiller, FnViewPostFixer, PostFixerRegistry, ViewPostFixer, ViewPostFixerId, DEFAULT_MAX_PASSES,
    FILLER_ATTRIBUTE,
};
pub use reconciler::{Patch, Reconciler};
pub use renderer::{RecordingRenderer, RenderReport, Renderer};
pub use stringify::{escape_html, stringify, stringify_node, stringify_with, StringifyOptions};
pub use tree::{ViewNodeRef, ViewTree};
pub use view::{View, ViewEvent};
pub use writer::ViewWriter;
