//! # Mapper
//!
//! Bidirectional association between model elements and render elements,
//! plus the render elements drawn for each marker.
//!
//! ## Positions
//!
//! Model offsets count one unit per element and per character. Walking a
//! render parent, text counts its characters, attribute wrappers count the
//! size of their content (they are transparent), UI elements count zero and
//! every other element counts one. Only the parent element is looked up by
//! identity, so positions can be mapped while the render tree still holds
//! content the model already dropped, as long as the offset is expressed in
//! the render tree's current state.

use crate::errors::{ConversionError, ConversionResult};
use folio_model::{Document, NodeId, Position, Range};
use folio_view::{ViewKind, ViewNodeId, ViewPosition, ViewRange, ViewTree};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default)]
pub struct Mapper {
    model_to_view: HashMap<NodeId, ViewNodeId>,
    view_to_model: HashMap<ViewNodeId, NodeId>,
    markers: HashMap<String, Vec<ViewNodeId>>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a model element with a render element. A later binding of
    /// the same model element replaces the earlier one.
    pub fn bind(&mut self, model: NodeId, view: ViewNodeId) {
        trace!(model = %model, view = %view, "bind");
        self.model_to_view.insert(model, view);
        self.view_to_model.insert(view, model);
    }

    pub fn to_view(&self, model: NodeId) -> Option<ViewNodeId> {
        self.model_to_view.get(&model).copied()
    }

    pub fn to_model(&self, view: ViewNodeId) -> Option<NodeId> {
        self.view_to_model.get(&view).copied()
    }

    /// Forget every binding of a render subtree. A model element already
    /// re-bound to another render element keeps that binding.
    pub fn unbind_view_subtree(&mut self, tree: &ViewTree, view: ViewNodeId) {
        for node in tree.descendants(view) {
            if let Some(model) = self.view_to_model.remove(&node) {
                if self.model_to_view.get(&model) == Some(&node) {
                    self.model_to_view.remove(&model);
                }
            }
        }
    }

    pub fn bind_marker(&mut self, name: &str, elements: Vec<ViewNodeId>) {
        self.markers.insert(name.to_string(), elements);
    }

    pub fn marker_elements(&self, name: &str) -> &[ViewNodeId] {
        self.markers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn unbind_marker(&mut self, name: &str) -> Vec<ViewNodeId> {
        self.markers.remove(name).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.model_to_view.clear();
        self.view_to_model.clear();
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.model_to_view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model_to_view.is_empty()
    }

    /// Offset units a render node stands for in the model
    pub fn model_size(tree: &ViewTree, view: ViewNodeId) -> usize {
        match tree.kind(view) {
            ViewKind::Text => tree.max_offset(view),
            ViewKind::Attribute => tree.children(view).iter().map(|child| Self::model_size(tree, *child)).sum(),
            ViewKind::Ui => 0,
            ViewKind::Root | ViewKind::Container | ViewKind::Empty => 1,
        }
    }

    fn model_size_before(tree: &ViewTree, parent: ViewNodeId, index: usize) -> usize {
        tree.children(parent)[..index]
            .iter()
            .map(|child| Self::model_size(tree, *child))
            .sum()
    }

    /// Render position `offset` model units into `parent`. Positions at the
    /// edge of an attribute wrapper land outside of it.
    pub fn find_view_position(tree: &ViewTree, parent: ViewNodeId, offset: usize) -> ViewPosition {
        let mut remaining = offset;
        for (index, child) in tree.children(parent).iter().enumerate() {
            if remaining == 0 {
                return ViewPosition::new(parent, index);
            }
            let size = Self::model_size(tree, *child);
            if remaining < size {
                return match tree.kind(*child) {
                    ViewKind::Text => ViewPosition::new(*child, remaining),
                    _ => Self::find_view_position(tree, *child, remaining),
                };
            }
            remaining -= size;
        }
        ViewPosition::new(parent, tree.children(parent).len())
    }

    pub fn to_view_position(
        &self,
        document: &Document,
        tree: &ViewTree,
        position: &Position,
    ) -> ConversionResult<ViewPosition> {
        let parent = document.tree().parent_at(position)?;
        let view_parent = self.to_view(parent).ok_or(ConversionError::Unmapped(parent))?;
        Ok(Self::find_view_position(tree, view_parent, position.offset()))
    }

    /// Render range of `how_many` model units starting at `start`
    pub fn to_view_range(
        &self,
        document: &Document,
        tree: &ViewTree,
        start: &Position,
        how_many: usize,
    ) -> ConversionResult<ViewRange> {
        let parent = document.tree().parent_at(start)?;
        let view_parent = self.to_view(parent).ok_or(ConversionError::Unmapped(parent))?;
        let from = Self::find_view_position(tree, view_parent, start.offset());
        let to = Self::find_view_position(tree, view_parent, start.offset() + how_many);
        Ok(ViewRange::new(from, to))
    }

    pub fn to_view_model_range(&self, document: &Document, tree: &ViewTree, range: &Range) -> ConversionResult<ViewRange> {
        Ok(ViewRange::new(
            self.to_view_position(document, tree, &range.start)?,
            self.to_view_position(document, tree, &range.end)?,
        ))
    }

    /// Nearest mapped ancestor of `view` and the model offset of `view`
    /// inside it
    fn mapped_offset_of(&self, tree: &ViewTree, view: ViewNodeId) -> ConversionResult<(NodeId, usize)> {
        let mut offset = 0;
        let mut current = view;
        loop {
            let parent = tree
                .parent(current)
                .ok_or_else(|| ConversionError::UnmappedPosition(format!("{} is detached", view)))?;
            let index = tree.index_in_parent(current).unwrap_or(0);
            offset += Self::model_size_before(tree, parent, index);
            if let Some(model) = self.to_model(parent) {
                return Ok((model, offset));
            }
            current = parent;
        }
    }

    pub fn to_model_position(
        &self,
        document: &Document,
        tree: &ViewTree,
        position: ViewPosition,
    ) -> ConversionResult<Position> {
        if !tree.contains(position.parent) {
            return Err(ConversionError::UnmappedPosition(position.parent.to_string()));
        }
        let (parent, offset) = match (tree.kind(position.parent), self.to_model(position.parent)) {
            (ViewKind::Text, _) => {
                let (parent, before) = self.mapped_offset_of(tree, position.parent)?;
                (parent, before + position.offset)
            }
            (_, Some(model)) => (model, Self::model_size_before(tree, position.parent, position.offset)),
            (_, None) => {
                let (parent, before) = self.mapped_offset_of(tree, position.parent)?;
                (parent, before + Self::model_size_before(tree, position.parent, position.offset))
            }
        };
        if !document.tree().contains(parent) {
            return Err(ConversionError::UnmappedPosition(format!("model node {} is gone", parent)));
        }
        Ok(document.tree().position_in(parent, offset))
    }
}
