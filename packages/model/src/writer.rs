//! # Model Writer
//!
//! The only public way to change a document. A writer exists only inside a
//! change block (see [`crate::model::ChangeBlock`]), so every operation it
//! applies lands in the block's batch and the differ buffer.
//!
//! High-level helpers (`split`, `merge`, `detach_root`, ...) decompose into
//! the primitive operations of [`crate::operation`].

use crate::batch::Batch;
use crate::document::Document;
use crate::errors::{ModelError, ModelResult};
use crate::model::Model;
use crate::node::{Attributes, Fragment, Node, NodeId};
use crate::operation::{AppliedEffect, Operation};
use crate::position::Position;
use crate::range::Range;
use crate::selection::Selection;
use serde_json::Value;
use tracing::debug;

pub struct Writer<'a> {
    pub(crate) model: &'a mut Model,
}

impl<'a> Writer<'a> {
    pub fn document(&self) -> &Document {
        &self.model.document
    }

    /// Operations recorded in the current batch so far
    pub fn operation_count(&self) -> usize {
        self.model.batch.as_ref().map_or(0, Batch::len)
    }

    /// Apply a raw operation and record it in the current batch
    pub fn apply_operation(&mut self, operation: Operation) -> ModelResult<AppliedEffect> {
        debug_assert!(self.model.depth > 0, "writer used outside a change block");
        let (applied, effect) = self.model.document.apply_operation(operation)?;
        if let Some(batch) = self.model.batch.as_mut() {
            batch.push(applied);
        }
        Ok(effect)
    }

    /// Undo every operation recorded after the first `count` ones by applying
    /// their inverses in reverse order
    pub fn rollback_to(&mut self, count: usize) -> ModelResult<()> {
        let undone = match self.model.batch.as_mut() {
            Some(batch) => batch.truncate(count),
            None => return Ok(()),
        };
        debug!(operations = undone.len(), "rolling back change block");
        for operation in undone.iter().rev() {
            let mut inverse = operation.invert();
            inverse.base_version = None;
            self.model
                .document
                .apply_operation(inverse)
                .map_err(|error| ModelError::InvariantViolation(format!("rollback failed: {}", error)))?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------------

    /// Insert content and return the top-level nodes now covering it
    pub fn insert(&mut self, content: impl Into<Fragment>, position: Position) -> ModelResult<Vec<NodeId>> {
        match self.apply_operation(Operation::insert(position, content))? {
            AppliedEffect::Inserted { nodes, .. } => Ok(nodes),
            _ => Ok(Vec::new()),
        }
    }

    pub fn insert_text(&mut self, text: &str, attributes: Attributes, position: Position) -> ModelResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.insert(
            Node::Text {
                data: text.to_string(),
                attributes,
            },
            position,
        )?;
        Ok(())
    }

    pub fn insert_element(&mut self, name: &str, attributes: Attributes, position: Position) -> ModelResult<NodeId> {
        let element = Node::Element {
            name: name.to_string(),
            attributes,
            children: Vec::new(),
        };
        self.insert(element, position)?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvariantViolation("inserted element not found".into()))
    }

    /// Insert at the end of `parent`
    pub fn append(&mut self, content: impl Into<Fragment>, parent: NodeId) -> ModelResult<Vec<NodeId>> {
        let tree = self.document().tree();
        let position = tree.position_in(parent, tree.max_offset(parent));
        self.insert(content, position)
    }

    /// Remove a flat range (moves it to the graveyard)
    pub fn remove(&mut self, range: &Range) -> ModelResult<()> {
        if !range.is_flat() {
            return Err(ModelError::precondition("only flat ranges can be removed"));
        }
        if range.is_collapsed() {
            return Ok(());
        }
        self.apply_operation(Operation::remove(range.start.clone(), range.len()))?;
        Ok(())
    }

    pub fn remove_node(&mut self, node: NodeId) -> ModelResult<()> {
        let range = self.node_range(node)?;
        self.remove(&range)
    }

    /// Move a flat range to `target`. Returns the range at its new place.
    pub fn move_range(&mut self, range: &Range, target: Position) -> ModelResult<Range> {
        if !range.is_flat() {
            return Err(ModelError::precondition("only flat ranges can be moved"));
        }
        if range.is_collapsed() {
            return Ok(Range::collapsed(target));
        }
        match self.apply_operation(Operation::move_range(range.start.clone(), range.len(), target))? {
            AppliedEffect::Moved { range } => Ok(range),
            _ => Err(ModelError::InvariantViolation("move reported no range".into())),
        }
    }

    // ---------------------------------------------------------------------
    // Attributes and names
    // ---------------------------------------------------------------------

    /// Set `key` on every top-level item of `range`. Items already holding
    /// the value are skipped; one operation is emitted per uniform run.
    pub fn set_attribute(&mut self, key: &str, value: Option<Value>, range: &Range) -> ModelResult<()> {
        for flat in self.document().flat_ranges(range)? {
            let parent = self.document().tree().parent_at(&flat.start)?;
            let runs = self
                .document()
                .tree()
                .attribute_runs(parent, flat.start.offset(), flat.end.offset(), key);
            for (from, to, old_value) in runs {
                if old_value == value {
                    continue;
                }
                let run = Range::flat(flat.start.with_offset(from), to - from);
                self.apply_operation(Operation::attribute(run, key, old_value, value.clone()))?;
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, key: &str, range: &Range) -> ModelResult<()> {
        self.set_attribute(key, None, range)
    }

    /// Set an attribute on a single node
    pub fn set_node_attribute(&mut self, node: NodeId, key: &str, value: Option<Value>) -> ModelResult<()> {
        let range = self.node_range(node)?;
        self.set_attribute(key, value, &range)
    }

    pub fn rename(&mut self, element: NodeId, new_name: &str) -> ModelResult<()> {
        let tree = self.document().tree();
        if !tree.is_element(element) {
            return Err(ModelError::NotAnElement);
        }
        let old_name = tree.get(element).name().to_string();
        if old_name == new_name {
            return Ok(());
        }
        let position = tree
            .position_before(element)
            .ok_or_else(|| ModelError::precondition("roots cannot be renamed"))?;
        self.apply_operation(Operation::rename(position, old_name, new_name))?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    /// Split the element containing `position` in two. Returns the position
    /// between both halves.
    pub fn split(&mut self, position: &Position) -> ModelResult<Position> {
        let tree = self.document().tree();
        let element = tree.parent_at(position)?;
        if tree.is_root(element) {
            return Err(ModelError::precondition("roots cannot be split"));
        }
        let before = tree
            .position_before(element)
            .ok_or_else(|| ModelError::precondition("element is detached"))?;
        let copy = Node::Element {
            name: tree.get(element).name().to_string(),
            attributes: tree.get(element).attributes().clone(),
            children: Vec::new(),
        };
        let moved = tree.max_offset(element) - position.offset();
        let after = before.shifted(1);

        self.insert(copy, after.clone())?;
        if moved > 0 {
            self.apply_operation(Operation::move_range(position.clone(), moved, after.child(0)))?;
        }
        Ok(after)
    }

    /// Merge the elements on both sides of `position`: the content of the
    /// second moves to the end of the first, then the second is removed.
    pub fn merge(&mut self, position: &Position) -> ModelResult<()> {
        let tree = self.document().tree();
        let parent = tree.parent_at(position)?;
        let offset = position.offset();
        let before = offset.checked_sub(1).and_then(|index| tree.node_at_offset(parent, index));
        let after = tree.node_at_offset(parent, offset);
        let (first, second) = match (before, after) {
            (Some(first), Some(second)) if tree.is_element(first) && tree.is_element(second) => (first, second),
            _ => return Err(ModelError::precondition("merge needs an element on both sides")),
        };
        let first_len = tree.max_offset(first);
        let second_len = tree.max_offset(second);
        let target = position.with_offset(offset - 1).child(first_len);

        if second_len > 0 {
            self.apply_operation(Operation::move_range(position.child(0), second_len, target))?;
        }
        self.apply_operation(Operation::remove(position.clone(), 1))?;
        Ok(())
    }

    /// Range covering exactly `node`
    pub fn node_range(&self, node: NodeId) -> ModelResult<Range> {
        let tree = self.document().tree();
        let start = tree
            .position_before(node)
            .ok_or_else(|| ModelError::precondition("node has no parent"))?;
        Ok(Range::flat(start, tree.offset_size(node)))
    }

    // ---------------------------------------------------------------------
    // Markers
    // ---------------------------------------------------------------------

    pub fn add_marker(&mut self, name: &str, range: Range, affects_data: bool) -> ModelResult<()> {
        if self.document().markers().contains(name) {
            return Err(ModelError::precondition(format!("marker `{}` already exists", name)));
        }
        self.apply_operation(Operation::marker(name, None, Some(range), affects_data))?;
        Ok(())
    }

    pub fn update_marker(&mut self, name: &str, range: Range) -> ModelResult<()> {
        let marker = self
            .document()
            .markers()
            .get(name)
            .ok_or_else(|| ModelError::precondition(format!("marker `{}` does not exist", name)))?;
        if marker.range == range {
            return Ok(());
        }
        let operation = Operation::marker(name, Some(marker.range.clone()), Some(range), marker.affects_data);
        self.apply_operation(operation)?;
        Ok(())
    }

    pub fn remove_marker(&mut self, name: &str) -> ModelResult<()> {
        let marker = self
            .document()
            .markers()
            .get(name)
            .ok_or_else(|| ModelError::precondition(format!("marker `{}` does not exist", name)))?;
        let operation = Operation::marker(name, Some(marker.range.clone()), None, marker.affects_data);
        self.apply_operation(operation)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Roots
    // ---------------------------------------------------------------------

    pub fn add_root(&mut self, name: &str, element_name: &str) -> ModelResult<NodeId> {
        match self.apply_operation(Operation::root(name, element_name, true))? {
            AppliedEffect::RootChanged { root, .. } => Ok(root),
            _ => Err(ModelError::InvariantViolation("root operation reported no root".into())),
        }
    }

    /// Detach a root. Markers inside it are removed first; selection ranges
    /// inside it are dropped by the root operation.
    pub fn detach_root(&mut self, name: &str) -> ModelResult<()> {
        let root = self
            .document()
            .root(name)
            .ok_or_else(|| ModelError::RootNotFound(name.to_string()))?;
        let element_name = self.document().node(root).name().to_string();
        let markers: Vec<String> = self
            .document()
            .markers()
            .iter()
            .filter(|marker| marker.range.root() == root)
            .map(|marker| marker.name.clone())
            .collect();
        for marker in markers {
            self.remove_marker(&marker)?;
        }
        self.apply_operation(Operation::root(name, element_name, false))?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    pub fn set_selection(&mut self, selection: Selection) -> ModelResult<()> {
        self.model.document.set_selection(selection)?;
        self.model.selection_changed = true;
        Ok(())
    }

    pub fn set_selection_at(&mut self, position: Position) -> ModelResult<()> {
        self.set_selection(Selection::caret(position))
    }

    /// Move the focus end of the selection, keeping its anchor
    pub fn set_selection_focus(&mut self, focus: Position) -> ModelResult<()> {
        let anchor = self
            .document()
            .selection()
            .anchor()
            .cloned()
            .ok_or_else(|| ModelError::precondition("selection has no anchor"))?;
        let selection = match Range::new(anchor.clone(), focus.clone()) {
            Ok(range) => Selection::new(vec![range], false),
            Err(_) => Selection::new(vec![Range::new(focus, anchor)?], true),
        };
        self.set_selection(selection)
    }
}
