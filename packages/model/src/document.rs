//! # Document
//!
//! Owns the node arena, the named roots, markers, the selection, the version
//! counter, the applied-operation history and the differ buffer. All
//! mutation goes through [`Document::apply_operation`] (see
//! `operation/apply.rs`), reachable from the writer.

use crate::differ::{ChangeSet, Differ, DifferState};
use crate::errors::{ModelError, ModelResult};
use crate::markers::MarkerCollection;
use crate::node::{Node, NodeId, GRAVEYARD, GRAVEYARD_NAME};
use crate::operation::Operation;
use crate::position::Position;
use crate::range::Range;
use crate::selection::Selection;
use crate::tree::{NodeRef, Tree};
use folio_common::{Emitter, ListenerId};
use std::collections::BTreeMap;

/// Name of the element backing roots created without an explicit one
pub const DEFAULT_ROOT_ELEMENT: &str = "$root";

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    OperationApplied(Operation),
    SelectionChanged(Selection),
    /// Fired once per outermost change block, after the differ flushed
    Changed(ChangeSet),
}

#[derive(Debug)]
pub struct Document {
    pub(crate) tree: Tree,
    pub(crate) roots: BTreeMap<String, NodeId>,
    pub(crate) markers: MarkerCollection,
    pub(crate) selection: Selection,
    pub(crate) version: u64,
    pub(crate) history: Vec<Operation>,
    pub(crate) differ: Differ,
    pub(crate) events: Emitter<DocumentEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut tree = Tree::new();
        let graveyard = tree.alloc_root(GRAVEYARD_NAME, DEFAULT_ROOT_ELEMENT, false);
        debug_assert_eq!(graveyard, GRAVEYARD);
        Self {
            tree,
            roots: BTreeMap::new(),
            markers: MarkerCollection::default(),
            selection: Selection::default(),
            version: 0,
            history: Vec::new(),
            differ: Differ::new(),
            events: Emitter::new(),
        }
    }

    /// Document with empty attached roots, created before any editing
    pub fn with_roots<S: AsRef<str>>(names: &[S]) -> ModelResult<Self> {
        let mut document = Self::new();
        for name in names {
            document.create_root(name.as_ref(), DEFAULT_ROOT_ELEMENT)?;
        }
        Ok(document)
    }

    /// Create an attached root outside of any change block. Later roots are
    /// added through root operations so they are reported and undoable.
    pub fn create_root(&mut self, name: &str, element_name: &str) -> ModelResult<NodeId> {
        if name == GRAVEYARD_NAME || self.roots.contains_key(name) {
            return Err(ModelError::precondition(format!("root `{}` already exists", name)));
        }
        let id = self.tree.alloc_root(name, element_name, true);
        self.roots.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Attached root by name
    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots
            .get(name)
            .copied()
            .filter(|id| self.tree.is_attached(*id))
    }

    /// Root by name, attached or not
    pub fn any_root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).copied()
    }

    pub fn root_names(&self) -> Vec<&str> {
        self.roots
            .iter()
            .filter(|(_, id)| self.tree.is_attached(**id))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn graveyard(&self) -> NodeId {
        GRAVEYARD
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        self.tree.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.tree.children(id)
    }

    pub fn to_node(&self, id: NodeId) -> Node {
        self.tree.to_value(id)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.tree.text_content(id)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.tree.is_attached(id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Every applied operation, in order. `history()[v]` has base version `v`.
    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    pub fn markers(&self) -> &MarkerCollection {
        &self.markers
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn differ_state(&self) -> DifferState {
        self.differ.state()
    }

    pub fn has_buffered_changes(&self) -> bool {
        !self.differ.is_empty()
    }

    pub fn on(&mut self, listener: impl FnMut(&DocumentEvent) + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Position inside a root by name
    pub fn position(&self, root: &str, path: Vec<usize>) -> ModelResult<Position> {
        let id = self
            .root(root)
            .ok_or_else(|| ModelError::RootNotFound(root.to_string()))?;
        let position = Position::new(id, path);
        self.tree.parent_at(&position)?;
        Ok(position)
    }

    /// Split a range into the fewest flat ranges covering the same content
    pub fn flat_ranges(&self, range: &Range) -> ModelResult<Vec<Range>> {
        if range.is_flat() {
            return Ok(if range.is_collapsed() { Vec::new() } else { vec![range.clone()] });
        }
        let (start, end) = (&range.start, &range.end);
        let common = start
            .parent_path()
            .iter()
            .zip(end.parent_path())
            .take_while(|(a, b)| a == b)
            .count();

        let mut ranges = Vec::new();
        let mut position = start.clone();
        while position.path.len() > common + 1 {
            let parent = self.tree.parent_at(&position)?;
            let size = self.tree.max_offset(parent);
            if position.offset() < size {
                ranges.push(Range::flat(position.clone(), size - position.offset()));
            }
            position.path.pop();
            if let Some(last) = position.path.last_mut() {
                *last += 1;
            }
        }

        let end_at_level = Position::new(end.root, end.path[..=common].to_vec());
        if end_at_level.offset() > position.offset() {
            ranges.push(Range::flat(position.clone(), end_at_level.offset() - position.offset()));
        }

        for depth in common + 1..end.path.len() {
            let inner_end = Position::new(end.root, end.path[..=depth].to_vec());
            if inner_end.offset() > 0 {
                ranges.push(Range::flat(inner_end.with_offset(0), inner_end.offset()));
            }
        }
        Ok(ranges)
    }

    /// Parent element of a position that operations may write to
    pub(crate) fn writable_parent(&self, position: &Position) -> ModelResult<NodeId> {
        let root = position.root;
        if !self.tree.contains(root) || !self.tree.is_root(root) {
            return Err(ModelError::invalid_position(format!("{} is not a root", root)));
        }
        if root != GRAVEYARD && !self.tree.is_attached(root) {
            return Err(ModelError::precondition(format!("root {} is detached", root)));
        }
        self.tree.parent_at(position)
    }

    /// Check that a range lies inside an attached root
    pub(crate) fn validate_live_range(&self, range: &Range) -> ModelResult<()> {
        if range.root() == GRAVEYARD || !self.tree.is_attached(range.root()) {
            return Err(ModelError::precondition("range must be inside an attached root"));
        }
        self.tree.parent_at(&range.start)?;
        self.tree.parent_at(&range.end)?;
        Ok(())
    }

    pub(crate) fn set_selection(&mut self, selection: Selection) -> ModelResult<()> {
        for range in selection.ranges() {
            self.validate_live_range(range)?;
        }
        if self.selection != selection {
            self.selection = selection;
            let event = DocumentEvent::SelectionChanged(self.selection.clone());
            self.events.fire(&event);
        }
        Ok(())
    }

    /// Flush the differ into a change set
    pub(crate) fn flush_changes(&mut self) -> ChangeSet {
        let change_set = self.differ.flush(&self.tree, &self.markers, self.version);
        if !change_set.is_empty() {
            self.events.fire(&DocumentEvent::Changed(change_set.clone()));
        }
        change_set
    }

    /// Drop buffered changes without reporting them
    pub(crate) fn discard_changes(&mut self) {
        self.differ.reset();
    }
}
