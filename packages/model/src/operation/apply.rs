//! Validation and application of operations against a document.
//!
//! Each kind is validated completely before anything is touched, so a
//! failing operation leaves the document as it was. After a successful apply
//! the differ has seen the change, live ranges (markers, selection) have
//! been transformed and the version has advanced by one.

use super::{Operation, OperationKind};
use crate::differ::ChildChange;
use crate::document::{Document, DocumentEvent};
use crate::errors::{ModelError, ModelResult};
use crate::node::{Fragment, NodeId, GRAVEYARD, GRAVEYARD_NAME};
use crate::position::Position;
use crate::range::Range;
use serde_json::Value;
use tracing::{instrument, trace};

/// What an applied operation did, in post-operation coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedEffect {
    Inserted { range: Range, nodes: Vec<NodeId> },
    Moved { range: Range },
    AttributeChanged { range: Range },
    Renamed { element: NodeId },
    MarkerChanged { name: String },
    RootChanged { root: NodeId, attached: bool },
    Nothing,
}

impl Document {
    /// Apply one operation. Returns the operation stamped with its base
    /// version together with its effect.
    #[instrument(level = "trace", skip(self, operation), fields(kind = operation.kind_name(), version = self.version))]
    pub(crate) fn apply_operation(&mut self, mut operation: Operation) -> ModelResult<(Operation, AppliedEffect)> {
        if let Some(base) = operation.base_version {
            if base != self.version {
                return Err(ModelError::StaleVersion {
                    expected: self.version,
                    found: Some(base),
                });
            }
        }
        operation.base_version = Some(self.version);

        let effect = match &operation.kind {
            OperationKind::Insert { position, nodes } => self.apply_insert(position, nodes)?,
            OperationKind::Move {
                source,
                how_many,
                target,
            } => self.apply_move(source, *how_many, target)?,
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => self.apply_attribute(range, key, old_value, new_value)?,
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => self.apply_rename(position, old_name, new_name)?,
            OperationKind::Marker {
                name,
                old_range,
                new_range,
                affects_data,
            } => self.apply_marker(name, old_range, new_range, *affects_data)?,
            OperationKind::Root {
                name,
                element_name,
                attach,
            } => self.apply_root(name, element_name, *attach)?,
            OperationKind::NoOp => AppliedEffect::Nothing,
        };

        self.transform_live_ranges(&operation.kind);
        self.version += 1;
        self.history.push(operation.clone());
        trace!(version = self.version, "operation applied");
        self.events.fire(&DocumentEvent::OperationApplied(operation.clone()));
        Ok((operation, effect))
    }

    fn is_graveyard_node(&self, id: NodeId) -> bool {
        self.tree.root_of(id) == GRAVEYARD
    }

    fn apply_insert(&mut self, position: &Position, nodes: &Fragment) -> ModelResult<AppliedEffect> {
        let parent = self.writable_parent(position)?;
        let how_many = nodes.offset_size();
        if how_many == 0 {
            return Err(ModelError::precondition("nothing to insert"));
        }
        let offset = position.offset();

        if !self.is_graveyard_node(parent) {
            let len = self.tree.max_offset(parent);
            self.differ
                .buffer_children(parent, len, ChildChange::Insert { offset, how_many });
        }

        let index = self.tree.split_at(parent, offset);
        let ids: Vec<NodeId> = nodes
            .nodes
            .iter()
            .filter(|node| node.offset_size() > 0)
            .map(|node| self.tree.alloc_value(node))
            .collect();
        let count = ids.len();
        self.tree.insert_children(parent, index, ids);
        self.tree.normalize_between(parent, index, index + count);

        Ok(AppliedEffect::Inserted {
            range: Range::flat(position.clone(), how_many),
            nodes: self.nodes_in(parent, offset, offset + how_many),
        })
    }

    fn apply_move(&mut self, source: &Position, how_many: usize, target: &Position) -> ModelResult<AppliedEffect> {
        if how_many == 0 {
            return Err(ModelError::precondition("nothing to move"));
        }
        let source_parent = self.writable_parent(source)?;
        let start = source.offset();
        if start + how_many > self.tree.max_offset(source_parent) {
            return Err(ModelError::invalid_position("moved range past end of parent"));
        }
        let target_parent = self.writable_parent(target)?;
        let target_offset = target.offset();
        if target_parent == source_parent && target_offset > start && target_offset < start + how_many {
            return Err(ModelError::precondition("target inside moved range"));
        }
        let mut current = Some(target_parent);
        while let Some(node) = current {
            if self.tree.parent(node) == Some(source_parent) {
                if let Some(offset) = self.tree.start_offset(node) {
                    if offset >= start && offset < start + how_many {
                        return Err(ModelError::CycleDetected);
                    }
                }
            }
            current = self.tree.parent(node);
        }

        let adjusted_target = if target_parent == source_parent && target_offset >= start + how_many {
            target_offset - how_many
        } else {
            target_offset
        };

        if !self.is_graveyard_node(source_parent) {
            let len = self.tree.max_offset(source_parent);
            let hint = self.tree.item_names(source_parent, start, start + how_many);
            self.differ.buffer_children(
                source_parent,
                len,
                ChildChange::Remove {
                    offset: start,
                    how_many,
                    hint,
                },
            );
        }
        if !self.is_graveyard_node(target_parent) {
            let len = self.tree.max_offset(target_parent);
            self.differ.buffer_children(
                target_parent,
                len,
                ChildChange::Insert {
                    offset: adjusted_target,
                    how_many,
                },
            );
        }

        let from = self.tree.split_at(source_parent, start);
        let to = self.tree.split_at(source_parent, start + how_many);
        let moved = self.tree.detach_children(source_parent, from, to);
        self.tree.merge_texts_at(source_parent, from);

        let index = self.tree.split_at(target_parent, adjusted_target);
        let count = moved.len();
        self.tree.insert_children(target_parent, index, moved);
        self.tree.normalize_between(target_parent, index, index + count);

        Ok(AppliedEffect::Moved {
            range: Range::flat(Position::moved_range_start(source, target, how_many), how_many),
        })
    }

    fn apply_attribute(
        &mut self,
        range: &Range,
        key: &str,
        old_value: &Option<Value>,
        new_value: &Option<Value>,
    ) -> ModelResult<AppliedEffect> {
        if !range.is_flat() {
            return Err(ModelError::precondition("attribute range must be flat"));
        }
        if old_value == new_value {
            return Err(ModelError::precondition("attribute old and new value are equal"));
        }
        let parent = self.writable_parent(&range.start)?;
        let (start, end) = (range.start.offset(), range.end.offset());
        if start == end {
            return Err(ModelError::precondition("empty attribute range"));
        }
        if end > self.tree.max_offset(parent) {
            return Err(ModelError::invalid_position("attribute range past end of parent"));
        }
        if self
            .tree
            .attribute_runs(parent, start, end, key)
            .iter()
            .any(|(_, _, value)| value != old_value)
        {
            return Err(ModelError::precondition(format!(
                "attribute `{}` does not have the expected old value on the whole range",
                key
            )));
        }

        if !self.is_graveyard_node(parent) {
            let len = self.tree.max_offset(parent);
            self.differ.buffer_children(
                parent,
                len,
                ChildChange::Attribute {
                    offset: start,
                    how_many: end - start,
                    key,
                    old_value,
                },
            );
        }

        let from = self.tree.split_at(parent, start);
        let to = self.tree.split_at(parent, end);
        let children: Vec<NodeId> = self.tree.children(parent)[from..to].to_vec();
        for child in children {
            self.tree.data_mut(child).attributes.set(key, new_value.clone());
        }
        self.tree.normalize_between(parent, from, to);

        Ok(AppliedEffect::AttributeChanged { range: range.clone() })
    }

    fn apply_rename(&mut self, position: &Position, old_name: &str, new_name: &str) -> ModelResult<AppliedEffect> {
        let parent = self.writable_parent(position)?;
        let element = self.tree.element_after(position)?;
        if self.tree.get(element).name() != old_name {
            return Err(ModelError::precondition(format!(
                "expected element `{}`, found `{}`",
                old_name,
                self.tree.get(element).name()
            )));
        }
        if old_name == new_name {
            return Err(ModelError::precondition("rename to the same name"));
        }

        if !self.is_graveyard_node(parent) {
            let len = self.tree.max_offset(parent);
            self.differ.buffer_children(
                parent,
                len,
                ChildChange::Refresh {
                    offset: position.offset(),
                },
            );
        }
        if let crate::node::NodeKind::Element { name, .. } = &mut self.tree.data_mut(element).kind {
            *name = new_name.to_string();
        }
        Ok(AppliedEffect::Renamed { element })
    }

    fn apply_marker(
        &mut self,
        name: &str,
        old_range: &Option<Range>,
        new_range: &Option<Range>,
        affects_data: bool,
    ) -> ModelResult<AppliedEffect> {
        let current = self.markers.get(name).map(|marker| marker.range.clone());
        if current != *old_range {
            return Err(ModelError::precondition(format!(
                "marker `{}` does not have the expected range",
                name
            )));
        }
        if let Some(range) = new_range {
            self.validate_live_range(range)?;
        }

        self.differ.buffer_marker(name, old_range.clone(), new_range.clone());
        match new_range {
            Some(range) => self.markers.set(name, range.clone(), affects_data),
            None => {
                self.markers.remove(name);
            }
        }
        Ok(AppliedEffect::MarkerChanged { name: name.to_string() })
    }

    fn apply_root(&mut self, name: &str, element_name: &str, attach: bool) -> ModelResult<AppliedEffect> {
        if name == GRAVEYARD_NAME {
            return Err(ModelError::precondition("the graveyard cannot be attached or detached"));
        }
        let root = if attach {
            match self.roots.get(name).copied() {
                Some(root) if self.tree.is_attached(root) => {
                    return Err(ModelError::precondition(format!("root `{}` is already attached", name)))
                }
                Some(root) => {
                    set_attached(self, root, true);
                    root
                }
                None => {
                    let root = self.tree.alloc_root(name, element_name, true);
                    self.roots.insert(name.to_string(), root);
                    root
                }
            }
        } else {
            let root = self
                .roots
                .get(name)
                .copied()
                .ok_or_else(|| ModelError::RootNotFound(name.to_string()))?;
            if !self.tree.is_attached(root) {
                return Err(ModelError::precondition(format!("root `{}` is already detached", name)));
            }
            if self.markers.iter().any(|marker| marker.range.root() == root) {
                return Err(ModelError::precondition(format!(
                    "root `{}` still holds markers",
                    name
                )));
            }
            set_attached(self, root, false);
            self.selection
                .map_ranges(|range| (range.root() != root).then(|| range.clone()));
            root
        };
        self.differ.buffer_root(name, root, attach);
        Ok(AppliedEffect::RootChanged { root, attached: attach })
    }

    fn transform_live_ranges(&mut self, kind: &OperationKind) {
        let transform: Box<dyn Fn(&Range) -> Range + '_> = match kind {
            OperationKind::Insert { position, nodes } => {
                let how_many = nodes.offset_size();
                Box::new(move |range: &Range| range.live_after_insertion(position, how_many))
            }
            OperationKind::Move {
                source,
                how_many,
                target,
            } => Box::new(move |range: &Range| range.live_after_move(source, target, *how_many)),
            _ => return,
        };

        for marker in self.markers.iter_mut() {
            let range = transform(&marker.range);
            if range != marker.range {
                self.differ
                    .buffer_marker(&marker.name, Some(marker.range.clone()), Some(range.clone()));
                marker.range = range;
            }
        }
        self.selection.map_ranges(|range| Some(transform(range)));
    }

    /// Top-level nodes overlapping `[start, end)` of `parent`
    fn nodes_in(&self, parent: NodeId, start: usize, end: usize) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut acc = 0;
        for child in self.tree.children(parent) {
            let size = self.tree.offset_size(*child);
            if acc < end && acc + size > start {
                result.push(*child);
            }
            acc += size;
        }
        result
    }
}

fn set_attached(document: &mut Document, root: NodeId, attached: bool) {
    if let Some(state) = document.tree.data_mut(root).root.as_mut() {
        state.attached = attached;
    }
}
