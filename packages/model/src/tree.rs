//! # Document Tree Arena
//!
//! Every live node (roots, the graveyard and their descendants) lives in one
//! arena. Nodes are never freed: detached content keeps its slot so
//! operations can move it back.
//!
//! Queries are public. Structural edits (`split_at`, `detach_children`,
//! `insert_children`, text merging) are crate-private and only reachable
//! through operations.

use crate::errors::{ModelError, ModelResult};
use crate::node::{char_to_byte, Attributes, Node, NodeData, NodeId, NodeKind, RootState, GRAVEYARD};
use crate::position::Position;

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<NodeData>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    pub(crate) fn alloc_root(&mut self, name: &str, element_name: &str, attached: bool) -> NodeId {
        let mut data = NodeData::element(element_name, Attributes::new());
        data.root = Some(RootState {
            name: name.to_string(),
            attached,
        });
        self.alloc(data)
    }

    /// Allocate live nodes for a value tree. The returned node has no parent.
    pub(crate) fn alloc_value(&mut self, node: &Node) -> NodeId {
        match node {
            Node::Text { data, attributes } => self.alloc(NodeData::text(data.clone(), attributes.clone())),
            Node::Element {
                name,
                attributes,
                children,
            } => {
                let id = self.alloc(NodeData::element(name.clone(), attributes.clone()));
                let child_ids: Vec<NodeId> = children
                    .iter()
                    .filter(|child| child.offset_size() > 0)
                    .map(|child| self.alloc_value(child))
                    .collect();
                let len = child_ids.len();
                self.insert_children(id, 0, child_ids);
                // Value trees may carry adjacent equal texts
                for index in (1..len).rev() {
                    self.merge_texts_at(id, index);
                }
                id
            }
        }
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.data(id).kind {
            NodeKind::Element { children, .. } => children,
            NodeKind::Text { .. } => &[],
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id).kind, NodeKind::Element { .. })
    }

    pub fn offset_size(&self, id: NodeId) -> usize {
        self.data(id).offset_size()
    }

    /// Offset units taken by all children of `id`
    pub fn max_offset(&self, id: NodeId) -> usize {
        self.children(id).iter().map(|child| self.offset_size(*child)).sum()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    /// Offset at which `id` starts inside its parent
    pub fn start_offset(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let mut offset = 0;
        for child in self.children(parent) {
            if *child == id {
                return Some(offset);
            }
            offset += self.offset_size(*child);
        }
        None
    }

    /// Ancestors of `id`, closest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            result.push(node);
            current = self.parent(node);
        }
        result
    }

    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.data(id).root.is_some()
    }

    /// Whether `id` belongs to an attached root. Graveyard content never is.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.root_of(id);
        root != GRAVEYARD && self.data(root).root.as_ref().map_or(false, |state| state.attached)
    }

    /// Whether `ancestor` contains `id` (strictly)
    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Position right before `id`
    pub fn position_before(&self, id: NodeId) -> Option<Position> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(self.start_offset(current)?);
            current = parent;
        }
        if path.is_empty() {
            return None;
        }
        path.reverse();
        Some(Position::new(current, path))
    }

    /// Position at `offset` inside element `id`
    pub fn position_in(&self, id: NodeId, offset: usize) -> Position {
        match self.position_before(id) {
            Some(mut position) => {
                position.path.push(offset);
                position
            }
            None => Position::new(id, vec![offset]),
        }
    }

    /// Child index containing `offset` and the offset inside that child.
    /// Returns `(children.len(), 0)` when `offset` is at the end.
    pub fn locate(&self, parent: NodeId, offset: usize) -> (usize, usize) {
        let mut acc = 0;
        for (index, child) in self.children(parent).iter().enumerate() {
            let size = self.offset_size(*child);
            if offset < acc + size {
                return (index, offset - acc);
            }
            acc += size;
        }
        (self.children(parent).len(), 0)
    }

    /// Node starting exactly at `offset` inside `parent`
    pub fn node_at_offset(&self, parent: NodeId, offset: usize) -> Option<NodeId> {
        let (index, inner) = self.locate(parent, offset);
        if inner != 0 {
            return None;
        }
        self.children(parent).get(index).copied()
    }

    /// Node covering `offset` inside `parent`, including text nodes entered mid-way
    pub fn node_covering(&self, parent: NodeId, offset: usize) -> Option<NodeId> {
        let (index, _) = self.locate(parent, offset);
        self.children(parent).get(index).copied()
    }

    /// Resolve the parent element a position points into
    pub fn parent_at(&self, position: &Position) -> ModelResult<NodeId> {
        if !self.contains(position.root) {
            return Err(ModelError::invalid_position(format!("unknown root {}", position.root)));
        }
        if position.path.is_empty() {
            return Err(ModelError::invalid_position("empty path"));
        }
        let mut current = position.root;
        for offset in position.parent_path() {
            current = match self.node_at_offset(current, *offset) {
                Some(node) if self.is_element(node) => node,
                _ => {
                    return Err(ModelError::invalid_position(format!(
                        "path {:?} does not lead through elements",
                        position.path
                    )))
                }
            };
        }
        if position.offset() > self.max_offset(current) {
            return Err(ModelError::invalid_position(format!(
                "offset {} past end of {}",
                position.offset(),
                current
            )));
        }
        Ok(current)
    }

    /// Element starting right after `position`
    pub fn element_after(&self, position: &Position) -> ModelResult<NodeId> {
        let parent = self.parent_at(position)?;
        match self.node_at_offset(parent, position.offset()) {
            Some(node) if self.is_element(node) => Ok(node),
            _ => Err(ModelError::NotAnElement),
        }
    }

    /// Value of `key` on the item at `offset` of `parent`
    pub fn attribute_at(&self, parent: NodeId, offset: usize, key: &str) -> Option<&serde_json::Value> {
        let node = self.node_covering(parent, offset)?;
        self.data(node).attributes.get(key)
    }

    /// Uniform runs of `key` over `[start, end)` of `parent`: `(from, to, value)`
    pub fn attribute_runs(
        &self,
        parent: NodeId,
        start: usize,
        end: usize,
        key: &str,
    ) -> Vec<(usize, usize, Option<serde_json::Value>)> {
        let mut runs: Vec<(usize, usize, Option<serde_json::Value>)> = Vec::new();
        let mut acc = 0;
        for child in self.children(parent) {
            let size = self.offset_size(*child);
            let from = acc.max(start);
            let to = (acc + size).min(end);
            acc += size;
            if from >= to {
                continue;
            }
            let value = self.data(*child).attributes.get(key).cloned();
            match runs.last_mut() {
                Some(last) if last.1 == from && last.2 == value => last.1 = to,
                _ => runs.push((from, to, value)),
            }
        }
        runs
    }

    /// Snapshot a live node as an owned value
    pub fn to_value(&self, id: NodeId) -> Node {
        let data = self.data(id);
        match &data.kind {
            NodeKind::Text { data: text } => Node::Text {
                data: text.clone(),
                attributes: data.attributes.clone(),
            },
            NodeKind::Element { name, children } => Node::Element {
                name: name.clone(),
                attributes: data.attributes.clone(),
                children: children.iter().map(|child| self.to_value(*child)).collect(),
            },
        }
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.data(id).kind {
            NodeKind::Text { data } => data.clone(),
            NodeKind::Element { children, .. } => children.iter().map(|child| self.text_content(*child)).collect(),
        }
    }

    /// Names of the items in `[start, end)` of `parent`, one entry per node
    pub(crate) fn item_names(&self, parent: NodeId, start: usize, end: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut acc = 0;
        for child in self.children(parent) {
            let size = self.offset_size(*child);
            if acc < end && acc + size > start {
                names.push(self.get(*child).name().to_string());
            }
            acc += size;
        }
        names
    }

    /// Make sure a child boundary exists at `offset`, splitting a text node if
    /// needed. Returns the index of the first child at or after `offset`.
    pub(crate) fn split_at(&mut self, parent: NodeId, offset: usize) -> usize {
        let (index, inner) = self.locate(parent, offset);
        if inner == 0 {
            return index;
        }
        let child = self.children(parent)[index];
        let (tail, attributes) = {
            let data = self.data_mut(child);
            let tail = match &mut data.kind {
                NodeKind::Text { data: text } => {
                    let byte = char_to_byte(text, inner);
                    text.split_off(byte)
                }
                // Elements are one unit wide, inner is always 0 for them
                NodeKind::Element { .. } => return index,
            };
            (tail, data.attributes.clone())
        };
        let new_id = self.alloc(NodeData::text(tail, attributes));
        self.insert_children(parent, index + 1, vec![new_id]);
        index + 1
    }

    pub(crate) fn detach_children(&mut self, parent: NodeId, start: usize, end: usize) -> Vec<NodeId> {
        let removed: Vec<NodeId> = match &mut self.data_mut(parent).kind {
            NodeKind::Element { children, .. } => children.drain(start..end).collect(),
            NodeKind::Text { .. } => Vec::new(),
        };
        for id in &removed {
            self.data_mut(*id).parent = None;
        }
        removed
    }

    pub(crate) fn insert_children(&mut self, parent: NodeId, index: usize, ids: Vec<NodeId>) {
        for id in &ids {
            self.data_mut(*id).parent = Some(parent);
        }
        if let NodeKind::Element { children, .. } = &mut self.data_mut(parent).kind {
            let tail = children.split_off(index);
            children.extend(ids);
            children.extend(tail);
        }
    }

    /// Merge `children[index - 1]` and `children[index]` if both are texts with
    /// equal attributes
    pub(crate) fn merge_texts_at(&mut self, parent: NodeId, index: usize) -> bool {
        let children = self.children(parent);
        if index == 0 || index >= children.len() {
            return false;
        }
        let (left, right) = (children[index - 1], children[index]);
        let mergeable = match (&self.data(left).kind, &self.data(right).kind) {
            (NodeKind::Text { .. }, NodeKind::Text { .. }) => {
                self.data(left).attributes == self.data(right).attributes
            }
            _ => false,
        };
        if !mergeable {
            return false;
        }
        let tail = match &self.data(right).kind {
            NodeKind::Text { data } => data.clone(),
            NodeKind::Element { .. } => return false,
        };
        if let NodeKind::Text { data } = &mut self.data_mut(left).kind {
            data.push_str(&tail);
        }
        self.detach_children(parent, index, index + 1);
        true
    }

    /// Merge equal adjacent texts at every boundary in `[from, to]`
    pub(crate) fn normalize_between(&mut self, parent: NodeId, from: usize, to: usize) {
        let to = to.min(self.children(parent).len());
        for index in (from.max(1)..=to).rev() {
            self.merge_texts_at(parent, index);
        }
    }
}

/// Borrowed view of a live node
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_element(&self) -> bool {
        self.tree.is_element(self.id)
    }

    pub fn is_text(&self) -> bool {
        !self.is_element()
    }

    /// Element name, or `$text`
    pub fn name(&self) -> &'a str {
        match &self.tree.data(self.id).kind {
            NodeKind::Element { name, .. } => name,
            NodeKind::Text { .. } => crate::node::TEXT_NAME,
        }
    }

    /// Text data, empty for elements
    pub fn data(&self) -> &'a str {
        match &self.tree.data(self.id).kind {
            NodeKind::Text { data } => data,
            NodeKind::Element { .. } => "",
        }
    }

    pub fn attributes(&self) -> &'a Attributes {
        &self.tree.data(self.id).attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.attributes().get(key)
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.tree.parent(self.id).map(|id| self.tree.get(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.children(self.id).iter().map(move |id| tree.get(*id))
    }

    pub fn child_count(&self) -> usize {
        self.tree.children(self.id).len()
    }

    pub fn offset_size(&self) -> usize {
        self.tree.offset_size(self.id)
    }

    pub fn max_offset(&self) -> usize {
        self.tree.max_offset(self.id)
    }

    pub fn start_offset(&self) -> Option<usize> {
        self.tree.start_offset(self.id)
    }

    pub fn root_name(&self) -> Option<&'a str> {
        self.tree.data(self.id).root.as_ref().map(|root| root.name.as_str())
    }
}
