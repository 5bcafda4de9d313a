//! # Render Tree
//!
//! Arena of render nodes with parent links. Detached nodes stay in the arena
//! with no parent; they are what the writer creates before inserting and
//! what removal leaves behind.
//!
//! Roots are named like model roots. Only nodes below a registered root are
//! attached and take part in reconciliation.

use crate::node::{RenderNode, ViewKind, ViewNodeData, ViewNodeId};
use crate::position::ViewPosition;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ViewTree {
    nodes: Vec<ViewNodeData>,
    roots: BTreeMap<String, ViewNodeId>,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, data: ViewNodeData) -> ViewNodeId {
        let id = ViewNodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    pub(crate) fn data(&self, id: ViewNodeId) -> &ViewNodeData {
        &self.nodes[id.index()]
    }

    pub(crate) fn data_mut(&mut self, id: ViewNodeId) -> &mut ViewNodeData {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn add_root(&mut self, name: &str, element_name: &str) -> ViewNodeId {
        let id = self.alloc(ViewNodeData::new(ViewKind::Root, element_name));
        self.roots.insert(name.to_string(), id);
        id
    }

    pub(crate) fn remove_root(&mut self, name: &str) -> Option<ViewNodeId> {
        self.roots.remove(name)
    }

    pub fn root(&self, name: &str) -> Option<ViewNodeId> {
        self.roots.get(name).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, ViewNodeId)> {
        self.roots.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn root_name(&self, root: ViewNodeId) -> Option<&str> {
        self.roots()
            .find(|(_, id)| *id == root)
            .map(|(name, _)| name)
    }

    pub fn contains(&self, id: ViewNodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn get(&self, id: ViewNodeId) -> ViewNodeRef<'_> {
        ViewNodeRef { tree: self, id }
    }

    pub fn kind(&self, id: ViewNodeId) -> ViewKind {
        self.data(id).kind
    }

    pub fn parent(&self, id: ViewNodeId) -> Option<ViewNodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: ViewNodeId) -> &[ViewNodeId] {
        &self.data(id).children
    }

    /// Characters for text, children for everything else
    pub fn max_offset(&self, id: ViewNodeId) -> usize {
        let data = self.data(id);
        match data.kind {
            ViewKind::Text => data.text.chars().count(),
            _ => data.children.len(),
        }
    }

    pub fn index_in_parent(&self, id: ViewNodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn position_before(&self, id: ViewNodeId) -> Option<ViewPosition> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        Some(ViewPosition::new(parent, index))
    }

    pub fn position_after(&self, id: ViewNodeId) -> Option<ViewPosition> {
        self.position_before(id).map(|position| position.shifted(1))
    }

    /// Ancestors from the parent up to the top
    pub fn ancestors(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            result.push(node);
            current = self.parent(node);
        }
        result
    }

    pub fn root_of(&self, id: ViewNodeId) -> ViewNodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    pub fn is_attached(&self, id: ViewNodeId) -> bool {
        let top = self.root_of(id);
        self.roots.values().any(|root| *root == top)
    }

    /// Child indices from the top down to the position, the position's
    /// offset last
    pub fn path(&self, position: &ViewPosition) -> Vec<usize> {
        let mut path = vec![position.offset];
        let mut current = position.parent;
        while let Some(index) = self.index_in_parent(current) {
            path.push(index);
            current = self.parent(current).unwrap_or(current);
        }
        path.reverse();
        path
    }

    /// Document order of two positions; `None` across roots
    pub fn compare(&self, a: &ViewPosition, b: &ViewPosition) -> Option<Ordering> {
        if self.root_of(a.parent) != self.root_of(b.parent) {
            return None;
        }
        Some(self.path(a).cmp(&self.path(b)))
    }

    /// Pre-order list of `id` and everything below it
    pub fn descendants(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        result
    }

    pub fn text_content(&self, id: ViewNodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.kind(*node) == ViewKind::Text)
            .map(|node| self.data(node).text.as_str())
            .collect()
    }

    pub fn to_render_node(&self, id: ViewNodeId) -> RenderNode {
        let data = self.data(id);
        match data.kind {
            ViewKind::Text => RenderNode::Text {
                id,
                content: data.text.clone(),
            },
            kind => RenderNode::Element {
                id,
                kind,
                name: data.name.clone(),
                attributes: data.attributes.clone(),
                children: data
                    .children
                    .iter()
                    .map(|child| self.to_render_node(*child))
                    .collect(),
            },
        }
    }

    pub(crate) fn insert_children(&mut self, parent: ViewNodeId, index: usize, children: Vec<ViewNodeId>) {
        for child in &children {
            self.data_mut(*child).parent = Some(parent);
        }
        let list = &mut self.data_mut(parent).children;
        let index = index.min(list.len());
        list.splice(index..index, children);
    }

    pub(crate) fn detach_children(&mut self, parent: ViewNodeId, from: usize, to: usize) -> Vec<ViewNodeId> {
        let removed: Vec<ViewNodeId> = self.data_mut(parent).children.drain(from..to).collect();
        for child in &removed {
            self.data_mut(*child).parent = None;
        }
        removed
    }
}

/// Borrowed view of one render node
#[derive(Clone, Copy)]
pub struct ViewNodeRef<'a> {
    tree: &'a ViewTree,
    id: ViewNodeId,
}

impl<'a> ViewNodeRef<'a> {
    pub fn id(&self) -> ViewNodeId {
        self.id
    }

    pub fn kind(&self) -> ViewKind {
        self.tree.data(self.id).kind
    }

    pub fn is_text(&self) -> bool {
        self.kind() == ViewKind::Text
    }

    pub fn name(&self) -> &'a str {
        &self.tree.data(self.id).name
    }

    pub fn attributes(&self) -> &'a BTreeMap<String, String> {
        &self.tree.data(self.id).attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.attributes().get(key).map(String::as_str)
    }

    pub fn text(&self) -> &'a str {
        &self.tree.data(self.id).text
    }

    pub fn priority(&self) -> i32 {
        self.tree.data(self.id).priority
    }

    pub fn parent(&self) -> Option<ViewNodeId> {
        self.tree.parent(self.id)
    }

    pub fn children(&self) -> &'a [ViewNodeId] {
        self.tree.children(self.id)
    }
}

impl std::fmt::Debug for ViewNodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewNodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_paragraph() -> (ViewTree, ViewNodeId, ViewNodeId, ViewNodeId) {
        let mut tree = ViewTree::new();
        let root = tree.add_root("main", "div");
        let paragraph = tree.alloc(ViewNodeData::new(ViewKind::Container, "p"));
        let mut text = ViewNodeData::new(ViewKind::Text, "");
        text.text = "hello".into();
        let text = tree.alloc(text);
        tree.insert_children(root, 0, vec![paragraph]);
        tree.insert_children(paragraph, 0, vec![text]);
        (tree, root, paragraph, text)
    }

    #[test]
    fn test_paths_and_order() {
        let (tree, root, paragraph, text) = tree_with_paragraph();
        assert_eq!(tree.path(&ViewPosition::new(text, 3)), vec![0, 0, 3]);
        assert_eq!(tree.path(&ViewPosition::new(root, 1)), vec![1]);
        assert_eq!(
            tree.compare(&ViewPosition::new(text, 3), &ViewPosition::new(paragraph, 1)),
            Some(Ordering::Less)
        );
        assert!(tree.is_attached(text));
        assert_eq!(tree.root_name(root), Some("main"));
    }

    #[test]
    fn test_detached_nodes() {
        let (mut tree, root, paragraph, text) = tree_with_paragraph();
        let removed = tree.detach_children(root, 0, 1);
        assert_eq!(removed, vec![paragraph]);
        assert!(!tree.is_attached(text));
        assert_eq!(tree.root_of(text), paragraph);
        assert_eq!(tree.text_content(paragraph), "hello");
        assert_eq!(tree.max_offset(text), 5);
    }
}
