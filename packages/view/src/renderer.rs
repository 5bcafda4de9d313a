//! Rendering surface abstraction.
//!
//! A [`Renderer`] receives patches from the reconciler and owns whatever the
//! user actually sees. [`RecordingRenderer`] keeps an in-memory surface and
//! a log of every commit; it backs headless use and tests.

use crate::errors::{ViewError, ViewResult};
use crate::node::{RenderNode, ViewKind, ViewNodeId};
use crate::position::ViewSelection;
use crate::reconciler::Patch;
use crate::stringify::{escape_html, is_self_closing};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Result of one commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    /// Selection nodes that exist on the surface after the commit
    pub realized: Vec<ViewNodeId>,
}

pub trait Renderer {
    /// Apply patches in order
    fn commit(&mut self, patches: &[Patch], selection_nodes: &[ViewNodeId]) -> ViewResult<RenderReport>;

    /// Restore the selection on the surface, `None` to clear it
    fn set_selection(&mut self, selection: Option<&ViewSelection>);
}

#[derive(Debug, Clone)]
struct SurfaceNode {
    kind: ViewKind,
    name: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<ViewNodeId>,
    children: Vec<ViewNodeId>,
}

#[derive(Debug, Default)]
pub struct RecordingRenderer {
    nodes: HashMap<ViewNodeId, SurfaceNode>,
    roots: Vec<ViewNodeId>,
    commits: Vec<Vec<Patch>>,
    selection: Option<ViewSelection>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every patch batch committed so far
    pub fn commits(&self) -> &[Vec<Patch>] {
        &self.commits
    }

    pub fn selection(&self) -> Option<&ViewSelection> {
        self.selection.as_ref()
    }

    pub fn contains(&self, node: ViewNodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn insert_subtree(&mut self, node: &RenderNode, parent: Option<ViewNodeId>) {
        match node {
            RenderNode::Text { id, content } => {
                self.nodes.insert(
                    *id,
                    SurfaceNode {
                        kind: ViewKind::Text,
                        name: String::new(),
                        attributes: BTreeMap::new(),
                        text: content.clone(),
                        parent,
                        children: Vec::new(),
                    },
                );
            }
            RenderNode::Element {
                id,
                kind,
                name,
                attributes,
                children,
            } => {
                self.nodes.insert(
                    *id,
                    SurfaceNode {
                        kind: *kind,
                        name: name.clone(),
                        attributes: attributes.clone(),
                        text: String::new(),
                        parent,
                        children: children.iter().map(RenderNode::id).collect(),
                    },
                );
                for child in children {
                    self.insert_subtree(child, Some(*id));
                }
            }
        }
    }

    fn drop_subtree(&mut self, node: ViewNodeId) {
        if let Some(surface) = self.nodes.remove(&node) {
            for child in surface.children {
                self.drop_subtree(child);
            }
        }
    }

    fn apply(&mut self, patch: &Patch) -> ViewResult<()> {
        match patch {
            Patch::Create { parent, index, node } => {
                let siblings = match parent {
                    Some(parent) => {
                        &mut self
                            .nodes
                            .get_mut(parent)
                            .ok_or_else(|| ViewError::Renderer(format!("create under unknown node {}", parent)))?
                            .children
                    }
                    None => &mut self.roots,
                };
                let index = (*index).min(siblings.len());
                siblings.insert(index, node.id());
                self.insert_subtree(node, *parent);
            }
            Patch::Remove { node } => {
                let parent = self
                    .nodes
                    .get(node)
                    .ok_or_else(|| ViewError::Renderer(format!("remove of unknown node {}", node)))?
                    .parent;
                let siblings = match parent {
                    Some(parent) => match self.nodes.get_mut(&parent) {
                        Some(parent) => &mut parent.children,
                        None => return Err(ViewError::Renderer(format!("dangling parent of {}", node))),
                    },
                    None => &mut self.roots,
                };
                siblings.retain(|child| child != node);
                self.drop_subtree(*node);
            }
            Patch::SetAttribute { node, key, value } => {
                let surface = self
                    .nodes
                    .get_mut(node)
                    .ok_or_else(|| ViewError::Renderer(format!("attribute on unknown node {}", node)))?;
                match value {
                    Some(value) => surface.attributes.insert(key.clone(), value.clone()),
                    None => surface.attributes.remove(key),
                };
            }
            Patch::SetText { node, text } => {
                let surface = self
                    .nodes
                    .get_mut(node)
                    .ok_or_else(|| ViewError::Renderer(format!("text on unknown node {}", node)))?;
                surface.text = text.clone();
            }
        }
        Ok(())
    }

    /// Surface markup, roots included
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.write_node(*root, &mut out);
        }
        out
    }

    fn write_node(&self, node: ViewNodeId, out: &mut String) {
        let Some(surface) = self.nodes.get(&node) else {
            return;
        };
        if surface.kind == ViewKind::Text {
            out.push_str(&escape_html(&surface.text));
            return;
        }
        out.push('<');
        out.push_str(&surface.name);
        for (key, value) in &surface.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, escape_html(value)));
        }
        if surface.children.is_empty() && (surface.kind == ViewKind::Empty || is_self_closing(&surface.name)) {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &surface.children {
            self.write_node(*child, out);
        }
        out.push_str(&format!("</{}>", surface.name));
    }
}

impl Renderer for RecordingRenderer {
    fn commit(&mut self, patches: &[Patch], selection_nodes: &[ViewNodeId]) -> ViewResult<RenderReport> {
        for patch in patches {
            self.apply(patch)?;
        }
        trace!(patches = patches.len(), nodes = self.nodes.len(), "surface updated");
        self.commits.push(patches.to_vec());
        Ok(RenderReport {
            realized: selection_nodes
                .iter()
                .copied()
                .filter(|node| self.nodes.contains_key(node))
                .collect(),
        })
    }

    fn set_selection(&mut self, selection: Option<&ViewSelection>) {
        self.selection = selection.cloned();
    }
}
