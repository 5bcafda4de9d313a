//! # Reconciler
//!
//! Diffs the render tree against the last committed snapshot and produces
//! the patches a rendering surface must apply.
//!
//! ## Design
//!
//! Nodes are matched by identity, not by position. Per parent, the children
//! present before and after keep their surface counterpart when they lie on
//! the longest increasing run of old indices; everything else is removed and
//! recreated. A node whose kind or name changed is recreated too.
//!
//! Patch order is removals, then creations in ascending final index per
//! parent, then attribute and text updates. Applying them in that order
//! against the previous surface yields the current tree.

use crate::node::{RenderNode, ViewKind, ViewNodeId};
use crate::tree::ViewTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Patch {
    /// Create a subtree. `parent: None` creates a top-level root.
    Create {
        parent: Option<ViewNodeId>,
        index: usize,
        node: RenderNode,
    },
    /// Remove a node with its whole surface subtree
    Remove { node: ViewNodeId },
    SetAttribute {
        node: ViewNodeId,
        key: String,
        value: Option<String>,
    },
    SetText { node: ViewNodeId, text: String },
}

#[derive(Debug, Clone)]
struct Committed {
    kind: ViewKind,
    name: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<ViewNodeId>,
}

#[derive(Debug, Default)]
struct Patches {
    removals: Vec<Patch>,
    creations: Vec<Patch>,
    updates: Vec<Patch>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    committed: HashMap<ViewNodeId, Committed>,
    roots: Vec<ViewNodeId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node` exists on the surface as of the last reconciliation
    pub fn is_committed(&self, node: ViewNodeId) -> bool {
        self.committed.contains_key(&node)
    }

    /// Patches turning the committed snapshot into `tree`. Commits `tree`
    /// as the new snapshot.
    pub fn reconcile(&mut self, tree: &ViewTree) -> Vec<Patch> {
        let roots: Vec<ViewNodeId> = tree.roots().map(|(_, id)| id).collect();
        let mut patches = Patches::default();
        self.diff_children(tree, None, &self.roots, &roots, &mut patches);

        debug!(
            removals = patches.removals.len(),
            creations = patches.creations.len(),
            updates = patches.updates.len(),
            "render tree reconciled"
        );
        self.commit(tree, roots);

        let mut result = patches.removals;
        result.extend(patches.creations);
        result.extend(patches.updates);
        result
    }

    fn commit(&mut self, tree: &ViewTree, roots: Vec<ViewNodeId>) {
        self.committed.clear();
        for root in &roots {
            for node in tree.descendants(*root) {
                let view = tree.get(node);
                self.committed.insert(
                    node,
                    Committed {
                        kind: view.kind(),
                        name: view.name().to_string(),
                        attributes: view.attributes().clone(),
                        text: view.text().to_string(),
                        children: view.children().to_vec(),
                    },
                );
            }
        }
        self.roots = roots;
    }

    fn matches(&self, tree: &ViewTree, node: ViewNodeId) -> bool {
        self.committed.get(&node).map_or(false, |old| {
            let view = tree.get(node);
            old.kind == view.kind() && old.name == view.name()
        })
    }

    fn diff_children(
        &self,
        tree: &ViewTree,
        parent: Option<ViewNodeId>,
        old: &[ViewNodeId],
        new: &[ViewNodeId],
        patches: &mut Patches,
    ) {
        let old_index: HashMap<ViewNodeId, usize> = old.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let candidates: Vec<(ViewNodeId, usize)> = new
            .iter()
            .filter(|id| self.matches(tree, **id))
            .filter_map(|id| old_index.get(id).map(|index| (*id, *index)))
            .collect();
        let sequence: Vec<usize> = candidates.iter().map(|(_, index)| *index).collect();
        let stable: HashSet<ViewNodeId> = longest_increasing_subsequence(&sequence)
            .into_iter()
            .map(|position| candidates[position].0)
            .collect();

        for node in old {
            if !stable.contains(node) {
                patches.removals.push(Patch::Remove { node: *node });
            }
        }

        for (index, node) in new.iter().enumerate() {
            if stable.contains(node) {
                self.diff_node(tree, *node, patches);
            } else {
                patches.creations.push(Patch::Create {
                    parent,
                    index,
                    node: tree.to_render_node(*node),
                });
            }
        }
    }

    fn diff_node(&self, tree: &ViewTree, node: ViewNodeId, patches: &mut Patches) {
        let Some(old) = self.committed.get(&node) else {
            return;
        };
        let view = tree.get(node);

        if old.kind == ViewKind::Text {
            if old.text != view.text() {
                patches.updates.push(Patch::SetText {
                    node,
                    text: view.text().to_string(),
                });
            }
            return;
        }

        let keys: BTreeSet<&String> = old.attributes.keys().chain(view.attributes().keys()).collect();
        for key in keys {
            let before = old.attributes.get(key);
            let after = view.attributes().get(key);
            if before != after {
                patches.updates.push(Patch::SetAttribute {
                    node,
                    key: key.clone(),
                    value: after.cloned(),
                });
            }
        }

        self.diff_children(tree, Some(node), &old.children, view.children(), patches);
    }
}

/// Positions (into `sequence`) of one longest strictly increasing subsequence
fn longest_increasing_subsequence(sequence: &[usize]) -> Vec<usize> {
    // tails[k]: position of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; sequence.len()];
    for (position, value) in sequence.iter().enumerate() {
        let length = tails.partition_point(|tail| sequence[*tail] < *value);
        if length > 0 {
            previous[position] = Some(tails[length - 1]);
        }
        if length == tails.len() {
            tails.push(position);
        } else {
            tails[length] = position;
        }
    }
    let mut result = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(position) = current {
        result.push(position);
        current = previous[position];
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{ViewPosition, ViewSelection};
    use crate::writer::ViewWriter;

    fn paragraph_list(texts: &[&str]) -> (ViewTree, ViewSelection, ViewNodeId, Vec<ViewNodeId>) {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let mut paragraphs = Vec::new();
        let root = {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            let root = writer.create_root("main", "div").unwrap();
            for (index, text) in texts.iter().enumerate() {
                let paragraph = writer.create_container("p", &[]);
                let text = writer.create_text(text);
                writer.insert(ViewPosition::new(root, index), paragraph).unwrap();
                writer.insert(ViewPosition::new(paragraph, 0), text).unwrap();
                paragraphs.push(paragraph);
            }
            root
        };
        (tree, selection, root, paragraphs)
    }

    #[test]
    fn test_lis() {
        assert_eq!(longest_increasing_subsequence(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing_subsequence(&[0, 1, 2]), vec![0, 1, 2]);
        let run = longest_increasing_subsequence(&[3, 0, 1, 4, 2]);
        assert_eq!(run.len(), 3);
        assert_eq!(run, vec![1, 2, 4]);
    }

    #[test]
    fn test_first_reconcile_creates_roots() {
        let (tree, _, root, _) = paragraph_list(&["a", "b"]);
        let mut reconciler = Reconciler::new();
        let patches = reconciler.reconcile(&tree);
        assert_eq!(patches.len(), 1);
        assert!(matches!(&patches[0], Patch::Create { parent: None, index: 0, node } if node.id() == root));
        assert!(reconciler.reconcile(&tree).is_empty());
    }

    #[test]
    fn test_text_and_attribute_updates() {
        let (mut tree, mut selection, _, paragraphs) = paragraph_list(&["a"]);
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&tree);

        let text = tree.children(paragraphs[0])[0];
        {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            writer.set_text(text, "ab").unwrap();
            writer.set_attribute(paragraphs[0], "class", "lead").unwrap();
        }
        let patches = reconciler.reconcile(&tree);
        assert_eq!(
            patches,
            vec![
                Patch::SetAttribute {
                    node: paragraphs[0],
                    key: "class".into(),
                    value: Some("lead".into()),
                },
                Patch::SetText {
                    node: text,
                    text: "ab".into(),
                },
            ]
        );
    }

    #[test]
    fn test_moved_node_is_recreated_once() {
        let (mut tree, mut selection, root, paragraphs) = paragraph_list(&["a", "b", "c"]);
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&tree);

        {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            writer
                .move_range(
                    crate::ViewRange::new(ViewPosition::new(root, 2), ViewPosition::new(root, 3)),
                    ViewPosition::new(root, 0),
                )
                .unwrap();
        }
        let patches = reconciler.reconcile(&tree);
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0], Patch::Remove { node: paragraphs[2] });
        assert!(matches!(
            &patches[1],
            Patch::Create { parent: Some(parent), index: 0, node } if *parent == root && node.id() == paragraphs[2]
        ));
    }

    #[test]
    fn test_renamed_node_is_replaced() {
        let (mut tree, mut selection, root, paragraphs) = paragraph_list(&["a"]);
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&tree);
        {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            writer.rename(paragraphs[0], "h1").unwrap();
        }
        let patches = reconciler.reconcile(&tree);
        assert_eq!(patches[0], Patch::Remove { node: paragraphs[0] });
        assert!(matches!(&patches[1], Patch::Create { parent: Some(parent), .. } if *parent == root));
    }
}
