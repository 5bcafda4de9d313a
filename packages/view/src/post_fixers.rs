//! # Render Post-Fixers
//!
//! Callbacks run after every render change pass to restore presentation
//! invariants the converters do not care about.
//!
//! ## Design
//!
//! The registry runs fixers in registration order. When one reports a change
//! the round restarts from the first fixer, so every fixer sees the effects
//! of every other. A round in which no fixer changes anything ends the run.
//! Fixers that keep reporting changes hit the pass cap and the run fails
//! with [`ViewError::PostFixerLoop`].

use crate::errors::{ViewError, ViewResult};
use crate::node::{ViewKind, ViewNodeId};
use crate::position::{ViewPosition, ViewSelection};
use crate::tree::ViewTree;
use crate::writer::ViewWriter;
use tracing::{debug, error};

/// Default cap on fixer rounds for one change pass
pub const DEFAULT_MAX_PASSES: usize = 100;

/// Render post-fixer. Returns whether it changed anything.
pub trait ViewPostFixer: std::fmt::Debug {
    fn name(&self) -> &str;

    fn fix(&mut self, writer: &mut ViewWriter<'_>) -> ViewResult<bool>;
}

/// Post-fixer backed by a closure
pub struct FnViewPostFixer<F> {
    name: String,
    f: F,
}

impl<F> FnViewPostFixer<F>
where
    F: FnMut(&mut ViewWriter<'_>) -> ViewResult<bool>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> std::fmt::Debug for FnViewPostFixer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnViewPostFixer").field("name", &self.name).finish()
    }
}

impl<F> ViewPostFixer for FnViewPostFixer<F>
where
    F: FnMut(&mut ViewWriter<'_>) -> ViewResult<bool>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fix(&mut self, writer: &mut ViewWriter<'_>) -> ViewResult<bool> {
        (self.f)(writer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewPostFixerId(u64);

#[derive(Debug)]
pub struct PostFixerRegistry {
    fixers: Vec<(ViewPostFixerId, Box<dyn ViewPostFixer>)>,
    next_id: u64,
    max_passes: usize,
}

impl PostFixerRegistry {
    pub fn new() -> Self {
        Self {
            fixers: Vec::new(),
            next_id: 0,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn set_max_passes(&mut self, passes: usize) {
        self.max_passes = passes.max(1);
    }

    pub fn register(&mut self, fixer: Box<dyn ViewPostFixer>) -> ViewPostFixerId {
        let id = ViewPostFixerId(self.next_id);
        self.next_id += 1;
        self.fixers.push((id, fixer));
        id
    }

    pub fn remove(&mut self, id: ViewPostFixerId) -> bool {
        let before = self.fixers.len();
        self.fixers.retain(|(fixer_id, _)| *fixer_id != id);
        before != self.fixers.len()
    }

    pub fn len(&self) -> usize {
        self.fixers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixers.is_empty()
    }

    /// Run fixers to a fixed point. Returns how many rounds changed the tree.
    pub fn run(&mut self, tree: &mut ViewTree, selection: &mut ViewSelection) -> ViewResult<usize> {
        for pass in 0..self.max_passes {
            let mut changed_by = None;
            for (_, fixer) in &mut self.fixers {
                let mut writer = ViewWriter::new(tree, selection);
                if fixer.fix(&mut writer)? {
                    changed_by = Some(fixer.name().to_string());
                    break;
                }
            }
            match changed_by {
                Some(name) => debug!(pass, fixer = %name, "render post-fixer changed the tree"),
                None => return Ok(pass),
            }
        }
        error!(passes = self.max_passes, "render post-fixers did not settle");
        Err(ViewError::PostFixerLoop {
            passes: self.max_passes,
        })
    }
}

impl Default for PostFixerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute marking filler elements
pub const FILLER_ATTRIBUTE: &str = "data-filler";

/// Keeps empty containers visible with a `<br>` UI filler and drops the
/// filler once the container has real content
#[derive(Debug, Default)]
pub struct BlockFiller;

impl BlockFiller {
    fn is_filler(tree: &ViewTree, node: ViewNodeId) -> bool {
        let node = tree.get(node);
        node.kind() == ViewKind::Ui && node.attribute(FILLER_ATTRIBUTE).is_some()
    }
}

impl ViewPostFixer for BlockFiller {
    fn name(&self) -> &str {
        "block-filler"
    }

    fn fix(&mut self, writer: &mut ViewWriter<'_>) -> ViewResult<bool> {
        let tree = writer.tree();
        let mut missing = Vec::new();
        let mut extra = Vec::new();
        for (_, root) in tree.roots() {
            for node in tree.descendants(root) {
                if tree.kind(node) != ViewKind::Container {
                    continue;
                }
                let children = tree.children(node);
                if children.is_empty() {
                    missing.push(node);
                } else if children.len() > 1 {
                    extra.extend(children.iter().copied().filter(|child| Self::is_filler(tree, *child)));
                }
            }
        }
        if missing.is_empty() && extra.is_empty() {
            return Ok(false);
        }
        for filler in extra {
            writer.remove_node(filler)?;
        }
        for container in missing {
            let filler = writer.create_ui("br", &[(FILLER_ATTRIBUTE, "true")]);
            writer.insert(ViewPosition::new(container, 0), filler)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stringify::stringify_with;
    use crate::stringify::StringifyOptions;

    fn tree_with_empty_paragraph() -> (ViewTree, ViewSelection, ViewNodeId) {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            let root = writer.create_root("main", "div").unwrap();
            let paragraph = writer.create_container("p", &[]);
            writer.insert(ViewPosition::new(root, 0), paragraph).unwrap();
            paragraph
        };
        (tree, selection, paragraph)
    }

    #[test]
    fn test_block_filler_added_and_removed() {
        let (mut tree, mut selection, paragraph) = tree_with_empty_paragraph();
        let mut registry = PostFixerRegistry::new();
        registry.register(Box::new(BlockFiller));

        assert_eq!(registry.run(&mut tree, &mut selection).unwrap(), 1);
        let root = tree.root("main").unwrap();
        let options = StringifyOptions {
            include_ui: true,
            ..Default::default()
        };
        assert_eq!(stringify_with(&tree, root, &options), r#"<p><br data-filler="true" /></p>"#);

        {
            let mut writer = ViewWriter::new(&mut tree, &mut selection);
            let text = writer.create_text("x");
            writer.insert(ViewPosition::new(paragraph, 0), text).unwrap();
        }
        assert_eq!(registry.run(&mut tree, &mut selection).unwrap(), 1);
        assert_eq!(stringify_with(&tree, root, &options), "<p>x</p>");
        assert_eq!(registry.run(&mut tree, &mut selection).unwrap(), 0);
    }

    #[test]
    fn test_restless_fixer_hits_cap() {
        let (mut tree, mut selection, paragraph) = tree_with_empty_paragraph();
        let mut registry = PostFixerRegistry::new();
        registry.set_max_passes(4);
        registry.register(Box::new(FnViewPostFixer::new("toggle", move |writer: &mut ViewWriter<'_>| {
            let flipped = writer.tree().get(paragraph).attribute("class").is_none();
            if flipped {
                writer.set_attribute(paragraph, "class", "a")?;
            } else {
                writer.remove_attribute(paragraph, "class")?;
            }
            Ok(true)
        })));

        assert_eq!(
            registry.run(&mut tree, &mut selection),
            Err(ViewError::PostFixerLoop { passes: 4 })
        );
    }

    #[test]
    fn test_removed_fixer_no_longer_runs() {
        let (mut tree, mut selection, _) = tree_with_empty_paragraph();
        let mut registry = PostFixerRegistry::new();
        let id = registry.register(Box::new(BlockFiller));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.run(&mut tree, &mut selection).unwrap(), 0);
        assert!(registry.is_empty());
    }
}
