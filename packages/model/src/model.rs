//! # Model and Change Blocks
//!
//! [`Model`] wraps a [`Document`] and controls when it may change. Changes
//! happen inside change blocks:
//!
//! ```rust,ignore
//! model.change(|writer| {
//!     writer.insert_text("Hello", Attributes::new(), position)?;
//!     Ok(())
//! })?;
//! ```
//!
//! or with an explicit guard, which can be nested:
//!
//! ```rust,ignore
//! let mut block = model.begin_change();
//! block.insert_text("a", Attributes::new(), position.clone())?;
//! {
//!     let mut inner = block.nested();
//!     inner.insert_text("b", Attributes::new(), position)?;
//! }
//! block.end()?;
//! ```
//!
//! ## Closing the outermost block
//!
//! 1. Model post-fixers run until none of them reports a change
//! 2. The differ is flushed into a [`ChangeSet`]
//! 3. The batch is handed over to whoever records history (undo)
//!
//! Nested blocks only decrement the depth.

use crate::batch::{Batch, BatchKind};
use crate::differ::ChangeSet;
use crate::document::{Document, DocumentEvent};
use crate::errors::{ModelError, ModelResult};
use crate::writer::Writer;
use folio_common::{Classify, ListenerId};
use std::ops::{Deref, DerefMut};
use tracing::{debug, error, instrument, warn};

/// Default cap on post-fixer passes per change block
pub const DEFAULT_MAX_POST_FIXER_PASSES: usize = 100;

/// Hook that may amend the document at the end of every outermost change block
pub trait ModelPostFixer: std::fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Apply corrections through the writer. Returns whether anything changed.
    fn fix(&mut self, writer: &mut Writer<'_>) -> ModelResult<bool>;
}

/// Post-fixer backed by a closure
pub struct FnPostFixer<F> {
    name: String,
    fix: F,
}

impl<F> FnPostFixer<F>
where
    F: FnMut(&mut Writer<'_>) -> ModelResult<bool>,
{
    pub fn new(name: impl Into<String>, fix: F) -> Self {
        Self { name: name.into(), fix }
    }
}

impl<F> std::fmt::Debug for FnPostFixer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPostFixer").field("name", &self.name).finish()
    }
}

impl<F> ModelPostFixer for FnPostFixer<F>
where
    F: FnMut(&mut Writer<'_>) -> ModelResult<bool>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fix(&mut self, writer: &mut Writer<'_>) -> ModelResult<bool> {
        (self.fix)(writer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostFixerId(u64);

#[derive(Debug)]
pub struct Model {
    pub(crate) document: Document,
    pub(crate) depth: usize,
    pub(crate) batch: Option<Batch>,
    pub(crate) selection_changed: bool,
    completed_batches: Vec<Batch>,
    change_sets: Vec<ChangeSet>,
    post_fixers: Vec<(PostFixerId, Box<dyn ModelPostFixer>)>,
    next_post_fixer: u64,
    max_post_fixer_passes: usize,
}

impl Model {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            depth: 0,
            batch: None,
            selection_changed: false,
            completed_batches: Vec::new(),
            change_sets: Vec::new(),
            post_fixers: Vec::new(),
            next_post_fixer: 0,
            max_post_fixer_passes: DEFAULT_MAX_POST_FIXER_PASSES,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_in_change_block(&self) -> bool {
        self.depth > 0
    }

    pub fn set_max_post_fixer_passes(&mut self, passes: usize) {
        self.max_post_fixer_passes = passes.max(1);
    }

    pub fn on(&mut self, listener: impl FnMut(&DocumentEvent) + 'static) -> ListenerId {
        self.document.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.document.off(id)
    }

    /// Register a post-fixer. Post-fixers run in registration order.
    pub fn register_post_fixer(&mut self, fixer: Box<dyn ModelPostFixer>) -> PostFixerId {
        let id = PostFixerId(self.next_post_fixer);
        self.next_post_fixer += 1;
        self.post_fixers.push((id, fixer));
        id
    }

    pub fn remove_post_fixer(&mut self, id: PostFixerId) -> bool {
        let before = self.post_fixers.len();
        self.post_fixers.retain(|(existing, _)| *existing != id);
        self.post_fixers.len() != before
    }

    /// Open an undoable change block
    pub fn begin_change(&mut self) -> ChangeBlock<'_> {
        self.begin_change_with(BatchKind::Undoable)
    }

    /// Open a change block. `kind` only matters for the outermost block.
    pub fn begin_change_with(&mut self, kind: BatchKind) -> ChangeBlock<'_> {
        if self.depth == 0 {
            self.batch = Some(Batch::new(kind));
            self.selection_changed = false;
        }
        self.depth += 1;
        ChangeBlock {
            writer: Writer { model: self },
            ended: false,
        }
    }

    /// Run `f` inside an undoable change block. On a recoverable error the
    /// operations `f` applied are rolled back before the error is returned.
    pub fn change<R>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> ModelResult<R> {
        self.change_with(BatchKind::Undoable, f)
    }

    pub fn change_with<R>(
        &mut self,
        kind: BatchKind,
        f: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let mut block = self.begin_change_with(kind);
        let start = block.operation_count();
        let result = match f(&mut *block) {
            Ok(value) => Ok(value),
            Err(error) if error.is_recoverable() => {
                warn!(%error, "change rejected, rolling back");
                block.rollback_to(start)?;
                Err(error)
            }
            Err(error) => Err(error),
        };
        let ended = block.end();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Change sets produced by closed outermost blocks, oldest first
    pub fn take_change_sets(&mut self) -> Vec<ChangeSet> {
        std::mem::take(&mut self.change_sets)
    }

    /// Batches closed since the last call, oldest first
    pub fn take_completed_batches(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.completed_batches)
    }

    /// Drop buffered and pending changes without reporting them
    pub fn discard_changes(&mut self) {
        self.document.discard_changes();
        self.change_sets.clear();
    }

    #[instrument(level = "debug", skip(self), fields(depth = self.depth))]
    fn end_change(&mut self) -> ModelResult<()> {
        if self.depth > 1 {
            self.depth -= 1;
            return Ok(());
        }

        let fixed = self.run_post_fixers();
        self.depth = 0;

        let change_set = self.document.flush_changes();
        if let Some(batch) = self.batch.take() {
            debug!(
                operations = batch.len(),
                kind = ?batch.kind,
                changes = change_set.changes.len(),
                "change block closed"
            );
            if !batch.is_empty() {
                self.completed_batches.push(batch);
            }
        }
        if !change_set.is_empty() || self.selection_changed {
            self.change_sets.push(change_set);
        }
        self.selection_changed = false;
        fixed
    }

    fn run_post_fixers(&mut self) -> ModelResult<()> {
        if self.post_fixers.is_empty() {
            return Ok(());
        }
        let mut fixers = std::mem::take(&mut self.post_fixers);
        let result = self.post_fixer_passes(&mut fixers);
        // Keep fixers registered while the loop ran
        fixers.append(&mut self.post_fixers);
        self.post_fixers = fixers;
        result
    }

    fn post_fixer_passes(&mut self, fixers: &mut [(PostFixerId, Box<dyn ModelPostFixer>)]) -> ModelResult<()> {
        for pass in 1..=self.max_post_fixer_passes {
            let mut changed = false;
            for (_, fixer) in fixers.iter_mut() {
                let mut writer = Writer { model: self };
                if fixer.fix(&mut writer)? {
                    debug!(fixer = fixer.name(), pass, "model post-fixer changed the document");
                    changed = true;
                    break;
                }
            }
            if !changed {
                return Ok(());
            }
        }
        error!(passes = self.max_post_fixer_passes, "model post-fixers did not settle");
        Err(ModelError::PostFixerLoop {
            passes: self.max_post_fixer_passes,
        })
    }
}

/// Scope guard for a change block. Dereferences to the [`Writer`].
pub struct ChangeBlock<'a> {
    writer: Writer<'a>,
    ended: bool,
}

impl<'a> ChangeBlock<'a> {
    /// Open a nested block sharing this block's batch
    pub fn nested(&mut self) -> ChangeBlock<'_> {
        self.writer.model.depth += 1;
        ChangeBlock {
            writer: Writer {
                model: &mut *self.writer.model,
            },
            ended: false,
        }
    }

    /// Close the block, reporting post-fixer failures
    pub fn end(mut self) -> ModelResult<()> {
        self.ended = true;
        self.writer.model.end_change()
    }
}

impl<'a> Deref for ChangeBlock<'a> {
    type Target = Writer<'a>;

    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl<'a> DerefMut for ChangeBlock<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

impl Drop for ChangeBlock<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(error) = self.writer.model.end_change() {
                error!(%error, "change block closed with an error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Attributes, Node};
    use crate::position::Position;

    fn model() -> Model {
        Model::new(Document::with_roots(&["main"]).unwrap())
    }

    #[test]
    fn test_only_outermost_block_flushes() {
        let mut model = model();
        let root = model.document().root("main").unwrap();
        {
            let mut block = model.begin_change();
            block
                .insert(Node::element("paragraph"), Position::new(root, vec![0]))
                .unwrap();
            {
                let mut inner = block.nested();
                inner
                    .insert(Node::element("paragraph"), Position::new(root, vec![1]))
                    .unwrap();
            }
            assert!(block.document().has_buffered_changes());
        }
        let change_sets = model.take_change_sets();
        assert_eq!(change_sets.len(), 1);
        assert_eq!(change_sets[0].changes.len(), 1);
        let batches = model.take_completed_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_recoverable_error_rolls_back() {
        let mut model = model();
        let root = model.document().root("main").unwrap();
        let result = model.change(|writer| {
            writer.insert(Node::element("paragraph"), Position::new(root, vec![0]))?;
            writer.insert(Node::element("paragraph"), Position::new(root, vec![5]))?;
            Ok(())
        });
        assert!(matches!(result, Err(ModelError::InvalidPosition(_))));
        assert!(model.document().children(root).is_empty());
        // insert + its inverse
        assert_eq!(model.document().version(), 2);
        assert!(model.take_change_sets().is_empty());
    }

    #[test]
    fn test_post_fixer_runs_to_fixed_point() {
        let mut model = model();
        let root = model.document().root("main").unwrap();
        // Every root must hold at least one paragraph
        model.register_post_fixer(Box::new(FnPostFixer::new("empty-root", move |writer: &mut Writer<'_>| {
            if writer.document().children(root).is_empty() {
                writer.insert_element("paragraph", Attributes::new(), Position::new(root, vec![0]))?;
                return Ok(true);
            }
            Ok(false)
        })));

        model
            .change(|writer| writer.set_selection_at(Position::new(root, vec![0])))
            .unwrap();
        assert_eq!(model.document().children(root).len(), 1);
        let batches = model.take_completed_batches();
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn test_runaway_post_fixer_is_an_invariant_violation() {
        let mut model = model();
        let root = model.document().root("main").unwrap();
        model.set_max_post_fixer_passes(5);
        model.register_post_fixer(Box::new(FnPostFixer::new("runaway", move |writer: &mut Writer<'_>| {
            writer.insert_element("paragraph", Attributes::new(), Position::new(root, vec![0]))?;
            Ok(true)
        })));

        let result = model.change(|_| Ok(()));
        assert_eq!(result, Err(ModelError::PostFixerLoop { passes: 5 }));
        assert!(!folio_common::Classify::is_recoverable(&ModelError::PostFixerLoop { passes: 5 }));
    }
}
