//! # Undo/Redo Stack
//!
//! Tracks undoable batches and reverts them on request.
//!
//! ## Design
//!
//! - Each undoable, data-changing batch becomes one undo step
//! - Undo inverts the step's operations (reverse order), transforms them
//!   against every operation applied after the step, and applies the result
//!   as a transparent batch
//! - That batch becomes the redo step; redo is the same procedure run on it
//! - New steps clear the redo stack
//! - The selection from before the step is restored when it is still valid
//!
//! ## Undo chains
//!
//! A step, its revert, the revert of that revert and so on form a chain.
//! Inside the window an undo rebases over, consecutive chain members cancel
//! out in pairs and are left out of the rebase history. Only an unpaired
//! last member is transformed against.

use crate::controller::EditingController;
use crate::errors::EditorResult;
use folio_model::{transform_sets, Batch, BatchKind, Operation, Selection};
use std::ops::Range;
use tracing::{debug, instrument};

/// Operations reverted together
#[derive(Debug, Clone)]
pub struct UndoStep {
    /// Operations as applied, oldest first
    pub operations: Vec<Operation>,

    /// Document version before the first operation
    pub base_version: u64,

    /// Document version right after the last operation
    pub end_version: u64,

    /// Optional description of this step
    pub description: Option<String>,

    /// Selection to restore once the step is reverted
    pub selection_before: Selection,

    /// Undo chain, for steps produced by a revert
    chain: Option<usize>,
}

impl UndoStep {
    /// Step for a batch that was applied. `None` for batches without an
    /// applied operation.
    pub fn from_batch(batch: &Batch, selection_before: Selection) -> Option<Self> {
        Some(Self {
            operations: batch.operations().to_vec(),
            base_version: batch.base_version()?,
            end_version: batch.end_version()?,
            description: batch.description.clone(),
            selection_before,
            chain: None,
        })
    }

    /// History indices of the step's operations
    pub fn versions(&self) -> Range<u64> {
        self.base_version..self.end_version
    }
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack {
    /// Steps that can be undone (most recent last)
    undo_stack: Vec<UndoStep>,

    /// Steps that can be redone (most recent last)
    redo_stack: Vec<UndoStep>,

    /// Version ranges of each undo chain, in application order
    chains: Vec<Vec<Range<u64>>>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    /// Create an undo stack with custom max levels
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            chains: Vec::new(),
            max_levels,
        }
    }

    /// Record a batch produced by a change. Transparent and selection-only
    /// batches are ignored.
    pub fn record(&mut self, batch: &Batch, selection_before: Selection) {
        if !batch.is_undoable() || !batch.is_data_changing() {
            return;
        }
        if let Some(step) = UndoStep::from_batch(batch, selection_before) {
            self.push_step(step);
        }
    }

    fn push_step(&mut self, step: UndoStep) {
        self.undo_stack.push(step);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // New action invalidates the future
        self.redo_stack.clear();
    }

    /// Undo the most recent step
    #[instrument(skip_all, fields(levels = self.undo_stack.len()))]
    pub fn undo(&mut self, controller: &mut EditingController) -> EditorResult<bool> {
        let Some(step) = self.undo_stack.pop() else {
            return Ok(false);
        };
        match self.revert(&step, controller) {
            Ok(Some(redo)) => self.redo_stack.push(redo),
            Ok(None) => {}
            Err(error) => {
                self.undo_stack.push(step);
                return Err(error);
            }
        }
        Ok(true)
    }

    /// Redo the most recently undone step
    #[instrument(skip_all, fields(levels = self.redo_stack.len()))]
    pub fn redo(&mut self, controller: &mut EditingController) -> EditorResult<bool> {
        let Some(step) = self.redo_stack.pop() else {
            return Ok(false);
        };
        match self.revert(&step, controller) {
            Ok(Some(undo)) => self.undo_stack.push(undo),
            Ok(None) => {}
            Err(error) => {
                self.redo_stack.push(step);
                return Err(error);
            }
        }
        Ok(true)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.chains.clear();
    }

    /// Get description of the next undo step
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().and_then(|step| step.description.as_deref())
    }

    /// Get description of the next redo step
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(|step| step.description.as_deref())
    }

    /// Operations applied from `version` on, without the chain members that
    /// cancel out inside that window
    pub fn rebase_history(&self, history: &[Operation], version: u64) -> Vec<Operation> {
        let mut skipped: Vec<&Range<u64>> = Vec::new();
        for chain in &self.chains {
            let inside: Vec<&Range<u64>> = chain.iter().filter(|versions| versions.start >= version).collect();
            skipped.extend(inside.chunks_exact(2).flatten().copied());
        }
        history
            .iter()
            .enumerate()
            .skip(version as usize)
            .filter(|(index, _)| !skipped.iter().any(|versions| versions.contains(&(*index as u64))))
            .map(|(_, operation)| operation.clone())
            .collect()
    }

    /// Apply the revert of `step`. Returns the step reverting that revert.
    fn revert(&mut self, step: &UndoStep, controller: &mut EditingController) -> EditorResult<Option<UndoStep>> {
        let later = self.rebase_history(controller.document().history(), step.end_version);
        let operations = reverting_operations(step, &later);
        let selection_now = controller.document().selection().clone();
        debug!(
            operations = operations.len(),
            later = later.len(),
            "reverting step"
        );
        let selection = step.selection_before.clone();
        let (_, batches) = controller.change(BatchKind::Transparent, move |writer| {
            for operation in operations {
                writer.apply_operation(operation)?;
            }
            if let Err(error) = writer.set_selection(selection) {
                debug!(%error, "selection from before the step is gone");
            }
            Ok(())
        })?;
        let Some(mut reverse) = batches.first().and_then(|batch| UndoStep::from_batch(batch, selection_now)) else {
            return Ok(None);
        };
        reverse.description = step.description.clone();

        let chain = match step.chain {
            Some(chain) => chain,
            None => {
                self.chains.push(vec![step.versions()]);
                self.chains.len() - 1
            }
        };
        if let Some(members) = self.chains.get_mut(chain) {
            members.push(reverse.versions());
        }
        reverse.chain = Some(chain);
        Ok(Some(reverse))
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations reverting `step`, rebased over `later` (the operations applied
/// after it)
pub fn reverting_operations(step: &UndoStep, later: &[Operation]) -> Vec<Operation> {
    let inverses: Vec<Operation> = step
        .operations
        .iter()
        .rev()
        .map(|operation| {
            let mut inverse = operation.invert();
            inverse.base_version = None;
            inverse
        })
        .collect();
    let (rebased, _) = transform_sets(&inverses, later, true);
    rebased.into_iter().filter(|operation| !operation.is_no_op()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{helpers, Dispatcher};
    use folio_model::{Document, Model, Node, Range};
    use folio_view::View;

    fn controller() -> EditingController {
        let mut model = Model::new(Document::with_roots(&["main"]).unwrap());
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(Node::element("paragraph").with_child(Node::text("Hello")), root)?;
                Ok(())
            })
            .unwrap();
        let mut dispatcher = Dispatcher::new();
        helpers::register_defaults(&mut dispatcher);
        helpers::element_to_element(&mut dispatcher, "paragraph", "p");
        EditingController::new(model, View::new(), dispatcher).unwrap()
    }

    fn insert(controller: &mut EditingController, stack: &mut UndoStack, offset: usize, text: &str) {
        let selection = controller.document().selection().clone();
        let (_, batches) = controller
            .change(BatchKind::Undoable, |writer| {
                let position = writer.document().position("main", vec![0, offset])?;
                writer.insert_text(text, Default::default(), position)
            })
            .unwrap();
        for batch in &batches {
            stack.record(batch, selection.clone());
        }
    }

    fn remove_text(controller: &mut EditingController, stack: &mut UndoStack, from: usize, to: usize) {
        let selection = controller.document().selection().clone();
        let (_, batches) = controller
            .change(BatchKind::Undoable, |writer| {
                let start = writer.document().position("main", vec![0, from])?;
                let end = writer.document().position("main", vec![0, to])?;
                writer.remove(&Range::new(start, end)?)
            })
            .unwrap();
        for batch in &batches {
            stack.record(batch, selection.clone());
        }
    }

    fn text(controller: &EditingController) -> String {
        let root = controller.document().root("main").unwrap();
        controller.document().text_content(root)
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_undo_and_redo_insert() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        insert(&mut controller, &mut stack, 5, " World");
        assert_eq!(text(&controller), "Hello World");

        assert!(stack.undo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello");
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 1);

        assert!(stack.redo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello World");
        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_undo_rebases_over_later_changes() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        insert(&mut controller, &mut stack, 5, "!");
        // A later change not recorded by this stack
        controller
            .change(BatchKind::Transparent, |writer| {
                let position = writer.document().position("main", vec![0, 0])?;
                writer.insert_text(">> ", Default::default(), position)
            })
            .unwrap();
        assert_eq!(text(&controller), ">> Hello!");

        stack.undo(&mut controller).unwrap();
        assert_eq!(text(&controller), ">> Hello");
    }

    #[test]
    fn test_new_step_clears_redo() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        insert(&mut controller, &mut stack, 5, "1");
        stack.undo(&mut controller).unwrap();
        assert_eq!(stack.redo_levels(), 1);

        insert(&mut controller, &mut stack, 5, "2");
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut controller = controller();
        let mut stack = UndoStack::with_max_levels(2);
        for i in 0..3 {
            insert(&mut controller, &mut stack, 5, &i.to_string());
        }
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_nothing_to_undo() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        assert!(!stack.undo(&mut controller).unwrap());
        assert!(!stack.redo(&mut controller).unwrap());
    }

    #[test]
    fn test_linear_undo_over_removed_content() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        insert(&mut controller, &mut stack, 5, "!");
        remove_text(&mut controller, &mut stack, 0, 6);
        assert_eq!(text(&controller), "");

        assert!(stack.undo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello!");
        assert!(stack.undo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello");

        assert!(stack.redo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello!");
        assert!(stack.redo(&mut controller).unwrap());
        assert_eq!(text(&controller), "");

        // Reverts of reverts cancel out as well
        assert!(stack.undo(&mut controller).unwrap());
        assert!(stack.undo(&mut controller).unwrap());
        assert_eq!(text(&controller), "Hello");
    }

    #[test]
    fn test_rebase_history_skips_cancelled_pairs() {
        let mut controller = controller();
        let mut stack = UndoStack::new();
        insert(&mut controller, &mut stack, 5, "1");
        insert(&mut controller, &mut stack, 6, "2");
        let after_first = controller.document().version() - 1;
        stack.undo(&mut controller).unwrap();

        let history = controller.document().history();
        assert_eq!(history.len() as u64, after_first + 2);
        assert!(stack.rebase_history(history, after_first).is_empty());

        stack.redo(&mut controller).unwrap();
        let history = controller.document().history();
        // Step, revert and redo: only the redo is left
        assert_eq!(stack.rebase_history(history, after_first).len(), 1);
        assert_eq!(text(&controller), "Hello12");
    }
}
