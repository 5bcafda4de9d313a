//! # Editing Controller
//!
//! Coordinates the edit → render pipeline: Change → Flush → Convert → Fix →
//! Reconcile.
//!
//! The controller owns:
//! - the model and its change blocks
//! - the render tree and its post-fixers
//! - the converter registry and the mapper between both trees
//!
//! ## Failure handling
//!
//! A change set is checked for converter coverage before the render tree is
//! touched. When the check fails, or conversion fails half way with a
//! recoverable error, the model operations of the change are reverted
//! (inverses in reverse order) and the error is returned. A half-converted
//! render tree is rebuilt from the model. Invariant violations propagate
//! as they are.

use crate::conversion::{Dispatcher, Mapper};
use crate::errors::{ConversionError, ConversionResult, EditorError, EditorResult};
use folio_common::Classify;
use folio_model::{
    Batch, BatchKind, Document, Model, ModelError, ModelPostFixer, ModelResult, PostFixerId, Selection, Writer,
};
use folio_view::{RenderReport, Renderer, View, ViewPostFixer, ViewPostFixerId, ViewRange, ViewSelection, ViewTree};
use tracing::{debug, instrument, warn};

/// Model, render tree and the conversion between them
#[derive(Debug)]
pub struct EditingController {
    model: Model,
    view: View,
    mapper: Mapper,
    dispatcher: Dispatcher,
}

/// Render selection for a model selection. Ranges that cannot be mapped are
/// left out.
pub fn view_selection(document: &Document, tree: &ViewTree, mapper: &Mapper) -> ViewSelection {
    let selection = document.selection();
    let mut ranges = Vec::new();
    for range in selection.ranges() {
        let start = mapper.to_view_position(document, tree, &range.start);
        let end = mapper.to_view_position(document, tree, &range.end);
        match (start, end) {
            (Ok(start), Ok(end)) => ranges.push(ViewRange::new(start, end)),
            (Err(error), _) | (_, Err(error)) => debug!(%error, "selection range not mapped"),
        }
    }
    ViewSelection::new(ranges, selection.is_backward())
}

impl EditingController {
    /// Take over `model` and convert its attached roots and markers
    pub fn new(model: Model, view: View, dispatcher: Dispatcher) -> EditorResult<Self> {
        let mut controller = Self {
            model,
            view,
            mapper: Mapper::new(),
            dispatcher,
        };
        controller.model.discard_changes();
        controller.model.take_completed_batches();
        controller.rebuild_view()?;
        Ok(controller)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn document(&self) -> &Document {
        self.model.document()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn register_post_fixer(&mut self, fixer: Box<dyn ModelPostFixer>) -> PostFixerId {
        self.model.register_post_fixer(fixer)
    }

    pub fn register_view_post_fixer(&mut self, fixer: Box<dyn ViewPostFixer>) -> ViewPostFixerId {
        self.view.post_fixers_mut().register(fixer)
    }

    pub fn set_max_post_fixer_passes(&mut self, passes: usize) {
        self.model.set_max_post_fixer_passes(passes);
        self.view.post_fixers_mut().set_max_passes(passes);
    }

    /// Run `f` in an outermost change block and bring the render tree up to
    /// date. Returns the closure's value and the batches the block produced.
    #[instrument(skip_all, fields(kind = ?kind))]
    pub fn change<R>(
        &mut self,
        kind: BatchKind,
        f: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> EditorResult<(R, Vec<Batch>)> {
        let selection_before = self.model.document().selection().clone();
        let value = self.model.change_with(kind, f)?;
        let batches = self.model.take_completed_batches();
        let change_sets = self.model.take_change_sets();

        for change_set in &change_sets {
            if let Err(error) = self.dispatcher.check_coverage(self.model.document(), change_set) {
                warn!(%error, "change set has no converter, reverting");
                self.revert(&batches, &selection_before)?;
                return Err(error.into());
            }
        }

        let document = self.model.document();
        let (dispatcher, mapper) = (&mut self.dispatcher, &mut self.mapper);
        let converted = self.view.change_with(|writer| -> ConversionResult<()> {
            for change_set in &change_sets {
                dispatcher.convert_change_set(document, change_set, writer, mapper)?;
            }
            Ok(())
        });
        match converted {
            Ok(()) => {}
            Err(error) if error.is_recoverable() => {
                warn!(%error, "conversion failed, reverting and rebuilding the render tree");
                self.revert(&batches, &selection_before)?;
                self.rebuild_view()?;
                return Err(error.into());
            }
            Err(error) => return Err(error.into()),
        }
        self.sync_selection()?;
        debug!(
            batches = batches.len(),
            change_sets = change_sets.len(),
            "change converted"
        );
        Ok((value, batches))
    }

    /// Apply the inverses of `batches` without reporting them
    fn revert(&mut self, batches: &[Batch], selection: &Selection) -> EditorResult<()> {
        let operations: Vec<_> = batches.iter().flat_map(|batch| batch.operations().iter()).collect();
        self.model
            .change_with(BatchKind::Transparent, |writer| {
                for operation in operations.iter().rev() {
                    let mut inverse = operation.invert();
                    inverse.base_version = None;
                    writer.apply_operation(inverse)?;
                }
                writer.set_selection(selection.clone())
            })
            .map_err(|error| EditorError::Model(ModelError::InvariantViolation(format!("revert failed: {}", error))))?;
        self.model.discard_changes();
        self.model.take_completed_batches();
        Ok(())
    }

    /// Throw the render tree away and convert the model again
    #[instrument(skip_all)]
    pub fn rebuild_view(&mut self) -> EditorResult<()> {
        let view_roots: Vec<String> = self.view.tree().roots().map(|(name, _)| name.to_string()).collect();
        let document = self.model.document();
        let (dispatcher, mapper) = (&mut self.dispatcher, &mut self.mapper);
        mapper.clear();
        self.view.change_with(|writer| -> ConversionResult<()> {
            for name in &view_roots {
                writer.detach_root(name)?;
            }
            for name in document.root_names() {
                dispatcher.convert_root(document, name, writer, mapper)?;
            }
            dispatcher.convert_markers(document, writer, mapper)
        })?;
        self.sync_selection()
    }

    /// Copy the model selection onto the render tree
    fn sync_selection(&mut self) -> EditorResult<()> {
        let selection = view_selection(self.model.document(), self.view.tree(), &self.mapper);
        self.view.change(|writer| writer.set_selection(selection))?;
        Ok(())
    }

    /// Model selection for a render selection
    pub fn to_model_selection(&self, selection: &ViewSelection) -> ConversionResult<Selection> {
        let document = self.model.document();
        let tree = self.view.tree();
        let mut ranges = Vec::new();
        for range in selection.ranges() {
            let start = self.mapper.to_model_position(document, tree, range.start)?;
            let end = self.mapper.to_model_position(document, tree, range.end)?;
            let range = folio_model::Range::new(start, end).map_err(ConversionError::Model)?;
            ranges.push(range);
        }
        Ok(Selection::new(ranges, selection.is_backward()))
    }

    /// Serialize a model root with the editing converters
    pub fn get_data(&mut self, root: &str) -> ConversionResult<String> {
        crate::data::get_data(self.model.document(), &mut self.dispatcher, root)
    }

    /// Push pending render changes to `renderer`
    pub fn render(&mut self, renderer: &mut dyn Renderer) -> EditorResult<RenderReport> {
        Ok(self.view.render(renderer)?)
    }
}
