//! # View
//!
//! Owns the render tree, its selection and the render post-fixers, and
//! pushes changes to a [`Renderer`].
//!
//! ## Design
//!
//! `change` hands out one [`ViewWriter`] for the caller's pass and then runs
//! the post-fixers to a fixed point. `render` reconciles the whole tree
//! against the last committed snapshot, commits the patches and restores
//! the selection as the very last step, once every node it points into
//! exists on the surface.

use crate::errors::{ViewError, ViewResult};
use crate::position::ViewSelection;
use crate::post_fixers::{BlockFiller, PostFixerRegistry};
use crate::reconciler::Reconciler;
use crate::renderer::{RenderReport, Renderer};
use crate::tree::ViewTree;
use crate::writer::ViewWriter;
use folio_common::{Emitter, ListenerId};
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// A render pass committed this many patches
    Rendered { patches: usize },
    /// The selection could not be restored because its nodes are not on
    /// the surface
    SelectionDropped(ViewSelection),
}

#[derive(Debug)]
pub struct View {
    tree: ViewTree,
    selection: ViewSelection,
    post_fixers: PostFixerRegistry,
    reconciler: Reconciler,
    events: Emitter<ViewEvent>,
}

impl View {
    /// View with the block filler registered
    pub fn new() -> Self {
        let mut view = Self::bare();
        view.post_fixers.register(Box::new(BlockFiller));
        view
    }

    /// View without any post-fixer
    pub fn bare() -> Self {
        Self {
            tree: ViewTree::new(),
            selection: ViewSelection::default(),
            post_fixers: PostFixerRegistry::new(),
            reconciler: Reconciler::new(),
            events: Emitter::new(),
        }
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn selection(&self) -> &ViewSelection {
        &self.selection
    }

    pub fn post_fixers_mut(&mut self) -> &mut PostFixerRegistry {
        &mut self.post_fixers
    }

    pub fn on(&mut self, listener: impl FnMut(&ViewEvent) + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Run one writer pass followed by the post-fixers
    pub fn change<R>(&mut self, f: impl FnOnce(&mut ViewWriter<'_>) -> ViewResult<R>) -> ViewResult<R> {
        self.change_with(f)
    }

    /// `change` for callers with their own error type
    pub fn change_with<R, E: From<ViewError>>(
        &mut self,
        f: impl FnOnce(&mut ViewWriter<'_>) -> Result<R, E>,
    ) -> Result<R, E> {
        let result = {
            let mut writer = ViewWriter::new(&mut self.tree, &mut self.selection);
            f(&mut writer)?
        };
        self.post_fixers.run(&mut self.tree, &mut self.selection)?;
        Ok(result)
    }

    pub fn run_post_fixers(&mut self) -> ViewResult<usize> {
        self.post_fixers.run(&mut self.tree, &mut self.selection)
    }

    /// Reconcile and commit to `renderer`, restoring the selection last
    #[instrument(skip_all)]
    pub fn render(&mut self, renderer: &mut dyn Renderer) -> ViewResult<RenderReport> {
        let patches = self.reconciler.reconcile(&self.tree);
        let selection_nodes = self.selection.nodes();
        let report = renderer.commit(&patches, &selection_nodes)?;

        if self.selection.is_empty() {
            renderer.set_selection(None);
        } else if report.realized.len() == selection_nodes.len() {
            renderer.set_selection(Some(&self.selection));
        } else {
            warn!(
                expected = selection_nodes.len(),
                realized = report.realized.len(),
                "selection points at nodes missing from the surface"
            );
            renderer.set_selection(None);
            self.events.fire(&ViewEvent::SelectionDropped(self.selection.clone()));
        }
        self.events.fire(&ViewEvent::Rendered {
            patches: patches.len(),
        });
        Ok(report)
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}
