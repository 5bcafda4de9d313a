//! # Editor
//!
//! The facade applications talk to. Wires the configuration, the editing
//! controller, undo, input handling and a renderer together.

use crate::commands::Command;
use crate::config::EditorConfig;
use crate::controller::EditingController;
use crate::conversion::{helpers, Dispatcher};
use crate::errors::{EditorError, EditorResult};
use crate::observer::{InputAction, InputEvent, InputObserver};
use crate::undo_stack::UndoStack;
use folio_common::{Change, Emitter, ListenerId, Observable};
use folio_model::{BatchKind, Document, Model, ModelResult, Range, Selection, Writer};
use folio_view::{RenderReport, Renderer, View, ViewPosition, ViewRange, ViewSelection};
use std::cmp::Ordering;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// A change reached the render tree
    Changed {
        version: u64,
        description: Option<String>,
    },
    /// Pending render changes were committed to the renderer
    Rendered { realized: usize },
    ReadOnlyChanged(bool),
    FocusChanged(bool),
}

pub struct Editor<R: Renderer> {
    config: EditorConfig,
    controller: EditingController,
    undo_stack: UndoStack,
    observer: InputObserver,
    renderer: R,
    read_only: Observable<bool>,
    focused: Observable<bool>,
    events: Emitter<EditorEvent>,
}

impl<R: Renderer> Editor<R> {
    /// Editor with the standard converters
    pub fn new(config: EditorConfig, renderer: R) -> EditorResult<Self> {
        let mut dispatcher = Dispatcher::new();
        helpers::register_standard(&mut dispatcher);
        Self::with_dispatcher(config, renderer, dispatcher)
    }

    #[instrument(skip_all, fields(roots = ?config.roots))]
    pub fn with_dispatcher(config: EditorConfig, renderer: R, dispatcher: Dispatcher) -> EditorResult<Self> {
        config.validate()?;
        let mut model = Model::new(Document::with_roots(&config.roots)?);
        model.set_max_post_fixer_passes(config.max_post_fixer_passes);
        let mut view = View::new();
        view.post_fixers_mut().set_max_passes(config.max_post_fixer_passes);
        let controller = EditingController::new(model, view, dispatcher)?;

        let mut editor = Self {
            undo_stack: UndoStack::with_max_levels(config.undo_levels),
            observer: InputObserver::new(),
            read_only: Observable::new(config.read_only),
            focused: Observable::new(false),
            events: Emitter::new(),
            controller,
            renderer,
            config,
        };
        editor.render()?;
        info!(roots = editor.config.roots.len(), "editor ready");
        Ok(editor)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        self.controller.document()
    }

    pub fn controller(&self) -> &EditingController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut EditingController {
        &mut self.controller
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn on(&mut self, listener: impl FnMut(&EditorEvent) + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn is_read_only(&self) -> bool {
        *self.read_only.get()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        if self.read_only.set(read_only) {
            self.events.fire(&EditorEvent::ReadOnlyChanged(read_only));
        }
    }

    pub fn on_read_only_change(&mut self, listener: impl FnMut(&Change<bool>) + 'static) -> ListenerId {
        self.read_only.on_change(listener)
    }

    pub fn is_focused(&self) -> bool {
        *self.focused.get()
    }

    fn ensure_writable(&self) -> EditorResult<()> {
        if self.is_read_only() {
            Err(EditorError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Run `f` as one undoable change and render the result
    pub fn change<T>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> ModelResult<T>) -> EditorResult<T> {
        self.ensure_writable()?;
        self.change_described(None, f)
    }

    fn change_described<T>(
        &mut self,
        description: Option<&str>,
        f: impl FnOnce(&mut Writer<'_>) -> ModelResult<T>,
    ) -> EditorResult<T> {
        let selection_before = self.controller.document().selection().clone();
        let (value, batches) = self.controller.change(BatchKind::Undoable, f)?;
        for mut batch in batches {
            batch.description = description.map(str::to_string);
            self.undo_stack.record(&batch, selection_before.clone());
        }
        self.after_change(description)?;
        Ok(value)
    }

    fn after_change(&mut self, description: Option<&str>) -> EditorResult<()> {
        self.events.fire(&EditorEvent::Changed {
            version: self.controller.document().version(),
            description: description.map(str::to_string),
        });
        self.render()?;
        Ok(())
    }

    /// Run a command against the current selection. Marker commands are
    /// allowed while read-only.
    pub fn execute(&mut self, command: Command) -> EditorResult<()> {
        if command.is_data_changing() {
            self.ensure_writable()?;
        }
        self.change_described(Some(command.name()), |writer| command.execute(writer))
    }

    pub fn undo(&mut self) -> EditorResult<bool> {
        self.ensure_writable()?;
        let undone = self.undo_stack.undo(&mut self.controller)?;
        if undone {
            self.after_change(Some("undo"))?;
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> EditorResult<bool> {
        self.ensure_writable()?;
        let redone = self.undo_stack.redo(&mut self.controller)?;
        if redone {
            self.after_change(Some("redo"))?;
        }
        Ok(redone)
    }

    /// Handle an input event from the rendering surface
    pub fn observe(&mut self, event: InputEvent) -> EditorResult<()> {
        match self.observer.handle(event) {
            InputAction::Ignore => Ok(()),
            InputAction::Focus(focused) => {
                if self.focused.set(focused) {
                    self.events.fire(&EditorEvent::FocusChanged(focused));
                }
                Ok(())
            }
            InputAction::Select { anchor, focus } => self.select(anchor, focus),
            InputAction::Execute(command) => self.execute(command),
        }
    }

    fn select(&mut self, anchor: ViewPosition, focus: ViewPosition) -> EditorResult<()> {
        let tree = self.controller.view().tree();
        let backward = tree.compare(&anchor, &focus) == Some(Ordering::Greater);
        let range = if backward {
            ViewRange::new(focus, anchor)
        } else {
            ViewRange::new(anchor, focus)
        };
        let selection = self
            .controller
            .to_model_selection(&ViewSelection::new(vec![range], backward))?;
        self.set_selection(selection)
    }

    /// Move the model selection. Allowed while read-only.
    pub fn set_selection(&mut self, selection: Selection) -> EditorResult<()> {
        self.controller
            .change(BatchKind::Transparent, |writer| writer.set_selection(selection))?;
        self.render()?;
        Ok(())
    }

    /// Add or move a marker. Allowed while read-only.
    pub fn add_marker(&mut self, name: &str, range: Range) -> EditorResult<()> {
        self.change_described(Some("addMarker"), |writer| {
            if writer.document().markers().contains(name) {
                writer.update_marker(name, range)
            } else {
                writer.add_marker(name, range, false)
            }
        })
    }

    /// Serialized content of a root
    pub fn get_data(&mut self, root: &str) -> EditorResult<String> {
        Ok(self.controller.get_data(root)?)
    }

    /// Commit pending render changes to the renderer
    pub fn render(&mut self) -> EditorResult<RenderReport> {
        let report = self.controller.render(&mut self.renderer)?;
        self.events.fire(&EditorEvent::Rendered {
            realized: report.realized.len(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Direction;
    use folio_model::{Node, Position};
    use folio_view::RecordingRenderer;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn editor() -> Editor<RecordingRenderer> {
        let mut editor = Editor::new(EditorConfig::default(), RecordingRenderer::new()).unwrap();
        editor
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(Node::element("paragraph").with_child(Node::text("Hello")), root)?;
                writer.set_selection(Selection::caret(writer.document().position("main", vec![0, 5])?))
            })
            .unwrap();
        editor
    }

    #[test]
    fn test_typing_reaches_renderer() {
        let mut editor = editor();
        editor.observe(InputEvent::InsertText { text: "!".into() }).unwrap();
        assert_eq!(editor.renderer().to_html(), "<div><p>Hello!</p></div>");
        assert_eq!(editor.get_data("main").unwrap(), "<p>Hello!</p>");
    }

    #[test]
    fn test_read_only_blocks_edits() {
        let mut editor = editor();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        editor.on(move |event| sink.borrow_mut().push(event.clone()));

        editor.set_read_only(true);
        let error = editor.execute(Command::InsertText { text: "x".into() }).unwrap_err();
        assert!(matches!(error, EditorError::ReadOnly));
        assert!(matches!(editor.undo(), Err(EditorError::ReadOnly)));
        // Markers are not content
        editor.execute(Command::AddMarker { name: "comment:1".into() }).unwrap();
        assert_eq!(seen.borrow()[0], EditorEvent::ReadOnlyChanged(true));
    }

    #[test]
    fn test_undo_restores_text_and_selection() {
        let mut editor = editor();
        let caret = editor.document().selection().clone();
        editor.execute(Command::InsertText { text: " World".into() }).unwrap();
        assert_eq!(editor.undo_stack().undo_description(), Some("insertText"));

        assert!(editor.undo().unwrap());
        assert_eq!(editor.get_data("main").unwrap(), "<p>Hello</p>");
        assert_eq!(editor.document().selection(), &caret);

        assert!(editor.redo().unwrap());
        assert_eq!(editor.get_data("main").unwrap(), "<p>Hello World</p>");
    }

    #[test]
    fn test_selection_change_from_surface() {
        let mut editor = editor();
        let tree = editor.controller().view().tree();
        let paragraph = tree.children(tree.root("main").unwrap())[0];
        let text = tree.children(paragraph)[0];
        editor
            .observe(InputEvent::SelectionChange {
                anchor: ViewPosition::new(text, 4),
                focus: ViewPosition::new(text, 1),
            })
            .unwrap();
        let selection = editor.document().selection();
        assert!(selection.is_backward());
        let root = editor.document().root("main").unwrap();
        assert_eq!(selection.ranges()[0].start, Position::new(root, vec![0, 1]));

        editor.observe(InputEvent::Delete { direction: Direction::Backward }).unwrap();
        assert_eq!(editor.get_data("main").unwrap(), "<p>Ho</p>");
    }

    #[test]
    fn test_focus_events() {
        let mut editor = editor();
        editor.observe(InputEvent::Focus).unwrap();
        assert!(editor.is_focused());
        editor.observe(InputEvent::Blur).unwrap();
        assert!(!editor.is_focused());
    }
}
