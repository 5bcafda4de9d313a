//! # Input Observer
//!
//! Turns raw input events from the rendering surface into editor actions.
//! Text typed while a composition is open is held back until the
//! composition ends, so an input method only produces one insertion.

use crate::commands::{Command, Direction};
use folio_view::ViewPosition;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    Focus,
    Blur,
    /// Selection moved on the surface, in render positions
    SelectionChange { anchor: ViewPosition, focus: ViewPosition },
    InsertText { text: String },
    Delete { direction: Direction },
    Enter,
    CompositionStart,
    /// Composition committed `text`
    CompositionEnd { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Focus(bool),
    Select { anchor: ViewPosition, focus: ViewPosition },
    Execute(Command),
    Ignore,
}

#[derive(Debug, Default)]
pub struct InputObserver {
    composing: bool,
}

impl InputObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn handle(&mut self, event: InputEvent) -> InputAction {
        trace!(event = ?event, composing = self.composing, "input event");
        match event {
            InputEvent::Focus => InputAction::Focus(true),
            InputEvent::Blur => {
                self.composing = false;
                InputAction::Focus(false)
            }
            InputEvent::CompositionStart => {
                self.composing = true;
                InputAction::Ignore
            }
            InputEvent::CompositionEnd { text } => {
                self.composing = false;
                if text.is_empty() {
                    InputAction::Ignore
                } else {
                    InputAction::Execute(Command::InsertText { text })
                }
            }
            _ if self.composing => InputAction::Ignore,
            InputEvent::SelectionChange { anchor, focus } => InputAction::Select { anchor, focus },
            InputEvent::InsertText { text } => InputAction::Execute(Command::InsertText { text }),
            InputEvent::Delete { direction } => InputAction::Execute(Command::Delete { direction }),
            InputEvent::Enter => InputAction::Execute(Command::SplitBlock),
        }
    }
}
