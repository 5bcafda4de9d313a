//! # Folio Editor
//!
//! Editing engine on top of the document model and the render tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: tree + operations + batches + differ │
//! └─────────────────────────────────────────────┘
//!                     ↓ change sets
//! ┌─────────────────────────────────────────────┐
//! │ editor: conversion + controller             │
//! │  - Dispatch change sets to converters       │
//! │  - Map positions between both trees         │
//! │  - Revert changes that cannot be converted  │
//! │  - Undo/redo over concurrent history        │
//! └─────────────────────────────────────────────┘
//!                     ↓ render changes
//! ┌─────────────────────────────────────────────┐
//! │ view: render tree → reconciler → renderer   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Model is source of truth**: the render tree is derived and can be rebuilt
//! 2. **Every change is operations**: undo and collaboration work on the same log
//! 3. **Converters are explicit**: content without a converter is rejected
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_editor::{Command, Editor, EditorConfig};
//! use folio_view::RecordingRenderer;
//!
//! let mut editor = Editor::new(EditorConfig::default(), RecordingRenderer::new())?;
//! editor.execute(Command::InsertText { text: "Hello".into() })?;
//! editor.undo()?;
//!
//! let html = editor.get_data("main")?;
//! ```

pub mod commands;
pub mod config;
pub mod controller;
pub mod conversion;
pub mod data;
pub mod editor;
mod errors;
pub mod observer;
pub mod undo_stack;

pub use commands::{delete_content, Command, Direction};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use controller::{view_selection, EditingController};
pub use conversion::{ConversionApi, ConversionEvent, Dispatcher, EventKey, Item, Mapper};
pub use data::get_data;
pub use editor::{Editor, EditorEvent};
pub use errors::{ConversionError, ConversionResult, EditorError, EditorResult};
pub use observer::{InputAction, InputEvent, InputObserver};
pub use undo_stack::{reverting_operations, UndoStack, UndoStep};
