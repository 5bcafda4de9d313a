//! Edit scripts: a JSON list of steps replayed against an editor.
//!
//! ```json
//! [
//!   { "step": "insertElement", "at": [0], "name": "paragraph" },
//!   { "step": "insertText", "at": [0, 0], "text": "Hello" },
//!   { "step": "setAttribute", "from": [0, 0], "to": [0, 5], "key": "bold", "value": true },
//!   { "step": "undo" }
//! ]
//! ```
//!
//! Paths are model paths inside `root`, which defaults to `main`.

use anyhow::{Context, Result};
use folio_editor::{Command, Editor, InputEvent};
use folio_model::{Attributes, Document, ModelError, ModelResult, NodeId, Position, Range, Selection};
use folio_view::Renderer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

fn default_root() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    InsertText {
        #[serde(default = "default_root")]
        root: String,
        at: Vec<usize>,
        text: String,
        #[serde(default)]
        attributes: Attributes,
    },
    InsertElement {
        #[serde(default = "default_root")]
        root: String,
        at: Vec<usize>,
        name: String,
        #[serde(default)]
        attributes: Attributes,
    },
    Remove {
        #[serde(default = "default_root")]
        root: String,
        from: Vec<usize>,
        to: Vec<usize>,
    },
    Move {
        #[serde(default = "default_root")]
        root: String,
        from: Vec<usize>,
        to: Vec<usize>,
        target: Vec<usize>,
    },
    /// `value: null` removes the attribute
    SetAttribute {
        #[serde(default = "default_root")]
        root: String,
        from: Vec<usize>,
        to: Vec<usize>,
        key: String,
        value: Option<Value>,
    },
    /// Rename the element right after `at`
    Rename {
        #[serde(default = "default_root")]
        root: String,
        at: Vec<usize>,
        name: String,
    },
    Split {
        #[serde(default = "default_root")]
        root: String,
        at: Vec<usize>,
    },
    AddMarker {
        #[serde(default = "default_root")]
        root: String,
        name: String,
        from: Vec<usize>,
        to: Vec<usize>,
    },
    RemoveMarker {
        name: String,
    },
    Select {
        #[serde(default = "default_root")]
        root: String,
        from: Vec<usize>,
        to: Vec<usize>,
        #[serde(default)]
        backward: bool,
    },
    Execute {
        command: Command,
    },
    Input {
        event: InputEvent,
    },
    Undo,
    Redo,
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Vec<Step>> {
    serde_json::from_str(content).context("invalid edit script")
}

fn range(document: &Document, root: &str, from: &[usize], to: &[usize]) -> ModelResult<Range> {
    Range::new(document.position(root, from.to_vec())?, document.position(root, to.to_vec())?)
}

fn position(document: &Document, root: &str, at: &[usize]) -> ModelResult<Position> {
    document.position(root, at.to_vec())
}

fn element_at(document: &Document, root: &str, at: &[usize]) -> ModelResult<NodeId> {
    let position = position(document, root, at)?;
    let tree = document.tree();
    let parent = tree.parent_at(&position)?;
    tree.node_at_offset(parent, position.offset())
        .filter(|node| tree.is_element(*node))
        .ok_or_else(|| ModelError::PreconditionFailed(format!("no element at {:?} in {}", at, root)))
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::InsertText { .. } => "insertText",
            Step::InsertElement { .. } => "insertElement",
            Step::Remove { .. } => "remove",
            Step::Move { .. } => "move",
            Step::SetAttribute { .. } => "setAttribute",
            Step::Rename { .. } => "rename",
            Step::Split { .. } => "split",
            Step::AddMarker { .. } => "addMarker",
            Step::RemoveMarker { .. } => "removeMarker",
            Step::Select { .. } => "select",
            Step::Execute { .. } => "execute",
            Step::Input { .. } => "input",
            Step::Undo => "undo",
            Step::Redo => "redo",
        }
    }

    /// Run the step. Undo and redo with nothing to revert are not errors.
    pub fn apply<R: Renderer>(&self, editor: &mut Editor<R>) -> Result<()> {
        match self {
            Step::InsertText {
                root,
                at,
                text,
                attributes,
            } => editor.change(|writer| {
                let at = position(writer.document(), root, at)?;
                writer.insert_text(text, attributes.clone(), at)
            })?,
            Step::InsertElement {
                root,
                at,
                name,
                attributes,
            } => editor.change(|writer| {
                let at = position(writer.document(), root, at)?;
                writer.insert_element(name, attributes.clone(), at).map(|_| ())
            })?,
            Step::Remove { root, from, to } => editor.change(|writer| {
                let range = range(writer.document(), root, from, to)?;
                writer.remove(&range)
            })?,
            Step::Move { root, from, to, target } => editor.change(|writer| {
                let range = range(writer.document(), root, from, to)?;
                let target = position(writer.document(), root, target)?;
                writer.move_range(&range, target).map(|_| ())
            })?,
            Step::SetAttribute {
                root,
                from,
                to,
                key,
                value,
            } => editor.change(|writer| {
                let range = range(writer.document(), root, from, to)?;
                writer.set_attribute(key, value.clone(), &range)
            })?,
            Step::Rename { root, at, name } => editor.change(|writer| {
                let element = element_at(writer.document(), root, at)?;
                writer.rename(element, name)
            })?,
            Step::Split { root, at } => editor.change(|writer| {
                let at = position(writer.document(), root, at)?;
                writer.split(&at).map(|_| ())
            })?,
            Step::AddMarker { root, name, from, to } => {
                let range = range(editor.document(), root, from, to)?;
                editor.add_marker(name, range)?
            }
            Step::RemoveMarker { name } => editor.execute(Command::RemoveMarker { name: name.clone() })?,
            Step::Select {
                root,
                from,
                to,
                backward,
            } => {
                let range = range(editor.document(), root, from, to)?;
                editor.set_selection(Selection::new(vec![range], *backward))?
            }
            Step::Execute { command } => editor.execute(command.clone())?,
            Step::Input { event } => editor.observe(event.clone())?,
            Step::Undo => {
                editor.undo()?;
            }
            Step::Redo => {
                editor.redo()?;
            }
        }
        Ok(())
    }
}
