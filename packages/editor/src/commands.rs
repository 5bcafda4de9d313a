//! # Commands
//!
//! Application-level edits expressed against the model selection. A command
//! runs inside one change block and moves the selection to where typing
//! should continue.

use folio_model::{Attributes, ModelError, ModelResult, NodeId, Position, Range, Selection, Writer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Backward,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Replace the selection with text, keeping the formatting before the caret
    InsertText { text: String },
    /// Delete the selection, or one unit next to the caret
    Delete { direction: Direction },
    /// Split the block at the caret
    SplitBlock,
    /// Flip a boolean text attribute over the selection
    ToggleAttribute { key: String },
    /// Rename the blocks touched by the selection
    SetBlockType { name: String },
    /// Mark the selection
    AddMarker { name: String },
    RemoveMarker { name: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertText { .. } => "insertText",
            Command::Delete { .. } => "delete",
            Command::SplitBlock => "splitBlock",
            Command::ToggleAttribute { .. } => "toggleAttribute",
            Command::SetBlockType { .. } => "setBlockType",
            Command::AddMarker { .. } => "addMarker",
            Command::RemoveMarker { .. } => "removeMarker",
        }
    }

    /// Whether the command changes document data
    pub fn is_data_changing(&self) -> bool {
        !matches!(self, Command::AddMarker { .. } | Command::RemoveMarker { .. })
    }

    pub fn execute(&self, writer: &mut Writer<'_>) -> ModelResult<()> {
        debug!(command = self.name(), "executing command");
        match self {
            Command::InsertText { text } => insert_text(writer, text),
            Command::Delete { direction } => delete(writer, *direction),
            Command::SplitBlock => split_block(writer),
            Command::ToggleAttribute { key } => toggle_attribute(writer, key),
            Command::SetBlockType { name } => set_block_type(writer, name),
            Command::AddMarker { name } => {
                let range = selected_range(writer)?;
                if writer.document().markers().contains(name) {
                    writer.update_marker(name, range)
                } else {
                    writer.add_marker(name, range, false)
                }
            }
            Command::RemoveMarker { name } => writer.remove_marker(name),
        }
    }
}

fn selected_range(writer: &Writer<'_>) -> ModelResult<Range> {
    writer
        .document()
        .selection()
        .first_range()
        .cloned()
        .ok_or_else(|| ModelError::PreconditionFailed("nothing is selected".to_string()))
}

/// Remove the content of `range` and return where it was. Ranges across two
/// sibling blocks also merge those blocks.
pub fn delete_content(writer: &mut Writer<'_>, range: &Range) -> ModelResult<Position> {
    if range.is_collapsed() {
        return Ok(range.start.clone());
    }
    if range.is_flat() {
        writer.remove(range)?;
        return Ok(range.start.clone());
    }
    let tree = writer.document().tree();
    let start_block = tree.parent_at(&range.start)?;
    let end_block = tree.parent_at(&range.end)?;
    let container = match (tree.parent(start_block), tree.parent(end_block)) {
        (Some(a), Some(b)) if a == b => a,
        _ => {
            return Err(ModelError::PreconditionFailed(
                "selection crosses nesting levels".to_string(),
            ))
        }
    };
    let (Some(start_index), Some(end_index)) = (tree.start_offset(start_block), tree.start_offset(end_block)) else {
        return Err(ModelError::InvariantViolation("selected block is detached".to_string()));
    };
    let tail = tree.max_offset(start_block) - range.start.offset();
    let container_position = tree.position_in(container, start_index + 1);

    // Right to left so earlier positions stay valid
    writer.remove(&Range::flat(range.end.with_offset(0), range.end.offset()))?;
    writer.remove(&Range::flat(container_position.clone(), end_index - start_index - 1))?;
    writer.remove(&Range::flat(range.start.clone(), tail))?;
    writer.merge(&container_position)?;
    Ok(range.start.clone())
}

/// Attributes of the text right before `position`
fn attributes_before(writer: &Writer<'_>, position: &Position) -> ModelResult<Attributes> {
    let tree = writer.document().tree();
    let parent = tree.parent_at(position)?;
    let attributes = position
        .offset()
        .checked_sub(1)
        .and_then(|offset| tree.node_covering(parent, offset))
        .filter(|node| !tree.is_element(*node))
        .map(|node| tree.get(node).attributes().clone())
        .unwrap_or_default();
    Ok(attributes)
}

fn insert_text(writer: &mut Writer<'_>, text: &str) -> ModelResult<()> {
    let range = selected_range(writer)?;
    let position = delete_content(writer, &range)?;
    let attributes = attributes_before(writer, &position)?;
    writer.insert_text(text, attributes, position.clone())?;
    writer.set_selection_at(position.shifted(text.chars().count()))
}

/// Element right before (backward) or after (forward) `block` in its parent
fn sibling_block(writer: &Writer<'_>, block: NodeId, direction: Direction) -> Option<NodeId> {
    let tree = writer.document().tree();
    let parent = tree.parent(block)?;
    let index = tree.index_in_parent(block)?;
    let sibling = match direction {
        Direction::Backward => index.checked_sub(1)?,
        Direction::Forward => index + 1,
    };
    tree.children(parent).get(sibling).copied().filter(|node| tree.is_element(*node))
}

fn delete(writer: &mut Writer<'_>, direction: Direction) -> ModelResult<()> {
    let range = selected_range(writer)?;
    if !range.is_collapsed() {
        let position = delete_content(writer, &range)?;
        return writer.set_selection_at(position);
    }
    let caret = range.start;
    let tree = writer.document().tree();
    let block = tree.parent_at(&caret)?;
    let len = tree.max_offset(block);
    match direction {
        Direction::Backward if caret.offset() > 0 => {
            let start = caret.with_offset(caret.offset() - 1);
            writer.remove(&Range::flat(start.clone(), 1))?;
            writer.set_selection_at(start)
        }
        Direction::Forward if caret.offset() < len => writer.remove(&Range::flat(caret, 1)),
        _ => {
            // At a block edge: join with the neighbouring block
            let Some(sibling) = sibling_block(writer, block, direction) else {
                return Ok(());
            };
            let (first, boundary) = match direction {
                Direction::Backward => (sibling, tree.position_before(block)),
                Direction::Forward => (block, tree.position_before(sibling)),
            };
            let Some(boundary) = boundary else {
                return Ok(());
            };
            let first_len = tree.max_offset(first);
            let caret = boundary.with_offset(boundary.offset() - 1).child(first_len);
            writer.merge(&boundary)?;
            writer.set_selection_at(caret)
        }
    }
}

fn split_block(writer: &mut Writer<'_>) -> ModelResult<()> {
    let range = selected_range(writer)?;
    let position = delete_content(writer, &range)?;
    let between = writer.split(&position)?;
    writer.set_selection_at(between.child(0))
}

fn toggle_attribute(writer: &mut Writer<'_>, key: &str) -> ModelResult<()> {
    let range = selected_range(writer)?;
    if range.is_collapsed() {
        return Ok(());
    }
    let document = writer.document();
    let mut all_set = true;
    for flat in document.flat_ranges(&range)? {
        let parent = document.tree().parent_at(&flat.start)?;
        let runs = document
            .tree()
            .attribute_runs(parent, flat.start.offset(), flat.end.offset(), key);
        all_set &= runs.iter().all(|(_, _, value)| value == &Some(Value::Bool(true)));
    }
    let value = if all_set { None } else { Some(Value::Bool(true)) };
    writer.set_attribute(key, value, &range)?;
    // Keep the selection where it was
    writer.set_selection(Selection::new(vec![range], false))
}

fn set_block_type(writer: &mut Writer<'_>, name: &str) -> ModelResult<()> {
    let range = selected_range(writer)?;
    let tree = writer.document().tree();
    let start_block = tree.parent_at(&range.start)?;
    let end_block = tree.parent_at(&range.end)?;
    let mut blocks = vec![start_block];
    if start_block != end_block {
        if let (Some(parent), Some(from), Some(to)) = (
            tree.parent(start_block),
            tree.index_in_parent(start_block),
            tree.index_in_parent(end_block),
        ) {
            if tree.parent(end_block) == Some(parent) {
                blocks = tree.children(parent)[from..=to]
                    .iter()
                    .copied()
                    .filter(|node| tree.is_element(*node))
                    .collect();
            }
        }
    }
    for block in blocks {
        if !writer.document().tree().is_root(block) {
            writer.rename(block, name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::{Document, Model, Node};

    fn model() -> Model {
        let mut model = Model::new(Document::with_roots(&["main"]).unwrap());
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(
                    vec![
                        Node::element("paragraph").with_child(Node::text("foo")),
                        Node::element("paragraph").with_child(Node::text("bar")),
                    ],
                    root,
                )?;
                Ok(())
            })
            .unwrap();
        model
    }

    fn select(model: &mut Model, start: Vec<usize>, end: Vec<usize>) {
        model
            .change(|writer| {
                let start = writer.document().position("main", start)?;
                let end = writer.document().position("main", end)?;
                writer.set_selection(Selection::new(vec![Range::new(start, end)?], false))
            })
            .unwrap();
    }

    fn run(model: &mut Model, command: Command) {
        model.change(|writer| command.execute(writer)).unwrap();
    }

    fn blocks(model: &Model) -> Vec<String> {
        let document = model.document();
        let root = document.root("main").unwrap();
        document
            .children(root)
            .iter()
            .map(|block| format!("{}:{}", document.node(*block).name(), document.text_content(*block)))
            .collect()
    }

    #[test]
    fn test_insert_text_replaces_selection() {
        let mut model = model();
        select(&mut model, vec![0, 1], vec![0, 2]);
        run(&mut model, Command::InsertText { text: "XY".into() });
        assert_eq!(blocks(&model), vec!["paragraph:fXYo", "paragraph:bar"]);
        let caret = model.document().selection().focus().cloned().unwrap();
        assert_eq!(caret.path, vec![0, 3]);
    }

    #[test]
    fn test_insert_text_inherits_formatting() {
        let mut model = model();
        select(&mut model, vec![0, 0], vec![0, 3]);
        run(&mut model, Command::ToggleAttribute { key: "bold".into() });
        select(&mut model, vec![0, 3], vec![0, 3]);
        run(&mut model, Command::InsertText { text: "d".into() });
        let paragraph = model.document().children(model.document().root("main").unwrap())[0];
        let text = model.document().children(paragraph)[0];
        assert_eq!(model.document().node(text).data(), "food");
        assert_eq!(model.document().node(text).attribute("bold"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_delete_across_blocks_merges_them() {
        let mut model = model();
        select(&mut model, vec![0, 2], vec![1, 1]);
        run(&mut model, Command::Delete { direction: Direction::Backward });
        assert_eq!(blocks(&model), vec!["paragraph:foar"]);
    }

    #[test]
    fn test_backspace_at_block_start_merges() {
        let mut model = model();
        select(&mut model, vec![1, 0], vec![1, 0]);
        run(&mut model, Command::Delete { direction: Direction::Backward });
        assert_eq!(blocks(&model), vec!["paragraph:foobar"]);
        let caret = model.document().selection().focus().cloned().unwrap();
        assert_eq!(caret.path, vec![0, 3]);
    }

    #[test]
    fn test_delete_forward_and_backward_characters() {
        let mut model = model();
        select(&mut model, vec![0, 1], vec![0, 1]);
        run(&mut model, Command::Delete { direction: Direction::Forward });
        run(&mut model, Command::Delete { direction: Direction::Backward });
        assert_eq!(blocks(&model), vec!["paragraph:o", "paragraph:bar"]);
    }

    #[test]
    fn test_split_block() {
        let mut model = model();
        select(&mut model, vec![0, 1], vec![0, 1]);
        run(&mut model, Command::SplitBlock);
        assert_eq!(blocks(&model), vec!["paragraph:f", "paragraph:oo", "paragraph:bar"]);
        let caret = model.document().selection().focus().cloned().unwrap();
        assert_eq!(caret.path, vec![1, 0]);
    }

    #[test]
    fn test_toggle_attribute_twice_clears_it() {
        let mut model = model();
        select(&mut model, vec![0, 0], vec![0, 3]);
        run(&mut model, Command::ToggleAttribute { key: "bold".into() });
        run(&mut model, Command::ToggleAttribute { key: "bold".into() });
        let paragraph = model.document().children(model.document().root("main").unwrap())[0];
        let text = model.document().children(paragraph)[0];
        assert!(model.document().node(text).attributes().is_empty());
    }

    #[test]
    fn test_set_block_type_renames_every_touched_block() {
        let mut model = model();
        select(&mut model, vec![0, 1], vec![1, 1]);
        run(&mut model, Command::SetBlockType { name: "heading".into() });
        assert_eq!(blocks(&model), vec!["heading:foo", "heading:bar"]);
    }

    #[test]
    fn test_markers_follow_selection() {
        let mut model = model();
        select(&mut model, vec![0, 0], vec![0, 2]);
        run(&mut model, Command::AddMarker { name: "comment:1".into() });
        select(&mut model, vec![1, 0], vec![1, 2]);
        run(&mut model, Command::AddMarker { name: "comment:1".into() });
        let marker = model.document().markers().get("comment:1").cloned().unwrap();
        assert_eq!(marker.range.start.path, vec![1, 0]);

        run(&mut model, Command::RemoveMarker { name: "comment:1".into() });
        assert!(model.document().markers().is_empty());
    }

    #[test]
    fn test_command_script_format() {
        let command: Command = serde_json::from_str(r#"{"command":"delete","direction":"backward"}"#).unwrap();
        assert_eq!(command, Command::Delete { direction: Direction::Backward });
    }
}
