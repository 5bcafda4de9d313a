//! # Render Writer
//!
//! Scoped, exclusive write access to the render tree for one conversion or
//! post-fixer pass. Nodes are created detached and then inserted.
//!
//! ## Attribute elements
//!
//! Formatting wrappers are not structural. `break_attributes` splits text
//! and wrappers so a position lands directly inside the nearest container,
//! `merge_attributes` joins equal neighbours again. `wrap` and `unwrap` are
//! built on both.

use crate::errors::{ViewError, ViewResult};
use crate::node::{ViewKind, ViewNodeData, ViewNodeId};
use crate::position::{ViewPosition, ViewRange, ViewSelection};
use crate::tree::ViewTree;
use tracing::trace;

pub struct ViewWriter<'a> {
    tree: &'a mut ViewTree,
    selection: &'a mut ViewSelection,
    changed: bool,
}

fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(index, _)| index)
}

impl<'a> ViewWriter<'a> {
    pub(crate) fn new(tree: &'a mut ViewTree, selection: &'a mut ViewSelection) -> Self {
        Self {
            tree,
            selection,
            changed: false,
        }
    }

    pub fn tree(&self) -> &ViewTree {
        self.tree
    }

    pub fn selection(&self) -> &ViewSelection {
        self.selection
    }

    /// Whether this writer modified the tree
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    fn check(&self, id: ViewNodeId) -> ViewResult<()> {
        if self.tree.contains(id) {
            Ok(())
        } else {
            Err(ViewError::NodeNotFound(id))
        }
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    fn create(&mut self, kind: ViewKind, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        let mut data = ViewNodeData::new(kind, name);
        data.attributes = attributes
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.tree.alloc(data)
    }

    pub fn create_container(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewKind::Container, name, attributes)
    }

    pub fn create_attribute_element(&mut self, name: &str, attributes: &[(&str, &str)], priority: i32) -> ViewNodeId {
        let id = self.create(ViewKind::Attribute, name, attributes);
        self.tree.data_mut(id).priority = priority;
        id
    }

    pub fn create_empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewKind::Empty, name, attributes)
    }

    pub fn create_ui(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewKind::Ui, name, attributes)
    }

    pub fn create_text(&mut self, data: &str) -> ViewNodeId {
        let id = self.create(ViewKind::Text, "", &[]);
        self.tree.data_mut(id).text = data.to_string();
        id
    }

    pub fn create_root(&mut self, name: &str, element_name: &str) -> ViewResult<ViewNodeId> {
        if self.tree.root(name).is_some() {
            return Err(ViewError::invalid_position(format!("render root `{}` already exists", name)));
        }
        self.changed = true;
        Ok(self.tree.add_root(name, element_name))
    }

    pub fn detach_root(&mut self, name: &str) -> ViewResult<ViewNodeId> {
        let root = self
            .tree
            .remove_root(name)
            .ok_or_else(|| ViewError::RootNotFound(name.to_string()))?;
        let ranges = self.selection.ranges().iter().copied();
        let kept: Vec<ViewRange> = ranges.filter(|range| self.tree.root_of(range.start.parent) != root).collect();
        *self.selection = ViewSelection::new(kept, self.selection.is_backward());
        self.changed = true;
        Ok(root)
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    /// Turn a position inside text into a position between nodes,
    /// splitting the text node if needed
    pub fn break_text(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        self.check(position.parent)?;
        let max = self.tree.max_offset(position.parent);
        if position.offset > max {
            return Err(ViewError::invalid_position(format!(
                "offset {} past end of {}",
                position.offset, position.parent
            )));
        }
        if self.tree.kind(position.parent) != ViewKind::Text {
            return Ok(position);
        }
        let text = position.parent;
        let (parent, index) = match (self.tree.parent(text), self.tree.index_in_parent(text)) {
            (Some(parent), Some(index)) => (parent, index),
            _ => return Err(ViewError::invalid_position("text node is detached")),
        };
        if position.offset == 0 {
            return Ok(ViewPosition::new(parent, index));
        }
        if position.offset == max {
            return Ok(ViewPosition::new(parent, index + 1));
        }
        let data = &mut self.tree.data_mut(text).text;
        let split = byte_index(data, position.offset);
        let right = data.split_off(split);
        let right = self.create_text(&right);
        self.tree.insert_children(parent, index + 1, vec![right]);
        self.changed = true;
        Ok(ViewPosition::new(parent, index + 1))
    }

    /// Insert a detached node. Returns the range it now occupies.
    pub fn insert(&mut self, position: ViewPosition, node: ViewNodeId) -> ViewResult<ViewRange> {
        self.check(node)?;
        if self.tree.parent(node).is_some() || self.tree.kind(node) == ViewKind::Root {
            return Err(ViewError::invalid_position(format!("{} is not a detached node", node)));
        }
        let position = self.break_text(position)?;
        if !self.tree.kind(position.parent).can_hold_children() {
            return Err(ViewError::NotAContainer(position.parent));
        }
        self.tree.insert_children(position.parent, position.offset, vec![node]);
        self.changed = true;
        trace!(node = %node, parent = %position.parent, offset = position.offset, "render node inserted");
        Ok(ViewRange::new(position, position.shifted(1)))
    }

    /// Break both ends of a range up to their containers
    fn break_range(&mut self, range: ViewRange) -> ViewResult<(ViewPosition, ViewPosition)> {
        let mut end = self.break_attributes(range.end)?;
        let len_before = self.tree.max_offset(end.parent);
        let start = self.break_attributes(range.start)?;
        if start.parent == end.parent {
            end.offset += self.tree.max_offset(end.parent).saturating_sub(len_before);
        }
        if start.parent != end.parent || start.offset > end.offset {
            return Err(ViewError::invalid_position("range does not lie inside one container"));
        }
        Ok((start, end))
    }

    /// Remove the content of a range. Returns the detached top-level nodes.
    pub fn remove(&mut self, range: ViewRange) -> ViewResult<Vec<ViewNodeId>> {
        if range.is_collapsed() {
            return Ok(Vec::new());
        }
        let (start, end) = self.break_range(range)?;
        let removed = self.tree.detach_children(start.parent, start.offset, end.offset);
        if !removed.is_empty() {
            self.changed = true;
        }
        self.merge_attributes(start)?;
        Ok(removed)
    }

    pub fn remove_node(&mut self, node: ViewNodeId) -> ViewResult<()> {
        self.check(node)?;
        let Some(before) = self.tree.position_before(node) else {
            return Ok(());
        };
        self.remove(ViewRange::new(before, before.shifted(1)))?;
        Ok(())
    }

    /// Move the content of a range to `target`, which is read after the
    /// content was taken out
    pub fn move_range(&mut self, range: ViewRange, target: ViewPosition) -> ViewResult<ViewRange> {
        let nodes = self.remove(range)?;
        let target = self.break_text(target)?;
        if !self.tree.kind(target.parent).can_hold_children() {
            return Err(ViewError::NotAContainer(target.parent));
        }
        let count = nodes.len();
        self.tree.insert_children(target.parent, target.offset, nodes);
        Ok(ViewRange::new(target, target.shifted(count)))
    }

    // ---------------------------------------------------------------------
    // Node data
    // ---------------------------------------------------------------------

    pub fn set_attribute(&mut self, node: ViewNodeId, key: &str, value: &str) -> ViewResult<()> {
        self.check(node)?;
        let attributes = &mut self.tree.data_mut(node).attributes;
        if attributes.get(key).map(String::as_str) != Some(value) {
            attributes.insert(key.to_string(), value.to_string());
            self.changed = true;
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: ViewNodeId, key: &str) -> ViewResult<()> {
        self.check(node)?;
        if self.tree.data_mut(node).attributes.remove(key).is_some() {
            self.changed = true;
        }
        Ok(())
    }

    pub fn rename(&mut self, node: ViewNodeId, name: &str) -> ViewResult<()> {
        self.check(node)?;
        if self.tree.kind(node) == ViewKind::Text {
            return Err(ViewError::invalid_position("text nodes have no name"));
        }
        let data = self.tree.data_mut(node);
        if data.name != name {
            data.name = name.to_string();
            self.changed = true;
        }
        Ok(())
    }

    pub fn set_text(&mut self, node: ViewNodeId, text: &str) -> ViewResult<()> {
        self.check(node)?;
        let data = self.tree.data_mut(node);
        if data.kind != ViewKind::Text {
            return Err(ViewError::invalid_position(format!("{} is not a text node", node)));
        }
        if data.text != text {
            data.text = text.to_string();
            self.changed = true;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Attribute elements
    // ---------------------------------------------------------------------

    /// Split text and attribute elements at `position` until the position
    /// sits directly inside a non-attribute element
    pub fn break_attributes(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        let mut position = self.break_text(position)?;
        while self.tree.kind(position.parent) == ViewKind::Attribute {
            let element = position.parent;
            let (parent, index) = match (self.tree.parent(element), self.tree.index_in_parent(element)) {
                (Some(parent), Some(index)) => (parent, index),
                _ => return Err(ViewError::invalid_position("attribute element is detached")),
            };
            let len = self.tree.max_offset(element);
            position = if position.offset == 0 {
                ViewPosition::new(parent, index)
            } else if position.offset >= len {
                ViewPosition::new(parent, index + 1)
            } else {
                let mut data = self.tree.data(element).clone();
                data.children.clear();
                data.parent = None;
                let clone = self.tree.alloc(data);
                let moved = self.tree.detach_children(element, position.offset, len);
                self.tree.insert_children(clone, 0, moved);
                self.tree.insert_children(parent, index + 1, vec![clone]);
                self.changed = true;
                ViewPosition::new(parent, index + 1)
            };
        }
        Ok(position)
    }

    /// Merge the nodes on both sides of `position` when they are texts or
    /// similar attribute elements. Returns the equivalent merged position.
    pub fn merge_attributes(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        self.check(position.parent)?;
        if self.tree.kind(position.parent) == ViewKind::Text {
            return Ok(position);
        }
        let children = self.tree.children(position.parent);
        if position.offset == 0 || position.offset >= children.len() {
            return Ok(position);
        }
        let (left, right) = (children[position.offset - 1], children[position.offset]);

        if self.tree.kind(left) == ViewKind::Text && self.tree.kind(right) == ViewKind::Text {
            let left_len = self.tree.max_offset(left);
            let appended = self.tree.data(right).text.clone();
            self.tree.data_mut(left).text.push_str(&appended);
            self.tree.detach_children(position.parent, position.offset, position.offset + 1);
            self.changed = true;
            return Ok(ViewPosition::new(left, left_len));
        }

        if self.tree.data(left).is_similar(self.tree.data(right)) {
            let left_len = self.tree.max_offset(left);
            let right_len = self.tree.max_offset(right);
            let moved = self.tree.detach_children(right, 0, right_len);
            self.tree.insert_children(left, left_len, moved);
            self.tree.detach_children(position.parent, position.offset, position.offset + 1);
            self.changed = true;
            return self.merge_attributes(ViewPosition::new(left, left_len));
        }
        Ok(position)
    }

    /// Wrap the content of a range in `wrapper`, a detached attribute element.
    /// Attribute elements that nest outside the wrapper keep wrapping it.
    pub fn wrap(&mut self, range: ViewRange, wrapper: ViewNodeId) -> ViewResult<()> {
        self.check(wrapper)?;
        if self.tree.kind(wrapper) != ViewKind::Attribute || self.tree.parent(wrapper).is_some() {
            return Err(ViewError::invalid_position(format!("{} is not a detached attribute element", wrapper)));
        }
        if range.is_collapsed() {
            return Ok(());
        }
        let (start, end) = self.break_range(range)?;
        if start.offset == end.offset {
            return Ok(());
        }
        let mut template = self.tree.data(wrapper).clone();
        template.children.clear();
        let mut spare = Some(wrapper);
        self.wrap_children(start.parent, start.offset, end.offset, &template, &mut spare)
    }

    /// Wrap children `from..to` of `parent` one by one, descending into
    /// attribute elements that nest outside `template`
    fn wrap_children(
        &mut self,
        parent: ViewNodeId,
        from: usize,
        to: usize,
        template: &ViewNodeData,
        spare: &mut Option<ViewNodeId>,
    ) -> ViewResult<()> {
        for index in from..to {
            let child = self.tree.children(parent)[index];
            let data = self.tree.data(child);
            if data.is_similar(template) {
                continue;
            }
            if data.kind == ViewKind::Attribute && data.wraps_outside(template) {
                let len = self.tree.max_offset(child);
                self.wrap_children(child, 0, len, template, spare)?;
                continue;
            }
            let wrapper = match spare.take() {
                Some(wrapper) => wrapper,
                None => self.tree.alloc(template.clone()),
            };
            self.tree.detach_children(parent, index, index + 1);
            self.tree.insert_children(wrapper, 0, vec![child]);
            self.tree.insert_children(parent, index, vec![wrapper]);
            self.changed = true;
        }
        // Right to left so earlier offsets stay valid
        for offset in (from..=to).rev() {
            self.merge_attributes(ViewPosition::new(parent, offset))?;
        }
        Ok(())
    }

    /// Remove every attribute element named `name` inside a range, keeping
    /// its content
    pub fn unwrap(&mut self, range: ViewRange, name: &str) -> ViewResult<()> {
        if range.is_collapsed() {
            return Ok(());
        }
        let (start, end) = self.break_range(range)?;
        let parent = start.parent;
        let mut index = start.offset;
        let mut end_index = end.offset;
        while index < end_index {
            let child = self.tree.children(parent)[index];
            if self.tree.kind(child) != ViewKind::Attribute {
                index += 1;
                continue;
            }
            let len = self.tree.max_offset(child);
            if self.tree.data(child).name == name {
                let inner = self.tree.detach_children(child, 0, len);
                let count = inner.len();
                self.tree.detach_children(parent, index, index + 1);
                self.tree.insert_children(parent, index, inner);
                end_index = end_index + count - 1;
                self.changed = true;
            } else {
                let inside = ViewRange::new(ViewPosition::new(child, 0), ViewPosition::new(child, len));
                self.unwrap(inside, name)?;
                index += 1;
            }
        }
        // Right to left so earlier offsets stay valid
        for offset in (start.offset..=end_index).rev() {
            self.merge_attributes(ViewPosition::new(parent, offset))?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    pub fn set_selection(&mut self, selection: ViewSelection) -> ViewResult<()> {
        for range in selection.ranges() {
            self.check(range.start.parent)?;
            self.check(range.end.parent)?;
        }
        *self.selection = selection;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stringify::stringify;

    fn setup(tree: &mut ViewTree, selection: &mut ViewSelection) -> ViewNodeId {
        let mut writer = ViewWriter::new(tree, selection);
        let root = writer.create_root("main", "div").unwrap();
        let paragraph = writer.create_container("p", &[]);
        writer.insert(ViewPosition::new(root, 0), paragraph).unwrap();
        let text = writer.create_text("foobar");
        writer.insert(ViewPosition::new(paragraph, 0), text).unwrap();
        paragraph
    }

    #[test]
    fn test_wrap_and_merge() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);

        let bold = writer.create_attribute_element("strong", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(text, 1), ViewPosition::new(text, 3)), bold)
            .unwrap();
        let root = writer.tree().root("main").unwrap();
        assert_eq!(stringify(writer.tree(), root), "<p>f<strong>oo</strong>bar</p>");

        // Wrapping the neighbour merges both wrappers
        let paragraph_children = writer.tree().children(paragraph).to_vec();
        let bar = paragraph_children[2];
        let bold = writer.create_attribute_element("strong", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(bar, 0), ViewPosition::new(bar, 2)), bold)
            .unwrap();
        assert_eq!(stringify(writer.tree(), root), "<p>f<strong>ooba</strong>r</p>");
        let strong = writer.tree().children(paragraph)[1];
        assert_eq!(writer.tree().children(strong).len(), 1);
    }

    #[test]
    fn test_unwrap_part_of_wrapper() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let bold = writer.create_attribute_element("strong", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(text, 0), ViewPosition::new(text, 6)), bold)
            .unwrap();

        let strong = writer.tree().children(paragraph)[0];
        let inner = writer.tree().children(strong)[0];
        writer
            .unwrap(ViewRange::new(ViewPosition::new(inner, 2), ViewPosition::new(inner, 4)), "strong")
            .unwrap();
        let root = writer.tree().root("main").unwrap();
        assert_eq!(stringify(writer.tree(), root), "<p><strong>fo</strong>ob<strong>ar</strong></p>");
    }

    #[test]
    fn test_break_attributes_splits_nested_wrappers() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let bold = writer.create_attribute_element("strong", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(text, 0), ViewPosition::new(text, 6)), bold)
            .unwrap();
        let strong = writer.tree().children(paragraph)[0];
        let inner = writer.tree().children(strong)[0];

        let position = writer.break_attributes(ViewPosition::new(inner, 3)).unwrap();
        assert_eq!(position, ViewPosition::new(paragraph, 1));
        assert_eq!(writer.tree().children(paragraph).len(), 2);

        let merged = writer.merge_attributes(position).unwrap();
        assert_eq!(writer.tree().children(paragraph).len(), 1);
        assert_eq!(merged.offset, 3);
        assert_eq!(writer.tree().kind(merged.parent), ViewKind::Text);
    }

    #[test]
    fn test_remove_merges_texts() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let removed = writer
            .remove(ViewRange::new(ViewPosition::new(text, 2), ViewPosition::new(text, 4)))
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(writer.tree().children(paragraph).len(), 1);
        assert_eq!(writer.tree().text_content(paragraph), "foar");
    }

    #[test]
    fn test_insert_requires_detached_node() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let root = writer.tree().root("main").unwrap();
        assert!(writer.insert(ViewPosition::new(root, 0), paragraph).is_err());
        let image = writer.create_empty("img", &[("src", "a.png")]);
        writer.insert(ViewPosition::new(root, 1), image).unwrap();
        let text = writer.create_text("x");
        assert_eq!(
            writer.insert(ViewPosition::new(image, 0), text),
            Err(ViewError::NotAContainer(image))
        );
    }

    fn wrap_twice(first: (&str, i32), second: (&str, i32)) -> String {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let wrapper = writer.create_attribute_element(first.0, &[], first.1);
        writer
            .wrap(ViewRange::new(ViewPosition::new(text, 2), ViewPosition::new(text, 4)), wrapper)
            .unwrap();
        let wrapper = writer.create_attribute_element(second.0, &[], second.1);
        writer
            .wrap(
                ViewRange::new(ViewPosition::new(paragraph, 1), ViewPosition::new(paragraph, 2)),
                wrapper,
            )
            .unwrap();
        let root = writer.tree().root("main").unwrap();
        stringify(writer.tree(), root)
    }

    #[test]
    fn test_wrap_nesting_ignores_wrap_order() {
        let expected = "<p>fo<em><strong>ob</strong></em>ar</p>";
        assert_eq!(wrap_twice(("strong", 10), ("em", 10)), expected);
        assert_eq!(wrap_twice(("em", 10), ("strong", 10)), expected);

        // Lower priority nests outside regardless of name
        let expected = "<p>fo<strong><a>ob</a></strong>ar</p>";
        assert_eq!(wrap_twice(("a", 20), ("strong", 10)), expected);
        assert_eq!(wrap_twice(("strong", 10), ("a", 20)), expected);
    }

    #[test]
    fn test_wrap_inside_partially_covering_wrapper() {
        let mut tree = ViewTree::new();
        let mut selection = ViewSelection::default();
        let paragraph = setup(&mut tree, &mut selection);
        let text = tree.children(paragraph)[0];
        let mut writer = ViewWriter::new(&mut tree, &mut selection);
        let em = writer.create_attribute_element("em", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(text, 0), ViewPosition::new(text, 3)), em)
            .unwrap();
        // <p><em>foo</em>bar</p>: strong over "ob" splits into the em and after it
        let em = writer.tree().children(paragraph)[0];
        let foo = writer.tree().children(em)[0];
        let bar = writer.tree().children(paragraph)[1];
        let strong = writer.create_attribute_element("strong", &[], 10);
        writer
            .wrap(ViewRange::new(ViewPosition::new(foo, 2), ViewPosition::new(bar, 1)), strong)
            .unwrap();
        let root = writer.tree().root("main").unwrap();
        assert_eq!(
            stringify(writer.tree(), root),
            "<p><em>fo<strong>o</strong></em><strong>b</strong>ar</p>"
        );
    }
}
