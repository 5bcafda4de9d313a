//! HTML serialization of render subtrees.
//!
//! Used for data output (UI elements skipped) and for readable assertions,
//! where a selection can be drawn into the markup: `[` `]` between nodes,
//! `{` `}` inside text.

use crate::node::{ViewKind, ViewNodeId};
use crate::position::ViewSelection;
use crate::tree::ViewTree;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct StringifyOptions {
    /// Keep presentation-only elements
    pub include_ui: bool,
    pub selection: Option<ViewSelection>,
}

/// Markup of the children of `node`, UI elements skipped
pub fn stringify(tree: &ViewTree, node: ViewNodeId) -> String {
    stringify_with(tree, node, &StringifyOptions::default())
}

pub fn stringify_with(tree: &ViewTree, node: ViewNodeId, options: &StringifyOptions) -> String {
    let marks = SelectionMarks::new(options.selection.as_ref());
    let mut out = String::new();
    write_children(tree, node, options, &marks, &mut out);
    out
}

/// Markup of `node` itself, including its own tag
pub fn stringify_node(tree: &ViewTree, node: ViewNodeId, options: &StringifyOptions) -> String {
    let marks = SelectionMarks::new(options.selection.as_ref());
    let mut out = String::new();
    write_node(tree, node, options, &marks, &mut out);
    out
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub(crate) fn is_self_closing(tag: &str) -> bool {
    matches!(
        tag,
        "img" | "input" | "br" | "hr" | "meta" | "link" | "area" | "base" | "col" | "embed" | "source" | "wbr"
    )
}

#[derive(Default)]
struct SelectionMarks {
    marks: BTreeMap<(ViewNodeId, usize), String>,
}

impl SelectionMarks {
    fn new(selection: Option<&ViewSelection>) -> Self {
        let mut marks: BTreeMap<(ViewNodeId, usize), String> = BTreeMap::new();
        for range in selection.map(ViewSelection::ranges).unwrap_or_default() {
            marks
                .entry((range.start.parent, range.start.offset))
                .or_default()
                .push('<');
            marks.entry((range.end.parent, range.end.offset)).or_default().push('>');
        }
        Self { marks }
    }

    /// `[`/`]` or `{`/`}` depending on whether the parent is text
    fn at(&self, parent: ViewNodeId, offset: usize, in_text: bool) -> String {
        let Some(raw) = self.marks.get(&(parent, offset)) else {
            return String::new();
        };
        let (open, close) = if in_text { ('{', '}') } else { ('[', ']') };
        raw.chars()
            .map(|mark| if mark == '<' { open } else { close })
            .collect()
    }
}

fn write_children(tree: &ViewTree, node: ViewNodeId, options: &StringifyOptions, marks: &SelectionMarks, out: &mut String) {
    let children = tree.children(node);
    for (index, child) in children.iter().enumerate() {
        out.push_str(&marks.at(node, index, false));
        write_node(tree, *child, options, marks, out);
    }
    out.push_str(&marks.at(node, children.len(), false));
}

fn write_node(tree: &ViewTree, node: ViewNodeId, options: &StringifyOptions, marks: &SelectionMarks, out: &mut String) {
    let view = tree.get(node);
    match view.kind() {
        ViewKind::Text => {
            for (index, ch) in view.text().chars().enumerate() {
                out.push_str(&marks.at(node, index, true));
                out.push_str(&escape_html(ch.encode_utf8(&mut [0; 4])));
            }
            out.push_str(&marks.at(node, view.text().chars().count(), true));
        }
        ViewKind::Ui if !options.include_ui => {}
        kind => {
            out.push('<');
            out.push_str(view.name());
            for (key, value) in view.attributes() {
                out.push_str(&format!(" {}=\"{}\"", key, escape_html(value)));
            }
            if view.children().is_empty() && (kind == ViewKind::Empty || is_self_closing(view.name())) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            write_children(tree, node, options, marks, out);
            out.push_str(&format!("</{}>", view.name()));
        }
    }
}
