//! # Model Nodes
//!
//! Two representations of document content live here:
//!
//! - [`Node`] / [`Fragment`]: owned values describing content to insert
//!   (and snapshots taken out of the document).
//! - `NodeData`: the arena entry backing a live node. Live nodes are
//!   addressed by [`NodeId`] and link to their parent by index, never by
//!   ownership.
//!
//! Attributes are shared copy-on-write maps, so splitting a text node for an
//! operation boundary does not copy its attributes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle of a live node in the document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Graveyard root. Always the first node allocated by a document.
pub const GRAVEYARD: NodeId = NodeId(0);

/// Name of the graveyard root
pub const GRAVEYARD_NAME: &str = "$graveyard";

/// Name reported for text content in conversion events and removal hints
pub const TEXT_NAME: &str = "$text";

/// Copy-on-write attribute map with canonical key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Arc<BTreeMap<String, Value>>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set or clear `key`. Clones the underlying map only if it is shared.
    pub fn set(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                Arc::make_mut(&mut self.0).insert(key.to_string(), value);
            }
            None => {
                if self.0.contains_key(key) {
                    Arc::make_mut(&mut self.0).remove(key);
                }
            }
        }
    }

    /// Whether both maps point at the same allocation
    pub fn shares_storage_with(&self, other: &Attributes) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Attributes(Arc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Value>::deserialize(deserializer).map(|map| Attributes(Arc::new(map)))
    }
}

/// Owned node value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Element {
        name: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<Node>,
    },
    Text {
        data: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
    },
}

impl Node {
    pub fn element(name: impl Into<String>) -> Self {
        Node::Element {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        Node::Text {
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        match &mut self {
            Node::Element { attributes, .. } | Node::Text { attributes, .. } => {
                attributes.set(key, Some(value.into()));
            }
        }
        self
    }

    /// Append a child. Has no effect on text nodes.
    pub fn with_child(mut self, child: Node) -> Self {
        if let Node::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    pub fn with_children(self, children: impl IntoIterator<Item = Node>) -> Self {
        children.into_iter().fold(self, Node::with_child)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text { .. })
    }

    /// `$text` for text nodes, the element name otherwise
    pub fn name(&self) -> &str {
        match self {
            Node::Element { name, .. } => name,
            Node::Text { .. } => TEXT_NAME,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Node::Element { attributes, .. } | Node::Text { attributes, .. } => attributes,
        }
    }

    /// Offset units taken in the parent: 1 for elements, one per character for text
    pub fn offset_size(&self) -> usize {
        match self {
            Node::Element { .. } => 1,
            Node::Text { data, .. } => data.chars().count(),
        }
    }
}

/// Root-less container of nodes, used to describe inserted content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Fragment {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn offset_size(&self) -> usize {
        self.nodes.iter().map(Node::offset_size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.offset_size() == 0
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Self {
        Fragment { nodes: vec![node] }
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment { nodes }
    }
}

/// State of a root element
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RootState {
    pub name: String,
    pub attached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Element { name: String, children: Vec<NodeId> },
    Text { data: String },
}

/// Arena entry of a live node
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub attributes: Attributes,
    pub parent: Option<NodeId>,
    pub root: Option<RootState>,
}

impl NodeData {
    pub fn element(name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: NodeKind::Element {
                name: name.into(),
                children: Vec::new(),
            },
            attributes,
            parent: None,
            root: None,
        }
    }

    pub fn text(data: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: NodeKind::Text { data: data.into() },
            attributes,
            parent: None,
            root: None,
        }
    }

    pub fn offset_size(&self) -> usize {
        match &self.kind {
            NodeKind::Element { .. } => 1,
            NodeKind::Text { data } => data.chars().count(),
        }
    }
}

/// Byte index of the `n`th character of `s`
pub(crate) fn char_to_byte(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
