use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handle of a render node inside a [`crate::ViewTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewNodeId(pub(crate) u32);

impl ViewNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ViewNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Render node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    /// Top of a rendered root, mapped to a model root
    Root,
    /// Structural element (paragraph, list item, ...)
    Container,
    /// Formatting wrapper (bold, link, ...). Split and merged freely.
    Attribute,
    /// Element that never holds children (image, line break)
    Empty,
    /// Presentation-only element, invisible to the model (marker boundaries, fillers)
    Ui,
    Text,
}

impl ViewKind {
    pub fn can_hold_children(self) -> bool {
        matches!(self, ViewKind::Root | ViewKind::Container | ViewKind::Attribute)
    }
}

/// Priority of attribute elements created without one
pub const DEFAULT_PRIORITY: i32 = 10;

/// Owned snapshot of a render subtree, keyed by node identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderNode {
    Element {
        id: ViewNodeId,
        kind: ViewKind,
        name: String,
        attributes: BTreeMap<String, String>,
        children: Vec<RenderNode>,
    },
    Text {
        id: ViewNodeId,
        content: String,
    },
}

impl RenderNode {
    pub fn id(&self) -> ViewNodeId {
        match self {
            RenderNode::Element { id, .. } | RenderNode::Text { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ViewNodeData {
    pub(crate) kind: ViewKind,
    pub(crate) name: String,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) children: Vec<ViewNodeId>,
    pub(crate) text: String,
    pub(crate) parent: Option<ViewNodeId>,
    pub(crate) priority: i32,
}

impl ViewNodeData {
    pub(crate) fn new(kind: ViewKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: String::new(),
            parent: None,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Attribute elements with equal name, attributes and priority merge
    pub(crate) fn is_similar(&self, other: &ViewNodeData) -> bool {
        self.kind == ViewKind::Attribute
            && other.kind == ViewKind::Attribute
            && self.name == other.name
            && self.priority == other.priority
            && self.attributes == other.attributes
    }

    /// Nesting order of attribute elements: lower priority sits outside,
    /// equal priorities are ordered by name
    pub(crate) fn wraps_outside(&self, other: &ViewNodeData) -> bool {
        (self.priority, &self.name) < (other.priority, &other.name)
    }
}
