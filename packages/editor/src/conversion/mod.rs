//! # Conversion
//!
//! Replays model change sets onto the render tree through a registry of
//! converters.
//!
//! ## Design
//!
//! Every change record is turned into [`ConversionEvent`]s. An event is
//! offered to the converters registered for its [`EventKey`] in
//! registration order; the first converter returning `true` claims it and
//! stops propagation. Converters write through the [`ViewWriter`] and keep
//! the [`Mapper`] up to date.
//!
//! Inserted content fires one `Insert` per item followed by one
//! `Attribute` per attribute the item carries, then recurses into element
//! children. `Reconvert` is a `Remove` of the element followed by a fresh
//! insert.
//!
//! Before the render tree is touched, [`Dispatcher::check_coverage`] walks
//! the change set and rejects it when an item or attribute has no
//! converter. Markers without a converter are skipped.

pub mod helpers;
pub mod mapper;

pub use mapper::Mapper;

use crate::errors::{ConversionError, ConversionResult};
use folio_model::{marker_group, Change, ChangeSet, Document, NodeId, Position, Range, TEXT_NAME};
use folio_view::{ViewPosition, ViewRange, ViewWriter};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, trace};

/// Model content an event is about
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Element { id: NodeId, name: String },
    /// Slice of a text node covered by the event
    Text { data: String },
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Element { name, .. } => name,
            Item::Text { .. } => TEXT_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    /// `item` now occupies `range` in the model
    Insert { item: Item, range: Range },
    Attribute {
        item: Item,
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
    /// `how_many` units were removed at `position`
    Remove { position: Position, how_many: usize },
    AddMarker { name: String, range: Range },
    /// `range` is where the marker was before the change
    RemoveMarker { name: String, range: Range },
}

/// Registry key converters are matched on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Element name, or `$text`
    Insert(String),
    /// Attribute key on an element name or `$text`
    Attribute { key: String, item: String },
    Remove,
    /// Marker group
    AddMarker(String),
    RemoveMarker(String),
}

impl EventKey {
    pub fn is_marker(&self) -> bool {
        matches!(self, EventKey::AddMarker(_) | EventKey::RemoveMarker(_))
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Insert(name) => write!(f, "insert:{}", name),
            EventKey::Attribute { key, item } => write!(f, "attribute:{}:{}", key, item),
            EventKey::Remove => write!(f, "remove"),
            EventKey::AddMarker(group) => write!(f, "addMarker:{}", group),
            EventKey::RemoveMarker(group) => write!(f, "removeMarker:{}", group),
        }
    }
}

impl ConversionEvent {
    pub fn key(&self) -> EventKey {
        match self {
            ConversionEvent::Insert { item, .. } => EventKey::Insert(item.name().to_string()),
            ConversionEvent::Attribute { item, key, .. } => EventKey::Attribute {
                key: key.clone(),
                item: item.name().to_string(),
            },
            ConversionEvent::Remove { .. } => EventKey::Remove,
            ConversionEvent::AddMarker { name, .. } => EventKey::AddMarker(marker_group(name).to_string()),
            ConversionEvent::RemoveMarker { name, .. } => EventKey::RemoveMarker(marker_group(name).to_string()),
        }
    }
}

/// What a converter gets to work with
pub struct ConversionApi<'a, 'w> {
    pub document: &'a Document,
    pub writer: &'a mut ViewWriter<'w>,
    pub mapper: &'a mut Mapper,
}

impl ConversionApi<'_, '_> {
    pub fn view_position(&self, position: &Position) -> ConversionResult<ViewPosition> {
        self.mapper.to_view_position(self.document, self.writer.tree(), position)
    }

    /// Render range of a flat model range
    pub fn view_range(&self, range: &Range) -> ConversionResult<ViewRange> {
        self.mapper
            .to_view_range(self.document, self.writer.tree(), &range.start, range.len())
    }
}

pub type Converter = Box<dyn FnMut(&ConversionEvent, &mut ConversionApi<'_, '_>) -> ConversionResult<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConverterId(u64);

struct Registered {
    id: ConverterId,
    key: EventKey,
    converter: Converter,
}

/// Ordered converter registry
#[derive(Default)]
pub struct Dispatcher {
    converters: Vec<Registered>,
    next_id: u64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("converters", &self.converters.iter().map(|c| c.key.to_string()).collect::<Vec<_>>())
            .finish()
    }
}

/// A piece of a model child overlapping an offset window
struct Slice {
    node: NodeId,
    /// Offset of the node's first unit in its parent
    node_start: usize,
    from: usize,
    to: usize,
}

fn slices(document: &Document, parent: NodeId, from: usize, to: usize) -> Vec<Slice> {
    let tree = document.tree();
    let mut result = Vec::new();
    let mut offset = 0;
    for child in tree.children(parent) {
        let size = tree.offset_size(*child);
        let (start, end) = (offset.max(from), (offset + size).min(to));
        if start < end {
            result.push(Slice {
                node: *child,
                node_start: offset,
                from: start,
                to: end,
            });
        }
        offset += size;
        if offset >= to {
            break;
        }
    }
    result
}

fn item_of(document: &Document, slice: &Slice) -> Item {
    let node = document.node(slice.node);
    if node.is_text() {
        let skip = slice.from - slice.node_start;
        Item::Text {
            data: node.data().chars().skip(skip).take(slice.to - slice.from).collect(),
        }
    } else {
        Item::Element {
            id: slice.node,
            name: node.name().to_string(),
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter for `key`. Converters for the same key are
    /// offered events in registration order.
    pub fn on<F>(&mut self, key: EventKey, converter: F) -> ConverterId
    where
        F: FnMut(&ConversionEvent, &mut ConversionApi<'_, '_>) -> ConversionResult<bool> + 'static,
    {
        self.next_id += 1;
        let id = ConverterId(self.next_id);
        debug!(key = %key, "converter registered");
        self.converters.push(Registered {
            id,
            key,
            converter: Box::new(converter),
        });
        id
    }

    pub fn off(&mut self, id: ConverterId) -> bool {
        let before = self.converters.len();
        self.converters.retain(|registered| registered.id != id);
        self.converters.len() != before
    }

    pub fn has_converter(&self, key: &EventKey) -> bool {
        self.converters.iter().any(|registered| &registered.key == key)
    }

    /// Offer `event` to its converters until one claims it
    pub fn fire(&mut self, event: &ConversionEvent, api: &mut ConversionApi<'_, '_>) -> ConversionResult<()> {
        let key = event.key();
        let mut offered = false;
        for registered in self.converters.iter_mut().filter(|registered| registered.key == key) {
            offered = true;
            if (registered.converter)(event, api)? {
                trace!(key = %key, "event claimed");
                return Ok(());
            }
        }
        match (offered, key.is_marker()) {
            (false, true) => Ok(()),
            (false, false) => Err(ConversionError::NoConverter(key.to_string())),
            (true, _) => Err(ConversionError::Unclaimed(key.to_string())),
        }
    }

    fn require(&self, key: EventKey) -> ConversionResult<()> {
        if self.has_converter(&key) {
            Ok(())
        } else {
            Err(ConversionError::NoConverter(key.to_string()))
        }
    }

    /// Insert keys of a whole subtree, attributes included
    fn check_subtree(&self, document: &Document, node: NodeId) -> ConversionResult<()> {
        let node_ref = document.node(node);
        let name = node_ref.name();
        self.require(EventKey::Insert(name.to_string()))?;
        for key in node_ref.attributes().keys() {
            self.require(EventKey::Attribute {
                key: key.clone(),
                item: name.to_string(),
            })?;
        }
        for child in document.children(node) {
            self.check_subtree(document, *child)?;
        }
        Ok(())
    }

    /// Reject a change set that would reach an item or attribute no
    /// converter handles. Runs before the render tree is touched.
    pub fn check_coverage(&self, document: &Document, change_set: &ChangeSet) -> ConversionResult<()> {
        let tree = document.tree();
        for change in &change_set.changes {
            match change {
                Change::Insert { position, how_many } => {
                    let parent = tree.parent_at(position)?;
                    for slice in slices(document, parent, position.offset(), position.offset() + how_many) {
                        self.check_subtree(document, slice.node)?;
                    }
                }
                Change::Remove { .. } => self.require(EventKey::Remove)?,
                Change::Attribute { range, key, .. } => {
                    let parent = tree.parent_at(&range.start)?;
                    for slice in slices(document, parent, range.start.offset(), range.end.offset()) {
                        self.require(EventKey::Attribute {
                            key: key.clone(),
                            item: document.node(slice.node).name().to_string(),
                        })?;
                    }
                }
                Change::Reconvert { element } => {
                    self.require(EventKey::Remove)?;
                    self.check_subtree(document, *element)?;
                }
            }
        }
        Ok(())
    }

    /// Convert `how_many` units of content starting at `position`
    fn convert_insert(
        &mut self,
        position: &Position,
        how_many: usize,
        api: &mut ConversionApi<'_, '_>,
    ) -> ConversionResult<()> {
        let document = api.document;
        let tree = document.tree();
        let parent = tree.parent_at(position)?;
        for slice in slices(document, parent, position.offset(), position.offset() + how_many) {
            let item = item_of(document, &slice);
            let range = Range::flat(tree.position_in(parent, slice.from), slice.to - slice.from);
            self.fire(
                &ConversionEvent::Insert {
                    item: item.clone(),
                    range: range.clone(),
                },
                api,
            )?;
            let node = document.node(slice.node);
            for (key, value) in node.attributes().iter() {
                self.fire(
                    &ConversionEvent::Attribute {
                        item: item.clone(),
                        range: range.clone(),
                        key: key.clone(),
                        old_value: None,
                        new_value: Some(value.clone()),
                    },
                    api,
                )?;
            }
            if node.is_element() && node.max_offset() > 0 {
                self.convert_insert(&tree.position_in(slice.node, 0), node.max_offset(), api)?;
            }
        }
        Ok(())
    }

    fn convert_attribute(
        &mut self,
        range: &Range,
        key: &str,
        old_value: &Option<Value>,
        new_value: &Option<Value>,
        api: &mut ConversionApi<'_, '_>,
    ) -> ConversionResult<()> {
        let document = api.document;
        let tree = document.tree();
        let parent = tree.parent_at(&range.start)?;
        for slice in slices(document, parent, range.start.offset(), range.end.offset()) {
            let event = ConversionEvent::Attribute {
                item: item_of(document, &slice),
                range: Range::flat(tree.position_in(parent, slice.from), slice.to - slice.from),
                key: key.to_string(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            };
            self.fire(&event, api)?;
        }
        Ok(())
    }

    fn convert_root_change(&mut self, name: &str, root: NodeId, attached: bool, api: &mut ConversionApi<'_, '_>) -> ConversionResult<()> {
        if attached {
            let element_name = view_root_name(api.document.node(root).name());
            let view_root = api.writer.create_root(name, element_name)?;
            api.mapper.bind(root, view_root);
        } else if api.writer.tree().root(name).is_some() {
            let view_root = api.writer.detach_root(name)?;
            api.mapper.unbind_view_subtree(api.writer.tree(), view_root);
        }
        Ok(())
    }

    /// Replay a change set onto the render tree. Marker removals go first,
    /// then root changes, content changes and marker additions.
    #[instrument(skip_all, fields(version = change_set.version, changes = change_set.changes.len()))]
    pub fn convert_change_set(
        &mut self,
        document: &Document,
        change_set: &ChangeSet,
        writer: &mut ViewWriter<'_>,
        mapper: &mut Mapper,
    ) -> ConversionResult<()> {
        let mut api = ConversionApi {
            document,
            writer,
            mapper,
        };
        for marker in &change_set.markers_to_remove {
            let event = ConversionEvent::RemoveMarker {
                name: marker.name.clone(),
                range: marker.range.clone(),
            };
            self.fire(&event, &mut api)?;
        }
        for root_change in &change_set.root_changes {
            self.convert_root_change(&root_change.name, root_change.root, root_change.attached, &mut api)?;
        }
        for change in &change_set.changes {
            trace!(change = ?change, "converting");
            match change {
                Change::Insert { position, how_many } => self.convert_insert(position, *how_many, &mut api)?,
                Change::Remove { position, how_many, .. } => {
                    let event = ConversionEvent::Remove {
                        position: position.clone(),
                        how_many: *how_many,
                    };
                    self.fire(&event, &mut api)?;
                }
                Change::Attribute {
                    range,
                    key,
                    old_value,
                    new_value,
                } => self.convert_attribute(range, key, old_value, new_value, &mut api)?,
                Change::Reconvert { element } => {
                    let position = document
                        .tree()
                        .position_before(*element)
                        .ok_or(ConversionError::Unmapped(*element))?;
                    let event = ConversionEvent::Remove {
                        position: position.clone(),
                        how_many: 1,
                    };
                    self.fire(&event, &mut api)?;
                    self.convert_insert(&position, 1, &mut api)?;
                }
            }
        }
        for marker in &change_set.markers_to_add {
            let event = ConversionEvent::AddMarker {
                name: marker.name.clone(),
                range: marker.range.clone(),
            };
            self.fire(&event, &mut api)?;
        }
        Ok(())
    }

    /// Convert every child of an already mapped model element
    pub fn convert_children(
        &mut self,
        document: &Document,
        element: NodeId,
        writer: &mut ViewWriter<'_>,
        mapper: &mut Mapper,
    ) -> ConversionResult<()> {
        let len = document.tree().max_offset(element);
        if len == 0 {
            return Ok(());
        }
        let mut api = ConversionApi {
            document,
            writer,
            mapper,
        };
        self.convert_insert(&document.tree().position_in(element, 0), len, &mut api)
    }

    /// Create and fill the render root for an attached model root
    pub fn convert_root(
        &mut self,
        document: &Document,
        name: &str,
        writer: &mut ViewWriter<'_>,
        mapper: &mut Mapper,
    ) -> ConversionResult<()> {
        let root = document
            .root(name)
            .ok_or_else(|| ConversionError::Model(folio_model::ModelError::RootNotFound(name.to_string())))?;
        {
            let mut api = ConversionApi {
                document,
                writer: &mut *writer,
                mapper: &mut *mapper,
            };
            self.convert_root_change(name, root, true, &mut api)?;
        }
        self.convert_children(document, root, writer, mapper)
    }

    /// Draw every marker currently in the document
    pub fn convert_markers(
        &mut self,
        document: &Document,
        writer: &mut ViewWriter<'_>,
        mapper: &mut Mapper,
    ) -> ConversionResult<()> {
        let mut api = ConversionApi {
            document,
            writer,
            mapper,
        };
        for marker in document.markers().iter() {
            if !document.tree().is_attached(marker.range.root()) {
                continue;
            }
            let event = ConversionEvent::AddMarker {
                name: marker.name.clone(),
                range: marker.range.clone(),
            };
            self.fire(&event, &mut api)?;
        }
        Ok(())
    }
}

/// Render element name for a model root element
pub fn view_root_name(model_name: &str) -> &str {
    if model_name.starts_with('$') {
        "div"
    } else {
        model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::{Model, Node};
    use folio_view::{stringify, View};

    fn model_with(content: Vec<Node>) -> Model {
        let mut model = Model::new(Document::with_roots(&["main"]).unwrap());
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(content, root)?;
                Ok(())
            })
            .unwrap();
        model.take_change_sets();
        model
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        helpers::register_defaults(&mut dispatcher);
        helpers::element_to_element(&mut dispatcher, "paragraph", "p");
        helpers::attribute_to_element(&mut dispatcher, "bold", "strong", None, folio_view::DEFAULT_PRIORITY);
        dispatcher
    }

    #[test]
    fn test_event_keys() {
        let remove_marker = ConversionEvent::RemoveMarker {
            name: "comment:1".to_string(),
            range: Range::collapsed(Position::new(folio_model::GRAVEYARD, vec![0])),
        };
        assert_eq!(remove_marker.key(), EventKey::RemoveMarker("comment".to_string()));
        assert_eq!(remove_marker.key().to_string(), "removeMarker:comment");
        assert_eq!(
            EventKey::Attribute {
                key: "bold".to_string(),
                item: TEXT_NAME.to_string()
            }
            .to_string(),
            "attribute:bold:$text"
        );
    }

    #[test]
    fn test_converts_root_with_formatting() {
        let model = model_with(vec![Node::element("paragraph")
            .with_child(Node::text("ab"))
            .with_child(Node::text("cd").with_attribute("bold", true))]);
        let mut dispatcher = dispatcher();
        let mut mapper = Mapper::new();
        let mut view = View::bare();
        view.change_with(|writer| dispatcher.convert_root(model.document(), "main", writer, &mut mapper))
            .unwrap();

        let view_root = view.tree().root("main").unwrap();
        assert_eq!(stringify(view.tree(), view_root), "<p>ab<strong>cd</strong></p>");
        assert_eq!(mapper.len(), 2);
    }

    #[test]
    fn test_coverage_rejects_unknown_element() {
        let mut model = model_with(vec![Node::element("paragraph")]);
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(Node::element("table"), root)?;
                Ok(())
            })
            .unwrap();
        let change_sets = model.take_change_sets();
        let error = dispatcher()
            .check_coverage(model.document(), &change_sets[0])
            .unwrap_err();
        assert_eq!(error, ConversionError::NoConverter("insert:table".to_string()));
    }

    #[test]
    fn test_coverage_rejects_unknown_text_attribute() {
        let model = Model::new(Document::with_roots(&["main"]).unwrap());
        let mut model = model;
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(
                    Node::element("paragraph").with_child(Node::text("x").with_attribute("italic", true)),
                    root,
                )?;
                Ok(())
            })
            .unwrap();
        let change_sets = model.take_change_sets();
        let error = dispatcher()
            .check_coverage(model.document(), &change_sets[0])
            .unwrap_err();
        assert_eq!(error, ConversionError::NoConverter("attribute:italic:$text".to_string()));
    }

    #[test]
    fn test_first_claiming_converter_wins() {
        let mut dispatcher = Dispatcher::new();
        helpers::register_defaults(&mut dispatcher);
        dispatcher.on(EventKey::Insert("paragraph".to_string()), |_, _| Ok(false));
        helpers::element_to_element(&mut dispatcher, "paragraph", "p");
        helpers::element_to_element(&mut dispatcher, "paragraph", "div");

        let model = model_with(vec![Node::element("paragraph")]);
        let mut mapper = Mapper::new();
        let mut view = View::bare();
        view.change_with(|writer| dispatcher.convert_root(model.document(), "main", writer, &mut mapper))
            .unwrap();
        let view_root = view.tree().root("main").unwrap();
        assert_eq!(stringify(view.tree(), view_root), "<p></p>");
    }

    #[test]
    fn test_declined_event_is_unclaimed() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(EventKey::Insert("paragraph".to_string()), |_, _| Ok(false));
        let model = model_with(vec![Node::element("paragraph")]);
        let mut mapper = Mapper::new();
        let mut view = View::bare();
        let error = view
            .change_with(|writer| dispatcher.convert_root(model.document(), "main", writer, &mut mapper))
            .unwrap_err();
        assert_eq!(error, ConversionError::Unclaimed("insert:paragraph".to_string()));
    }
}
