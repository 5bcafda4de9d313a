//! Ready-made converters for the common model to render mappings

use super::{ConversionEvent, ConverterId, Dispatcher, EventKey, Item};
use crate::errors::ConversionError;
use folio_model::TEXT_NAME;
use folio_view::{ViewKind, ViewPosition, ViewTree, DEFAULT_PRIORITY};
use serde_json::Value;
use tracing::trace;

/// Attribute carried on marker boundary elements
pub const MARKER_NAME_ATTRIBUTE: &str = "data-name";
/// `start`, `end` or `collapsed`
pub const MARKER_BOUNDARY_ATTRIBUTE: &str = "data-boundary";

/// Priority of link wrappers
pub const LINK_PRIORITY: i32 = 5;

/// Text of a render attribute for a model attribute value
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_set(value: &Option<Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

/// Text insertion and removal. Every editor needs both.
pub fn register_defaults(dispatcher: &mut Dispatcher) {
    dispatcher.on(EventKey::Insert(TEXT_NAME.to_string()), |event, api| {
        let ConversionEvent::Insert {
            item: Item::Text { data },
            range,
        } = event
        else {
            return Ok(false);
        };
        let position = api.view_position(&range.start)?;
        let position = api.writer.break_attributes(position)?;
        let text = api.writer.create_text(data);
        let inserted = api.writer.insert(position, text)?;
        api.writer.merge_attributes(inserted.end)?;
        api.writer.merge_attributes(inserted.start)?;
        Ok(true)
    });

    dispatcher.on(EventKey::Remove, |event, api| {
        let ConversionEvent::Remove { position, how_many } = event else {
            return Ok(false);
        };
        let range = api
            .mapper
            .to_view_range(api.document, api.writer.tree(), position, *how_many)?;
        let removed = api.writer.remove(range)?;
        trace!(nodes = removed.len(), "render content removed");
        for node in removed {
            api.mapper.unbind_view_subtree(api.writer.tree(), node);
        }
        Ok(true)
    });
}

/// Converters for the built-in vocabulary: paragraphs, headings, quotes,
/// images, inline formatting, links and comment or search markers
pub fn register_standard(dispatcher: &mut Dispatcher) {
    register_defaults(dispatcher);
    element_to_element(dispatcher, "paragraph", "p");
    element_to_element(dispatcher, "heading", "h2");
    element_to_element(dispatcher, "blockQuote", "blockquote");
    element_to_empty(dispatcher, "image", "img");
    attribute_to_attribute(dispatcher, "image", "src", "src");
    attribute_to_attribute(dispatcher, "image", "alt", "alt");
    // Links wrap all other formatting
    attribute_to_element(dispatcher, "link", "a", Some("href"), LINK_PRIORITY);
    attribute_to_element(dispatcher, "bold", "strong", None, DEFAULT_PRIORITY);
    attribute_to_element(dispatcher, "italic", "em", None, DEFAULT_PRIORITY + 1);
    attribute_to_element(dispatcher, "code", "code", None, DEFAULT_PRIORITY + 2);
    marker_to_element(dispatcher, "comment", "span");
    marker_to_element(dispatcher, "search", "mark");
}

fn element_converter(dispatcher: &mut Dispatcher, model: &str, view: &str, kind: ViewKind) -> ConverterId {
    let view = view.to_string();
    dispatcher.on(EventKey::Insert(model.to_string()), move |event, api| {
        let ConversionEvent::Insert {
            item: Item::Element { id, .. },
            range,
        } = event
        else {
            return Ok(false);
        };
        let position = api.view_position(&range.start)?;
        let position = api.writer.break_attributes(position)?;
        let element = match kind {
            ViewKind::Empty => api.writer.create_empty(&view, &[]),
            _ => api.writer.create_container(&view, &[]),
        };
        api.writer.insert(position, element)?;
        api.mapper.bind(*id, element);
        Ok(true)
    })
}

/// Model element `model` renders as container `view`
pub fn element_to_element(dispatcher: &mut Dispatcher, model: &str, view: &str) -> ConverterId {
    element_converter(dispatcher, model, view, ViewKind::Container)
}

/// Model element `model` renders as childless `view` (images, rules)
pub fn element_to_empty(dispatcher: &mut Dispatcher, model: &str, view: &str) -> ConverterId {
    element_converter(dispatcher, model, view, ViewKind::Empty)
}

/// Text attribute `key` renders as wrapper `view`. With `value_attribute`,
/// the model value is copied onto the wrapper under that name (links).
/// Wrappers with a lower `priority` nest outside.
pub fn attribute_to_element(
    dispatcher: &mut Dispatcher,
    key: &str,
    view: &str,
    value_attribute: Option<&str>,
    priority: i32,
) -> ConverterId {
    let view = view.to_string();
    let value_attribute = value_attribute.map(str::to_string);
    let event_key = EventKey::Attribute {
        key: key.to_string(),
        item: TEXT_NAME.to_string(),
    };
    dispatcher.on(event_key, move |event, api| {
        let ConversionEvent::Attribute {
            range,
            old_value,
            new_value,
            ..
        } = event
        else {
            return Ok(false);
        };
        if old_value.is_some() {
            let view_range = api.view_range(range)?;
            api.writer.unwrap(view_range, &view)?;
        }
        if let Some(value) = new_value.as_ref().filter(|_| is_set(new_value)) {
            let text = value_to_string(value);
            let attributes: Vec<(&str, &str)> = value_attribute
                .as_deref()
                .map(|name| vec![(name, text.as_str())])
                .unwrap_or_default();
            let wrapper = api.writer.create_attribute_element(&view, &attributes, priority);
            let view_range = api.view_range(range)?;
            api.writer.wrap(view_range, wrapper)?;
        }
        Ok(true)
    })
}

/// Attribute `key` of model element `element` renders as attribute
/// `view_key` of its render element
pub fn attribute_to_attribute(dispatcher: &mut Dispatcher, element: &str, key: &str, view_key: &str) -> ConverterId {
    let view_key = view_key.to_string();
    let event_key = EventKey::Attribute {
        key: key.to_string(),
        item: element.to_string(),
    };
    dispatcher.on(event_key, move |event, api| {
        let ConversionEvent::Attribute {
            item: Item::Element { id, .. },
            new_value,
            ..
        } = event
        else {
            return Ok(false);
        };
        let view = api.mapper.to_view(*id).ok_or(ConversionError::Unmapped(*id))?;
        match new_value {
            Some(value) if is_set(new_value) => api.writer.set_attribute(view, &view_key, &value_to_string(value))?,
            _ => api.writer.remove_attribute(view, &view_key)?,
        }
        Ok(true)
    })
}

/// Position among the marker boundaries sharing `position` that keeps them
/// sorted by marker name
fn marker_slot(tree: &ViewTree, position: ViewPosition, name: &str) -> ViewPosition {
    let children = tree.children(position.parent);
    let marker_at = |offset: usize| {
        children
            .get(offset)
            .map(|child| tree.get(*child))
            .filter(|node| node.kind() == ViewKind::Ui)
            .and_then(|node| node.attribute(MARKER_NAME_ATTRIBUTE))
    };
    let mut offset = position.offset;
    while offset > 0 && marker_at(offset - 1).map_or(false, |other| other > name) {
        offset -= 1;
    }
    while marker_at(offset).map_or(false, |other| other < name) {
        offset += 1;
    }
    ViewPosition::new(position.parent, offset)
}

/// Markers of `group` render as zero-width `view` UI elements at their
/// boundaries, one element when the marker is collapsed
pub fn marker_to_element(dispatcher: &mut Dispatcher, group: &str, view: &str) -> (ConverterId, ConverterId) {
    let view = view.to_string();
    let add = dispatcher.on(EventKey::AddMarker(group.to_string()), move |event, api| {
        let ConversionEvent::AddMarker { name, range } = event else {
            return Ok(false);
        };
        let mut elements = Vec::new();
        let boundaries: &[(&str, &folio_model::Position)] = if range.is_collapsed() {
            &[("collapsed", &range.start)]
        } else {
            // End first so the start mapping sees the final structure
            &[("end", &range.end), ("start", &range.start)]
        };
        for (boundary, position) in boundaries {
            let view_position = api.view_position(position)?;
            let view_position = api.writer.break_attributes(view_position)?;
            let view_position = marker_slot(api.writer.tree(), view_position, name);
            let element = api.writer.create_ui(
                &view,
                &[(MARKER_NAME_ATTRIBUTE, name.as_str()), (MARKER_BOUNDARY_ATTRIBUTE, boundary)],
            );
            api.writer.insert(view_position, element)?;
            elements.push(element);
        }
        elements.reverse();
        api.mapper.bind_marker(name, elements);
        Ok(true)
    });
    let remove = dispatcher.on(EventKey::RemoveMarker(group.to_string()), |event, api| {
        let ConversionEvent::RemoveMarker { name, .. } = event else {
            return Ok(false);
        };
        for element in api.mapper.unbind_marker(name) {
            if api.writer.tree().contains(element) {
                api.writer.remove_node(element)?;
            }
        }
        Ok(true)
    });
    (add, remove)
}
