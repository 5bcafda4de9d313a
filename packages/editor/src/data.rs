//! # Data Pipeline
//!
//! Serializes a model root through the same converters the editing view
//! uses, into a detached render tree that is never rendered. Markers and UI
//! elements are left out.

use crate::conversion::{view_root_name, Dispatcher, Mapper};
use crate::errors::{ConversionError, ConversionResult};
use folio_model::{Document, ModelError};
use folio_view::{stringify, View};
use tracing::instrument;

#[instrument(skip(document, dispatcher))]
pub fn get_data(document: &Document, dispatcher: &mut Dispatcher, root: &str) -> ConversionResult<String> {
    let model_root = document
        .root(root)
        .ok_or_else(|| ConversionError::Model(ModelError::RootNotFound(root.to_string())))?;
    let mut view = View::bare();
    let mut mapper = Mapper::new();
    let view_root = view.change_with(|writer| -> ConversionResult<_> {
        let view_root = writer.create_root(root, view_root_name(document.node(model_root).name()))?;
        mapper.bind(model_root, view_root);
        dispatcher.convert_children(document, model_root, writer, &mut mapper)?;
        Ok(view_root)
    })?;
    Ok(stringify(view.tree(), view_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::helpers;
    use folio_model::{Model, Node, Range};

    #[test]
    fn test_get_data_skips_markers() {
        let mut model = Model::new(Document::with_roots(&["main"]).unwrap());
        model
            .change(|writer| {
                let root = writer.document().root("main").unwrap();
                writer.append(
                    Node::element("paragraph")
                        .with_child(Node::text("a<b"))
                        .with_child(Node::text("c").with_attribute("bold", true)),
                    root,
                )?;
                let start = writer.document().position("main", vec![0, 0])?;
                let end = writer.document().position("main", vec![0, 2])?;
                writer.add_marker("comment:1", Range::new(start, end)?, false)
            })
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        helpers::register_standard(&mut dispatcher);
        let data = get_data(model.document(), &mut dispatcher, "main").unwrap();
        assert_eq!(data, "<p>a&lt;b<strong>c</strong></p>");
    }

    #[test]
    fn test_get_data_unknown_root() {
        let model = Model::new(Document::with_roots(&["main"]).unwrap());
        let mut dispatcher = Dispatcher::new();
        let error = get_data(model.document(), &mut dispatcher, "title").unwrap_err();
        assert_eq!(error, ConversionError::Model(ModelError::RootNotFound("title".into())));
    }
}
