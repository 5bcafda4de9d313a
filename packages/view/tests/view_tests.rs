use folio_view::{
    Patch, RecordingRenderer, Renderer, View, ViewEvent, ViewNodeId, ViewPosition, ViewRange, ViewSelection,
};
use std::cell::RefCell;
use std::rc::Rc;

fn view_with_paragraph(text: &str) -> (View, ViewNodeId, ViewNodeId) {
    let mut view = View::new();
    let (paragraph, text) = view
        .change(|writer| {
            let root = writer.create_root("main", "div")?;
            let paragraph = writer.create_container("p", &[]);
            writer.insert(ViewPosition::new(root, 0), paragraph)?;
            let text = writer.create_text(text);
            writer.insert(ViewPosition::new(paragraph, 0), text)?;
            Ok((paragraph, text))
        })
        .unwrap();
    (view, paragraph, text)
}

#[test]
fn test_second_render_only_sends_the_difference() {
    let (mut view, _, text) = view_with_paragraph("Hello");
    let mut renderer = RecordingRenderer::new();
    view.render(&mut renderer).unwrap();

    view.change(|writer| writer.set_text(text, "Hello world")).unwrap();
    view.render(&mut renderer).unwrap();

    assert_eq!(
        renderer.commits()[1],
        vec![Patch::SetText {
            node: text,
            text: "Hello world".into(),
        }]
    );
    assert_eq!(renderer.to_html(), "<div><p>Hello world</p></div>");
}

#[test]
fn test_surface_matches_tree_after_formatting() {
    let (mut view, _, text) = view_with_paragraph("foobar");
    let mut renderer = RecordingRenderer::new();
    view.render(&mut renderer).unwrap();

    view.change(|writer| {
        let bold = writer.create_attribute_element("strong", &[], 10);
        writer.wrap(ViewRange::new(ViewPosition::new(text, 3), ViewPosition::new(text, 6)), bold)
    })
    .unwrap();
    view.render(&mut renderer).unwrap();
    assert_eq!(renderer.to_html(), "<div><p>foo<strong>bar</strong></p></div>");

    view.change(|writer| {
        let root = writer.tree().root("main").unwrap();
        let paragraph = writer.tree().children(root)[0];
        let len = writer.tree().children(paragraph).len();
        writer.unwrap(
            ViewRange::new(ViewPosition::new(paragraph, 0), ViewPosition::new(paragraph, len)),
            "strong",
        )
    })
    .unwrap();
    view.render(&mut renderer).unwrap();
    assert_eq!(renderer.to_html(), "<div><p>foobar</p></div>");
}

#[test]
fn test_emptied_paragraph_gets_a_filler() {
    let (mut view, paragraph, _) = view_with_paragraph("x");
    let mut renderer = RecordingRenderer::new();
    view.change(|writer| {
        writer.remove(ViewRange::new(ViewPosition::new(paragraph, 0), ViewPosition::new(paragraph, 1)))
    })
    .unwrap();
    view.render(&mut renderer).unwrap();
    assert_eq!(renderer.to_html(), r#"<div><p><br data-filler="true" /></p></div>"#);
}

#[test]
fn test_selection_restored_after_commit() {
    let (mut view, _, text) = view_with_paragraph("Hello");
    view.change(|writer| writer.set_selection(ViewSelection::caret(ViewPosition::new(text, 2))))
        .unwrap();
    let mut renderer = RecordingRenderer::new();
    let report = view.render(&mut renderer).unwrap();
    assert_eq!(report.realized, vec![text]);
    assert_eq!(renderer.selection(), Some(view.selection()));
}

/// Surface that never realizes anything
struct BlindRenderer {
    selection_calls: Vec<bool>,
}

impl Renderer for BlindRenderer {
    fn commit(&mut self, _: &[Patch], _: &[ViewNodeId]) -> folio_view::ViewResult<folio_view::RenderReport> {
        Ok(Default::default())
    }

    fn set_selection(&mut self, selection: Option<&ViewSelection>) {
        self.selection_calls.push(selection.is_some());
    }
}

#[test]
fn test_selection_dropped_when_nodes_missing() {
    let (mut view, _, text) = view_with_paragraph("Hello");
    view.change(|writer| writer.set_selection(ViewSelection::caret(ViewPosition::new(text, 0))))
        .unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    view.on(move |event| sink.borrow_mut().push(event.clone()));

    let mut renderer = BlindRenderer {
        selection_calls: Vec::new(),
    };
    view.render(&mut renderer).unwrap();
    assert_eq!(renderer.selection_calls, vec![false]);
    assert!(matches!(events.borrow()[0], ViewEvent::SelectionDropped(_)));
    assert!(matches!(events.borrow()[1], ViewEvent::Rendered { .. }));
}
