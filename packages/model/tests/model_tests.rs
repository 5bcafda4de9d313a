use folio_model::{
    BatchKind, Change, Document, Model, ModelError, Node, NodeId, Operation, Position, PositionRelation, Range,
};
use serde_json::json;

fn model_with_paragraphs(texts: &[&str]) -> (Model, NodeId) {
    let mut model = Model::new(Document::with_roots(&["main"]).unwrap());
    let root = model.document().root("main").unwrap();
    model
        .change(|writer| {
            for text in texts {
                let mut paragraph = Node::element("paragraph");
                if !text.is_empty() {
                    paragraph = paragraph.with_child(Node::text(*text));
                }
                writer.append(paragraph, root)?;
            }
            Ok(())
        })
        .unwrap();
    model.take_change_sets();
    model.take_completed_batches();
    (model, root)
}

fn texts(model: &Model, root: NodeId) -> Vec<String> {
    model
        .document()
        .children(root)
        .iter()
        .map(|child| model.document().text_content(*child))
        .collect()
}

fn undo_history_since(model: &mut Model, version: u64) {
    let operations: Vec<Operation> = model.document().history()[version as usize..].to_vec();
    model
        .change_with(BatchKind::Transparent, |writer| {
            for operation in operations.iter().rev() {
                let mut inverse = operation.invert();
                inverse.base_version = None;
                writer.apply_operation(inverse)?;
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_insert_then_remove_reports_single_insert() {
    let (mut model, root) = model_with_paragraphs(&[""]);
    model
        .change(|writer| {
            writer.insert_text("AB", Default::default(), Position::new(root, vec![0, 0]))?;
            writer.remove(&Range::flat(Position::new(root, vec![0, 0]), 1))
        })
        .unwrap();

    assert_eq!(texts(&model, root), vec!["B"]);
    let change_sets = model.take_change_sets();
    assert_eq!(change_sets.len(), 1);
    assert_eq!(
        change_sets[0].changes,
        vec![Change::Insert {
            position: Position::new(root, vec![0, 0]),
            how_many: 1,
        }]
    );
}

#[test]
fn test_insert_and_remove_of_same_content_cancels() {
    let (mut model, root) = model_with_paragraphs(&["abc"]);
    model
        .change(|writer| {
            writer.insert_text("xyz", Default::default(), Position::new(root, vec![0, 1]))?;
            writer.remove(&Range::flat(Position::new(root, vec![0, 1]), 3))
        })
        .unwrap();

    assert_eq!(texts(&model, root), vec!["abc"]);
    assert!(model.take_change_sets().is_empty());
    // The operations still happened and remain undoable
    assert_eq!(model.take_completed_batches()[0].len(), 2);
}

#[test]
fn test_changes_in_sibling_subtrees_are_disjoint() {
    let (mut model, root) = model_with_paragraphs(&["abc", "def"]);
    model
        .change(|writer| {
            writer.insert_text("x", Default::default(), Position::new(root, vec![0, 1]))?;
            writer.set_attribute("bold", Some(json!(true)), &Range::flat(Position::new(root, vec![1, 0]), 3))
        })
        .unwrap();

    let changes = model.take_change_sets().remove(0).changes;
    assert_eq!(
        changes,
        vec![
            Change::Insert {
                position: Position::new(root, vec![0, 1]),
                how_many: 1,
            },
            Change::Attribute {
                range: Range::flat(Position::new(root, vec![1, 0]), 3),
                key: "bold".into(),
                old_value: None,
                new_value: Some(json!(true)),
            },
        ]
    );
}

#[test]
fn test_move_three_nodes_and_restore_with_inverse() {
    let (mut model, root) = model_with_paragraphs(&["0", "1", "2", "3", "4", "5", "6", "7"]);
    let before = model.document().to_node(root);

    let moved = model
        .change(|writer| writer.move_range(&Range::flat(Position::new(root, vec![2]), 3), Position::new(root, vec![8])))
        .unwrap();
    assert_eq!(moved, Range::flat(Position::new(root, vec![5]), 3));
    assert_eq!(texts(&model, root), vec!["0", "1", "5", "6", "7", "2", "3", "4"]);
    assert_eq!(model.take_change_sets()[0].changes.len(), 2);

    let operation = model.document().history().last().cloned().unwrap();
    model
        .change(|writer| {
            writer.apply_operation(operation.invert())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(model.document().to_node(root), before);
}

#[test]
fn test_move_to_end_of_own_range_is_degenerate() {
    let (mut model, root) = model_with_paragraphs(&["0", "1", "2", "3", "4", "5", "6", "7"]);
    let before = model.document().to_node(root);
    let version = model.document().version();

    // Target read before the move: offset 5 is where the range already ends
    let moved = model
        .change(|writer| writer.move_range(&Range::flat(Position::new(root, vec![2]), 3), Position::new(root, vec![5])))
        .unwrap();
    assert_eq!(moved, Range::flat(Position::new(root, vec![2]), 3));
    assert_eq!(texts(&model, root), vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
    assert_eq!(model.document().version(), version + 1);

    let operation = model.document().history().last().cloned().unwrap();
    model
        .change(|writer| {
            writer.apply_operation(operation.invert())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(model.document().to_node(root), before);

    // Empty ranges move nothing and record nothing
    let version = model.document().version();
    let moved = model
        .change(|writer| writer.move_range(&Range::flat(Position::new(root, vec![2]), 0), Position::new(root, vec![5])))
        .unwrap();
    assert!(moved.is_collapsed());
    assert_eq!(model.document().version(), version);

    // A target strictly inside the range is refused
    let result = model.change(|writer| writer.move_range(&Range::flat(Position::new(root, vec![2]), 3), Position::new(root, vec![3])));
    assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    assert_eq!(model.document().to_node(root), before);
}

#[test]
fn test_overlapping_markers_collapse_at_deletion_point() {
    let (mut model, root) = model_with_paragraphs(&["abcdef"]);
    model
        .change(|writer| {
            writer.add_marker("comment:1", Range::flat(Position::new(root, vec![0, 1]), 2), false)?;
            writer.add_marker("comment:2", Range::flat(Position::new(root, vec![0, 2]), 3), false)
        })
        .unwrap();

    model
        .change(|writer| writer.remove(&Range::flat(Position::new(root, vec![0, 1]), 4)))
        .unwrap();

    let collapsed = Range::collapsed(Position::new(root, vec![0, 1]));
    let markers = model.document().markers();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers.get("comment:1").unwrap().range, collapsed);
    assert_eq!(markers.get("comment:2").unwrap().range, collapsed);
    assert_eq!(markers.in_group("comment").count(), 2);
}

#[test]
fn test_inverses_restore_tree_exactly() {
    let (mut model, root) = model_with_paragraphs(&["hello world", "second"]);
    let before = model.document().to_node(root);
    let version = model.document().version();

    model
        .change(|writer| {
            writer.set_attribute("bold", Some(json!(true)), &Range::flat(Position::new(root, vec![0, 2]), 5))?;
            let paragraph = writer.document().children(root)[0];
            writer.rename(paragraph, "heading")?;
            writer.split(&Position::new(root, vec![0, 5]))?;
            writer.insert(Node::element("image").with_attribute("src", "a.png"), Position::new(root, vec![2]))?;
            writer.move_range(&Range::flat(Position::new(root, vec![3]), 1), Position::new(root, vec![0]))?;
            writer.remove(&Range::flat(Position::new(root, vec![1, 0]), 2))?;
            Ok(())
        })
        .unwrap();
    assert_ne!(model.document().to_node(root), before);

    undo_history_since(&mut model, version);
    assert_eq!(model.document().to_node(root), before);
}

#[test]
fn test_stale_operation_is_rejected() {
    let (mut model, root) = model_with_paragraphs(&["abc"]);
    let version = model.document().version();
    let result = model.change(|writer| {
        writer.apply_operation(Operation::insert(Position::new(root, vec![0, 0]), Node::text("x")).with_base_version(version + 5))?;
        Ok(())
    });
    assert_eq!(
        result,
        Err(ModelError::StaleVersion {
            expected: version,
            found: Some(version + 5),
        })
    );
    assert_eq!(model.document().version(), version);
}

#[test]
fn test_moving_into_own_subtree_fails() {
    let (mut model, root) = model_with_paragraphs(&["abc"]);
    let result = model.change(|writer| {
        writer.move_range(&Range::flat(Position::new(root, vec![0]), 1), Position::new(root, vec![0, 1]))?;
        Ok(())
    });
    assert_eq!(result, Err(ModelError::CycleDetected));
    assert_eq!(texts(&model, root), vec!["abc"]);
}

#[test]
fn test_position_trichotomy() {
    let document = Document::with_roots(&["main", "title"]).unwrap();
    let main = document.root("main").unwrap();
    let title = document.root("title").unwrap();
    let positions = [
        Position::new(main, vec![0]),
        Position::new(main, vec![0, 3]),
        Position::new(main, vec![1]),
        Position::new(main, vec![1, 0, 2]),
    ];
    for a in &positions {
        for b in &positions {
            let relations = [a.is_before(b), a == b, a.is_after(b)];
            assert_eq!(relations.iter().filter(|holds| **holds).count(), 1);
        }
    }
    assert_eq!(
        positions[0].compare(&Position::new(title, vec![0])),
        PositionRelation::Different
    );
}

#[test]
fn test_concurrent_edits_converge_after_transform() {
    let (mut left, root) = model_with_paragraphs(&["abcdef"]);
    let (mut right, _) = model_with_paragraphs(&["abcdef"]);

    let a = vec![Operation::insert(Position::new(root, vec![0, 2]), Node::text("XY"))];
    let b = vec![
        Operation::remove(Position::new(root, vec![0, 1]), 3),
        Operation::attribute(Range::flat(Position::new(root, vec![0, 0]), 2), "bold", None, Some(json!(true))),
    ];
    let (a_after_b, b_after_a) = folio_model::transform_sets(&a, &b, true);

    let apply = |model: &mut Model, first: &[Operation], second: &[Operation]| {
        model
            .change(|writer| {
                for operation in first.iter().chain(second) {
                    writer.apply_operation(Operation::new(operation.kind.clone()))?;
                }
                Ok(())
            })
            .unwrap();
    };
    apply(&mut left, &a, &b_after_a);
    apply(&mut right, &b, &a_after_b);

    assert_eq!(left.document().to_node(root), right.document().to_node(root));
}

#[test]
fn test_detached_root_is_reported() {
    let (mut model, _) = model_with_paragraphs(&["abc"]);
    model.change(|writer| writer.add_root("notes", "$root").map(|_| ())).unwrap();
    let change_set = model.take_change_sets().remove(0);
    assert_eq!(change_set.root_changes.len(), 1);
    assert!(change_set.root_changes[0].attached);

    model.change(|writer| writer.detach_root("notes")).unwrap();
    let change_set = model.take_change_sets().remove(0);
    assert_eq!(change_set.root_changes[0].name, "notes");
    assert!(!change_set.root_changes[0].attached);
    assert_eq!(model.document().root_names(), vec!["main"]);
}
