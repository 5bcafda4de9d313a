//! # Operational Transformation
//!
//! `transform(a, b)` rewrites `a` so that it applies to the document after
//! `b` was applied and has the effect `a` intended. The result may be
//! several operations (a range torn apart by `b`) or a single
//! [`OperationKind::NoOp`] when nothing of `a` survives.
//!
//! ## Conflicts
//!
//! When both operations want the same thing (insert at one position, set one
//! attribute, rename one element, change one marker) the stronger side wins:
//!
//! - insertions at the same position: the stronger one ends up first
//! - attribute, rename and marker conflicts: the stronger one rebases its old
//!   value onto the weaker one's result, the weaker one gives up
//!
//! Content removed by `b` is never touched again by a transformed `a`.
//!
//! Transformed operations carry no base version; they are applied against
//! whatever version the document is at.

use super::{Operation, OperationKind};
use crate::node::GRAVEYARD;
use crate::position::Position;
use crate::range::Range;
use serde_json::Value;
use tracing::trace;

/// Transform `a` against `b` (both based on the same document)
pub fn transform(a: &Operation, b: &Operation, a_is_stronger: bool) -> Vec<Operation> {
    let kinds = match &b.kind {
        OperationKind::NoOp => vec![a.kind.clone()],
        OperationKind::Insert { position, nodes } => {
            by_insertion(&a.kind, position, nodes.offset_size(), a_is_stronger)
        }
        OperationKind::Move {
            source,
            how_many,
            target,
        } => by_move(&a.kind, source, *how_many, target, a_is_stronger),
        OperationKind::Attribute {
            range, key, new_value, ..
        } => by_attribute(&a.kind, range, key, new_value, a_is_stronger),
        OperationKind::Rename {
            position, new_name, ..
        } => vec![by_rename(&a.kind, position, new_name, a_is_stronger)],
        OperationKind::Marker { name, new_range, .. } => {
            vec![by_marker(&a.kind, name, new_range, a_is_stronger)]
        }
        OperationKind::Root { name, attach, .. } => vec![by_root(&a.kind, name, *attach)],
    };
    let mut operations: Vec<Operation> = kinds
        .into_iter()
        .filter(|kind| !matches!(kind, OperationKind::NoOp))
        .map(Operation::new)
        .collect();
    if operations.is_empty() {
        operations.push(Operation::no_op());
    }
    trace!(
        a = a.kind_name(),
        b = b.kind_name(),
        results = operations.len(),
        "operation transformed"
    );
    operations
}

/// Transform two concurrent operation sequences against each other.
///
/// Returns `(a', b')` such that applying `b` then `a'` gives the same
/// document as applying `a` then `b'`.
pub fn transform_sets(a: &[Operation], b: &[Operation], a_is_stronger: bool) -> (Vec<Operation>, Vec<Operation>) {
    transform_lists(a.to_vec(), b.to_vec(), a_is_stronger)
}

fn transform_lists(xs: Vec<Operation>, ys: Vec<Operation>, x_is_stronger: bool) -> (Vec<Operation>, Vec<Operation>) {
    if xs.is_empty() || ys.is_empty() {
        return (xs, ys);
    }
    if xs.len() == 1 && ys.len() == 1 {
        return (
            transform(&xs[0], &ys[0], x_is_stronger),
            transform(&ys[0], &xs[0], !x_is_stronger),
        );
    }
    if xs.len() > 1 {
        let mut rest = xs;
        let first = rest.remove(0);
        let (mut first_done, ys) = transform_lists(vec![first], ys, x_is_stronger);
        let (rest_done, ys) = transform_lists(rest, ys, x_is_stronger);
        first_done.extend(rest_done);
        return (first_done, ys);
    }
    let mut rest = ys;
    let first = rest.remove(0);
    let (xs, mut first_done) = transform_lists(xs, vec![first], x_is_stronger);
    let (xs, rest_done) = transform_lists(xs, rest, x_is_stronger);
    first_done.extend(rest_done);
    (xs, first_done)
}

// -------------------------------------------------------------------------
// Against an insertion
// -------------------------------------------------------------------------

fn by_insertion(a: &OperationKind, at: &Position, how_many: usize, a_is_stronger: bool) -> Vec<OperationKind> {
    match a {
        OperationKind::Insert { position, nodes } => vec![OperationKind::Insert {
            position: position.transformed_by_insertion(at, how_many, !a_is_stronger),
            nodes: nodes.clone(),
        }],
        OperationKind::Move {
            source,
            how_many: moved,
            target,
        } => {
            let target = target.transformed_by_insertion(at, how_many, !a_is_stronger);
            let spread = source.has_same_parent_as(at)
                && at.offset() > source.offset()
                && at.offset() < source.offset() + moved;
            if spread {
                // Content inserted into the moved range travels with it
                return vec![OperationKind::Move {
                    source: source.clone(),
                    how_many: moved + how_many,
                    target,
                }];
            }
            vec![OperationKind::Move {
                source: source.transformed_by_insertion(at, how_many, true),
                how_many: *moved,
                target,
            }]
        }
        OperationKind::Attribute {
            range,
            key,
            old_value,
            new_value,
        } => range
            .pieces_after_insertion(at, how_many)
            .into_iter()
            .map(|piece| OperationKind::Attribute {
                range: piece,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
            .collect(),
        OperationKind::Rename {
            position,
            old_name,
            new_name,
        } => vec![OperationKind::Rename {
            position: position.transformed_by_insertion(at, how_many, true),
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        }],
        OperationKind::Marker {
            name,
            old_range,
            new_range,
            affects_data,
        } => vec![OperationKind::Marker {
            name: name.clone(),
            old_range: old_range.as_ref().map(|range| range.live_after_insertion(at, how_many)),
            new_range: new_range.as_ref().map(|range| range.live_after_insertion(at, how_many)),
            affects_data: *affects_data,
        }],
        OperationKind::Root { .. } | OperationKind::NoOp => vec![a.clone()],
    }
}

// -------------------------------------------------------------------------
// Against a move
// -------------------------------------------------------------------------

/// Position in front of a node, after a move. Unlike gap positions, a node
/// position on the first moved item travels with it.
fn node_position_after_move(position: &Position, source: &Position, target: &Position, how_many: usize) -> Position {
    if position.has_same_parent_as(source) {
        let (offset, start) = (position.offset(), source.offset());
        if offset >= start && offset < start + how_many {
            return Position::moved_range_start(source, target, how_many).shifted(offset - start);
        }
    }
    position.transformed_by_move(source, target, how_many, true)
}

fn range_after_move(range: &Range, source: &Position, target: &Position, how_many: usize) -> Range {
    Range {
        start: range.start.transformed_by_move(source, target, how_many, true),
        end: range.end.transformed_by_move(source, target, how_many, false),
    }
}

fn by_move(
    a: &OperationKind,
    source: &Position,
    how_many: usize,
    target: &Position,
    a_is_stronger: bool,
) -> Vec<OperationKind> {
    match a {
        OperationKind::Insert { position, nodes } => vec![OperationKind::Insert {
            position: position.transformed_by_move(source, target, how_many, !a_is_stronger),
            nodes: nodes.clone(),
        }],
        OperationKind::Move {
            source: a_source,
            how_many: a_how_many,
            target: a_target,
        } => {
            let removed_by_b = target.root == GRAVEYARD;
            let pieces: Vec<Range> = Range::flat(a_source.clone(), *a_how_many)
                .pieces_after_move(source, target, how_many)
                .into_iter()
                .filter(|piece| !(removed_by_b && piece.root() == GRAVEYARD && a_source.root != GRAVEYARD))
                .collect();
            let mut a_target = a_target.transformed_by_move(source, target, how_many, !a_is_stronger);

            // Move pieces right to left; each later move sees the earlier ones
            let mut moves = Vec::with_capacity(pieces.len());
            let mut remaining = pieces;
            while let Some(piece) = remaining.pop() {
                let n = piece.len();
                for other in remaining.iter_mut() {
                    *other = range_after_move(other, &piece.start, &a_target, n);
                }
                let next_target = a_target.transformed_by_move(&piece.start, &a_target, n, false);
                moves.push(OperationKind::Move {
                    source: piece.start,
                    how_many: n,
                    target: a_target,
                });
                a_target = next_target;
            }
            moves
        }
        OperationKind::Attribute {
            range,
            key,
            old_value,
            new_value,
        } => range
            .pieces_after_move(source, target, how_many)
            .into_iter()
            .map(|piece| OperationKind::Attribute {
                range: piece,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
            .collect(),
        OperationKind::Rename {
            position,
            old_name,
            new_name,
        } => vec![OperationKind::Rename {
            position: node_position_after_move(position, source, target, how_many),
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        }],
        OperationKind::Marker {
            name,
            old_range,
            new_range,
            affects_data,
        } => vec![OperationKind::Marker {
            name: name.clone(),
            old_range: old_range
                .as_ref()
                .map(|range| range.live_after_move(source, target, how_many)),
            new_range: new_range
                .as_ref()
                .map(|range| range.live_after_move(source, target, how_many)),
            affects_data: *affects_data,
        }],
        OperationKind::Root { .. } | OperationKind::NoOp => vec![a.clone()],
    }
}

// -------------------------------------------------------------------------
// Against attribute, rename, marker and root changes
// -------------------------------------------------------------------------

/// Parts of a flat `range` outside `other`
fn subtract(range: &Range, other: &Range) -> Vec<Range> {
    let Some(common) = range.intersection(other) else {
        return vec![range.clone()];
    };
    let mut parts = Vec::new();
    if range.start.is_before(&common.start) {
        parts.push(Range {
            start: range.start.clone(),
            end: common.start.clone(),
        });
    }
    if common.end.is_before(&range.end) {
        parts.push(Range {
            start: common.end,
            end: range.end.clone(),
        });
    }
    parts
}

fn by_attribute(
    a: &OperationKind,
    b_range: &Range,
    b_key: &str,
    b_new_value: &Option<Value>,
    a_is_stronger: bool,
) -> Vec<OperationKind> {
    let OperationKind::Attribute {
        range,
        key,
        old_value,
        new_value,
    } = a
    else {
        return vec![a.clone()];
    };
    let Some(common) = range.intersection(b_range).filter(|_| key == b_key) else {
        return vec![a.clone()];
    };
    let attribute = |range: Range, old_value: &Option<Value>| OperationKind::Attribute {
        range,
        key: key.clone(),
        old_value: old_value.clone(),
        new_value: new_value.clone(),
    };

    let mut kinds: Vec<OperationKind> = subtract(range, &common)
        .into_iter()
        .map(|piece| attribute(piece, old_value))
        .collect();
    if a_is_stronger && b_new_value != new_value {
        kinds.push(attribute(common, b_new_value));
    }
    kinds
}

fn by_rename(a: &OperationKind, b_position: &Position, b_new_name: &str, a_is_stronger: bool) -> OperationKind {
    match a {
        OperationKind::Rename {
            position, new_name, ..
        } if position == b_position => {
            if !a_is_stronger || new_name == b_new_name {
                return OperationKind::NoOp;
            }
            OperationKind::Rename {
                position: position.clone(),
                old_name: b_new_name.to_string(),
                new_name: new_name.clone(),
            }
        }
        _ => a.clone(),
    }
}

fn by_marker(a: &OperationKind, b_name: &str, b_new_range: &Option<Range>, a_is_stronger: bool) -> OperationKind {
    match a {
        OperationKind::Marker {
            name,
            new_range,
            affects_data,
            ..
        } if name == b_name => {
            if !a_is_stronger || new_range == b_new_range {
                return OperationKind::NoOp;
            }
            OperationKind::Marker {
                name: name.clone(),
                old_range: b_new_range.clone(),
                new_range: new_range.clone(),
                affects_data: *affects_data,
            }
        }
        _ => a.clone(),
    }
}

fn by_root(a: &OperationKind, b_name: &str, b_attach: bool) -> OperationKind {
    match a {
        OperationKind::Root { name, attach, .. } if name == b_name && *attach == b_attach => OperationKind::NoOp,
        _ => a.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeId};
    use serde_json::json;

    const ROOT: NodeId = NodeId(1);

    fn pos(path: &[usize]) -> Position {
        Position::new(ROOT, path.to_vec())
    }

    fn graveyard() -> Position {
        Position::new(GRAVEYARD, vec![0])
    }

    fn single(operations: Vec<Operation>) -> OperationKind {
        assert_eq!(operations.len(), 1, "{:?}", operations);
        operations.into_iter().next().unwrap().kind
    }

    #[test]
    fn test_insertions_at_same_position_stronger_goes_first() {
        let a = Operation::insert(pos(&[0, 2]), Node::text("x"));
        let b = Operation::insert(pos(&[0, 2]), Node::text("yy"));

        let stronger = single(transform(&a, &b, true));
        assert!(matches!(stronger, OperationKind::Insert { ref position, .. } if *position == pos(&[0, 2])));

        let weaker = single(transform(&a, &b, false));
        assert!(matches!(weaker, OperationKind::Insert { ref position, .. } if *position == pos(&[0, 4])));
    }

    #[test]
    fn test_attribute_conflict() {
        let a = Operation::attribute(Range::flat(pos(&[0, 0]), 4), "bold", None, Some(json!(true)));
        let b = Operation::attribute(Range::flat(pos(&[0, 2]), 4), "bold", None, Some(json!(false)));

        let stronger: Vec<OperationKind> = transform(&a, &b, true).into_iter().map(|op| op.kind).collect();
        assert_eq!(
            stronger,
            vec![
                OperationKind::Attribute {
                    range: Range::flat(pos(&[0, 0]), 2),
                    key: "bold".into(),
                    old_value: None,
                    new_value: Some(json!(true)),
                },
                OperationKind::Attribute {
                    range: Range::flat(pos(&[0, 2]), 2),
                    key: "bold".into(),
                    old_value: Some(json!(false)),
                    new_value: Some(json!(true)),
                },
            ]
        );

        let weaker = single(transform(&a, &b, false));
        assert!(matches!(weaker, OperationKind::Attribute { ref range, .. } if *range == Range::flat(pos(&[0, 0]), 2)));
    }

    #[test]
    fn test_different_attribute_keys_do_not_conflict() {
        let a = Operation::attribute(Range::flat(pos(&[0, 0]), 4), "bold", None, Some(json!(true)));
        let b = Operation::attribute(Range::flat(pos(&[0, 0]), 4), "italic", None, Some(json!(true)));
        assert_eq!(single(transform(&a, &b, false)), a.kind);
    }

    #[test]
    fn test_insertion_inside_moved_range_travels_with_it() {
        let a = Operation::move_range(pos(&[0, 1]), 3, pos(&[1, 0]));
        let b = Operation::insert(pos(&[0, 2]), Node::text("zz"));
        assert_eq!(
            single(transform(&a, &b, false)),
            OperationKind::Move {
                source: pos(&[0, 1]),
                how_many: 5,
                target: pos(&[1, 0]),
            }
        );
    }

    #[test]
    fn test_overlapping_removals_remove_only_what_is_left() {
        let a = Operation::remove(pos(&[0, 1]), 3);
        let b = Operation::remove(pos(&[0, 2]), 3);
        assert_eq!(
            single(transform(&a, &b, true)),
            OperationKind::Move {
                source: pos(&[0, 1]),
                how_many: 1,
                target: graveyard(),
            }
        );
        let b_after_a = single(transform(&b, &a, false));
        assert!(matches!(
            b_after_a,
            OperationKind::Move { ref source, how_many: 1, .. } if *source == pos(&[0, 1])
        ));
    }

    #[test]
    fn test_fully_removed_content_is_not_touched() {
        let a = Operation::attribute(Range::flat(pos(&[0, 1]), 2), "bold", None, Some(json!(true)));
        let b = Operation::remove(pos(&[0]), 1);
        let transformed = single(transform(&a, &b, true));
        let OperationKind::Attribute { range, .. } = transformed else {
            panic!("expected attribute operation");
        };
        assert_eq!(range.root(), GRAVEYARD);

        let a = Operation::move_range(pos(&[0, 1]), 2, pos(&[1, 0]));
        assert!(single(transform(&a, &b, true)) == OperationKind::NoOp);
    }

    #[test]
    fn test_rename_conflict() {
        let a = Operation::rename(pos(&[0]), "paragraph", "heading");
        let b = Operation::rename(pos(&[0]), "paragraph", "quote");
        assert_eq!(
            single(transform(&a, &b, true)),
            OperationKind::Rename {
                position: pos(&[0]),
                old_name: "quote".into(),
                new_name: "heading".into(),
            }
        );
        assert_eq!(single(transform(&a, &b, false)), OperationKind::NoOp);
    }

    #[test]
    fn test_rename_follows_moved_element() {
        let a = Operation::rename(pos(&[1]), "paragraph", "heading");
        let b = Operation::move_range(pos(&[1]), 1, pos(&[4]));
        let OperationKind::Rename { position, .. } = single(transform(&a, &b, false)) else {
            panic!("expected rename");
        };
        assert_eq!(position, pos(&[3]));
    }

    #[test]
    fn test_same_root_change_becomes_no_op() {
        let a = Operation::root("notes", "$root", true);
        let b = Operation::root("notes", "$root", true);
        assert!(transform(&a, &b, true)[0].is_no_op());
    }

    #[test]
    fn test_transform_sets_of_insertions() {
        let a = vec![
            Operation::insert(pos(&[0, 0]), Node::text("a")),
            Operation::insert(pos(&[0, 1]), Node::text("b")),
        ];
        let b = vec![Operation::insert(pos(&[0, 0]), Node::text("xyz"))];
        let (a_after_b, b_after_a) = transform_sets(&a, &b, true);
        let positions: Vec<Position> = a_after_b
            .iter()
            .map(|op| match &op.kind {
                OperationKind::Insert { position, .. } => position.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(positions, vec![pos(&[0, 0]), pos(&[0, 1])]);
        assert!(matches!(
            &b_after_a[0].kind,
            OperationKind::Insert { position, .. } if *position == pos(&[0, 2])
        ));
    }
}
