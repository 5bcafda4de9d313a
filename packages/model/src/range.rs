//! # Ranges
//!
//! An ordered pair of positions in one root. Besides the usual queries this
//! module holds the two flavours of range transformation:
//!
//! - **live**: a single range following edits (markers, selection). Content
//!   moved to the graveyard collapses the range to the deletion point.
//! - **pieces**: a flat range split into the parts that still exist after an
//!   edit. Operational transformation uses these so an operation never
//!   touches content it did not see.

use crate::errors::{ModelError, ModelResult};
use crate::node::{NodeId, GRAVEYARD};
use crate::position::{Position, PositionRelation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> ModelResult<Self> {
        match start.compare(&end) {
            PositionRelation::Before | PositionRelation::Same => Ok(Self { start, end }),
            PositionRelation::After => Err(ModelError::invalid_position("range start after end")),
            PositionRelation::Different => Err(ModelError::invalid_position("range spans two roots")),
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            end: position.clone(),
            start: position,
        }
    }

    /// `how_many` units starting at `start`, inside one parent
    pub fn flat(start: Position, how_many: usize) -> Self {
        let end = start.shifted(how_many);
        Self { start, end }
    }

    pub fn root(&self) -> NodeId {
        self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both ends share one parent
    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent_as(&self.end)
    }

    /// Offset units covered by a flat range
    pub fn len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Strictly between the range ends
    pub fn contains_position(&self, position: &Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.root() == other.root()
            && !other.start.is_before(&self.start)
            && !other.end.is_after(&self.end)
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.root() == other.root() && self.start.is_before(&other.end) && other.start.is_before(&self.end)
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.intersects(other) {
            return None;
        }
        let start = if self.start.is_after(&other.start) { &self.start } else { &other.start };
        let end = if self.end.is_before(&other.end) { &self.end } else { &other.end };
        Some(Range {
            start: start.clone(),
            end: end.clone(),
        })
    }

    /// Intersecting or sharing a boundary
    pub fn touches(&self, other: &Range) -> bool {
        self.root() == other.root() && !self.end.is_before(&other.start) && !other.end.is_before(&self.start)
    }

    // ---------------------------------------------------------------------
    // Live transformation
    // ---------------------------------------------------------------------

    pub fn live_after_insertion(&self, at: &Position, how_many: usize) -> Range {
        if self.is_collapsed() {
            return Range::collapsed(self.start.transformed_by_insertion(at, how_many, true));
        }
        Range {
            start: self.start.transformed_by_insertion(at, how_many, true),
            end: self.end.transformed_by_insertion(at, how_many, false),
        }
    }

    pub fn live_after_deletion(&self, at: &Position, how_many: usize) -> Range {
        Range {
            start: self.start.transformed_by_deletion(at, how_many),
            end: self.end.transformed_by_deletion(at, how_many),
        }
    }

    /// Follow a move. Moves into the graveyard act as deletions. A range
    /// whose ends drift apart (partially moved) keeps the part left behind.
    pub fn live_after_move(&self, source: &Position, target: &Position, how_many: usize) -> Range {
        if target.root == GRAVEYARD {
            return self.live_after_deletion(source, how_many);
        }
        if self.is_collapsed() {
            return Range::collapsed(self.start.transformed_by_move(source, target, how_many, true));
        }
        let start = self.start.transformed_by_move(source, target, how_many, true);
        let end = self.end.transformed_by_move(source, target, how_many, false);
        if let Ok(range) = Range::new(start.clone(), end) {
            return range;
        }
        let start_moved = self.start.offset_inside_range(source, how_many).is_some();
        let end_moved = self.end.offset_inside_range(source, how_many).is_some();
        let left_behind = match (start_moved, end_moved) {
            (true, false) => Range::new(
                source.shifted(how_many).transformed_by_move(source, target, how_many, true),
                self.end.transformed_by_move(source, target, how_many, false),
            ),
            (false, true) => Range::new(
                self.start.transformed_by_move(source, target, how_many, true),
                source.transformed_by_move(source, target, how_many, false),
            ),
            _ => Err(ModelError::invalid_position("range torn apart by move")),
        };
        left_behind.unwrap_or_else(|_| Range::collapsed(start))
    }

    // ---------------------------------------------------------------------
    // Piecewise transformation of flat ranges
    // ---------------------------------------------------------------------

    /// Drop the inserted content from the range if it lands strictly inside
    fn split_around_insertion(self, at: &Position, how_many: usize) -> Vec<Range> {
        if how_many == 0 || !self.start.has_same_parent_as(at) {
            return vec![self];
        }
        let insert = at.offset();
        if insert <= self.start.offset() || insert >= self.end.offset() {
            return vec![self];
        }
        vec![
            Range {
                start: self.start.clone(),
                end: at.clone(),
            },
            Range {
                start: at.shifted(how_many),
                end: self.end.clone(),
            },
        ]
    }

    /// Parts of a flat range after `how_many` units were inserted at `at`.
    /// Inserted content is never part of the result.
    pub fn pieces_after_insertion(&self, at: &Position, how_many: usize) -> Vec<Range> {
        let moved = Range {
            start: self.start.transformed_by_insertion(at, how_many, true),
            end: self.end.transformed_by_insertion(at, how_many, false),
        };
        moved
            .split_around_insertion(at, how_many)
            .into_iter()
            .filter(|range| !range.is_collapsed() || self.is_collapsed())
            .collect()
    }

    /// Parts of a flat range after a move, in document order of the original
    pub fn pieces_after_move(&self, source: &Position, target: &Position, how_many: usize) -> Vec<Range> {
        let moved_start = Position::moved_range_start(source, target, how_many);
        let stayed = |range: Range| -> Vec<Range> {
            let after_deletion = Range {
                start: range.start.transformed_by_deletion(source, how_many),
                end: range.end.transformed_by_deletion(source, how_many),
            };
            after_deletion.pieces_after_insertion(&moved_start, how_many)
        };

        let mut pieces = Vec::new();
        if self.start.has_same_parent_as(source) {
            let (a, b) = (self.start.offset(), self.end.offset());
            let (s, e) = (source.offset(), source.offset() + how_many);
            if a < b.min(s) {
                pieces.extend(stayed(Range::flat(self.start.clone(), b.min(s) - a)));
            }
            let (from, to) = (a.max(s), b.min(e));
            if from < to {
                pieces.push(Range::flat(moved_start.shifted(from - s), to - from));
            }
            if a.max(e) < b {
                pieces.extend(stayed(Range::flat(self.start.with_offset(a.max(e)), b - a.max(e))));
            }
        } else if self.start.offset_inside_range(source, how_many).is_some() {
            pieces.push(Range {
                start: self.start.transformed_by_move(source, target, how_many, true),
                end: self.end.transformed_by_move(source, target, how_many, false),
            });
        } else {
            pieces.extend(stayed(self.clone()));
        }
        pieces.retain(|range| !range.is_collapsed());
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: NodeId = NodeId(1);

    fn pos(path: &[usize]) -> Position {
        Position::new(ROOT, path.to_vec())
    }

    fn range(start: &[usize], end: &[usize]) -> Range {
        Range::new(pos(start), pos(end)).unwrap()
    }

    #[test]
    fn test_new_rejects_reversed_ranges() {
        assert!(Range::new(pos(&[3]), pos(&[1])).is_err());
        assert!(Range::new(pos(&[1]), Position::new(NodeId(7), vec![2])).is_err());
    }

    #[test]
    fn test_containment_and_intersection() {
        let outer = range(&[0], &[5]);
        let inner = range(&[1], &[3]);
        assert!(outer.contains_range(&inner));
        assert!(outer.contains_position(&pos(&[2, 4])));
        assert!(!outer.contains_position(&pos(&[5])));
        assert_eq!(outer.intersection(&range(&[4], &[8])), Some(range(&[4], &[5])));
        assert_eq!(outer.intersection(&range(&[5], &[8])), None);
        assert!(outer.touches(&range(&[5], &[8])));
        assert!(inner.is_flat());
        assert!(!range(&[0, 1], &[2]).is_flat());
    }

    #[test]
    fn test_live_insertion_at_edges() {
        let live = range(&[2], &[4]);
        assert_eq!(live.live_after_insertion(&pos(&[2]), 1), range(&[3], &[5]));
        assert_eq!(live.live_after_insertion(&pos(&[4]), 1), range(&[2], &[4]));
        let caret = range(&[2], &[2]);
        assert_eq!(caret.live_after_insertion(&pos(&[2]), 3), range(&[5], &[5]));
    }

    #[test]
    fn test_live_removal_collapses() {
        let graveyard = Position::new(GRAVEYARD, vec![0]);
        let live = range(&[2], &[4]);
        assert_eq!(live.live_after_move(&pos(&[1]), &graveyard, 4), range(&[1], &[1]));
    }

    #[test]
    fn test_live_move_follows_content() {
        let live = range(&[2], &[4]);
        // move the whole range to the end of a 10-unit parent
        assert_eq!(live.live_after_move(&pos(&[2]), &pos(&[10]), 2), range(&[8], &[10]));
    }

    #[test]
    fn test_pieces_after_insertion_skip_inserted_content() {
        let flat = range(&[2], &[6]);
        assert_eq!(
            flat.pieces_after_insertion(&pos(&[4]), 2),
            vec![range(&[2], &[4]), range(&[6], &[8])]
        );
        assert_eq!(flat.pieces_after_insertion(&pos(&[2]), 2), vec![range(&[4], &[8])]);
    }

    #[test]
    fn test_pieces_after_partial_move() {
        // [2, 6) while [4, 8) moves to offset 0
        let flat = range(&[2], &[6]);
        let pieces = flat.pieces_after_move(&pos(&[4]), &pos(&[0]), 4);
        assert_eq!(pieces, vec![range(&[6], &[8]), range(&[0], &[2])]);
    }
}
