//! # Positions
//!
//! A position is a root plus a path of offsets. Every offset but the last
//! selects an element inside its parent. The last offset is the place between
//! two items of the parent, counted in offset units (1 per element, 1 per
//! character).
//!
//! The `transformed_by_*` helpers describe how a position shifts when content
//! is inserted, deleted or moved. Live ranges (markers, selection) and
//! operational transformation are both built on them.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub root: NodeId,
    pub path: Vec<usize>,
}

/// Result of comparing two positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRelation {
    Before,
    Same,
    After,
    /// Positions in different roots are not ordered
    Different,
}

impl Position {
    pub fn new(root: NodeId, path: Vec<usize>) -> Self {
        Self { root, path }
    }

    /// Offset inside the parent
    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn parent_path(&self) -> &[usize] {
        match self.path.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }

    pub fn with_offset(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            *last = offset;
        }
        Position::new(self.root, path)
    }

    /// Position `delta` units further inside the same parent
    pub fn shifted(&self, delta: usize) -> Position {
        self.with_offset(self.offset() + delta)
    }

    /// Position inside the element that starts right after this position
    pub fn child(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        path.push(offset);
        Position::new(self.root, path)
    }

    pub fn compare(&self, other: &Position) -> PositionRelation {
        if self.root != other.root {
            return PositionRelation::Different;
        }
        match self.path.cmp(&other.path) {
            Ordering::Less => PositionRelation::Before,
            Ordering::Equal => PositionRelation::Same,
            Ordering::Greater => PositionRelation::After,
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::After
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    /// Whether this path runs through the parent `at` points into, and the
    /// offset it has at that depth
    fn offset_at_depth_of(&self, at: &Position) -> Option<usize> {
        let depth = at.path.len().checked_sub(1)?;
        if self.root != at.root || self.path.len() <= depth || self.path[..depth] != at.path[..depth] {
            return None;
        }
        Some(self.path[depth])
    }

    /// Shift for `how_many` units inserted at `at`. A position equal to `at`
    /// moves only when `stick_to_next` is set.
    pub fn transformed_by_insertion(&self, at: &Position, how_many: usize, stick_to_next: bool) -> Position {
        let Some(offset) = self.offset_at_depth_of(at) else {
            return self.clone();
        };
        let depth = at.path.len() - 1;
        let insert_offset = at.offset();
        let shifts = if self.path.len() == depth + 1 {
            offset > insert_offset || (offset == insert_offset && stick_to_next)
        } else {
            offset >= insert_offset
        };
        if !shifts {
            return self.clone();
        }
        let mut result = self.clone();
        result.path[depth] += how_many;
        result
    }

    /// Shift for `how_many` units removed at `at`. Positions inside the removed
    /// content collapse to `at`.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: usize) -> Position {
        let Some(offset) = self.offset_at_depth_of(at) else {
            return self.clone();
        };
        let depth = at.path.len() - 1;
        let start = at.offset();
        let end = start + how_many;
        let mut result = self.clone();
        if self.path.len() == depth + 1 {
            if offset >= end {
                result.path[depth] -= how_many;
            } else if offset > start {
                result.path[depth] = start;
            }
        } else if offset >= end {
            result.path[depth] -= how_many;
        } else if offset >= start {
            return at.clone();
        }
        result
    }

    /// Offset relative to the start of `[source, source + how_many)` if this
    /// position lies strictly inside that range or inside one of its nodes
    pub fn offset_inside_range(&self, source: &Position, how_many: usize) -> Option<usize> {
        let offset = self.offset_at_depth_of(source)?;
        let depth = source.path.len() - 1;
        let start = source.offset();
        let end = start + how_many;
        let inside = if self.path.len() == depth + 1 {
            offset > start && offset < end
        } else {
            offset >= start && offset < end
        };
        inside.then(|| offset - start)
    }

    /// Where the moved content starts once a move has been applied
    pub fn moved_range_start(source: &Position, target: &Position, how_many: usize) -> Position {
        target.transformed_by_deletion(source, how_many)
    }

    /// Shift for `how_many` units moved from `source` to `target`. Positions
    /// inside the moved content travel with it.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        stick_to_next: bool,
    ) -> Position {
        let start = Position::moved_range_start(source, target, how_many);
        if let Some(relative) = self.offset_inside_range(source, how_many) {
            let depth = source.path.len() - 1;
            let mut path = start.path.clone();
            if let Some(last) = path.last_mut() {
                *last += relative;
            }
            path.extend_from_slice(&self.path[depth + 1..]);
            return Position::new(start.root, path);
        }
        self.transformed_by_deletion(source, how_many)
            .transformed_by_insertion(&start, how_many, stick_to_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: NodeId = NodeId(1);
    const OTHER: NodeId = NodeId(2);

    fn pos(path: &[usize]) -> Position {
        Position::new(ROOT, path.to_vec())
    }

    #[test]
    fn test_trichotomy() {
        let samples = [pos(&[0]), pos(&[0, 1]), pos(&[1]), pos(&[1, 0, 2]), pos(&[2])];
        for a in &samples {
            for b in &samples {
                let relations = [a.is_before(b), a == b, a.is_after(b)];
                assert_eq!(relations.iter().filter(|r| **r).count(), 1, "{:?} vs {:?}", a, b);
            }
        }
        assert_eq!(pos(&[0]).compare(&Position::new(OTHER, vec![0])), PositionRelation::Different);
    }

    #[test]
    fn test_insertion_sticks_on_request() {
        let at = pos(&[3]);
        assert_eq!(pos(&[3]).transformed_by_insertion(&at, 2, false), pos(&[3]));
        assert_eq!(pos(&[3]).transformed_by_insertion(&at, 2, true), pos(&[5]));
        assert_eq!(pos(&[4, 1]).transformed_by_insertion(&at, 2, false), pos(&[6, 1]));
        assert_eq!(pos(&[3, 1]).transformed_by_insertion(&at, 2, false), pos(&[5, 1]));
        assert_eq!(pos(&[2, 1]).transformed_by_insertion(&at, 2, false), pos(&[2, 1]));
    }

    #[test]
    fn test_deletion_collapses_inside() {
        let at = pos(&[2]);
        assert_eq!(pos(&[3]).transformed_by_deletion(&at, 3), pos(&[2]));
        assert_eq!(pos(&[6]).transformed_by_deletion(&at, 3), pos(&[3]));
        assert_eq!(pos(&[3, 4]).transformed_by_deletion(&at, 3), pos(&[2]));
        assert_eq!(pos(&[5, 4]).transformed_by_deletion(&at, 3), pos(&[2, 4]));
        assert_eq!(pos(&[1, 4]).transformed_by_deletion(&at, 3), pos(&[1, 4]));
    }

    #[test]
    fn test_move_carries_inner_positions() {
        // Move [2, 5) to offset 7 of the same parent
        let source = pos(&[2]);
        let target = pos(&[7]);
        assert_eq!(Position::moved_range_start(&source, &target, 3), pos(&[4]));
        assert_eq!(pos(&[3]).transformed_by_move(&source, &target, 3, false), pos(&[5]));
        assert_eq!(pos(&[2, 1]).transformed_by_move(&source, &target, 3, false), pos(&[4, 1]));
        assert_eq!(pos(&[6]).transformed_by_move(&source, &target, 3, false), pos(&[3]));
        assert_eq!(pos(&[1]).transformed_by_move(&source, &target, 3, false), pos(&[1]));
    }

    #[test]
    fn test_move_into_other_root() {
        let source = pos(&[1, 0]);
        let target = Position::new(OTHER, vec![0]);
        let moved = pos(&[1, 1]).transformed_by_move(&source, &target, 2, false);
        assert_eq!(moved, Position::new(OTHER, vec![1]));
    }
}
