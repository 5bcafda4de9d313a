//! Positions, ranges and selection in the render tree.
//!
//! A position is a parent plus an offset. Inside text the offset counts
//! characters; inside elements it counts children.

use crate::node::ViewNodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewPosition {
    pub parent: ViewNodeId,
    pub offset: usize,
}

impl ViewPosition {
    pub fn new(parent: ViewNodeId, offset: usize) -> Self {
        Self { parent, offset }
    }

    pub fn shifted(&self, delta: usize) -> Self {
        Self::new(self.parent, self.offset + delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRange {
    pub start: ViewPosition,
    pub end: ViewPosition,
}

impl ViewRange {
    pub fn new(start: ViewPosition, end: ViewPosition) -> Self {
        Self { start, end }
    }

    pub fn collapsed(position: ViewPosition) -> Self {
        Self::new(position, position)
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both ends inside one parent
    pub fn is_flat(&self) -> bool {
        self.start.parent == self.end.parent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSelection {
    ranges: Vec<ViewRange>,
    backward: bool,
}

impl ViewSelection {
    pub fn new(ranges: Vec<ViewRange>, backward: bool) -> Self {
        Self { ranges, backward }
    }

    pub fn caret(position: ViewPosition) -> Self {
        Self::new(vec![ViewRange::collapsed(position)], false)
    }

    pub fn ranges(&self) -> &[ViewRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_backward(&self) -> bool {
        self.backward
    }

    pub fn anchor(&self) -> Option<ViewPosition> {
        if self.backward {
            self.ranges.last().map(|range| range.end)
        } else {
            self.ranges.first().map(|range| range.start)
        }
    }

    pub fn focus(&self) -> Option<ViewPosition> {
        if self.backward {
            self.ranges.first().map(|range| range.start)
        } else {
            self.ranges.last().map(|range| range.end)
        }
    }

    /// Every node a position of the selection lives in
    pub fn nodes(&self) -> Vec<ViewNodeId> {
        let mut nodes: Vec<ViewNodeId> = self
            .ranges
            .iter()
            .flat_map(|range| [range.start.parent, range.end.parent])
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}
