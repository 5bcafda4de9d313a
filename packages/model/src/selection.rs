//! # Document Selection
//!
//! Ordered, disjoint ranges plus a direction. The document keeps it live:
//! every applied operation transforms the ranges the same way markers are
//! transformed.

use crate::position::Position;
use crate::range::Range;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<Range>,
    backward: bool,
}

impl Selection {
    /// Sorts the ranges and merges overlapping ones
    pub fn new(ranges: Vec<Range>, backward: bool) -> Self {
        Self {
            ranges: normalize(ranges),
            backward,
        }
    }

    pub fn caret(position: Position) -> Self {
        Self::new(vec![Range::collapsed(position)], false)
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn first_range(&self) -> Option<&Range> {
        self.ranges.first()
    }

    pub fn last_range(&self) -> Option<&Range> {
        self.ranges.last()
    }

    pub fn is_backward(&self) -> bool {
        self.backward && !self.is_collapsed()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    pub fn anchor(&self) -> Option<&Position> {
        let range = if self.backward { self.last_range()? } else { self.first_range()? };
        Some(if self.backward { &range.end } else { &range.start })
    }

    pub fn focus(&self) -> Option<&Position> {
        let range = if self.backward { self.first_range()? } else { self.last_range()? };
        Some(if self.backward { &range.start } else { &range.end })
    }

    pub(crate) fn map_ranges(&mut self, mut f: impl FnMut(&Range) -> Option<Range>) {
        let ranges = self.ranges.iter().filter_map(&mut f).collect();
        self.ranges = normalize(ranges);
    }
}

fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by(|a, b| a.root().cmp(&b.root()).then_with(|| a.start.path.cmp(&b.start.path)));
    let mut result: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match result.last_mut() {
            Some(last) if last.root() == range.root() && !range.start.is_after(&last.end) => {
                if range.end.is_after(&last.end) {
                    last.end = range.end;
                }
            }
            _ => result.push(range),
        }
    }
    result
}
