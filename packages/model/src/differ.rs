//! # Differ
//!
//! Buffers the effect of applied operations and, once per outermost change
//! block, reduces them to a minimal list of change records against the
//! post-change tree.
//!
//! ## Design
//!
//! - Every element whose children are touched gets a *shadow list*: a
//!   run-length description of its children in current offsets. A run is
//!   either original content (with the attribute keys changed on it and their
//!   first old value), inserted content, or a zero-width tombstone for removed
//!   original content.
//! - Removing inserted content simply deletes the run, so insert-then-remove
//!   leaves nothing behind.
//! - Moves are a removal in the source parent plus an insertion in the target
//!   parent. The graveyard is never tracked.
//! - At flush, an element whose original children were all touched and which
//!   would produce several records collapses to a single `Reconvert`.
//! - Records inside inserted, removed, reconverted or newly attached content
//!   are dropped; the enclosing record already covers them.
//!
//! ## States
//!
//! `Buffering` while operations are applied, `Flushing` while the change set
//! is produced. Flushing is not reentrant.

use crate::markers::MarkerCollection;
use crate::node::NodeId;
use crate::position::Position;
use crate::range::Range;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

/// A single change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    #[serde(rename_all = "camelCase")]
    Insert { position: Position, how_many: usize },

    /// `removed_hint` lists the names of the removed original items
    #[serde(rename_all = "camelCase")]
    Remove {
        position: Position,
        how_many: usize,
        removed_hint: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },

    /// The element must be converted again from scratch
    Reconvert { element: NodeId },
}

impl Change {
    /// Model range the record covers, used to find markers that need a refresh
    fn covered_range(&self, tree: &Tree) -> Option<Range> {
        match self {
            Change::Insert { position, how_many } => Some(Range::flat(position.clone(), *how_many)),
            Change::Remove { position, .. } => Some(Range::collapsed(position.clone())),
            Change::Attribute { range, .. } => Some(range.clone()),
            Change::Reconvert { element } => tree.position_before(*element).map(|start| Range::flat(start, 1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRange {
    pub name: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootChange {
    pub name: String,
    pub root: NodeId,
    pub attached: bool,
}

/// Everything one outermost change block did, in application order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub changes: Vec<Change>,
    pub markers_to_remove: Vec<MarkerRange>,
    pub markers_to_add: Vec<MarkerRange>,
    pub root_changes: Vec<RootChange>,
    /// Document version after the block
    pub version: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
            && self.markers_to_remove.is_empty()
            && self.markers_to_add.is_empty()
            && self.root_changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferState {
    Buffering,
    Flushing,
}

/// What happened to the children of one element, in offsets current at the
/// time of the call
#[derive(Debug, Clone)]
pub(crate) enum ChildChange<'a> {
    Insert {
        offset: usize,
        how_many: usize,
    },
    Remove {
        offset: usize,
        how_many: usize,
        hint: Vec<String>,
    },
    Attribute {
        offset: usize,
        how_many: usize,
        key: &'a str,
        old_value: &'a Option<Value>,
    },
    /// Element at `offset` was renamed
    Refresh {
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Original {
        start: usize,
        len: usize,
        attributes: BTreeMap<String, Option<Value>>,
        refresh: bool,
    },
    Inserted {
        len: usize,
    },
    Removed {
        start: usize,
        len: usize,
        hint: Vec<String>,
    },
}

impl Segment {
    fn width(&self) -> usize {
        match self {
            Segment::Original { len, .. } | Segment::Inserted { len } => *len,
            Segment::Removed { .. } => 0,
        }
    }

    /// Keep the first `at` units, return the rest
    fn split_off(&mut self, at: usize) -> Segment {
        match self {
            Segment::Original {
                start,
                len,
                attributes,
                refresh,
            } => {
                let right = Segment::Original {
                    start: *start + at,
                    len: *len - at,
                    attributes: attributes.clone(),
                    refresh: *refresh,
                };
                *len = at;
                right
            }
            Segment::Inserted { len } => {
                let right = Segment::Inserted { len: *len - at };
                *len = at;
                right
            }
            Segment::Removed { start, len, .. } => Segment::Removed {
                start: *start + *len,
                len: 0,
                hint: Vec::new(),
            },
        }
    }

    /// Absorb `next` if both describe one contiguous run
    fn absorb(&mut self, next: &Segment) -> bool {
        match (self, next) {
            (Segment::Inserted { len }, Segment::Inserted { len: more }) => {
                *len += more;
                true
            }
            (
                Segment::Removed { start, len, hint },
                Segment::Removed {
                    start: next_start,
                    len: more,
                    hint: more_hint,
                },
            ) if *start + *len == *next_start => {
                *len += more;
                hint.extend(more_hint.iter().cloned());
                true
            }
            (
                Segment::Original {
                    start,
                    len,
                    attributes,
                    refresh: false,
                },
                Segment::Original {
                    start: next_start,
                    len: more,
                    attributes: next_attributes,
                    refresh: false,
                },
            ) if *start + *len == *next_start && attributes == next_attributes => {
                *len += more;
                true
            }
            _ => false,
        }
    }
}

/// Run-length record of one element's children
#[derive(Debug, Clone)]
struct ShadowList {
    segments: Vec<Segment>,
    original_len: usize,
}

impl ShadowList {
    fn new(len: usize) -> Self {
        let segments = if len > 0 {
            vec![Segment::Original {
                start: 0,
                len,
                attributes: BTreeMap::new(),
                refresh: false,
            }]
        } else {
            Vec::new()
        };
        Self {
            segments,
            original_len: len,
        }
    }

    /// Index of the first segment starting at `offset`, splitting if needed.
    /// Tombstones sitting at `offset` stay on the left.
    fn split_at(&mut self, offset: usize) -> usize {
        let mut acc = 0;
        for index in 0..self.segments.len() {
            let width = self.segments[index].width();
            if width > 0 && acc == offset {
                return index;
            }
            if acc < offset && offset < acc + width {
                let right = self.segments[index].split_off(offset - acc);
                self.segments.insert(index + 1, right);
                return index + 1;
            }
            acc += width;
        }
        self.segments.len()
    }

    fn apply(&mut self, change: ChildChange<'_>) {
        match change {
            ChildChange::Insert { offset, how_many } => {
                let index = self.split_at(offset);
                self.segments.insert(index, Segment::Inserted { len: how_many });
            }
            ChildChange::Remove {
                offset,
                how_many,
                hint,
            } => {
                let from = self.split_at(offset);
                let to = self.split_at(offset + how_many);
                let mut hint = Some(hint);
                let replaced: Vec<Segment> = self
                    .segments
                    .drain(from..to)
                    .filter_map(|segment| match segment {
                        Segment::Original { start, len, .. } => Some(Segment::Removed {
                            start,
                            len,
                            hint: hint.take().unwrap_or_default(),
                        }),
                        Segment::Inserted { .. } => None,
                        removed @ Segment::Removed { .. } => Some(removed),
                    })
                    .collect();
                self.segments.splice(from..from, replaced);
            }
            ChildChange::Attribute {
                offset,
                how_many,
                key,
                old_value,
            } => {
                let from = self.split_at(offset);
                let to = self.split_at(offset + how_many);
                for segment in &mut self.segments[from..to] {
                    if let Segment::Original { attributes, .. } = segment {
                        attributes.entry(key.to_string()).or_insert_with(|| old_value.clone());
                    }
                }
            }
            ChildChange::Refresh { offset } => {
                let from = self.split_at(offset);
                let to = self.split_at(offset + 1);
                for segment in &mut self.segments[from..to] {
                    if let Segment::Original { refresh, .. } = segment {
                        *refresh = true;
                    }
                }
            }
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            if segment.width() == 0 && !matches!(segment, Segment::Removed { .. }) {
                continue;
            }
            let absorbed = merged.last_mut().map_or(false, |last| last.absorb(&segment));
            if !absorbed {
                merged.push(segment);
            }
        }
        self.segments = merged;
    }

    /// Kind of segment covering `offset`
    fn segment_at(&self, offset: usize) -> Option<&Segment> {
        let mut acc = 0;
        for segment in &self.segments {
            let width = segment.width();
            if offset >= acc && offset < acc + width {
                return Some(segment);
            }
            acc += width;
        }
        None
    }
}

#[derive(Debug, Clone)]
struct MarkerBuffer {
    old_range: Option<Range>,
    new_range: Option<Range>,
}

#[derive(Debug, Clone)]
struct RootBuffer {
    root: NodeId,
    was_attached: bool,
    attached: bool,
}

#[derive(Debug)]
pub struct Differ {
    state: DifferState,
    elements: HashMap<NodeId, ShadowList>,
    markers: BTreeMap<String, MarkerBuffer>,
    roots: BTreeMap<String, RootBuffer>,
}

impl Default for Differ {
    fn default() -> Self {
        Self::new()
    }
}

impl Differ {
    pub fn new() -> Self {
        Self {
            state: DifferState::Buffering,
            elements: HashMap::new(),
            markers: BTreeMap::new(),
            roots: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> DifferState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.markers.is_empty() && self.roots.is_empty()
    }

    /// Drop everything buffered so far
    pub fn reset(&mut self) {
        self.elements.clear();
        self.markers.clear();
        self.roots.clear();
    }

    /// Record a change to the children of `element`. `current_len` is the
    /// element's size before the change and seeds the shadow list.
    pub(crate) fn buffer_children(&mut self, element: NodeId, current_len: usize, change: ChildChange<'_>) {
        trace!(element = %element, change = ?change, "buffer child change");
        self.elements
            .entry(element)
            .or_insert_with(|| ShadowList::new(current_len))
            .apply(change);
    }

    pub(crate) fn buffer_marker(&mut self, name: &str, old_range: Option<Range>, new_range: Option<Range>) {
        self.markers
            .entry(name.to_string())
            .or_insert_with(|| MarkerBuffer {
                old_range,
                new_range: None,
            })
            .new_range = new_range;
    }

    pub(crate) fn buffer_root(&mut self, name: &str, root: NodeId, attached: bool) {
        self.roots
            .entry(name.to_string())
            .or_insert(RootBuffer {
                root,
                was_attached: !attached,
                attached,
            })
            .attached = attached;
    }

    /// Produce the change set and clear the buffer
    pub(crate) fn flush(&mut self, tree: &Tree, markers: &MarkerCollection, version: u64) -> ChangeSet {
        assert_eq!(
            self.state,
            DifferState::Buffering,
            "differ flush re-entered while flushing"
        );
        self.state = DifferState::Flushing;

        let mut change_set = ChangeSet {
            version,
            ..ChangeSet::default()
        };

        let mut new_roots = BTreeSet::new();
        for (name, buffer) in std::mem::take(&mut self.roots) {
            if buffer.was_attached == buffer.attached {
                continue;
            }
            if buffer.attached {
                new_roots.insert(buffer.root);
            }
            change_set.root_changes.push(RootChange {
                name,
                root: buffer.root,
                attached: buffer.attached,
            });
        }

        let elements = std::mem::take(&mut self.elements);
        let mut candidates: Vec<(NodeId, Vec<Change>)> = Vec::new();
        let mut collapsed = HashSet::new();
        for (element, list) in &elements {
            if !tree.is_attached(*element) || new_roots.contains(&tree.root_of(*element)) {
                continue;
            }
            let (records, collapse) = element_records(tree, *element, list);
            if collapse {
                collapsed.insert(*element);
                candidates.push((*element, vec![Change::Reconvert { element: *element }]));
            } else if !records.is_empty() {
                candidates.push((*element, records));
            }
        }

        candidates.retain(|(element, _)| !is_covered_by_ancestor(tree, *element, &elements, &collapsed));
        candidates.sort_by_key(|(element, _)| {
            let path = tree.position_before(*element).map(|position| position.path).unwrap_or_default();
            (tree.root_of(*element), path)
        });

        for root in &new_roots {
            let len = tree.max_offset(*root);
            if len > 0 {
                change_set.changes.push(Change::Insert {
                    position: Position::new(*root, vec![0]),
                    how_many: len,
                });
            }
        }
        for (_, records) in candidates {
            change_set.changes.extend(records);
        }

        self.flush_markers(tree, markers, &mut change_set);

        debug!(
            changes = change_set.changes.len(),
            markers_added = change_set.markers_to_add.len(),
            markers_removed = change_set.markers_to_remove.len(),
            roots = change_set.root_changes.len(),
            version,
            "differ flushed"
        );
        self.state = DifferState::Buffering;
        change_set
    }

    fn flush_markers(&mut self, tree: &Tree, markers: &MarkerCollection, change_set: &mut ChangeSet) {
        let mut handled = HashSet::new();
        for (name, buffer) in std::mem::take(&mut self.markers) {
            if buffer.old_range == buffer.new_range {
                continue;
            }
            if let Some(range) = buffer.old_range {
                change_set.markers_to_remove.push(MarkerRange {
                    name: name.clone(),
                    range,
                });
            }
            if let Some(range) = buffer.new_range {
                if tree.is_attached(range.root()) {
                    change_set.markers_to_add.push(MarkerRange {
                        name: name.clone(),
                        range,
                    });
                }
            }
            handled.insert(name);
        }

        // Markers around re-rendered content need their boundaries again
        let covered: Vec<Range> = change_set
            .changes
            .iter()
            .filter_map(|change| change.covered_range(tree))
            .collect();
        for marker in markers.iter() {
            if handled.contains(&marker.name) || !tree.is_attached(marker.range.root()) {
                continue;
            }
            if covered.iter().any(|range| range.touches(&marker.range)) {
                let entry = MarkerRange {
                    name: marker.name.clone(),
                    range: marker.range.clone(),
                };
                change_set.markers_to_remove.push(entry.clone());
                change_set.markers_to_add.push(entry);
            }
        }
    }
}

/// Records for one element and whether it collapses to a reconvert
fn element_records(tree: &Tree, element: NodeId, list: &ShadowList) -> (Vec<Change>, bool) {
    let mut records: Vec<Change> = Vec::new();
    let mut untouched = false;
    let mut offset = 0;
    for segment in &list.segments {
        match segment {
            Segment::Removed { len, hint, .. } => records.push(Change::Remove {
                position: tree.position_in(element, offset),
                how_many: *len,
                removed_hint: hint.clone(),
            }),
            Segment::Inserted { len } => {
                records.push(Change::Insert {
                    position: tree.position_in(element, offset),
                    how_many: *len,
                });
                offset += len;
            }
            Segment::Original {
                len,
                attributes,
                refresh,
                ..
            } => {
                if *refresh {
                    for index in 0..*len {
                        if let Some(child) = tree.node_at_offset(element, offset + index) {
                            records.push(Change::Reconvert { element: child });
                        }
                    }
                } else {
                    let mut changed = false;
                    for (key, old_value) in attributes {
                        for (from, to, value) in tree.attribute_runs(element, offset, offset + len, key) {
                            if value == *old_value {
                                continue;
                            }
                            changed = true;
                            push_attribute(
                                &mut records,
                                Change::Attribute {
                                    range: Range::flat(tree.position_in(element, from), to - from),
                                    key: key.clone(),
                                    old_value: old_value.clone(),
                                    new_value: value,
                                },
                            );
                        }
                    }
                    untouched |= !changed;
                }
                offset += len;
            }
        }
    }
    let collapse = !tree.is_root(element) && list.original_len > 0 && !untouched && records.len() > 1;
    (records, collapse)
}

/// Append an attribute record, extending a trailing record it continues
fn push_attribute(records: &mut Vec<Change>, record: Change) {
    if let Change::Attribute {
        range,
        key,
        old_value,
        new_value,
    } = &record
    {
        for existing in records.iter_mut().rev() {
            match existing {
                Change::Attribute {
                    range: existing_range,
                    key: existing_key,
                    old_value: existing_old,
                    new_value: existing_new,
                } => {
                    if existing_key == key
                        && existing_old == old_value
                        && existing_new == new_value
                        && existing_range.end == range.start
                    {
                        existing_range.end = range.end.clone();
                        return;
                    }
                }
                _ => break,
            }
        }
    }
    records.push(record);
}

/// Whether some ancestor's record already re-renders `element`
fn is_covered_by_ancestor(
    tree: &Tree,
    element: NodeId,
    elements: &HashMap<NodeId, ShadowList>,
    collapsed: &HashSet<NodeId>,
) -> bool {
    let mut current = element;
    while let Some(parent) = tree.parent(current) {
        if collapsed.contains(&parent) {
            return true;
        }
        if let (Some(list), Some(offset)) = (elements.get(&parent), tree.start_offset(current)) {
            match list.segment_at(offset) {
                Some(Segment::Inserted { .. }) => return true,
                Some(Segment::Original { refresh: true, .. }) => return true,
                _ => {}
            }
        }
        current = parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_after(len: usize, changes: Vec<ChildChange<'static>>) -> ShadowList {
        let mut list = ShadowList::new(len);
        for change in changes {
            list.apply(change);
        }
        list
    }

    #[test]
    fn test_insert_then_remove_cancels() {
        let list = list_after(
            3,
            vec![
                ChildChange::Insert { offset: 1, how_many: 2 },
                ChildChange::Remove {
                    offset: 1,
                    how_many: 2,
                    hint: vec![],
                },
            ],
        );
        assert_eq!(
            list.segments,
            vec![Segment::Original {
                start: 0,
                len: 3,
                attributes: BTreeMap::new(),
                refresh: false
            }]
        );
    }

    #[test]
    fn test_partial_removal_of_inserted_content() {
        let list = list_after(
            0,
            vec![
                ChildChange::Insert { offset: 0, how_many: 2 },
                ChildChange::Remove {
                    offset: 0,
                    how_many: 1,
                    hint: vec![],
                },
            ],
        );
        assert_eq!(list.segments, vec![Segment::Inserted { len: 1 }]);
    }

    #[test]
    fn test_adjacent_removals_share_a_tombstone() {
        let list = list_after(
            6,
            vec![
                ChildChange::Remove {
                    offset: 2,
                    how_many: 2,
                    hint: vec!["$text".into()],
                },
                ChildChange::Remove {
                    offset: 1,
                    how_many: 1,
                    hint: vec!["image".into()],
                },
            ],
        );
        assert_eq!(list.segments.len(), 3);
        assert_eq!(
            list.segments[1],
            Segment::Removed {
                start: 1,
                len: 3,
                hint: vec!["image".into(), "$text".into()]
            }
        );
    }

    #[test]
    fn test_insertion_goes_after_tombstone() {
        let list = list_after(
            2,
            vec![
                ChildChange::Remove {
                    offset: 0,
                    how_many: 2,
                    hint: vec![],
                },
                ChildChange::Insert { offset: 0, how_many: 1 },
            ],
        );
        assert!(matches!(list.segments[0], Segment::Removed { .. }));
        assert_eq!(list.segments[1], Segment::Inserted { len: 1 });
    }

    #[test]
    fn test_attribute_keeps_first_old_value() {
        let old: &'static Option<Value> = Box::leak(Box::new(None));
        let newer: &'static Option<Value> = Box::leak(Box::new(Some(Value::Bool(true))));
        let list = list_after(
            4,
            vec![
                ChildChange::Attribute {
                    offset: 0,
                    how_many: 2,
                    key: "bold",
                    old_value: old,
                },
                ChildChange::Attribute {
                    offset: 0,
                    how_many: 4,
                    key: "bold",
                    old_value: newer,
                },
            ],
        );
        match &list.segments[0] {
            Segment::Original { attributes, len, .. } => {
                assert_eq!(*len, 2);
                assert_eq!(attributes.get("bold"), Some(&None));
            }
            other => panic!("unexpected segment {:?}", other),
        }
        match &list.segments[1] {
            Segment::Original { attributes, .. } => {
                assert_eq!(attributes.get("bold"), Some(&Some(Value::Bool(true))));
            }
            other => panic!("unexpected segment {:?}", other),
        }
    }
}
