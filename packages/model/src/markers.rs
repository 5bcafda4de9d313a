//! Named live ranges

use crate::range::Range;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub name: String,
    pub range: Range,
    /// Markers that affect data are undoable and reported as data changes
    pub affects_data: bool,
}

impl Marker {
    /// Group is the name part before the first `:` (`comment:1` -> `comment`)
    pub fn group(&self) -> &str {
        marker_group(&self.name)
    }
}

pub fn marker_group(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

#[derive(Debug, Clone, Default)]
pub struct MarkerCollection {
    markers: BTreeMap<String, Marker>,
}

impl MarkerCollection {
    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers.values().filter(move |marker| marker.group() == group)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub(crate) fn set(&mut self, name: &str, range: Range, affects_data: bool) {
        self.markers.insert(
            name.to_string(),
            Marker {
                name: name.to_string(),
                range,
                affects_data,
            },
        );
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Marker> {
        self.markers.remove(name)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Marker> {
        self.markers.values_mut()
    }
}
