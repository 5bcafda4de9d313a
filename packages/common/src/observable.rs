//! Explicitly declared observable fields.
//!
//! An `Observable<T>` owns its value and an [`Emitter`] of [`Change`] events.
//! Setting an equal value is silent.

use crate::emitter::{Emitter, ListenerId};

/// A value transition
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

pub struct Observable<T> {
    value: T,
    changes: Emitter<Change<T>>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            changes: Emitter::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Store a value, notifying listeners if it differs from the current one.
    /// Returns whether a change happened.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        let old = std::mem::replace(&mut self.value, value);
        let change = Change {
            old,
            new: self.value.clone(),
        };
        self.changes.fire(&change);
        true
    }

    pub fn on_change(&mut self, listener: impl FnMut(&Change<T>) + 'static) -> ListenerId {
        self.changes.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.changes.off(id)
    }
}

impl<T: Clone + PartialEq + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .finish()
    }
}
