//! # Event Emitter
//!
//! Typed publish/subscribe owned by the component that fires the events.
//!
//! Listeners run in registration order. A listener registered with
//! [`Emitter::on_claiming`] may return [`Propagation::Stop`] to keep later
//! listeners from seeing the event.

use tracing::trace;

/// Handle returned by `on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Whether an event continues to later listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

type Listener<E> = Box<dyn FnMut(&E) -> Propagation>;

/// Ordered listener list for one event type
pub struct Emitter<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Subscribe a listener that always lets the event continue
    pub fn on(&mut self, mut listener: impl FnMut(&E) + 'static) -> ListenerId {
        self.on_claiming(move |event| {
            listener(event);
            Propagation::Continue
        })
    }

    /// Subscribe a listener that may stop propagation
    pub fn on_claiming(&mut self, listener: impl FnMut(&E) -> Propagation + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unsubscribe. Returns false if the listener was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    /// Deliver an event; returns how many listeners saw it
    pub fn fire(&mut self, event: &E) -> usize {
        let mut delivered = 0;
        for (id, listener) in &mut self.listeners {
            delivered += 1;
            if listener(event) == Propagation::Stop {
                trace!(listener = id.0, "Event propagation stopped");
                break;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter: Emitter<u32> = Emitter::new();

        let first = seen.clone();
        emitter.on(move |value| first.borrow_mut().push(("first", *value)));
        let second = seen.clone();
        emitter.on(move |value| second.borrow_mut().push(("second", *value)));

        assert_eq!(emitter.fire(&7), 2);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_claiming_listener_stops_propagation() {
        let seen = Rc::new(RefCell::new(0));
        let mut emitter: Emitter<&str> = Emitter::new();

        emitter.on_claiming(|event| {
            if *event == "claimed" {
                Propagation::Stop
            } else {
                Propagation::Continue
            }
        });
        let counter = seen.clone();
        emitter.on(move |_| *counter.borrow_mut() += 1);

        emitter.fire(&"claimed");
        emitter.fire(&"free");
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_off_removes_listener() {
        let mut emitter: Emitter<()> = Emitter::new();
        let id = emitter.on(|_| {});
        assert_eq!(emitter.listener_count(), 1);
        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        assert_eq!(emitter.fire(&()), 0);
    }
}
