//! Synchronous publish/subscribe registry
//!
//! Listeners run on the publishing thread (the audio thread, in the
//! pipeline) before `publish` returns, in the order they subscribed.
//! Subscribing allocates; publishing does not.

use super::{BusEvent, Event, EventKind};

type Listener = Box<dyn FnMut(&Event) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    kinds: u8,
    listener: Listener,
}

/// Per-kind listener registry with same-thread dispatch
#[derive(Default)]
pub struct EventBus {
    entries: Vec<Entry>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one concrete event type
    pub fn subscribe<E, F>(&mut self, mut listener: F) -> ListenerId
    where
        E: BusEvent,
        F: FnMut(E) + Send + 'static,
    {
        self.subscribe_kinds(&[E::KIND], move |event| {
            if let Some(inner) = E::from_event(event) {
                listener(inner);
            }
        })
    }

    /// Subscribe one listener to several event kinds
    pub fn subscribe_kinds<F>(&mut self, kinds: &[EventKind], listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            kinds: kinds.iter().fold(0, |mask, kind| mask | kind.bit()),
            listener: Box::new(listener),
        });
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Invoke every listener registered for the event's kind, in subscription order
    pub fn publish(&mut self, event: impl Into<Event>) {
        let event = event.into();
        let bit = event.kind().bit();
        for entry in self.entries.iter_mut() {
            if entry.kinds & bit != 0 {
                (entry.listener)(&event);
            }
        }
    }

    /// Number of listeners that would receive an event of `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.kinds & kind.bit() != 0)
            .count()
    }

    /// Remove all listeners
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.entries.len())
            .finish()
    }
}
