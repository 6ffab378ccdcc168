//! Lock-free event forwarding to another thread
//!
//! The bus itself never queues. When a consumer needs every occurrence
//! (for counting or timing) rather than the latest-wins snapshot flags, an
//! `EventTap` listener pushes events into an SPSC ring buffer that the
//! display thread drains at its own pace.

use super::{Event, EventBus, EventKind, ListenerId};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Create a connected tap/drain pair holding up to `capacity` events
pub fn event_tap(capacity: usize) -> (EventTap, EventDrain) {
    let rb = HeapRb::<Event>::new(capacity);
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));

    (
        EventTap {
            producer,
            dropped: Arc::clone(&dropped),
        },
        EventDrain { consumer, dropped },
    )
}

/// Producer side, installed as a bus listener on the audio thread
pub struct EventTap {
    producer: HeapProducer<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventTap {
    /// Push one event; a full queue drops the event and counts it
    pub fn push(&mut self, event: Event) {
        if self.producer.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Subscribe this tap to `kinds` on the bus, consuming the tap
    pub fn attach(mut self, bus: &mut EventBus, kinds: &[EventKind]) -> ListenerId {
        bus.subscribe_kinds(kinds, move |event| self.push(*event))
    }
}

/// Consumer side, owned by the display thread
pub struct EventDrain {
    consumer: HeapConsumer<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventDrain {
    /// Take the oldest queued event
    pub fn pop(&mut self) -> Option<Event> {
        self.consumer.pop()
    }

    /// Hand every queued event to `f`, oldest first; returns how many were drained
    pub fn drain<F: FnMut(Event)>(&mut self, mut f: F) -> usize {
        let mut count = 0;
        while let Some(event) = self.consumer.pop() {
            f(event);
            count += 1;
        }
        if count > 0 {
            let dropped = self.dropped();
            if dropped > 0 {
                log::warn!("event tap overflowed, {} events dropped so far", dropped);
            }
        }
        count
    }

    /// Number of events currently queued
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Events lost to a full queue since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
