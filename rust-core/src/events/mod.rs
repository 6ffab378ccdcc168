//! Event model and synchronous dispatch
//!
//! Analyzers report plain value events; the pipeline publishes them on an
//! [`EventBus`] from the audio thread. An optional [`EventTap`] forwards them
//! to another thread through a lock-free queue.

pub mod bus;
pub mod tap;

pub use bus::{EventBus, ListenerId};
pub use tap::{event_tap, EventDrain, EventTap};

/// An onset was detected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetEvent {
    /// Stream time of the detecting hop, in seconds
    pub timestamp_seconds: f64,
}

/// A beat boundary was crossed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub timestamp_seconds: f64,
}

/// A tatum boundary was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TatumEvent {
    /// Stream sample index of the boundary
    pub sample_index: i64,
}

/// Attack class assigned to the onset of the same buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnsetClassEvent {
    pub class_id: i32,
}

/// Attack class assigned to the beat of the same buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatClassEvent {
    pub class_id: i32,
}

/// Discriminant used to route events to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Onset,
    Beat,
    Tatum,
    OnsetClass,
    BeatClass,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Onset,
        EventKind::Beat,
        EventKind::Tatum,
        EventKind::OnsetClass,
        EventKind::BeatClass,
    ];

    /// Bit used in listener kind masks
    pub(crate) fn bit(self) -> u8 {
        match self {
            EventKind::Onset => 1 << 0,
            EventKind::Beat => 1 << 1,
            EventKind::Tatum => 1 << 2,
            EventKind::OnsetClass => 1 << 3,
            EventKind::BeatClass => 1 << 4,
        }
    }
}

/// Any event the pipeline can publish
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Onset(OnsetEvent),
    Beat(BeatEvent),
    Tatum(TatumEvent),
    OnsetClass(OnsetClassEvent),
    BeatClass(BeatClassEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Onset(_) => EventKind::Onset,
            Event::Beat(_) => EventKind::Beat,
            Event::Tatum(_) => EventKind::Tatum,
            Event::OnsetClass(_) => EventKind::OnsetClass,
            Event::BeatClass(_) => EventKind::BeatClass,
        }
    }
}

/// A concrete event type that can be subscribed to individually
pub trait BusEvent: Copy + Send + 'static {
    const KIND: EventKind;

    fn into_event(self) -> Event;

    fn from_event(event: &Event) -> Option<Self>;
}

macro_rules! bus_event {
    ($ty:ty, $variant:ident) => {
        impl BusEvent for $ty {
            const KIND: EventKind = EventKind::$variant;

            fn into_event(self) -> Event {
                Event::$variant(self)
            }

            fn from_event(event: &Event) -> Option<Self> {
                match event {
                    Event::$variant(inner) => Some(*inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Event {
            fn from(value: $ty) -> Self {
                Event::$variant(value)
            }
        }
    };
}

bus_event!(OnsetEvent, Onset);
bus_event!(BeatEvent, Beat);
bus_event!(TatumEvent, Tatum);
bus_event!(OnsetClassEvent, OnsetClass);
bus_event!(BeatClassEvent, BeatClass);
