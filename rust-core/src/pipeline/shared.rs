//! Lock-free snapshot handoff from the audio thread to the display thread
//!
//! Whole snapshots travel through a triple buffer, so the reader always
//! gets one publish in its entirety and neither side ever waits. Event
//! flags are latched by the writer until the reader acknowledges a
//! generation that carried them, and masked by the reader once seen, so
//! every detection is observed exactly once however the two rates relate.

use super::snapshot::AnalyzerSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use triple_buffer::{Input, Output, TripleBuffer};

const FLAG_COUNT: usize = 3;

/// What actually crosses the triple buffer
#[derive(Debug, Clone, Copy)]
struct Published {
    snapshot: AnalyzerSnapshot,
    /// Generation at which each flag was last detected (0 = not latched)
    latched: [u64; FLAG_COUNT],
}

fn flags(snapshot: &AnalyzerSnapshot) -> [bool; FLAG_COUNT] {
    [snapshot.onset_flag, snapshot.beat_flag, snapshot.tatum_flag]
}

fn set_flags(snapshot: &mut AnalyzerSnapshot, flags: [bool; FLAG_COUNT]) {
    snapshot.onset_flag = flags[0];
    snapshot.beat_flag = flags[1];
    snapshot.tatum_flag = flags[2];
}

/// Create a connected writer/reader pair starting from `initial`
pub fn shared_state(initial: AnalyzerSnapshot) -> (SnapshotWriter, SnapshotReader) {
    let published = Published {
        snapshot: initial,
        latched: [0; FLAG_COUNT],
    };
    let (input, output) = TripleBuffer::new(&published).split();
    let ack = Arc::new(AtomicU64::new(initial.generation));

    (
        SnapshotWriter {
            input,
            ack: Arc::clone(&ack),
            generation: initial.generation,
            latched: [0; FLAG_COUNT],
            latest: initial,
        },
        SnapshotReader {
            output,
            ack,
            seen: [0; FLAG_COUNT],
            generation: initial.generation,
        },
    )
}

/// Audio-thread side
pub struct SnapshotWriter {
    input: Input<Published>,
    ack: Arc<AtomicU64>,
    generation: u64,
    latched: [u64; FLAG_COUNT],
    latest: AnalyzerSnapshot,
}

impl SnapshotWriter {
    /// Publish a snapshot, returning its generation
    ///
    /// Flags set in `snapshot` are latched; flags already latched stay set
    /// until the reader has acknowledged a generation that carried them.
    pub fn publish(&mut self, mut snapshot: AnalyzerSnapshot) -> u64 {
        self.generation += 1;
        let acked = self.ack.load(Ordering::Acquire);

        let detected = flags(&snapshot);
        let mut shown = [false; FLAG_COUNT];
        for i in 0..FLAG_COUNT {
            if detected[i] {
                self.latched[i] = self.generation;
            } else if self.latched[i] != 0 && acked >= self.latched[i] {
                self.latched[i] = 0;
            }
            shown[i] = self.latched[i] != 0;
        }
        set_flags(&mut snapshot, shown);
        snapshot.generation = self.generation;

        self.latest = snapshot;
        self.input.write(Published {
            snapshot,
            latched: self.latched,
        });
        self.generation
    }

    /// The snapshot most recently published (flags as latched)
    pub fn latest(&self) -> &AnalyzerSnapshot {
        &self.latest
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Display-thread side
pub struct SnapshotReader {
    output: Output<Published>,
    ack: Arc<AtomicU64>,
    /// Latch generation of the last occurrence of each flag already returned
    seen: [u64; FLAG_COUNT],
    generation: u64,
}

impl SnapshotReader {
    /// Copy out the most recent snapshot; never blocks
    ///
    /// A flag is reported true once per detection: reading the same
    /// generation again reports it false.
    pub fn read(&mut self) -> AnalyzerSnapshot {
        let published = *self.output.read();
        let mut snapshot = published.snapshot;

        let raw = flags(&snapshot);
        let mut fresh = [false; FLAG_COUNT];
        for i in 0..FLAG_COUNT {
            if raw[i] && published.latched[i] > self.seen[i] {
                fresh[i] = true;
                self.seen[i] = published.latched[i];
            }
        }
        set_flags(&mut snapshot, fresh);

        self.generation = snapshot.generation;
        self.ack.store(snapshot.generation, Ordering::Release);
        snapshot
    }

    /// Generation of the last snapshot returned by `read`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if a publish happened since the last `read`
    pub fn has_update(&self) -> bool {
        self.output.updated()
    }
}
