//! Simulation event queue.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use privpack_id::{BlockId, SimTime};

/// What happens at a point of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BlockArrival,
    /// One release of a block's withheld budget; `steps_left` releases
    /// remain, this one included.
    BlockUnlock { block_id: BlockId, steps_left: u32 },
    BlockExpiry { block_id: BlockId },
    /// Index into the workload.
    TaskArrival { index: usize },
    Recompute,
    ReportMetrics,
}

impl EventKind {
    /// Order among events at the same time; lower runs first. Expiries
    /// free their live slot before a new block arrives at the same instant.
    pub fn priority(&self) -> u8 {
        match self {
            EventKind::BlockExpiry { .. } => 0,
            EventKind::BlockArrival => 1,
            EventKind::BlockUnlock { .. } => 2,
            EventKind::TaskArrival { .. } => 3,
            EventKind::Recompute => 4,
            EventKind::ReportMetrics => 5,
        }
    }

    /// Periodic events keep the clock running only while other events
    /// remain.
    pub fn is_periodic(&self) -> bool {
        matches!(self, EventKind::Recompute | EventKind::ReportMetrics)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: SimTime,
    pub kind: EventKind,
    seq: u64,
}

impl Event {
    fn key(&self) -> (SimTime, u8, u64) {
        (self.time, self.kind.priority(), self.seq)
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of events by `(time, priority, insertion order)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    next_seq: u64,
    substantive: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, time: SimTime, kind: EventKind) {
        let event = Event {
            time,
            kind,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        if !kind.is_periodic() {
            self.substantive += 1;
        }
        self.heap.push(Reverse(event));
    }

    pub fn pop(&mut self) -> Option<Event> {
        let Reverse(event) = self.heap.pop()?;
        if !event.kind.is_periodic() {
            self.substantive -= 1;
        }
        Some(event)
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|Reverse(e)| e.time)
    }

    /// True while a non-periodic event is queued.
    pub fn has_substantive(&self) -> bool {
        self.substantive > 0
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.substantive = 0;
    }
}
