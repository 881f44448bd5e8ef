//! Bounded-latency reorder buffer (component E): a binary heap keyed by
//! corrected tod, releasing events once they are older than `now - W`
//! (Design Notes §9). Late-late arrivals bypass the queue entirely.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::passing::CorrectedPassing;
use crate::tod::Tod;

/// Default reorder window (§4.5).
pub const DEFAULT_WINDOW_SECS: f64 = 3.0;
/// Soft cap on pending events (§5 memory bounds).
pub const DEFAULT_CAPACITY: usize = 1_024;

struct HeapEntry {
    passing: CorrectedPassing,
    /// Tie-break sequence: arrival order, used when (tod, mpid) tie.
    arrival_seq: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for HeapEntry {}

impl HeapEntry {
    /// (tod, mpid ascending, arrival order) per §5 ordering guarantees.
    /// Reversed for use in a max-heap acting as a min-heap.
    fn sort_key(&self) -> (i64, u8, u64) {
        (self.passing.tod.ticks(), self.passing.mpid, self.arrival_seq)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key pops first.
        other.sort_key().cmp(&self.sort_key())
    }
}

pub struct ReorderBuffer {
    heap: BinaryHeap<HeapEntry>,
    window_secs: f64,
    capacity: usize,
    next_arrival_seq: u64,
    /// Set when an enqueue overflowed capacity; cleared once the backlog
    /// drops below half (§7 QueueOverflow auto-clear).
    pub overflowed: bool,
}

pub enum EnqueueOutcome {
    Queued,
    /// Late-late: key already older than `now - W`. Caller should release
    /// this passing immediately, flagged `out_of_order`.
    ReleaseImmediately(CorrectedPassing),
    Overflowed,
}

impl ReorderBuffer {
    pub fn new(window_secs: f64, capacity: usize) -> Self {
        ReorderBuffer {
            heap: BinaryHeap::new(),
            window_secs,
            capacity,
            next_arrival_seq: 0,
            overflowed: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_CAPACITY)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn enqueue(&mut self, mut passing: CorrectedPassing, now: Tod) -> EnqueueOutcome {
        let late_late_boundary = now.delta(Tod::from_ticks(
            (self.window_secs * crate::tod::TICKS_PER_SECOND as f64) as i64,
        ));
        if passing.tod.ticks() < late_late_boundary.0 {
            passing.out_of_order = true;
            return EnqueueOutcome::ReleaseImmediately(passing);
        }

        if self.heap.len() >= self.capacity {
            self.overflowed = true;
            // Drop oldest-arrival event (§5): the heap doesn't track
            // arrival order for removal cheaply, so we rebuild without the
            // minimum-arrival-seq entry.
            if let Some(min_seq) = self.heap.iter().map(|e| e.arrival_seq).min() {
                let remaining: Vec<HeapEntry> =
                    self.heap.drain().filter(|e| e.arrival_seq != min_seq).collect();
                self.heap = remaining.into_iter().collect();
            }
            return EnqueueOutcome::Overflowed;
        }

        let seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;
        self.heap.push(HeapEntry { passing, arrival_seq: seq });

        if self.overflowed && self.heap.len() < self.capacity / 2 {
            self.overflowed = false;
        }

        EnqueueOutcome::Queued
    }

    /// Drops every pending event for the given mpid (§4.8 ResetUnit: drop
    /// queued events for the reset channel).
    pub fn drop_mpid(&mut self, mpid: u8) {
        let remaining: Vec<HeapEntry> =
            self.heap.drain().filter(|e| e.passing.mpid != mpid).collect();
        self.heap = remaining.into_iter().collect();
    }

    /// Drops every pending event (§4.8 Reset: drain E).
    pub fn drain_all(&mut self) -> Vec<CorrectedPassing> {
        self.heap.drain().map(|e| e.passing).collect()
    }

    /// Releases every event whose key is `<= now - window`, in strict
    /// nondecreasing key order.
    pub fn release_ready(&mut self, now: Tod) -> Vec<CorrectedPassing> {
        let threshold = now.ticks() - (self.window_secs * crate::tod::TICKS_PER_SECOND as f64) as i64;
        let mut released = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.passing.tod.ticks() <= threshold {
                released.push(self.heap.pop().unwrap().passing);
            } else {
                break;
            }
        }
        if self.overflowed && self.heap.len() < self.capacity / 2 {
            self.overflowed = false;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(mpid: u8, tod: &str) -> CorrectedPassing {
        CorrectedPassing {
            mpid,
            refid: "100000".into(),
            tod: Tod::parse(tod).unwrap(),
            env: None,
            info: None,
            arrival_wall: Tod::parse(tod).unwrap(),
            out_of_order: false,
        }
    }

    #[test]
    fn releases_in_tod_order_regardless_of_arrival_order() {
        let mut buf = ReorderBuffer::new(3.0, 16);
        let now = Tod::parse("12:00:00.200").unwrap();
        buf.enqueue(cp(1, "12:00:00.100"), now);
        buf.enqueue(cp(9, "12:00:00.050"), now);

        let released = buf.release_ready(Tod::parse("12:00:03.300").unwrap());
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].mpid, 9);
        assert_eq!(released[1].mpid, 1);
    }

    #[test]
    fn late_late_event_bypasses_queue() {
        let mut buf = ReorderBuffer::new(3.0, 16);
        let now = Tod::parse("12:00:10.000").unwrap();
        match buf.enqueue(cp(1, "12:00:00.000"), now) {
            EnqueueOutcome::ReleaseImmediately(p) => assert!(p.out_of_order),
            _ => panic!("expected immediate release"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_arrival() {
        let mut buf = ReorderBuffer::new(3.0, 2);
        let now = Tod::ZERO;
        buf.enqueue(cp(1, "0:00:01.000"), now);
        buf.enqueue(cp(2, "0:00:02.000"), now);
        let outcome = buf.enqueue(cp(3, "0:00:03.000"), now);
        assert!(matches!(outcome, EnqueueOutcome::Overflowed));
        assert!(buf.overflowed);
    }
}
