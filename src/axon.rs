//! Axonal delivery: schedules a firing's outbound signals against each
//! connection's configured delay and delivers them in timestamp order.
//!
//! Implemented as a `BinaryHeap` keyed on `(delivery_time, sequence)` so it
//! behaves as a min-heap by delivery time with FIFO tie-breaking on the
//! monotonically increasing sequence number — no external priority-queue
//! dependency is needed for this.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{NeuralSignal, SynapseId, Timestamp};

/// A single pending delivery: a signal addressed to one output connection,
/// scheduled for a specific future timestamp.
#[derive(Debug, Clone, PartialEq)]
struct ScheduledDelivery {
    delivery_time: Timestamp,
    sequence: u64,
    connection_id: SynapseId,
    signal: NeuralSignal,
}

impl Eq for ScheduledDelivery {}

impl PartialOrd for ScheduledDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledDelivery {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the earliest delivery
        // time first, with lower sequence numbers breaking ties (FIFO).
        other
            .delivery_time
            .cmp(&self.delivery_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A delivery ready to hand to an output connection's `transmit`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyDelivery {
    /// Which output connection to transmit on.
    pub connection_id: SynapseId,
    /// The signal to deliver.
    pub signal: NeuralSignal,
}

/// Time-ordered, bounded priority queue of pending deliveries owned by a
/// single neuron.
#[derive(Debug)]
pub struct AxonalDelivery {
    heap: BinaryHeap<ScheduledDelivery>,
    next_sequence: u64,
    capacity: usize,
}

impl AxonalDelivery {
    /// Construct with a bounded capacity; once full, scheduling a new entry
    /// drops the single oldest (earliest-delivery-time) pending entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            next_sequence: 0,
            capacity,
        }
    }

    /// Number of pending deliveries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// `true` if there are no pending deliveries.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedule a signal for delivery on `connection_id` at `delivery_time`.
    ///
    /// Returns `true` if the queue was at capacity and the oldest pending
    /// entry had to be dropped to make room (the caller should increment
    /// its dropped-delivery counter).
    pub fn schedule(
        &mut self,
        delivery_time: Timestamp,
        connection_id: SynapseId,
        signal: NeuralSignal,
    ) -> bool {
        let mut dropped_oldest = false;
        if self.heap.len() >= self.capacity {
            // BinaryHeap has no pop-min; rebuild without the earliest entry.
            // Capacity is expected to be modest (bounded per neuron), so a
            // full drain-and-rebuild is acceptable and keeps this simple.
            let mut items: Vec<ScheduledDelivery> = self.heap.drain().collect();
            if let Some((idx, _)) = items
                .iter()
                .enumerate()
                .min_by_key(|(_, d)| (d.delivery_time, d.sequence))
            {
                items.remove(idx);
                dropped_oldest = true;
            }
            self.heap = items.into_iter().collect();
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.heap.push(ScheduledDelivery {
            delivery_time,
            sequence,
            connection_id,
            signal,
        });
        dropped_oldest
    }

    /// Drain and return every entry whose scheduled delivery time is
    /// `<= now`, in delivery order.
    pub fn drain_ready(&mut self, now: Timestamp) -> Vec<ReadyDelivery> {
        let mut ready = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.delivery_time > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry must exist");
            ready.push(ReadyDelivery {
                connection_id: entry.connection_id,
                signal: entry.signal,
            });
        }
        ready
    }
}
