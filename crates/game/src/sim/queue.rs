use std::collections::VecDeque;

use crate::protocol::{InputPacket, sequence_greater_than};

pub const MAX_INPUT_QUEUE_SIZE: usize = 32;

/// Per-player input queue, kept sorted ascending by sequence number.
/// Insertion is O(n), which is intentional at this capacity.
#[derive(Debug)]
pub struct InputQueue {
    entries: VecDeque<InputPacket>,
    max_size: usize,
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new(MAX_INPUT_QUEUE_SIZE)
    }
}

impl InputQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Insert at the unique sorted position. Duplicates are ignored. When the
    /// queue is full the oldest entry is dropped and its sequence returned.
    pub fn push(&mut self, packet: InputPacket) -> Option<u32> {
        let seq = packet.sequence_number;
        if self
            .entries
            .iter()
            .any(|p| p.sequence_number == seq)
        {
            return None;
        }

        let index = self
            .entries
            .partition_point(|p| sequence_greater_than(seq, p.sequence_number));
        self.entries.insert(index, packet);

        if self.entries.len() > self.max_size {
            return self.entries.pop_front().map(|p| p.sequence_number);
        }
        None
    }

    /// Pop the strictly sequential run starting right after `last_processed`.
    /// Anything at or below `last_processed` is discarded first; a gap stops
    /// the drain until the missing sequence arrives or is dropped.
    pub fn drain_ready(&mut self, last_processed: u32) -> Vec<InputPacket> {
        while self
            .entries
            .front()
            .is_some_and(|p| !sequence_greater_than(p.sequence_number, last_processed))
        {
            self.entries.pop_front();
        }

        let mut ready = Vec::new();
        let mut expected = last_processed.wrapping_add(1);
        while self
            .entries
            .front()
            .is_some_and(|p| p.sequence_number == expected)
        {
            ready.push(self.entries.pop_front().unwrap());
            expected = expected.wrapping_add(1);
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(seq: u32) -> InputPacket {
        InputPacket::new(seq, seq)
    }

    #[test]
    fn out_of_order_arrivals_sort() {
        let mut queue = InputQueue::default();
        queue.push(input(3));
        queue.push(input(1));
        queue.push(input(2));

        let ready = queue.drain_ready(0);
        let seqs: Vec<u32> = ready.iter().map(|p| p.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn gap_stalls_the_drain() {
        let mut queue = InputQueue::default();
        queue.push(input(1));
        queue.push(input(3));

        let ready = queue.drain_ready(0);
        assert_eq!(ready.len(), 1);
        assert_eq!(queue.len(), 1);

        queue.push(input(2));
        let ready = queue.drain_ready(1);
        let seqs: Vec<u32> = ready.iter().map(|p| p.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn stale_and_duplicate_sequences_are_dropped() {
        let mut queue = InputQueue::default();
        queue.push(input(5));
        queue.push(input(5));
        assert_eq!(queue.len(), 1);

        queue.push(input(2));
        let ready = queue.drain_ready(4);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].sequence_number, 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = InputQueue::new(4);
        for seq in 1..=4 {
            assert_eq!(queue.push(input(seq)), None);
        }
        assert_eq!(queue.push(input(5)), Some(1));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn sequences_wrap_across_u32_boundary() {
        let mut queue = InputQueue::default();
        queue.push(input(u32::MAX));
        queue.push(input(0));
        queue.push(input(1));

        let ready = queue.drain_ready(u32::MAX - 1);
        let seqs: Vec<u32> = ready.iter().map(|p| p.sequence_number).collect();
        assert_eq!(seqs, vec![u32::MAX, 0, 1]);
    }
}
