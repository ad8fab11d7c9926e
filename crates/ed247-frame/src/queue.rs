use std::collections::VecDeque;

use tracing::debug;

use crate::error::{FrameError, Result};
use crate::sample::Sample;

/// Result of a successful [`SampleQueue::pop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popped {
    /// The oldest sample in the queue.
    pub sample: Sample,
    /// True when this pop removed the last sample.
    pub now_empty: bool,
}

/// Fixed-capacity FIFO of samples with drop-oldest eviction.
///
/// A push never fails for lack of room: when the queue is full the oldest
/// sample is discarded to make space. Not synchronized; one owner at a time.
#[derive(Debug, Clone)]
pub struct SampleQueue {
    slots: VecDeque<Sample>,
    capacity: usize,
    max_sample_size: usize,
    evicted: u64,
}

impl SampleQueue {
    /// Create a queue holding up to `capacity` samples of at most
    /// `max_sample_size` bytes each. A zero capacity is raised to one.
    pub fn new(capacity: usize, max_sample_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
            max_sample_size,
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest one if the queue is full.
    ///
    /// Returns `true` when the queue is full after the push. Rejects samples
    /// longer than the queue's element size without touching the queue.
    pub fn push(&mut self, sample: Sample) -> Result<bool> {
        if sample.len() > self.max_sample_size {
            return Err(FrameError::SampleTooLarge {
                size: sample.len(),
                max: self.max_sample_size,
            });
        }

        if self.slots.len() == self.capacity {
            self.slots.pop_front();
            self.evicted = self.evicted.saturating_add(1);
            debug!(capacity = self.capacity, "sample queue full; evicted oldest sample");
        }
        self.slots.push_back(sample);

        Ok(self.slots.len() == self.capacity)
    }

    /// Remove and return the oldest sample, or `None` when empty.
    pub fn pop(&mut self) -> Option<Popped> {
        let sample = self.slots.pop_front()?;
        Some(Popped {
            sample,
            now_empty: self.slots.is_empty(),
        })
    }

    /// The oldest sample.
    pub fn front(&self) -> Option<&Sample> {
        self.slots.front()
    }

    /// The newest sample.
    pub fn back(&self) -> Option<&Sample> {
        self.slots.back()
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_sample_size(&self) -> usize {
        self.max_sample_size
    }

    /// Samples discarded by overflow since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate oldest to newest without removing anything.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.slots.iter()
    }

    /// Drop every queued sample.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tag: u8) -> Sample {
        Sample::new(vec![tag; 4])
    }

    #[test]
    fn push_reports_full_from_capacity_onwards() {
        let mut queue = SampleQueue::new(3, 4);
        assert!(!queue.push(sample(1)).unwrap());
        assert!(!queue.push(sample(2)).unwrap());
        assert!(queue.push(sample(3)).unwrap());
        assert!(queue.push(sample(4)).unwrap());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn overflow_keeps_last_n_in_order() {
        let mut queue = SampleQueue::new(3, 4);
        for tag in 1..=4 {
            queue.push(sample(tag)).unwrap();
        }
        assert_eq!(queue.evicted(), 1);
        assert_eq!(queue.front().unwrap().data()[0], 2);
        assert_eq!(queue.back().unwrap().data()[0], 4);

        let first = queue.pop().unwrap();
        assert_eq!(first.sample.data()[0], 2);
        assert!(!first.now_empty);
        let second = queue.pop().unwrap();
        assert_eq!(second.sample.data()[0], 3);
        assert!(!second.now_empty);
        let third = queue.pop().unwrap();
        assert_eq!(third.sample.data()[0], 4);
        assert!(third.now_empty);

        assert!(queue.pop().is_none());
    }

    #[test]
    fn pop_on_empty_is_no_data() {
        let mut queue = SampleQueue::new(2, 8);
        assert!(queue.pop().is_none());
        assert!(queue.front().is_none());
        assert!(queue.back().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn oversized_push_is_rejected_without_side_effects() {
        let mut queue = SampleQueue::new(1, 2);
        queue.push(Sample::new(vec![1, 2])).unwrap();
        let err = queue.push(Sample::new(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, FrameError::SampleTooLarge { size: 3, max: 2 }));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.evicted(), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut queue = SampleQueue::new(0, 1);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(Sample::new(vec![9])).unwrap());
    }

    #[test]
    fn popped_sample_outlives_queue_mutation() {
        let mut queue = SampleQueue::new(1, 4);
        queue.push(sample(7)).unwrap();
        let popped = queue.pop().unwrap();
        queue.push(sample(8)).unwrap();
        queue.clear();
        assert_eq!(popped.sample.data(), &[7, 7, 7, 7]);
    }
}
