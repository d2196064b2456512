//! A fixed-capacity FIFO. Used for the 1-second sample ring, the 1000-entry
//! score histories and the 10-entry spike reference window.

use std::collections::VecDeque;

/// Keeps at most `capacity` items; pushing onto a full history evicts the
/// oldest one first.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Instantiates an empty [`BoundedHistory`]. A zero capacity is bumped to
    /// one so that the most recent push is always visible.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, evicting the oldest entry when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been pushed since the last clear.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + DoubleEndedIterator {
        self.items.iter()
    }

    /// The newest entry.
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Copies the contents out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl BoundedHistory<f64> {
    /// Arithmetic mean, or `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.iter().sum::<f64>() / self.items.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut hist = BoundedHistory::new(3);
        for v in 1..=5 {
            hist.push(v);
        }
        assert_eq!(hist.len(), 3);
        assert_eq!(hist.to_vec(), vec![3, 4, 5]);
        assert_eq!(hist.last(), Some(&5));
    }

    #[test]
    fn mean_of_empty_is_none() {
        let mut hist: BoundedHistory<f64> = BoundedHistory::new(10);
        assert_eq!(hist.mean(), None);
        hist.push(0.5);
        hist.push(1.0);
        assert_eq!(hist.mean(), Some(0.75));
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut hist = BoundedHistory::new(0);
        hist.push('a');
        hist.push('b');
        assert_eq!(hist.capacity(), 1);
        assert_eq!(hist.to_vec(), vec!['b']);
    }
}
