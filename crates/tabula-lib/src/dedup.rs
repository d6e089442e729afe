//! Bounded-memory suppression of repeated output items.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

pub const DEFAULT_WINDOW: usize = 10_000;

/// Remembers the last `capacity` emitted items and rejects any item
/// among them. A capacity of 0 lets everything through.
#[derive(Debug, Clone)]
pub struct DedupWindow<T> {
    capacity: usize,
    order: VecDeque<T>,
    seen: HashSet<T>,
}

impl<T: Hash + Eq + Clone> DedupWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(DEFAULT_WINDOW)),
            seen: HashSet::with_capacity(capacity.min(DEFAULT_WINDOW)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if `item` should be emitted, recording it as the
    /// newest entry of the window.
    pub fn admit(&mut self, item: &T) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(item) {
            return false;
        }
        self.order.push_back(item.clone());
        self.seen.insert(item.clone());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Filter a stream through this window, preserving order.
    pub fn filter<I>(&mut self, items: I) -> Dedup<'_, I::IntoIter, T>
    where
        I: IntoIterator<Item = T>,
    {
        Dedup {
            inner: items.into_iter(),
            window: self,
        }
    }
}

impl<T: Hash + Eq + Clone> Default for DedupWindow<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

pub struct Dedup<'a, I, T> {
    inner: I,
    window: &'a mut DedupWindow<T>,
}

impl<I, T> Iterator for Dedup<'_, I, T>
where
    I: Iterator<Item = T>,
    T: Hash + Eq + Clone,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let window = &mut *self.window;
        self.inner.by_ref().find(|item| window.admit(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(capacity: usize, items: &[&'static str]) -> Vec<&'static str> {
        let mut window = DedupWindow::new(capacity);
        window.filter(items.iter().copied()).collect()
    }

    #[test]
    fn suppresses_within_window() {
        assert_eq!(run(2, &["a", "b", "a", "c", "a"]), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn immediate_repeat_is_dropped() {
        assert_eq!(run(2, &["x", "x"]), vec!["x"]);
        assert_eq!(run(DEFAULT_WINDOW, &["x", "x", "x"]), vec!["x"]);
    }

    #[test]
    fn repeat_after_window_is_emitted() {
        assert_eq!(run(2, &["x", "a", "b", "x"]), vec!["x", "a", "b", "x"]);
        assert_eq!(run(3, &["x", "a", "b", "x"]), vec!["x", "a", "b"]);
    }

    #[test]
    fn zero_capacity_is_passthrough() {
        assert_eq!(run(0, &["a", "a", "a"]), vec!["a", "a", "a"]);
    }

    #[test]
    fn dropped_items_do_not_refresh_the_window() {
        // "a" is rejected the second time but stays the oldest entry
        assert_eq!(
            run(2, &["a", "b", "a", "c", "a"]),
            run(2, &["a", "b", "c", "a"])
        );
    }

    #[test]
    fn window_survives_across_batches() {
        let mut window = DedupWindow::new(10);
        let first: Vec<i32> = window.filter(vec![1, 2, 3]).collect();
        let second: Vec<i32> = window.filter(vec![3, 4, 1]).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4]);
    }

    #[test]
    fn memory_is_bounded() {
        let mut window = DedupWindow::new(5);
        for i in 0..1000 {
            assert!(window.admit(&i));
        }
        assert_eq!(window.order.len(), 5);
        assert_eq!(window.seen.len(), 5);
    }
}
