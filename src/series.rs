use std::collections::VecDeque;

use crate::models::Candle;

/// Items stored in a [`BoundedSeries`] are unique per timestamp
pub trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for Candle {
    fn key(&self) -> i64 {
        self.timestamp
    }
}

/// What an upsert did to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Replaced,
    Inserted,
    /// Inserted and the oldest entry fell off the tail
    Evicted,
}

/// Newest-first, timestamp-keyed buffer with a fixed cap
///
/// New keys are prepended; a repeated key is replaced in place. The forming
/// bar sits at index 0, so push updates hit the front of the scan.
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T: Keyed + Clone> BoundedSeries<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(4096)),
            cap,
        }
    }

    pub fn upsert(&mut self, item: T) -> Upsert {
        let key = item.key();
        if let Some(existing) = self.items.iter_mut().find(|i| i.key() == key) {
            *existing = item;
            return Upsert::Replaced;
        }

        self.items.push_front(item);
        if self.items.len() > self.cap {
            self.items.pop_back();
            return Upsert::Evicted;
        }
        Upsert::Inserted
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn find(&self, key: i64) -> Option<&T> {
        self.items.iter().find(|i| i.key() == key)
    }

    /// Newest-first copy
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Up to `count` newest entries, newest-first
    pub fn newest(&self, count: usize) -> Vec<T> {
        self.items.iter().take(count).cloned().collect()
    }

    /// Oldest-first iteration, the order indicators consume prices in
    pub fn iter_chronological(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }
}
