//! FIFO Queue Module
//!
//! Insertion-ordered queue used for never-expiring indices and as the bucket
//! type of the sharded engine.

use std::collections::VecDeque;

// == FIFO Queue ==
/// An optionally bounded first-in first-out queue.
///
/// - Front = oldest entry
/// - Back = newest entry
#[derive(Debug)]
pub struct Fifo<T> {
    items: VecDeque<T>,
    /// Maximum length, None = unbounded
    max_len: Option<usize>,
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Fifo<T> {
    // == Constructor ==
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            max_len: None,
        }
    }

    /// Creates a queue holding at most `max_len` entries.
    pub fn bounded(max_len: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_len),
            max_len: Some(max_len),
        }
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    /// Returns true when a bounded queue holds `max_len` entries.
    pub fn is_full(&self) -> bool {
        self.max_len.is_some_and(|max| self.items.len() >= max)
    }

    // == Push ==
    /// Appends an entry at the back.
    ///
    /// When the queue is full, the front entry is popped first and returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        let overflow = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        overflow
    }

    // == Pop ==
    /// Removes and returns the oldest entry.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Returns the oldest entry without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    // == Remove First Match ==
    /// Removes the first entry matching `pred`, keeping the order of the rest.
    pub fn remove_first<F>(&mut self, pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let pos = self.items.iter().position(pred)?;
        self.items.remove(pos)
    }

    /// Keeps only the entries matching `keep`, in order.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.items.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Removes every entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
