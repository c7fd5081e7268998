//! Fixed-capacity ring buffer over numeric samples
//!
//! The backing storage is allocated once. When full, `enqueue` overwrites
//! the oldest element. Logical index `i` (0 = oldest) maps to the physical
//! slot `(tail + i) % capacity`.

use super::Numeric;
use crate::error::{ObserverError, ObserverResult};
use std::ops::{Index, IndexMut};

/// Bounded FIFO of numeric samples that drops the oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Numeric> {
    buffer: Vec<T>,
    /// Physical slot of the newest element
    head: usize,
    /// Physical slot of the oldest element
    tail: usize,
    count: usize,
}

impl<T: Numeric> RingBuffer<T> {
    /// Create an empty buffer; fails if `capacity` is zero
    pub fn new(capacity: usize) -> ObserverResult<Self> {
        if capacity == 0 {
            return Err(ObserverError::InvalidArgument(
                "ring buffer capacity must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            buffer: vec![T::default(); capacity],
            head: capacity - 1,
            tail: 0,
            count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.buffer.len()
    }

    fn physical(&self, index: usize) -> usize {
        (self.tail + index) % self.buffer.len()
    }

    fn check_index(&self, index: usize) -> ObserverResult<()> {
        if index >= self.count {
            return Err(ObserverError::IndexOutOfRange {
                index,
                len: self.count,
            });
        }
        Ok(())
    }

    /// Append `item` as the newest element.
    ///
    /// Returns the value previously held by the slot that was written: the
    /// evicted oldest element when the buffer was full, otherwise the
    /// default value.
    pub fn enqueue(&mut self, item: T) -> T {
        self.head = (self.head + 1) % self.buffer.len();
        let overwritten = std::mem::replace(&mut self.buffer[self.head], item);

        if self.is_full() {
            self.tail = (self.tail + 1) % self.buffer.len();
        } else {
            self.count += 1;
        }

        overwritten
    }

    /// Remove and return the oldest element
    pub fn dequeue(&mut self) -> ObserverResult<T> {
        if self.is_empty() {
            return Err(ObserverError::InvalidOperation(
                "cannot dequeue from an empty ring buffer".to_string(),
            ));
        }

        let item = std::mem::take(&mut self.buffer[self.tail]);
        self.tail = (self.tail + 1) % self.buffer.len();
        self.count -= 1;
        Ok(item)
    }

    pub fn get(&self, index: usize) -> ObserverResult<T> {
        self.check_index(index)?;
        Ok(self.buffer[self.physical(index)])
    }

    pub fn set(&mut self, index: usize, value: T) -> ObserverResult<()> {
        self.check_index(index)?;
        let slot = self.physical(index);
        self.buffer[slot] = value;
        Ok(())
    }

    /// Insert `item` at logical `index`, shifting later elements towards the
    /// head. The previous newest element is re-enqueued to make room, so a
    /// full buffer evicts its oldest element and capacity never changes.
    /// `index == len()` is an append.
    pub fn insert(&mut self, index: usize, item: T) -> ObserverResult<()> {
        if index > self.count {
            return Err(ObserverError::IndexOutOfRange {
                index,
                len: self.count,
            });
        }

        if index == self.count {
            self.enqueue(item);
            return Ok(());
        }

        let last = self.get(self.count - 1)?;
        for i in (index + 1..self.count).rev() {
            let previous = self.get(i - 1)?;
            self.set(i, previous)?;
        }
        self.set(index, item)?;
        self.enqueue(last);
        Ok(())
    }

    /// Remove the element at logical `index`, shifting earlier elements
    /// towards the tail
    pub fn remove_at(&mut self, index: usize) -> ObserverResult<T> {
        self.check_index(index)?;

        let removed = self.get(index)?;
        for i in (1..=index).rev() {
            let previous = self.get(i - 1)?;
            self.set(i, previous)?;
        }
        self.dequeue()?;
        Ok(removed)
    }

    /// Move the live elements into new storage of `new_capacity`, oldest
    /// first. Shrinking keeps the newest elements.
    pub fn resize(&mut self, new_capacity: usize) -> ObserverResult<()> {
        let mut resized = RingBuffer::new(new_capacity)?;
        while !self.is_empty() {
            resized.enqueue(self.dequeue()?);
        }
        *self = resized;
        Ok(())
    }

    /// Reset to empty and zero the backing storage
    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = T::default());
        self.head = self.buffer.len() - 1;
        self.tail = 0;
        self.count = 0;
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            position: 0,
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Numeric> Index<usize> for RingBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.count,
            "index {} out of range for ring buffer of length {}",
            index,
            self.count
        );
        &self.buffer[self.physical(index)]
    }
}

impl<T: Numeric> IndexMut<usize> for RingBuffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.count,
            "index {} out of range for ring buffer of length {}",
            index,
            self.count
        );
        let slot = self.physical(index);
        &mut self.buffer[slot]
    }
}

/// Borrowing iterator over a [`RingBuffer`] in logical order
pub struct Iter<'a, T: Numeric> {
    ring: &'a RingBuffer<T>,
    position: usize,
}

impl<'a, T: Numeric> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.position >= self.ring.count {
            return None;
        }
        let item = self.ring.buffer[self.ring.physical(self.position)];
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ring.count - self.position;
        (remaining, Some(remaining))
    }
}

impl<'a, T: Numeric> ExactSizeIterator for Iter<'a, T> {}

impl<'a, T: Numeric> IntoIterator for &'a RingBuffer<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
