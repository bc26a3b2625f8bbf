// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Arena Allocator
//!
//! A fixed-capacity slot arena. Every slot is addressed by a small index
//! so that queues can hold indices instead of owned values, and the number
//! of outstanding allocations can never exceed the capacity chosen at
//! creation time.
//!
//! # Design
//!
//! - **Bounded**: `alloc` fails with `NoResources` once `capacity` slots
//!   are outstanding; storage grows lazily up to that bound
//! - **Free list**: Released slots are reused LIFO
//! - **Checked indices**: Freeing or touching a vacant slot is a kernel bug
//!   and panics

use crate::rustux::errors::*;

/// Index of an arena slot
pub type SlotIndex = usize;

/// Bounded slot arena
pub struct Arena<T> {
    /// Arena name, for diagnostics
    name: &'static str,

    /// Maximum number of outstanding slots
    capacity: usize,

    /// Slot storage (`None` = vacant)
    slots: Vec<Option<T>>,

    /// Vacant slot indices
    free: Vec<SlotIndex>,

    /// Outstanding allocations
    outstanding: usize,

    /// High-water mark of outstanding allocations
    peak: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena
    ///
    /// # Arguments
    ///
    /// * `name` - Arena name
    /// * `capacity` - Maximum number of outstanding slots
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            slots: Vec::new(),
            free: Vec::new(),
            outstanding: 0,
            peak: 0,
        }
    }

    /// Allocate a slot holding `value`
    ///
    /// # Returns
    ///
    /// - The slot index
    /// - `Err(Error::NoResources)` when the arena is at capacity
    pub fn alloc(&mut self, value: T) -> Result<SlotIndex> {
        if self.outstanding >= self.capacity {
            return Err(Error::NoResources);
        }

        let index = match self.free.pop() {
            Some(index) => {
                debug_assert!(self.slots[index].is_none());
                self.slots[index] = Some(value);
                index
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        };

        self.outstanding += 1;
        self.peak = self.peak.max(self.outstanding);
        Ok(index)
    }

    /// Release a slot, returning its value
    pub fn free(&mut self, index: SlotIndex) -> T {
        let value = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("{}: free of vacant slot {}", self.name, index));

        self.free.push(index);
        self.outstanding -= 1;
        value
    }

    /// Borrow a live slot
    pub fn get(&self, index: SlotIndex) -> &T {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("{}: access to vacant slot {}", self.name, index))
    }

    /// Mutably borrow a live slot
    pub fn get_mut(&mut self, index: SlotIndex) -> &mut T {
        let name = self.name;
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("{}: access to vacant slot {}", name, index))
    }

    /// Check whether a slot is live
    pub fn contains(&self, index: SlotIndex) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Maximum number of outstanding slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of outstanding slots
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// High-water mark
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Check whether another slot can be allocated
    pub fn has_room(&self) -> bool {
        self.outstanding < self.capacity
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_capacity() {
        let mut arena = Arena::new("test", 2);
        let a = arena.alloc(1u32).unwrap();
        let _b = arena.alloc(2u32).unwrap();
        assert_eq!(arena.alloc(3u32), Err(Error::NoResources));
        assert!(!arena.has_room());

        assert_eq!(arena.free(a), 1);
        assert!(arena.has_room());
        let c = arena.alloc(4u32).unwrap();
        // Freed slot is reused.
        assert_eq!(c, a);
        assert_eq!(*arena.get(c), 4);
        assert_eq!(arena.peak(), 2);
    }

    #[test]
    fn test_arena_get_mut() {
        let mut arena = Arena::new("test", 4);
        let idx = arena.alloc(10u32).unwrap();
        *arena.get_mut(idx) += 5;
        assert_eq!(*arena.get(idx), 15);
        assert!(arena.contains(idx));
        arena.free(idx);
        assert!(!arena.contains(idx));
    }

    #[test]
    #[should_panic]
    fn test_double_free_panics() {
        let mut arena = Arena::new("test", 1);
        let idx = arena.alloc(0u8).unwrap();
        arena.free(idx);
        arena.free(idx);
    }
}
