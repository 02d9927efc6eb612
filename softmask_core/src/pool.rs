// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A generic object pool for frame-scoped allocations.
//!
//! Command lists, draw-parameter blocks, and scratch meshes are rented at the
//! start of a buffer render and recycled when it completes, so steady-state
//! frames allocate nothing. The pool is unbounded: rent falls back to the
//! factory when empty, and recycle always stores.

use alloc::vec::Vec;

/// An unbounded pool of reusable objects.
///
/// Behavior is defined by three plain functions supplied at construction:
/// a factory, a validity check applied on recycle (invalid objects are
/// dropped instead of stored), and a reset applied before storing.
pub struct ObjectPool<T> {
    create: fn() -> T,
    valid: fn(&T) -> bool,
    reset: fn(&mut T),
    free: Vec<T>,
    /// Total number of objects ever created by this pool.
    created: u32,
}

impl<T> core::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("free", &self.free.len())
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool with the given lifecycle functions.
    #[must_use]
    pub fn new(create: fn() -> T, valid: fn(&T) -> bool, reset: fn(&mut T)) -> Self {
        Self {
            create,
            valid,
            reset,
            free: Vec::new(),
            created: 0,
        }
    }

    /// Takes an object from the pool, creating one if none are free.
    pub fn rent(&mut self) -> T {
        if let Some(obj) = self.free.pop() {
            obj
        } else {
            self.created += 1;
            (self.create)()
        }
    }

    /// Returns an object to the pool, taking it out of the slot.
    ///
    /// The slot is left as `None` either way. Objects that fail the validity
    /// check are dropped rather than stored.
    pub fn recycle(&mut self, slot: &mut Option<T>) {
        if let Some(mut obj) = slot.take() {
            if (self.valid)(&obj) {
                (self.reset)(&mut obj);
                self.free.push(obj);
            }
        }
    }

    /// Number of objects currently available for rent.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Total number of objects this pool has ever created.
    #[must_use]
    pub fn created_count(&self) -> u32 {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn make() -> Vec<u8> {
        Vec::new()
    }

    fn always_valid(_: &Vec<u8>) -> bool {
        true
    }

    fn never_valid(_: &Vec<u8>) -> bool {
        false
    }

    fn clear(v: &mut Vec<u8>) {
        v.clear();
    }

    #[test]
    fn rent_creates_when_empty() {
        let mut pool = ObjectPool::new(make, always_valid, clear);
        let _a = pool.rent();
        let _b = pool.rent();
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn recycle_resets_and_reuses() {
        let mut pool = ObjectPool::new(make, always_valid, clear);
        let mut obj = pool.rent();
        obj.push(7);
        let mut slot = Some(obj);
        pool.recycle(&mut slot);
        assert!(slot.is_none());
        assert_eq!(pool.free_count(), 1);

        let again = pool.rent();
        assert!(again.is_empty());
        assert_eq!(pool.created_count(), 1);
    }

    #[test]
    fn invalid_objects_are_dropped() {
        let mut pool = ObjectPool::new(make, never_valid, clear);
        let mut slot = Some(pool.rent());
        pool.recycle(&mut slot);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn recycling_empty_slot_is_a_no_op() {
        let mut pool = ObjectPool::new(make, always_valid, clear);
        let mut slot: Option<Vec<u8>> = None;
        pool.recycle(&mut slot);
        assert_eq!(pool.free_count(), 0);
    }
}
