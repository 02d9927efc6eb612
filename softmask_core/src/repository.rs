// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference-counted sharing of derived objects by content hash.
//!
//! Derived materials are expensive to build and frequently identical: every
//! drawable under the same mask with the same base material wants the same
//! replacement. The repository keys each object by a [`ContentHash`] of the
//! inputs that produced it, hands out shared references, and destroys the
//! object when the last holder releases it.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;

/// A 128-bit content hash identifying the inputs of a derived object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(pub [u32; 4]);

impl ContentHash {
    /// Hashes a sequence of input words into a 128-bit key.
    ///
    /// Two FNV-1a passes with distinct offset bases; not cryptographic, just
    /// well-spread enough for map keys.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "splitting each u64 digest into two u32 words is the point"
    )]
    pub fn of(parts: &[u64]) -> Self {
        const PRIME: u64 = 0x0000_0100_0000_01B3;
        let mut lo: u64 = 0xCBF2_9CE4_8422_2325;
        let mut hi: u64 = 0x6C62_272E_07BB_0142;
        for &part in parts {
            for byte in part.to_le_bytes() {
                lo = (lo ^ u64::from(byte)).wrapping_mul(PRIME);
                hi = (hi ^ u64::from(byte.wrapping_add(0x9E))).wrapping_mul(PRIME);
            }
        }
        Self([
            (lo & 0xFFFF_FFFF) as u32,
            (lo >> 32) as u32,
            (hi & 0xFFFF_FFFF) as u32,
            (hi >> 32) as u32,
        ])
    }
}

/// A shared reference to a repository-managed object.
///
/// Holds the content hash it was registered under so that release and
/// re-acquire can find the entry without recomputing inputs.
#[derive(Debug)]
pub struct Shared<T> {
    hash: ContentHash,
    value: Rc<T>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> Shared<T> {
    /// The hash this object is registered under.
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// The shared object.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: Rc<T>,
    refcount: u32,
}

/// Content-addressed store of shared derived objects.
#[derive(Debug)]
pub struct ObjectRepository<T> {
    entries: BTreeMap<ContentHash, Entry<T>>,
    /// How many objects the factory has actually built (diagnostics).
    built: u64,
}

impl<T> Default for ObjectRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectRepository<T> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            built: 0,
        }
    }

    /// Fills `slot` with the object registered under `hash`, building it
    /// with `factory` on first demand.
    ///
    /// If `slot` already holds an object with this hash, nothing happens.
    /// Otherwise the old occupant (if any) is released first. A factory
    /// returning `None` registers nothing and leaves the slot empty.
    pub fn get<F>(&mut self, hash: ContentHash, slot: &mut Option<Shared<T>>, factory: F)
    where
        F: FnOnce() -> Option<T>,
    {
        if let Some(held) = slot {
            if held.hash == hash {
                return;
            }
        }
        self.release(slot);

        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.refcount += 1;
            *slot = Some(Shared {
                hash,
                value: Rc::clone(&entry.value),
            });
            return;
        }

        let Some(value) = factory() else {
            return;
        };
        self.built += 1;
        let value = Rc::new(value);
        self.entries.insert(
            hash,
            Entry {
                value: Rc::clone(&value),
                refcount: 1,
            },
        );
        *slot = Some(Shared { hash, value });
    }

    /// Releases the object held in `slot`, destroying it if this was the
    /// last holder. The slot is left empty.
    pub fn release(&mut self, slot: &mut Option<Shared<T>>) {
        let Some(held) = slot.take() else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(&held.hash) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                self.entries.remove(&held.hash);
            }
        }
    }

    /// Number of distinct objects currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of objects the factory has built (diagnostics).
    #[must_use]
    pub fn built_count(&self) -> u64 {
        self.built
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_hashes_share_one_object() {
        let mut repo: ObjectRepository<u32> = ObjectRepository::new();
        let hash = ContentHash::of(&[1, 2, 3]);

        let mut a = None;
        let mut b = None;
        repo.get(hash, &mut a, || Some(41));
        repo.get(hash, &mut b, || Some(99));

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.built_count(), 1);
        assert_eq!(*a.as_ref().unwrap().value(), 41);
        assert_eq!(*b.as_ref().unwrap().value(), 41);
    }

    #[test]
    fn last_release_destroys_entry() {
        let mut repo: ObjectRepository<u32> = ObjectRepository::new();
        let hash = ContentHash::of(&[5]);

        let mut a = None;
        let mut b = None;
        repo.get(hash, &mut a, || Some(1));
        repo.get(hash, &mut b, || Some(1));

        repo.release(&mut a);
        assert!(a.is_none());
        assert_eq!(repo.len(), 1);

        repo.release(&mut b);
        assert!(repo.is_empty());
    }

    #[test]
    fn rebinding_a_slot_releases_the_old_object() {
        let mut repo: ObjectRepository<u32> = ObjectRepository::new();
        let h1 = ContentHash::of(&[1]);
        let h2 = ContentHash::of(&[2]);

        let mut slot = None;
        repo.get(h1, &mut slot, || Some(10));
        repo.get(h2, &mut slot, || Some(20));

        assert_eq!(repo.len(), 1);
        assert_eq!(*slot.as_ref().unwrap().value(), 20);
    }

    #[test]
    fn same_hash_is_idempotent() {
        let mut repo: ObjectRepository<u32> = ObjectRepository::new();
        let hash = ContentHash::of(&[7]);

        let mut slot = None;
        repo.get(hash, &mut slot, || Some(1));
        repo.get(hash, &mut slot, || Some(2));
        assert_eq!(repo.built_count(), 1);
        assert_eq!(*slot.as_ref().unwrap().value(), 1);
    }

    #[test]
    fn factory_returning_none_registers_nothing() {
        let mut repo: ObjectRepository<u32> = ObjectRepository::new();
        let hash = ContentHash::of(&[9]);

        let mut slot = None;
        repo.get(hash, &mut slot, || None);
        assert!(slot.is_none());
        assert!(repo.is_empty());
    }

    #[test]
    fn distinct_inputs_hash_differently() {
        assert_ne!(ContentHash::of(&[1, 2]), ContentHash::of(&[2, 1]));
        assert_ne!(ContentHash::of(&[0]), ContentHash::of(&[]));
    }
}
