// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A memoization cache flushed at every frame boundary.
//!
//! Within one frame, the same question (did this mask render? is this node in
//! view? did this point hit?) may be asked many times; across frames the
//! answers go stale. Entries are keyed by an owner id, a static string tag,
//! and a numeric subkey, and the whole cache is cleared before each rebuild.

use alloc::collections::BTreeMap;

/// Composite cache key: owner id, question tag, numeric subkey.
type Key = (u64, &'static str, u32);

/// Per-frame memoization cache.
///
/// The compositor clears this at the start of every frame; a value observed
/// mid-frame is authoritative for the rest of that frame.
#[derive(Debug)]
pub struct FrameCache<V> {
    entries: BTreeMap<Key, V>,
}

impl<V> Default for FrameCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FrameCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Looks up a cached answer.
    #[must_use]
    pub fn get(&self, owner: u64, tag: &'static str, subkey: u32) -> Option<&V> {
        self.entries.get(&(owner, tag, subkey))
    }

    /// Records an answer for the rest of the frame.
    pub fn set(&mut self, owner: u64, tag: &'static str, subkey: u32, value: V) {
        self.entries.insert((owner, tag, subkey), value);
    }

    /// Returns whether an answer has been recorded this frame.
    #[must_use]
    pub fn contains(&self, owner: u64, tag: &'static str, subkey: u32) -> bool {
        self.entries.contains_key(&(owner, tag, subkey))
    }

    /// Flushes all entries, returning how many were discarded.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "entry counts are far below u32::MAX; the count is diagnostic"
    )]
    pub fn clear(&mut self) -> u32 {
        let n = self.entries.len() as u32;
        self.entries.clear();
        n
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
