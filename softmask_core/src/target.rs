// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-target bookkeeping with epoch-based invalidation.
//!
//! The repository does not own GPU memory; it hands out stable [`TargetId`]s
//! sized from the current screen and the configured down-sample tier, and the
//! host backend materializes textures on first use. When the screen size
//! changes, the epoch is bumped and every outstanding slot goes stale at
//! once; slots are re-validated lazily on their next acquire instead of
//! eagerly reallocated.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::settings::DownSampleTier;

/// An opaque identity for one mask buffer texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(pub u64);

/// A mask node's hold on a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSlot {
    /// The target's identity, stable until reallocation.
    pub id: TargetId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    epoch: u64,
}

/// Whether an acquire reused the existing target or allocated a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// The slot was still valid for the current epoch and size.
    Reused,
    /// A new target identity was handed out; the old one (if any) is in the
    /// released list.
    Allocated,
}

#[derive(Clone, Copy, Debug)]
struct ActiveRecord {
    id: TargetId,
    width: u32,
    height: u32,
}

/// Tracks which mask nodes hold which render targets.
#[derive(Debug, Default)]
pub struct RenderTargetRepository {
    screen: (u32, u32),
    epoch: u64,
    next_id: u64,
    active: BTreeMap<u32, ActiveRecord>,
    released: Vec<TargetId>,
}

impl RenderTargetRepository {
    /// Creates an empty repository with a zero-sized screen.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the reference screen size. Returns `true` when it changed, in
    /// which case the epoch is bumped and all outstanding slots go stale.
    pub fn set_screen_size(&mut self, width: u32, height: u32) -> bool {
        if self.screen == (width, height) {
            return false;
        }
        self.screen = (width, height);
        self.epoch += 1;
        true
    }

    /// The current reference screen size.
    #[must_use]
    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    /// The size a buffer at the given tier would get right now.
    #[must_use]
    pub fn buffer_size(&self, tier: DownSampleTier) -> (u32, u32) {
        let d = tier.divisor();
        (
            core::cmp::max(self.screen.0 / d, 1),
            core::cmp::max(self.screen.1 / d, 1),
        )
    }

    /// Ensures `slot` holds a valid target for `owner` at the given tier.
    ///
    /// Returns `None` (and empties the slot) while the screen size is zero;
    /// no buffer can exist without a screen to derive its size from.
    pub fn acquire(
        &mut self,
        owner: u32,
        tier: DownSampleTier,
        slot: &mut Option<TargetSlot>,
    ) -> Option<Acquire> {
        if self.screen.0 == 0 || self.screen.1 == 0 {
            self.release(owner, slot);
            return None;
        }

        let (width, height) = self.buffer_size(tier);
        if let Some(held) = slot {
            if held.epoch == self.epoch && held.width == width && held.height == height {
                return Some(Acquire::Reused);
            }
        }

        // Stale or absent: retire the old identity and hand out a new one.
        self.release(owner, slot);
        self.next_id += 1;
        let id = TargetId(self.next_id);
        self.active.insert(owner, ActiveRecord { id, width, height });
        *slot = Some(TargetSlot {
            id,
            width,
            height,
            epoch: self.epoch,
        });
        Some(Acquire::Allocated)
    }

    /// Releases `owner`'s target, if it holds one. The slot is emptied and
    /// the retired identity is queued for the host to destroy.
    pub fn release(&mut self, owner: u32, slot: &mut Option<TargetSlot>) {
        *slot = None;
        if let Some(record) = self.active.remove(&owner) {
            self.released.push(record.id);
        }
    }

    /// Drains the identities retired since the last call, so the host can
    /// free the corresponding textures.
    pub fn drain_released(&mut self) -> Vec<TargetId> {
        core::mem::take(&mut self.released)
    }

    /// Number of targets currently held.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
