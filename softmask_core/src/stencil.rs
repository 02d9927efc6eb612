// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stencil-bit and mask-depth allocation.
//!
//! Every node that participates in masking (as a mask or as masked content)
//! needs to know three things about its ancestry:
//!
//! - **depth** — how many enabled *soft* mask levels enclose it (itself
//!   included if it is an enabled soft mask), minus one. Soft masks use this
//!   as the buffer channel index: depth 0 renders into R, 1 into G, 2 into B,
//!   3 into A. Hard masks clip through the stencil alone and never consume a
//!   channel.
//! - **stencil bits** — the hard-mask stencil reference value accumulated
//!   nearest-first over the strict ancestor chain. Each outer mask level
//!   shifts the inner bits left; a hard level then sets the low bit. A mask's
//!   bit position therefore equals its level count from the scope root, the
//!   same value for every descendant that can see it.
//! - **nearest soft mask** — the enabled soft mask at or above the node whose
//!   buffer the node's material samples.
//!
//! The walk stops at (but includes) a render-order-override boundary, so
//! independently-sorted subtrees get independent allocations. Results are
//! cached per node and recomputed only after a structural or role change
//! invalidates them.

use alloc::vec::Vec;

use crate::node::{INVALID, MaskKind, MaskTree, NodeId};

/// Maximum number of nested soft-mask levels; one buffer channel each.
pub const MAX_SOFT_DEPTH: i32 = 4;

/// A node's position in the masking hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilAllocation {
    /// Number of enclosing enabled soft-mask levels minus one; `-1` when no
    /// soft mask covers the node.
    pub depth: i32,
    /// Hard-mask stencil reference bits from the strict ancestor chain,
    /// capped at 8 bits.
    pub stencil_bits: u32,
    /// The enabled soft mask at or above this node, if any.
    pub nearest_soft: Option<NodeId>,
}

impl StencilAllocation {
    /// The allocation of an unmasked node outside any mask scope.
    pub const UNMASKED: Self = Self {
        depth: -1,
        stencil_bits: 0,
        nearest_soft: None,
    };
}

impl MaskTree {
    /// Returns the node's stencil allocation, recomputing it if a structural
    /// or role change invalidated the cached value.
    pub fn stencil_allocation(&mut self, id: NodeId) -> StencilAllocation {
        self.validate(id);
        let idx = id.idx;
        if !self.stencil_dirty[idx as usize] {
            if let Some(cached) = self.stencil_cache[idx as usize] {
                return cached;
            }
        }
        let alloc = self.compute_allocation(idx);
        self.stencil_cache[idx as usize] = Some(alloc);
        self.stencil_dirty[idx as usize] = false;
        self.stencil_recalcs += 1;
        alloc
    }

    /// Walks the strict ancestor chain up to (and including) the nearest
    /// render-order-override boundary, then folds the enabled mask levels
    /// nearest-first into stencil bits and counts the soft levels for depth.
    fn compute_allocation(&self, idx: u32) -> StencilAllocation {
        // Chain of enabled mask ancestors, nearest first. A node that is
        // itself the boundary sees no ancestors at all.
        let mut chain: Vec<MaskKind> = Vec::new();
        let mut nearest_soft = INVALID;
        if self.is_soft_mask(idx) {
            nearest_soft = idx;
        }

        if !self.sort_boundary[idx as usize] {
            let mut cur = self.parent[idx as usize];
            while cur != INVALID {
                if self.enabled[cur as usize] {
                    if let Some(kind) = self.mask[cur as usize] {
                        chain.push(kind);
                        if nearest_soft == INVALID && kind == MaskKind::Soft {
                            nearest_soft = cur;
                        }
                    }
                }
                if self.sort_boundary[cur as usize] {
                    break;
                }
                cur = self.parent[cur as usize];
            }
        }

        let mut bits: u32 = 0;
        let mut levels: i32 = 0;
        let mut soft_levels: i32 = 0;
        for &kind in &chain {
            bits = if levels > 0 { bits << 1 } else { 0 };
            levels += 1;
            match kind {
                MaskKind::Hard => bits += 1,
                MaskKind::Soft => soft_levels += 1,
            }
        }
        bits &= 0xFF;

        let depth = soft_levels + i32::from(self.is_soft_mask(idx)) - 1;

        StencilAllocation {
            depth,
            stencil_bits: bits,
            nearest_soft: if nearest_soft == INVALID {
                None
            } else {
                self.handle(nearest_soft)
            },
        }
    }
}
