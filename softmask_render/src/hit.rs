// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mask-aware hit testing.
//!
//! A pointer event is valid for an element only if every soft mask in its
//! chain admits the point. Each mask answers either geometrically (the
//! host's shape test) or, when alpha hit testing is enabled, by reading
//! back the rendered buffer channel at the point. Answers are memoized per
//! mask and quantized point for the rest of the frame.

use kurbo::Point;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use softmask_core::node::{MaskTree, NodeId};

use crate::compositor::MaskCompositor;
use crate::host::MaskBackend;

/// Packs a point into a frame-cache subkey at pixel resolution.
#[expect(
    clippy::cast_possible_truncation,
    reason = "screen coordinates fit in u16; wrapping off-screen points only weakens the memo key"
)]
fn quantize(point: Point) -> u32 {
    let x = point.x.round() as i32 as u16;
    let y = point.y.round() as i32 as u16;
    (u32::from(x) << 16) | u32::from(y)
}

impl MaskCompositor {
    /// Returns whether a pointer at `point` reaches `node` through every
    /// soft mask above it.
    pub fn raycast_valid(
        &mut self,
        tree: &mut MaskTree,
        backend: &impl MaskBackend,
        node: NodeId,
        point: Point,
    ) -> bool {
        let mut cursor = tree.stencil_allocation(node).nearest_soft;
        while let Some(mask) = cursor {
            if !self.mask_admits(tree, backend, mask, point) {
                return false;
            }
            cursor = tree.mask_parent(mask);
        }
        true
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "depth is bounded by MAX_SOFT_DEPTH"
    )]
    fn mask_admits(
        &mut self,
        tree: &mut MaskTree,
        backend: &impl MaskBackend,
        mask: NodeId,
        point: Point,
    ) -> bool {
        let owner = u64::from(mask.index());
        let subkey = quantize(point);
        if let Some(&hit) = self.frame_cache.get(owner, "hit", subkey) {
            return hit;
        }

        let hit = if tree.alpha_hit_test(mask) {
            let alloc = tree.stencil_allocation(mask);
            match (self.target_of(mask), alloc.depth) {
                (Some(target), depth) if depth >= 0 => {
                    backend.sample_alpha(target, depth as u8, point) > 0.0
                }
                // No buffer yet: fall back to the geometric answer.
                _ => backend.hit_test(tree, mask, point),
            }
        } else {
            backend.hit_test(tree, mask, point)
        };

        self.frame_cache.set(owner, "hit", subkey, hit);
        hit
    }
}
