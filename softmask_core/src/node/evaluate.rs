// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame evaluation and change tracking.
//!
//! Evaluation follows a drain-recompute pattern:
//!
//! 1. **TRANSFORM** — Drain dirty indices in dependency order and recompute
//!    each node's `world_transform` as `parent_world * local_transform`.
//! 2. **TOPOLOGY** — Drain and report (structural changes are already applied
//!    eagerly; the channel only records that they happened).
//!
//! [`FrameChanges`] uses raw slot indices (`u32`) rather than [`NodeId`]
//! handles so that the render layer can index directly into per-node
//! bookkeeping without paying for generation checks on every access.
//!
//! [`NodeId`]: super::NodeId

use alloc::vec::Vec;

use super::id::INVALID;
use super::store::MaskTree;
use crate::dirty;
use crate::transform::Transform3d;

/// The set of changes produced by a single [`MaskTree::evaluate`] call.
///
/// Each list contains raw slot indices. The render layer uses `transforms`
/// to run movement-sensitivity checks and `removed` to drop per-node
/// resources.
#[derive(Clone, Debug, Default)]
pub struct FrameChanges {
    /// Nodes whose world transform was recomputed.
    pub transforms: Vec<u32>,
    /// Nodes added since the last evaluate.
    pub added: Vec<u32>,
    /// Nodes removed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the element topology changed.
    pub topology_changed: bool,
}

impl FrameChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }
}

impl MaskTree {
    /// Evaluates the tree, recomputing dirty world transforms and returning
    /// the set of changes.
    pub fn evaluate(&mut self) -> FrameChanges {
        let mut changes = FrameChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer
    /// to avoid allocation.
    pub fn evaluate_into(&mut self, changes: &mut FrameChanges) {
        changes.clear();

        // Drain TRANSFORM — the dependency edges (child depends on parent)
        // make the drain yield parents before children.
        let dirty_transforms: Vec<u32> = self
            .dirty
            .drain(dirty::TRANSFORM)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_transforms {
            let parent_idx = self.parent[idx as usize];
            let parent_world = if parent_idx != INVALID {
                self.world_transform[parent_idx as usize]
            } else {
                Transform3d::IDENTITY
            };
            self.world_transform[idx as usize] = parent_world * self.local_transform[idx as usize];
        }
        changes.transforms = dirty_transforms;

        // Drain TOPOLOGY (just consume, changes are structural).
        let topology: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();
        changes.topology_changed = !topology.is_empty();

        // Move lifecycle lists.
        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }
}
