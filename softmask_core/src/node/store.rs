// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, mask-forest
//! links, and property management.

use alloc::vec::Vec;

use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::dirty;
use crate::range::SoftnessRange;
use crate::stencil::StencilAllocation;
use crate::transform::Transform3d;

use super::id::{INVALID, MeshId, NodeId, TextureId};
use super::traverse::Children;

/// Whether a mask cuts with a binary stencil or an alpha gradient.
///
/// The stencil allocator and the compositor both branch on this: hard masks
/// consume stencil bits, soft masks consume a buffer channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Binary stencil mask — no gradient, occupies a stencil bit.
    Hard,
    /// Alpha-gradient mask — rendered into a channel of a mask buffer.
    Soft,
}

/// How an auxiliary shape combines with the mask it is attached to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaskMethod {
    /// Union: the shape's alpha is added to the mask.
    #[default]
    Additive,
    /// Subtraction: the shape's alpha is reverse-subtracted from the mask.
    Subtract,
}

/// An auxiliary shape drawn into a mask node's buffer after its own shape.
///
/// Shapes attached to the same node have no defined order relative to each
/// other; only the owning node's position in the mask chain is load-bearing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuxShape {
    /// The shape's mesh.
    pub mesh: MeshId,
    /// Union or subtraction.
    pub method: MaskMethod,
    /// Softness range applied while drawing this shape.
    pub softness: SoftnessRange,
}

/// Struct-of-arrays storage for all mask-capable elements.
///
/// Nodes are addressed by [`NodeId`] handles. Internally, each node occupies
/// a slot in parallel arrays. Destroyed nodes are recycled via a free list,
/// and generation counters prevent stale handle access.
///
/// Two hierarchies live here:
///
/// - The **element tree** (`parent`/`first_child`/siblings) mirrors the host
///   UI hierarchy and drives world-transform evaluation.
/// - The **mask forest** (`mask_parent`/`mask_children`) is derived: each
///   soft mask's parent is the nearest enabled soft-mask ancestor not
///   crossing a render-order-override boundary. Children vectors hold
///   back-references that are pruned lazily during dirty propagation.
#[derive(Debug)]
pub struct MaskTree {
    // -- Element topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Local properties (set by callers) --
    pub(crate) local_transform: Vec<Transform3d>,
    pub(crate) enabled: Vec<bool>,
    pub(crate) sort_boundary: Vec<bool>,
    pub(crate) mask: Vec<Option<MaskKind>>,
    pub(crate) threshold: Vec<SoftnessRange>,
    pub(crate) clear_color: Vec<[f32; 4]>,
    pub(crate) alpha_hit_test: Vec<bool>,
    pub(crate) shape_mesh: Vec<Option<MeshId>>,
    pub(crate) texture: Vec<Option<TextureId>>,
    pub(crate) aux_shapes: Vec<Vec<AuxShape>>,

    // -- Computed properties (written by evaluate) --
    pub(crate) world_transform: Vec<Transform3d>,

    // -- Mask forest (derived) --
    pub(crate) mask_parent: Vec<u32>,
    pub(crate) mask_children: Vec<Vec<u32>>,

    // -- Per-node render bookkeeping --
    pub(crate) buffer_dirty: Vec<bool>,
    pub(crate) stencil_dirty: Vec<bool>,
    pub(crate) stencil_cache: Vec<Option<StencilAllocation>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,

    // -- Diagnostics --
    pub(crate) stencil_recalcs: u64,
}

impl Default for MaskTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            local_transform: Vec::new(),
            enabled: Vec::new(),
            sort_boundary: Vec::new(),
            mask: Vec::new(),
            threshold: Vec::new(),
            clear_color: Vec::new(),
            alpha_hit_test: Vec::new(),
            shape_mesh: Vec::new(),
            texture: Vec::new(),
            aux_shapes: Vec::new(),
            world_transform: Vec::new(),
            mask_parent: Vec::new(),
            mask_children: Vec::new(),
            buffer_dirty: Vec::new(),
            stencil_dirty: Vec::new(),
            stencil_cache: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
            stencil_recalcs: 0,
        }
    }

    // -- Allocation API --

    /// Creates a new node and returns its handle.
    ///
    /// The node starts enabled, with an identity transform, no mask role,
    /// and no parent.
    pub fn create_node(&mut self) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            let i = idx as usize;
            self.generation[i] += 1;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.local_transform[i] = Transform3d::IDENTITY;
            self.enabled[i] = true;
            self.sort_boundary[i] = false;
            self.mask[i] = None;
            self.threshold[i] = SoftnessRange::default();
            self.clear_color[i] = [0.0; 4];
            self.alpha_hit_test[i] = false;
            self.shape_mesh[i] = None;
            self.texture[i] = None;
            self.aux_shapes[i].clear();
            self.world_transform[i] = Transform3d::IDENTITY;
            self.mask_parent[i] = INVALID;
            self.mask_children[i].clear();
            self.buffer_dirty[i] = false;
            self.stencil_dirty[i] = true;
            self.stencil_cache[i] = None;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.local_transform.push(Transform3d::IDENTITY);
            self.enabled.push(true);
            self.sort_boundary.push(false);
            self.mask.push(None);
            self.threshold.push(SoftnessRange::default());
            self.clear_color.push([0.0; 4]);
            self.alpha_hit_test.push(false);
            self.shape_mesh.push(None);
            self.texture.push(None);
            self.aux_shapes.push(Vec::new());
            self.world_transform.push(Transform3d::IDENTITY);
            self.mask_parent.push(INVALID);
            self.mask_children.push(Vec::new());
            self.buffer_dirty.push(false);
            self.stencil_dirty.push(true);
            self.stencil_cache.push(None);
            self.generation.push(0);
            idx
        };

        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Destroys a node, freeing its slot for reuse.
    ///
    /// The node detaches from its mask parent's children set, and each of its
    /// own mask children is told to recompute its parent link (it reattaches
    /// to the nearest surviving enabled soft mask, or becomes a root).
    ///
    /// # Panics
    ///
    /// Panics if the node has element children (remove them first) or if the
    /// handle is stale.
    pub fn destroy_node(&mut self, id: NodeId) {
        self.validate(id);
        let idx = id.idx;
        assert!(
            self.first_child[idx as usize] == INVALID,
            "cannot destroy node with children"
        );

        // Detach from the mask forest before tearing down topology, while
        // the ancestor chain is still walkable.
        self.unlink_mask_parent(idx);
        let orphans = core::mem::take(&mut self.mask_children[idx as usize]);

        if self.parent[idx as usize] != INVALID {
            self.unlink_from_parent(idx);
        }

        self.dirty.remove_key(idx);

        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.free_list.push(idx);
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        // Former mask children recompute their parent and re-render.
        for c in orphans {
            if self.is_free(c) || self.mask_parent[c as usize] != idx {
                continue;
            }
            self.mask_parent[c as usize] = INVALID;
            self.update_mask_parent_of(c);
            self.mark_buffer_dirty_idx(c);
            self.request_stencil_recalc_subtree(c);
        }
    }

    /// Resolves a raw slot index (as reported in
    /// [`FrameChanges`](super::FrameChanges)) back to a live handle.
    #[must_use]
    pub fn node_at(&self, idx: u32) -> Option<NodeId> {
        if idx >= self.len {
            return None;
        }
        self.handle(idx)
    }

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        (id.idx < self.len)
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    // -- Element topology API --

    /// Adds `child` as the last child of `parent`.
    ///
    /// The moved subtree's world transforms, mask-forest links, and stencil
    /// allocations are all recomputed under the new ancestry.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, or if `child` already has a parent.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.validate(parent);
        self.validate(child);
        let p = parent.idx;
        let c = child.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );

        self.link_last_child(p, c);
        let _ = self.dirty.add_dependency(c, p, dirty::TRANSFORM);
        self.dirty.mark_with(c, dirty::TRANSFORM, &EagerPolicy);
        self.dirty.mark(p, dirty::TOPOLOGY);

        self.refresh_mask_links(c);
        self.request_stencil_recalc_subtree(c);
    }

    /// Removes `child` from its current element parent.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node has no parent.
    pub fn remove_from_parent(&mut self, child: NodeId) {
        self.validate(child);
        let c = child.idx;
        assert!(self.parent[c as usize] != INVALID, "node has no parent");

        let p = self.parent[c as usize];
        self.unlink_from_parent(c);
        self.dirty.remove_dependency(c, p, dirty::TRANSFORM);
        self.dirty.mark_with(c, dirty::TRANSFORM, &EagerPolicy);
        self.dirty.mark(p, dirty::TOPOLOGY);

        self.refresh_mask_links(c);
        self.request_stencil_recalc_subtree(c);
    }

    /// Moves `child` to be a child of `new_parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) {
        self.validate(child);
        self.validate(new_parent);
        let c = child.idx;

        if self.parent[c as usize] != INVALID {
            let old_p = self.parent[c as usize];
            self.unlink_from_parent(c);
            self.dirty.remove_dependency(c, old_p, dirty::TRANSFORM);
            self.dirty.mark(old_p, dirty::TOPOLOGY);
        }

        let p = new_parent.idx;
        self.link_last_child(p, c);
        let _ = self.dirty.add_dependency(c, p, dirty::TRANSFORM);
        self.dirty.mark_with(c, dirty::TRANSFORM, &EagerPolicy);
        self.dirty.mark(p, dirty::TOPOLOGY);

        self.refresh_mask_links(c);
        self.request_stencil_recalc_subtree(c);
    }

    /// Returns the element parent of a node, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        self.handle(self.parent[id.idx as usize])
    }

    /// Returns an iterator over the direct element children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns the root of the element tree containing `id`.
    #[must_use]
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.validate(id);
        let mut cur = id.idx;
        while self.parent[cur as usize] != INVALID {
            cur = self.parent[cur as usize];
        }
        self.handle(cur).expect("root slot is live")
    }

    /// Returns all live root nodes (those with no element parent).
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for idx in 0..self.len {
            if self.parent[idx as usize] == INVALID && !self.is_free(idx) {
                roots.push(self.handle(idx).expect("non-free slot is live"));
            }
        }
        roots
    }

    // -- Mask forest API --

    /// Returns the mask parent: the nearest enabled soft-mask ancestor, not
    /// crossing a render-order-override boundary.
    #[must_use]
    pub fn mask_parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        self.handle(self.mask_parent[id.idx as usize])
    }

    /// Returns the live mask children of a node.
    ///
    /// Entries whose computed parent no longer points here are filtered out
    /// (they are pruned for real on the next dirty propagation).
    #[must_use]
    pub fn mask_children(&self, id: NodeId) -> Vec<NodeId> {
        self.validate(id);
        let idx = id.idx;
        self.mask_children[idx as usize]
            .iter()
            .filter(|&&c| !self.is_free(c) && self.mask_parent[c as usize] == idx)
            .map(|&c| self.handle(c).expect("non-free slot is live"))
            .collect()
    }

    /// Returns every live node that is an enabled soft mask.
    ///
    /// These are exactly the nodes eligible for buffer rendering.
    #[must_use]
    pub fn soft_mask_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for idx in 0..self.len {
            if !self.is_free(idx) && self.is_soft_mask(idx) {
                out.push(self.handle(idx).expect("non-free slot is live"));
            }
        }
        out
    }

    /// Marks a node's buffer dirty and propagates downward through the mask
    /// forest: if a node must re-render, so must every mask nested inside it.
    ///
    /// Stale child entries (destroyed or reparented nodes) are pruned here.
    pub fn mark_buffer_dirty(&mut self, id: NodeId) {
        self.validate(id);
        self.mark_buffer_dirty_idx(id.idx);
    }

    /// Returns whether the node's buffer needs re-rendering.
    #[must_use]
    pub fn is_buffer_dirty(&self, id: NodeId) -> bool {
        self.validate(id);
        self.buffer_dirty[id.idx as usize]
    }

    /// Clears the node's dirty flag without touching its descendants.
    ///
    /// Called by the compositor after a successful buffer render.
    pub fn clear_buffer_dirty(&mut self, id: NodeId) {
        self.validate(id);
        self.buffer_dirty[id.idx as usize] = false;
    }

    /// Marks every enabled soft mask dirty (e.g. after the shared buffer
    /// size changes and all outstanding targets go stale).
    pub fn mark_all_masks_dirty(&mut self) {
        for idx in 0..self.len {
            if !self.is_free(idx) && self.is_soft_mask(idx) {
                self.mark_buffer_dirty_idx(idx);
            }
        }
    }

    /// Requests stencil recalculation for every live node.
    pub fn request_stencil_recalc_all(&mut self) {
        for idx in 0..self.len {
            if !self.is_free(idx) {
                self.stencil_dirty[idx as usize] = true;
            }
        }
    }

    /// Requests stencil recalculation for one node.
    pub fn request_stencil_recalc(&mut self, id: NodeId) {
        self.validate(id);
        self.stencil_dirty[id.idx as usize] = true;
    }

    // -- Property getters --

    /// Returns the local transform of a node.
    #[must_use]
    pub fn local_transform(&self, id: NodeId) -> Transform3d {
        self.validate(id);
        self.local_transform[id.idx as usize]
    }

    /// Returns the computed world transform of a node.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn world_transform(&self, id: NodeId) -> Transform3d {
        self.validate(id);
        self.world_transform[id.idx as usize]
    }

    /// Returns whether the node is enabled.
    #[must_use]
    pub fn enabled(&self, id: NodeId) -> bool {
        self.validate(id);
        self.enabled[id.idx as usize]
    }

    /// Returns the node's mask role, if any.
    #[must_use]
    pub fn mask(&self, id: NodeId) -> Option<MaskKind> {
        self.validate(id);
        self.mask[id.idx as usize]
    }

    /// Returns whether the node is a render-order-override boundary.
    #[must_use]
    pub fn sort_boundary(&self, id: NodeId) -> bool {
        self.validate(id);
        self.sort_boundary[id.idx as usize]
    }

    /// Returns the node's alpha threshold range.
    #[must_use]
    pub fn threshold(&self, id: NodeId) -> SoftnessRange {
        self.validate(id);
        self.threshold[id.idx as usize]
    }

    /// Returns the clear color of the node's buffer.
    #[must_use]
    pub fn clear_color(&self, id: NodeId) -> [f32; 4] {
        self.validate(id);
        self.clear_color[id.idx as usize]
    }

    /// Returns whether alpha hit testing is enabled for the node.
    #[must_use]
    pub fn alpha_hit_test(&self, id: NodeId) -> bool {
        self.validate(id);
        self.alpha_hit_test[id.idx as usize]
    }

    /// Returns the node's shape mesh, if one has been generated.
    #[must_use]
    pub fn shape_mesh(&self, id: NodeId) -> Option<MeshId> {
        self.validate(id);
        self.shape_mesh[id.idx as usize]
    }

    /// Returns the node's main texture, if any.
    #[must_use]
    pub fn texture(&self, id: NodeId) -> Option<TextureId> {
        self.validate(id);
        self.texture[id.idx as usize]
    }

    /// Returns the auxiliary shapes attached to the node.
    #[must_use]
    pub fn aux_shapes(&self, id: NodeId) -> &[AuxShape] {
        self.validate(id);
        &self.aux_shapes[id.idx as usize]
    }

    /// Returns how many stencil allocations have been recomputed (walked)
    /// since the tree was created. Diagnostics only.
    #[must_use]
    pub fn stencil_recalcs(&self) -> u64 {
        self.stencil_recalcs
    }

    // -- Mutation API (auto-marks dirty state) --

    /// Sets the local transform of a node.
    ///
    /// Marks the TRANSFORM channel dirty with eager propagation. Whether the
    /// change is large enough to re-render buffers is decided later, in the
    /// pre-rebuild phase, against the configured sensitivity epsilon.
    pub fn set_transform(&mut self, id: NodeId, transform: Transform3d) {
        self.validate(id);
        self.local_transform[id.idx as usize] = transform;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Enables or disables a node.
    ///
    /// Masks inside the node's element subtree recompute their parent links
    /// (an enabled mask appearing or disappearing changes everyone's nearest
    /// ancestor), re-render, and recompute stencil allocations.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        self.validate(id);
        let idx = id.idx;
        if self.enabled[idx as usize] == enabled {
            return;
        }
        self.enabled[idx as usize] = enabled;
        if !enabled {
            self.unlink_mask_parent(idx);
        }
        self.refresh_mask_links(idx);
        self.mark_subtree_masks_dirty(idx);
        self.request_stencil_recalc_subtree(idx);
    }

    /// Sets or clears the node's mask role.
    pub fn set_mask(&mut self, id: NodeId, mask: Option<MaskKind>) {
        self.validate(id);
        let idx = id.idx;
        if self.mask[idx as usize] == mask {
            return;
        }
        self.mask[idx as usize] = mask;
        if mask != Some(MaskKind::Soft) {
            self.unlink_mask_parent(idx);
        }
        self.refresh_mask_links(idx);
        self.mark_subtree_masks_dirty(idx);
        self.request_stencil_recalc_subtree(idx);
    }

    /// Marks or unmarks the node as a render-order-override boundary.
    pub fn set_sort_boundary(&mut self, id: NodeId, boundary: bool) {
        self.validate(id);
        let idx = id.idx;
        if self.sort_boundary[idx as usize] == boundary {
            return;
        }
        self.sort_boundary[idx as usize] = boundary;
        self.refresh_mask_links(idx);
        self.mark_subtree_masks_dirty(idx);
        self.request_stencil_recalc_subtree(idx);
    }

    /// Sets the node's alpha threshold range. No-op when approximately equal.
    pub fn set_threshold(&mut self, id: NodeId, threshold: SoftnessRange) {
        self.validate(id);
        let idx = id.idx;
        if self.threshold[idx as usize].approx_eq(threshold) {
            return;
        }
        self.threshold[idx as usize] = threshold;
        self.mark_buffer_dirty_idx(idx);
    }

    /// Sets the clear color of the node's buffer.
    pub fn set_clear_color(&mut self, id: NodeId, color: [f32; 4]) {
        self.validate(id);
        let idx = id.idx;
        if self.clear_color[idx as usize] == color {
            return;
        }
        self.clear_color[idx as usize] = color;
        self.mark_buffer_dirty_idx(idx);
    }

    /// Enables or disables alpha hit testing for the node.
    pub fn set_alpha_hit_test(&mut self, id: NodeId, enabled: bool) {
        self.validate(id);
        self.alpha_hit_test[id.idx as usize] = enabled;
    }

    /// Sets the node's shape mesh (host mesh-generation hook output).
    pub fn set_shape_mesh(&mut self, id: NodeId, mesh: Option<MeshId>) {
        self.validate(id);
        let idx = id.idx;
        self.shape_mesh[idx as usize] = mesh;
        self.mark_buffer_dirty_idx(idx);
    }

    /// Sets the node's main texture.
    pub fn set_texture(&mut self, id: NodeId, texture: Option<TextureId>) {
        self.validate(id);
        let idx = id.idx;
        self.texture[idx as usize] = texture;
        self.mark_buffer_dirty_idx(idx);
    }

    /// Attaches an auxiliary shape to the node.
    pub fn add_aux_shape(&mut self, id: NodeId, shape: AuxShape) {
        self.validate(id);
        let idx = id.idx;
        self.aux_shapes[idx as usize].push(shape);
        self.mark_buffer_dirty_idx(idx);
    }

    /// Removes all auxiliary shapes from the node.
    pub fn clear_aux_shapes(&mut self, id: NodeId) {
        self.validate(id);
        let idx = id.idx;
        if !self.aux_shapes[idx as usize].is_empty() {
            self.aux_shapes[idx as usize].clear();
            self.mark_buffer_dirty_idx(idx);
        }
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: NodeId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    pub(crate) fn is_free(&self, idx: u32) -> bool {
        self.free_list.contains(&idx)
    }

    pub(crate) fn handle(&self, idx: u32) -> Option<NodeId> {
        if idx == INVALID || self.is_free(idx) {
            None
        } else {
            Some(NodeId {
                idx,
                generation: self.generation[idx as usize],
            })
        }
    }

    pub(crate) fn is_soft_mask(&self, idx: u32) -> bool {
        self.enabled[idx as usize] && self.mask[idx as usize] == Some(MaskKind::Soft)
    }

    fn link_last_child(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }
    }

    /// Removes `idx` from its element parent's child list.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    /// Removes `idx` from its current mask parent's children set.
    fn unlink_mask_parent(&mut self, idx: u32) {
        let mp = self.mask_parent[idx as usize];
        if mp != INVALID {
            if !self.is_free(mp) {
                self.mask_children[mp as usize].retain(|&c| c != idx);
            }
            self.mask_parent[idx as usize] = INVALID;
        }
    }

    pub(crate) fn mark_buffer_dirty_idx(&mut self, idx: u32) {
        if self.buffer_dirty[idx as usize] {
            return;
        }
        self.buffer_dirty[idx as usize] = true;

        // Propagate downward through the mask forest, pruning entries whose
        // computed parent no longer points here.
        let mut kids = core::mem::take(&mut self.mask_children[idx as usize]);
        kids.retain(|&c| !self.is_free(c) && self.mask_parent[c as usize] == idx);
        for &c in &kids {
            self.mark_buffer_dirty_idx(c);
        }
        self.mask_children[idx as usize] = kids;
    }

    /// Recomputes mask-forest parent links for every soft mask in the element
    /// subtree rooted at `idx` (inclusive).
    pub(crate) fn refresh_mask_links(&mut self, idx: u32) {
        let mut stack = alloc::vec![idx];
        while let Some(cur) = stack.pop() {
            if self.mask[cur as usize] == Some(MaskKind::Soft) && self.enabled[cur as usize] {
                self.update_mask_parent_of(cur);
            }
            let mut child = self.first_child[cur as usize];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
        }
    }

    /// Walks upward from `idx` to its nearest enabled soft-mask ancestor,
    /// stopping at (but including) a render-order-override boundary, and
    /// relinks the mask forest if the answer changed.
    fn update_mask_parent_of(&mut self, idx: u32) {
        let mut found = INVALID;
        let mut cur = self.parent[idx as usize];
        while cur != INVALID {
            if self.is_soft_mask(cur) {
                found = cur;
                break;
            }
            if self.sort_boundary[cur as usize] {
                // Independent masking scope starts above this node.
                break;
            }
            cur = self.parent[cur as usize];
        }

        let old = self.mask_parent[idx as usize];
        if old == found {
            return;
        }

        self.unlink_mask_parent(idx);
        if found != INVALID {
            self.mask_parent[idx as usize] = found;
            if !self.mask_children[found as usize].contains(&idx) {
                self.mask_children[found as usize].push(idx);
            }
        }
        self.mark_buffer_dirty_idx(idx);
    }

    /// Marks every soft mask in the element subtree rooted at `idx` dirty.
    fn mark_subtree_masks_dirty(&mut self, idx: u32) {
        let mut stack = alloc::vec![idx];
        while let Some(cur) = stack.pop() {
            if self.mask[cur as usize] == Some(MaskKind::Soft) {
                self.mark_buffer_dirty_idx(cur);
            }
            let mut child = self.first_child[cur as usize];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
        }
    }

    /// Sets the stencil-recalculation flag for the element subtree at `idx`.
    pub(crate) fn request_stencil_recalc_subtree(&mut self, idx: u32) {
        let mut stack = alloc::vec![idx];
        while let Some(cur) = stack.pop() {
            self.stencil_dirty[cur as usize] = true;
            let mut child = self.first_child[cur as usize];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft(tree: &mut MaskTree) -> NodeId {
        let id = tree.create_node();
        tree.set_mask(id, Some(MaskKind::Soft));
        id
    }

    #[test]
    fn create_and_destroy() {
        let mut tree = MaskTree::new();
        let id = tree.create_node();
        assert!(tree.is_alive(id));
        tree.destroy_node(id);
        assert!(!tree.is_alive(id));
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut tree = MaskTree::new();
        let id1 = tree.create_node();
        tree.destroy_node(id1);
        let id2 = tree.create_node();
        assert!(!tree.is_alive(id1));
        assert!(tree.is_alive(id2));
        assert_eq!(id1.idx, id2.idx);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    #[should_panic(expected = "stale NodeId")]
    fn destroyed_handle_panics() {
        let mut tree = MaskTree::new();
        let id = tree.create_node();
        tree.destroy_node(id);
        let _ = tree.local_transform(id);
    }

    #[test]
    #[should_panic(expected = "cannot destroy node with children")]
    fn destroy_with_children_panics() {
        let mut tree = MaskTree::new();
        let parent = tree.create_node();
        let child = tree.create_node();
        tree.add_child(parent, child);
        tree.destroy_node(parent);
    }

    #[test]
    fn mask_parent_is_nearest_enabled_soft_ancestor() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let plain = tree.create_node();
        let b = soft(&mut tree);
        tree.add_child(a, plain);
        tree.add_child(plain, b);

        assert_eq!(tree.mask_parent(b), Some(a));
        assert_eq!(tree.mask_parent(a), None);
        assert_eq!(tree.mask_children(a), alloc::vec![b]);
    }

    #[test]
    fn hard_mask_does_not_join_mask_forest() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let hard = tree.create_node();
        tree.set_mask(hard, Some(MaskKind::Hard));
        let b = soft(&mut tree);
        tree.add_child(a, hard);
        tree.add_child(hard, b);

        // b's mask parent skips the hard mask and lands on a.
        assert_eq!(tree.mask_parent(b), Some(a));
    }

    #[test]
    fn sort_boundary_stops_parent_search() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let boundary = tree.create_node();
        tree.set_sort_boundary(boundary, true);
        let b = soft(&mut tree);
        tree.add_child(a, boundary);
        tree.add_child(boundary, b);

        // The boundary defines an independent scope; b does not see a.
        assert_eq!(tree.mask_parent(b), None);
    }

    #[test]
    fn soft_mask_on_boundary_node_is_still_found() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        tree.set_sort_boundary(a, true);
        let b = soft(&mut tree);
        tree.add_child(a, b);

        // The boundary node itself is inside the scope.
        assert_eq!(tree.mask_parent(b), Some(a));
    }

    #[test]
    fn disable_reparents_descendant_masks() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let b = soft(&mut tree);
        let c = soft(&mut tree);
        tree.add_child(a, b);
        tree.add_child(b, c);
        assert_eq!(tree.mask_parent(c), Some(b));

        tree.set_enabled(b, false);
        assert_eq!(tree.mask_parent(c), Some(a));
        assert_eq!(tree.mask_children(a), alloc::vec![c]);

        tree.set_enabled(b, true);
        assert_eq!(tree.mask_parent(c), Some(b));
    }

    #[test]
    fn children_match_parent_pointers_after_reparent() {
        let mut tree = MaskTree::new();
        let p1 = soft(&mut tree);
        let p2 = soft(&mut tree);
        let child = soft(&mut tree);
        tree.add_child(p1, child);
        assert_eq!(tree.mask_children(p1), alloc::vec![child]);

        tree.reparent(child, p2);
        assert_eq!(tree.mask_parent(child), Some(p2));
        assert!(tree.mask_children(p1).is_empty());
        assert_eq!(tree.mask_children(p2), alloc::vec![child]);
    }

    #[test]
    fn destroy_propagates_recompute_to_mask_children() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let b = soft(&mut tree);
        let c = soft(&mut tree);
        tree.add_child(a, b);
        tree.add_child(b, c);

        // Detach c from the element tree first so b can be destroyed; its
        // mask link still points at b until recomputed.
        tree.remove_from_parent(c);
        tree.add_child(a, c);
        assert_eq!(tree.mask_parent(c), Some(a));

        tree.remove_from_parent(b);
        tree.destroy_node(b);
        assert_eq!(tree.mask_parent(c), Some(a));
        assert!(tree.mask_children(a).contains(&c));
    }

    #[test]
    fn dirty_propagates_to_mask_descendants() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let b = soft(&mut tree);
        let c = soft(&mut tree);
        tree.add_child(a, b);
        tree.add_child(b, c);

        tree.clear_buffer_dirty(a);
        tree.clear_buffer_dirty(b);
        tree.clear_buffer_dirty(c);

        tree.mark_buffer_dirty(a);
        assert!(tree.is_buffer_dirty(a));
        assert!(tree.is_buffer_dirty(b));
        assert!(tree.is_buffer_dirty(c));

        // Clearing the ancestor leaves descendants dirty.
        tree.clear_buffer_dirty(a);
        assert!(!tree.is_buffer_dirty(a));
        assert!(tree.is_buffer_dirty(b));
        assert!(tree.is_buffer_dirty(c));
    }

    #[test]
    fn threshold_change_marks_dirty_only_when_different() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        tree.clear_buffer_dirty(a);

        tree.set_threshold(a, tree.threshold(a));
        assert!(!tree.is_buffer_dirty(a));

        tree.set_threshold(a, SoftnessRange::new(0.25, 0.75));
        assert!(tree.is_buffer_dirty(a));
    }

    #[test]
    fn stale_mask_children_are_pruned_during_propagation() {
        let mut tree = MaskTree::new();
        let a = soft(&mut tree);
        let b = soft(&mut tree);
        tree.add_child(a, b);
        assert_eq!(tree.mask_children(a).len(), 1);

        tree.remove_from_parent(b);
        tree.destroy_node(b);

        // Propagation prunes the stale entry rather than touching it.
        tree.clear_buffer_dirty(a);
        tree.mark_buffer_dirty(a);
        assert!(tree.mask_children(a).is_empty());
    }
}
