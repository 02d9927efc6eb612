// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame-driving compositor.
//!
//! [`MaskCompositor`] owns every piece of cross-frame state: render-target
//! slots, pooled command lists, the per-frame cache, shared derived
//! materials, and the per-root view hashes used for camera tracking. A frame
//! runs in three phases (see [`run_frame`]):
//!
//! 1. **begin_frame** — flush the per-frame cache, evaluate the tree,
//!    release resources of removed nodes, apply movement-sensitivity and
//!    view-change checks.
//! 2. **rebuild** — host callback that regenerates meshes and mutates
//!    properties for the coming frame.
//! 3. **render_masks** — render every dirty soft mask, parents before
//!    children, one pooled command list per buffer.
//!
//! Buffer renders follow a strict per-node sequence: the per-frame guard
//! ensures at most one render per mask per frame, the dirty flag is cleared
//! before recursing into the parent, off-screen masks get a single clear
//! instead of draws, and masks deeper than the channel budget are skipped
//! entirely.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use kurbo::Rect;
use softmask_core::callback::{CallbackId, CallbackList};
use softmask_core::frame_cache::FrameCache;
use softmask_core::node::{FrameChanges, MaskKind, MaskMethod, MaskTree, NodeId};
use softmask_core::pool::ObjectPool;
use softmask_core::repository::{ObjectRepository, Shared};
use softmask_core::settings::MaskSettings;
use softmask_core::stencil::MAX_SOFT_DEPTH;
use softmask_core::target::{Acquire, RenderTargetRepository, TargetId, TargetSlot};
use softmask_core::trace::{
    BufferClearEvent, BufferRenderEvent, FrameCacheClearEvent, TargetAllocEvent,
    TargetReleaseEvent, Tracer, ViewChangeEvent,
};

use crate::command::{BlendOp, CommandList, DrawParams, MaskCommand, MeshStore};
use crate::host::{Eye, MaskBackend, RenderMode};
use crate::material::{MaskMaterial, MaterialId, ShaderRegistry, material_hash};

fn make_list() -> CommandList {
    CommandList::new()
}

fn list_valid(_: &CommandList) -> bool {
    true
}

fn reset_list(list: &mut CommandList) {
    list.clear();
}

/// Owns all cross-frame compositing state.
pub struct MaskCompositor {
    settings: MaskSettings,
    shaders: ShaderRegistry,
    meshes: MeshStore,
    list_pool: ObjectPool<CommandList>,
    pub(crate) frame_cache: FrameCache<bool>,
    materials: ObjectRepository<MaskMaterial>,
    material_slots: BTreeMap<(u32, u64), Option<Shared<MaskMaterial>>>,
    targets: RenderTargetRepository,
    pub(crate) target_slots: BTreeMap<u32, Option<TargetSlot>>,
    /// Masks whose buffer currently holds drawn content (as opposed to
    /// being cleared or never rendered).
    has_drawn: BTreeSet<u32>,
    /// World transform at the time of each mask's last buffer render.
    last_rendered: BTreeMap<u32, softmask_core::transform::Transform3d>,
    /// Persistent per-root view-projection hash for tracked roots.
    view_hash: BTreeMap<u32, u64>,
    size_listeners: CallbackList<(u32, u32)>,
    screen_resized: bool,
    changes: FrameChanges,
}

impl core::fmt::Debug for MaskCompositor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MaskCompositor")
            .field("settings", &self.settings)
            .field("active_targets", &self.targets.active_count())
            .field("materials", &self.materials.len())
            .finish_non_exhaustive()
    }
}

impl MaskCompositor {
    /// Creates a compositor with the given settings.
    #[must_use]
    pub fn new(settings: MaskSettings) -> Self {
        Self {
            settings,
            shaders: ShaderRegistry::new(),
            meshes: MeshStore::new(),
            list_pool: ObjectPool::new(make_list, list_valid, reset_list),
            frame_cache: FrameCache::new(),
            materials: ObjectRepository::new(),
            material_slots: BTreeMap::new(),
            targets: RenderTargetRepository::new(),
            target_slots: BTreeMap::new(),
            has_drawn: BTreeSet::new(),
            last_rendered: BTreeMap::new(),
            view_hash: BTreeMap::new(),
            size_listeners: CallbackList::new(),
            screen_resized: false,
            changes: FrameChanges::default(),
        }
    }

    /// The current settings.
    #[must_use]
    pub fn settings(&self) -> &MaskSettings {
        &self.settings
    }

    /// Applies new settings, releasing or invalidating state as needed.
    ///
    /// Disabling releases every buffer and derived material; re-enabling
    /// marks all masks dirty so the next frame rebuilds from scratch. A
    /// down-sample change re-renders everything at the new resolution.
    pub fn apply_settings(&mut self, tree: &mut MaskTree, new: MaskSettings) {
        if new == self.settings {
            return;
        }
        let was_enabled = self.settings.enabled;
        let old_tier = self.settings.down_sample;
        self.settings = new;

        if !new.enabled {
            self.release_all();
            return;
        }
        if !was_enabled {
            tree.mark_all_masks_dirty();
            tree.request_stencil_recalc_all();
        }
        if old_tier != new.down_sample {
            tree.mark_all_masks_dirty();
        }
    }

    /// The host's shader registry.
    pub fn shaders_mut(&mut self) -> &mut ShaderRegistry {
        &mut self.shaders
    }

    /// Shape meshes, for the host's generation hooks.
    #[must_use]
    pub fn meshes(&self) -> &MeshStore {
        &self.meshes
    }

    /// Shape meshes, mutable.
    pub fn meshes_mut(&mut self) -> &mut MeshStore {
        &mut self.meshes
    }

    /// Updates the reference screen size. Takes effect at the next
    /// `begin_frame`: all buffers re-render and size listeners fire. The
    /// first size established on a fresh compositor is not a change; nothing
    /// has rendered at the old size and listeners stay quiet.
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        let prior = self.targets.screen_size();
        if self.targets.set_screen_size(width, height) && prior != (0, 0) {
            self.screen_resized = true;
        }
    }

    /// Subscribes to mask-buffer size changes.
    pub fn add_size_listener(&mut self, f: impl FnMut(&(u32, u32)) + 'static) -> CallbackId {
        self.size_listeners.add(f)
    }

    /// Unsubscribes a size listener.
    pub fn remove_size_listener(&mut self, id: CallbackId) -> bool {
        self.size_listeners.remove(id)
    }

    /// The buffer target currently held by a mask node, if any.
    #[must_use]
    pub fn target_of(&self, node: NodeId) -> Option<TargetId> {
        self.target_slots
            .get(&node.index())
            .copied()
            .flatten()
            .map(|s| s.id)
    }

    /// Retired target identities the host should free.
    pub fn drain_released_targets(&mut self) -> Vec<TargetId> {
        self.targets.drain_released()
    }

    /// The changes produced by the most recent `begin_frame`.
    #[must_use]
    pub fn last_changes(&self) -> &FrameChanges {
        &self.changes
    }

    /// Per-frame memoization cache (hit tests, render guards).
    #[must_use]
    pub fn frame_cache(&self) -> &FrameCache<bool> {
        &self.frame_cache
    }

    // -- Frame phases --

    /// Starts a frame: flushes the per-frame cache, evaluates the tree, and
    /// applies movement and view-change invalidation.
    pub fn begin_frame(
        &mut self,
        tree: &mut MaskTree,
        backend: &impl MaskBackend,
        tracer: &mut Tracer<'_>,
    ) {
        let flushed = self.frame_cache.clear();
        if flushed > 0 {
            tracer.frame_cache_clear(&FrameCacheClearEvent { entries: flushed });
        }

        if !self.settings.enabled {
            self.release_all();
            let mut changes = core::mem::take(&mut self.changes);
            tree.evaluate_into(&mut changes);
            self.changes = changes;
            return;
        }

        if self.screen_resized {
            self.screen_resized = false;
            tree.mark_all_masks_dirty();
            tree.request_stencil_recalc_all();
            let size = self.targets.buffer_size(self.settings.down_sample);
            self.size_listeners.invoke(&size);
        }

        let mut changes = core::mem::take(&mut self.changes);
        tree.evaluate_into(&mut changes);
        for &idx in &changes.removed {
            self.forget_node(idx, tracer);
        }

        // Movement sensitivity: a mask whose world transform drifted past
        // the epsilon since its last render must re-render; smaller jitter
        // is absorbed.
        let epsilon = self.settings.sensitivity.epsilon();
        for &idx in &changes.transforms {
            let Some(id) = tree.node_at(idx) else {
                continue;
            };
            if tree.mask(id) != Some(MaskKind::Soft) || !tree.enabled(id) {
                continue;
            }
            if let Some(prev) = self.last_rendered.get(&idx) {
                if !tree.world_transform(id).approx_eq(prev, epsilon) {
                    tree.mark_buffer_dirty(id);
                }
            }
        }
        self.changes = changes;

        self.check_view_changes(tree, backend, tracer);
    }

    /// Renders every dirty soft mask, parents before children.
    pub fn render_masks(
        &mut self,
        tree: &mut MaskTree,
        backend: &mut impl MaskBackend,
        tracer: &mut Tracer<'_>,
    ) {
        if !self.settings.enabled {
            return;
        }
        for id in tree.soft_mask_nodes() {
            self.render_node(tree, backend, id, tracer);
        }
    }

    /// Builds (or retrieves) the mask-aware replacement material for an
    /// element rendering with `base` under its nearest soft mask.
    ///
    /// Returns `None` when the element is not under a soft mask, masking is
    /// disabled, or shader resolution declines a substitute; the element
    /// then renders with its original material.
    pub fn replacement_material(
        &mut self,
        tree: &mut MaskTree,
        backend: &impl MaskBackend,
        node: NodeId,
        base: MaterialId,
        base_shader: &str,
    ) -> Option<Shared<MaskMaterial>> {
        let key = (node.index(), base.0);
        if !self.settings.enabled {
            self.drop_material(key);
            return None;
        }

        let alloc = tree.stencil_allocation(node);
        let Some(soft) = alloc.nearest_soft else {
            self.drop_material(key);
            return None;
        };
        let soft_alloc = tree.stencil_allocation(soft);
        if soft_alloc.depth < 0 || soft_alloc.depth >= MAX_SOFT_DEPTH {
            self.drop_material(key);
            return None;
        }

        // Pin the mask's buffer identity so the material can reference it
        // even before the first render.
        let sidx = soft.index();
        let mut slot = self.target_slots.remove(&sidx).unwrap_or(None);
        let _ = self
            .targets
            .acquire(sidx, self.settings.down_sample, &mut slot);
        let buffer = slot.map(|s| s.id);
        self.target_slots.insert(sidx, slot);

        let root = tree.root_of(node);
        let stereo = self.settings.stereo_enabled && backend.is_stereo(tree, root);
        let hash = material_hash(base, buffer, alloc.stencil_bits, stereo, soft_alloc.depth);

        let mut held = self.material_slots.remove(&key).unwrap_or(None);
        let shaders = &self.shaders;
        let fallback = self.settings.fallback;
        let stencil_bits = alloc.stencil_bits;
        let depth = soft_alloc.depth;
        self.materials.get(hash, &mut held, || {
            shaders.resolve(base_shader, fallback).map(|shader| MaskMaterial {
                base,
                shader,
                buffer,
                stencil_bits,
                depth,
                stereo,
            })
        });
        let out = held.clone();
        self.material_slots.insert(key, held);
        out
    }

    /// Releases the derived material held for `(node, base)`, if any.
    pub fn release_material(&mut self, node: NodeId, base: MaterialId) {
        self.drop_material((node.index(), base.0));
    }

    // -- Internals --

    #[expect(
        clippy::cast_possible_truncation,
        reason = "depth is bounded by MAX_SOFT_DEPTH and the eye list holds at most two entries"
    )]
    fn render_node(
        &mut self,
        tree: &mut MaskTree,
        backend: &mut impl MaskBackend,
        node: NodeId,
        tracer: &mut Tracer<'_>,
    ) {
        let idx = node.index();

        // At most one render attempt per mask per frame.
        if self.frame_cache.contains(u64::from(idx), "rendered", 0) {
            return;
        }
        self.frame_cache.set(u64::from(idx), "rendered", 0, true);

        if !tree.is_buffer_dirty(node) {
            return;
        }
        tree.clear_buffer_dirty(node);

        // Parent content must be current before it can be copied in.
        if let Some(parent) = tree.mask_parent(node) {
            self.render_node(tree, backend, parent, tracer);
        }

        let alloc = tree.stencil_allocation(node);
        if alloc.depth < 0 || alloc.depth >= MAX_SOFT_DEPTH {
            return;
        }

        if !backend.in_screen(tree, node) {
            self.clear_offscreen(tree, backend, node, tracer);
            return;
        }

        let mut slot = self.target_slots.remove(&idx).unwrap_or(None);
        let acquired = self
            .targets
            .acquire(idx, self.settings.down_sample, &mut slot);
        let target = slot;
        self.target_slots.insert(idx, target);
        let Some(target) = target else {
            // Zero-sized screen; nothing to render into.
            return;
        };
        if acquired == Some(Acquire::Allocated) {
            tracer.target_alloc(&TargetAllocEvent {
                owner: idx,
                width: target.width,
                height: target.height,
            });
        }

        let parent_target = tree
            .mask_parent(node)
            .and_then(|p| self.target_slots.get(&p.index()).copied().flatten())
            .map(|s| s.id);

        let root = tree.root_of(node);
        let stereo = self.settings.stereo_enabled && backend.is_stereo(tree, root);
        let eyes: &[Eye] = if stereo {
            &[Eye::Left, Eye::Right]
        } else {
            &[Eye::Mono]
        };

        let mut list = self.list_pool.rent();
        list.push(MaskCommand::SetTarget {
            target: target.id,
            width: target.width,
            height: target.height,
        });
        // Nested masks start from the parent copy instead of a clear.
        if alloc.depth == 0 {
            list.push(MaskCommand::Clear {
                color: tree.clear_color(node),
            });
        }

        let channel = alloc.depth as u8;
        for (i, &eye) in eyes.iter().enumerate() {
            let (view, projection) = backend.view_projection(tree, root, eye);
            list.push(MaskCommand::SetViewProjection { view, projection });
            // The copy covers the whole buffer, both halves at once.
            if i == 0
                && let Some(source) = parent_target
            {
                list.push(MaskCommand::CopyFrom { source });
            }
            if stereo {
                let rect = match eye {
                    Eye::Left => Rect::new(0.0, 0.0, 0.5, 1.0),
                    Eye::Right => Rect::new(0.5, 0.0, 1.0, 1.0),
                    Eye::Mono => unreachable!("mono eye in stereo pass"),
                };
                list.push(MaskCommand::SetViewport { rect });
            }

            if let Some(mesh) = tree.shape_mesh(node) {
                list.push(MaskCommand::Draw {
                    mesh,
                    transform: tree.world_transform(node),
                    params: DrawParams {
                        channel,
                        texture: tree.texture(node),
                        threshold: tree.threshold(node),
                        blend: BlendOp::Add,
                    },
                });
            }
            for shape in tree.aux_shapes(node) {
                list.push(MaskCommand::Draw {
                    mesh: shape.mesh,
                    transform: tree.world_transform(node),
                    params: DrawParams {
                        channel,
                        texture: None,
                        threshold: shape.softness,
                        blend: match shape.method {
                            MaskMethod::Additive => BlendOp::Add,
                            MaskMethod::Subtract => BlendOp::ReverseSubtract,
                        },
                    },
                });
            }
        }

        let draws = list.draw_count();
        backend.execute(&list, &self.meshes);
        let mut returned = Some(list);
        self.list_pool.recycle(&mut returned);

        self.has_drawn.insert(idx);
        self.last_rendered.insert(idx, tree.world_transform(node));
        tracer.buffer_render(&BufferRenderEvent {
            node_index: idx,
            depth: alloc.depth,
            eyes: eyes.len() as u8,
            draws,
        });
    }

    /// Clears an off-screen mask's buffer once; repeated frames off screen
    /// cost nothing.
    fn clear_offscreen(
        &mut self,
        tree: &MaskTree,
        backend: &mut impl MaskBackend,
        node: NodeId,
        tracer: &mut Tracer<'_>,
    ) {
        let idx = node.index();
        if !self.has_drawn.remove(&idx) {
            return;
        }
        let Some(target) = self.target_slots.get(&idx).copied().flatten() else {
            return;
        };
        let mut list = self.list_pool.rent();
        list.push(MaskCommand::SetTarget {
            target: target.id,
            width: target.width,
            height: target.height,
        });
        list.push(MaskCommand::Clear {
            color: tree.clear_color(node),
        });
        backend.execute(&list, &self.meshes);
        let mut returned = Some(list);
        self.list_pool.recycle(&mut returned);
        tracer.buffer_clear(&BufferClearEvent { node_index: idx });
    }

    /// Re-renders a tracked root's masks when its camera moved.
    fn check_view_changes(
        &mut self,
        tree: &mut MaskTree,
        backend: &impl MaskBackend,
        tracer: &mut Tracer<'_>,
    ) {
        let masks = tree.soft_mask_nodes();
        let mut roots: BTreeMap<u32, NodeId> = BTreeMap::new();
        for &m in &masks {
            let root = tree.root_of(m);
            roots.insert(root.index(), root);
        }

        for (ridx, root) in roots {
            if backend.render_mode(tree, root) != RenderMode::Tracked {
                continue;
            }
            let stereo = self.settings.stereo_enabled && backend.is_stereo(tree, root);
            let eyes: &[Eye] = if stereo {
                &[Eye::Left, Eye::Right]
            } else {
                &[Eye::Mono]
            };
            let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
            for &eye in eyes {
                let (view, projection) = backend.view_projection(tree, root, eye);
                hash = hash.rotate_left(5) ^ view.bit_hash();
                hash = hash.rotate_left(5) ^ projection.bit_hash();
            }

            match self.view_hash.insert(ridx, hash) {
                Some(old) if old != hash => {
                    for &m in &masks {
                        if tree.root_of(m) == root {
                            tree.mark_buffer_dirty(m);
                        }
                    }
                    tracer.view_change(&ViewChangeEvent { root_index: ridx });
                }
                _ => {}
            }
        }
    }

    fn drop_material(&mut self, key: (u32, u64)) {
        if let Some(mut slot) = self.material_slots.remove(&key) {
            self.materials.release(&mut slot);
        }
    }

    /// Drops every per-node resource held for a destroyed slot.
    fn forget_node(&mut self, idx: u32, tracer: &mut Tracer<'_>) {
        let mut slot = self.target_slots.remove(&idx).unwrap_or(None);
        if slot.is_some() {
            tracer.target_release(&TargetReleaseEvent { owner: idx });
        }
        self.targets.release(idx, &mut slot);
        self.has_drawn.remove(&idx);
        self.last_rendered.remove(&idx);
        self.view_hash.remove(&idx);

        let keys: Vec<(u32, u64)> = self
            .material_slots
            .range((idx, 0)..=(idx, u64::MAX))
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.drop_material(key);
        }
    }

    /// Releases every buffer and derived material (master switch off).
    fn release_all(&mut self) {
        let owners: Vec<u32> = self.target_slots.keys().copied().collect();
        for owner in owners {
            let mut slot = self.target_slots.remove(&owner).unwrap_or(None);
            self.targets.release(owner, &mut slot);
        }
        let keys: Vec<(u32, u64)> = self.material_slots.keys().copied().collect();
        for key in keys {
            self.drop_material(key);
        }
        self.has_drawn.clear();
        self.last_rendered.clear();
        self.view_hash.clear();
    }
}

/// Drives one full frame: begin, host rebuild, render.
pub fn run_frame<B: MaskBackend>(
    compositor: &mut MaskCompositor,
    tree: &mut MaskTree,
    backend: &mut B,
    tracer: &mut Tracer<'_>,
    rebuild: impl FnOnce(&mut MaskTree, &mut MaskCompositor),
) {
    compositor.begin_frame(tree, backend, tracer);
    rebuild(tree, compositor);
    compositor.render_masks(tree, backend, tracer);
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use kurbo::Point;
    use softmask_core::node::{AuxShape, MaskKind, MaskMethod};
    use softmask_core::range::SoftnessRange;
    use softmask_core::settings::{DownSampleTier, TransformSensitivity};
    use softmask_core::transform::Transform3d;

    use super::*;
    use crate::command::ShapeMesh;

    /// Records executed command lists and answers platform questions from
    /// plain fields.
    struct FakeBackend {
        executed: Vec<CommandList>,
        offscreen: BTreeSet<u32>,
        tracked: bool,
        view: Transform3d,
        stereo: bool,
        alpha: f32,
        geometric_hit: bool,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                executed: Vec::new(),
                offscreen: BTreeSet::new(),
                tracked: false,
                view: Transform3d::IDENTITY,
                stereo: false,
                alpha: 1.0,
                geometric_hit: true,
            }
        }

        /// The executed list that renders into `target`, if any.
        fn list_for(&self, target: TargetId) -> Option<&CommandList> {
            self.executed.iter().find(|list| {
                matches!(
                    list.commands().first(),
                    Some(MaskCommand::SetTarget { target: t, .. }) if *t == target
                )
            })
        }
    }

    impl MaskBackend for FakeBackend {
        fn execute(&mut self, list: &CommandList, _meshes: &MeshStore) {
            self.executed.push(list.clone());
        }

        fn in_screen(&self, _tree: &MaskTree, node: NodeId) -> bool {
            !self.offscreen.contains(&node.index())
        }

        fn render_mode(&self, _tree: &MaskTree, _root: NodeId) -> RenderMode {
            if self.tracked {
                RenderMode::Tracked
            } else {
                RenderMode::Overlay
            }
        }

        fn view_projection(
            &self,
            _tree: &MaskTree,
            _root: NodeId,
            _eye: Eye,
        ) -> (Transform3d, Transform3d) {
            (self.view, Transform3d::IDENTITY)
        }

        fn is_stereo(&self, _tree: &MaskTree, _root: NodeId) -> bool {
            self.stereo
        }

        fn hit_test(&self, _tree: &MaskTree, _node: NodeId, _point: Point) -> bool {
            self.geometric_hit
        }

        fn sample_alpha(&self, _target: TargetId, _channel: u8, _point: Point) -> f32 {
            self.alpha
        }
    }

    fn setup() -> (MaskCompositor, MaskTree, FakeBackend) {
        let mut compositor = MaskCompositor::new(MaskSettings {
            down_sample: DownSampleTier::None,
            ..MaskSettings::default()
        });
        compositor.set_screen_size(640, 480);
        (compositor, MaskTree::new(), FakeBackend::new())
    }

    fn quad() -> ShapeMesh {
        ShapeMesh {
            positions: alloc::vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            uvs: alloc::vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: alloc::vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn soft_mask(compositor: &mut MaskCompositor, tree: &mut MaskTree) -> NodeId {
        let id = tree.create_node();
        tree.set_mask(id, Some(MaskKind::Soft));
        let mesh = compositor.meshes_mut().insert(quad());
        tree.set_shape_mesh(id, Some(mesh));
        id
    }

    fn frame(compositor: &mut MaskCompositor, tree: &mut MaskTree, backend: &mut FakeBackend) {
        run_frame(compositor, tree, backend, &mut Tracer::none(), |_, _| {});
    }

    fn channels_drawn(list: &CommandList) -> Vec<u8> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                MaskCommand::Draw { params, .. } => Some(params.channel),
                _ => None,
            })
            .collect()
    }

    fn copy_sources(list: &CommandList) -> Vec<TargetId> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                MaskCommand::CopyFrom { source } => Some(*source),
                _ => None,
            })
            .collect()
    }

    fn has_clear(list: &CommandList) -> bool {
        list.commands()
            .iter()
            .any(|c| matches!(c, MaskCommand::Clear { .. }))
    }

    #[test]
    fn nested_masks_render_into_successive_channels() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        let b = soft_mask(&mut compositor, &mut tree);
        let c = soft_mask(&mut compositor, &mut tree);
        tree.add_child(a, b);
        tree.add_child(b, c);

        frame(&mut compositor, &mut tree, &mut backend);

        let ta = compositor.target_of(a).unwrap();
        let tb = compositor.target_of(b).unwrap();
        let tc = compositor.target_of(c).unwrap();
        assert_eq!(backend.executed.len(), 3);

        let la = backend.list_for(ta).unwrap();
        assert!(has_clear(la));
        assert!(copy_sources(la).is_empty());
        assert_eq!(channels_drawn(la), alloc::vec![0]);

        let lb = backend.list_for(tb).unwrap();
        assert!(!has_clear(lb));
        assert_eq!(copy_sources(lb), alloc::vec![ta]);
        assert_eq!(channels_drawn(lb), alloc::vec![1]);

        let lc = backend.list_for(tc).unwrap();
        assert_eq!(copy_sources(lc), alloc::vec![tb]);
        assert_eq!(channels_drawn(lc), alloc::vec![2]);
    }

    #[test]
    fn parents_render_before_children() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        let b = soft_mask(&mut compositor, &mut tree);
        tree.add_child(a, b);

        frame(&mut compositor, &mut tree, &mut backend);

        let ta = compositor.target_of(a).unwrap();
        let tb = compositor.target_of(b).unwrap();
        let order: Vec<TargetId> = backend
            .executed
            .iter()
            .filter_map(|l| match l.commands().first() {
                Some(MaskCommand::SetTarget { target, .. }) => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(order, alloc::vec![ta, tb]);
    }

    #[test]
    fn clean_frame_executes_nothing() {
        let (mut compositor, mut tree, mut backend) = setup();
        let _a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);

        backend.executed.clear();
        frame(&mut compositor, &mut tree, &mut backend);
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());
    }

    #[test]
    fn mask_renders_at_most_once_per_frame() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        backend.executed.clear();

        // Dirty going into the frame, then re-dirtied by the rebuild hook:
        // still a single render.
        tree.mark_buffer_dirty(a);
        run_frame(
            &mut compositor,
            &mut tree,
            &mut backend,
            &mut Tracer::none(),
            |tree, _| tree.mark_buffer_dirty(a),
        );
        assert_eq!(backend.executed.len(), 1);

        // The render phase consumed the rebuild hook's mark too.
        backend.executed.clear();
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());
    }

    #[test]
    fn offscreen_mask_cleared_once() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        backend.executed.clear();

        backend.offscreen.insert(a.index());
        tree.mark_buffer_dirty(a);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
        let clear = &backend.executed[0];
        assert_eq!(clear.len(), 2);
        assert!(has_clear(clear));
        assert_eq!(clear.draw_count(), 0);

        // Still off screen, still dirty: the buffer is already clear.
        backend.executed.clear();
        tree.mark_buffer_dirty(a);
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());

        // Back on screen, it renders again.
        backend.offscreen.clear();
        tree.mark_buffer_dirty(a);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
        assert_eq!(backend.executed[0].draw_count(), 1);
    }

    #[test]
    fn movement_below_epsilon_is_absorbed() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        backend.executed.clear();

        // Medium sensitivity: epsilon 1/32.
        assert_eq!(
            compositor.settings().sensitivity,
            TransformSensitivity::Medium
        );
        tree.set_transform(a, Transform3d::from_translation(0.001, 0.0, 0.0));
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());

        tree.set_transform(a, Transform3d::from_translation(5.0, 0.0, 0.0));
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
    }

    #[test]
    fn screen_resize_rerenders_and_retires_targets() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        let sizes = alloc::rc::Rc::new(core::cell::RefCell::new(Vec::new()));
        let sink = alloc::rc::Rc::clone(&sizes);
        compositor.add_size_listener(move |s| sink.borrow_mut().push(*s));

        frame(&mut compositor, &mut tree, &mut backend);
        let old = compositor.target_of(a).unwrap();
        backend.executed.clear();

        compositor.set_screen_size(1280, 720);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
        let fresh = compositor.target_of(a).unwrap();
        assert_ne!(fresh, old);
        assert_eq!(*sizes.borrow(), alloc::vec![(1280, 720)]);
        assert!(compositor.drain_released_targets().contains(&old));
    }

    #[test]
    fn tracked_root_rerenders_on_view_change() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        backend.tracked = true;

        frame(&mut compositor, &mut tree, &mut backend);
        backend.executed.clear();

        // Stable camera: nothing to do.
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());

        backend.view = Transform3d::from_translation(0.0, 3.0, 0.0);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
        assert!(tree.node_at(a.index()).is_some());
    }

    #[test]
    fn overlay_root_ignores_view_changes() {
        let (mut compositor, mut tree, mut backend) = setup();
        let _a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        backend.executed.clear();

        backend.view = Transform3d::from_translation(9.0, 0.0, 0.0);
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());
    }

    #[test]
    fn stereo_renders_both_halves_with_one_copy() {
        let (mut compositor, mut tree, mut backend) = setup();
        let mut settings = *compositor.settings();
        settings.stereo_enabled = true;
        compositor.apply_settings(&mut tree, settings);
        backend.stereo = true;

        let a = soft_mask(&mut compositor, &mut tree);
        let b = soft_mask(&mut compositor, &mut tree);
        tree.add_child(a, b);
        frame(&mut compositor, &mut tree, &mut backend);

        let tb = compositor.target_of(b).unwrap();
        let lb = backend.list_for(tb).unwrap();
        let viewports: Vec<Rect> = lb
            .commands()
            .iter()
            .filter_map(|c| match c {
                MaskCommand::SetViewport { rect } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(
            viewports,
            alloc::vec![Rect::new(0.0, 0.0, 0.5, 1.0), Rect::new(0.5, 0.0, 1.0, 1.0)]
        );
        assert_eq!(copy_sources(lb).len(), 1);
        assert_eq!(lb.draw_count(), 2);
    }

    #[test]
    fn aux_shapes_draw_after_main_shape() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        let cutout = compositor.meshes_mut().insert(quad());
        tree.add_aux_shape(
            a,
            AuxShape {
                mesh: cutout,
                method: MaskMethod::Subtract,
                softness: SoftnessRange::new(0.0, 0.5),
            },
        );

        frame(&mut compositor, &mut tree, &mut backend);
        let list = backend.list_for(compositor.target_of(a).unwrap()).unwrap();
        let blends: Vec<BlendOp> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                MaskCommand::Draw { params, .. } => Some(params.blend),
                _ => None,
            })
            .collect();
        assert_eq!(blends, alloc::vec![BlendOp::Add, BlendOp::ReverseSubtract]);
    }

    #[test]
    fn replacement_materials_are_shared() {
        let (mut compositor, mut tree, mut backend) = setup();
        let m = soft_mask(&mut compositor, &mut tree);
        let d1 = tree.create_node();
        let d2 = tree.create_node();
        tree.add_child(m, d1);
        tree.add_child(m, d2);
        compositor.shaders_mut().register("UI/Default (SoftMaskable)");
        frame(&mut compositor, &mut tree, &mut backend);

        let base = MaterialId(7);
        let m1 = compositor
            .replacement_material(&mut tree, &backend, d1, base, "UI/Default")
            .unwrap();
        let m2 = compositor
            .replacement_material(&mut tree, &backend, d2, base, "UI/Default")
            .unwrap();
        assert_eq!(m1.hash(), m2.hash());
        assert_eq!(m1.value().shader, "UI/Default (SoftMaskable)");
        assert_eq!(m1.value().depth, 0);
        assert_eq!(m1.value().buffer, compositor.target_of(m));

        compositor.release_material(d1, base);
        compositor.release_material(d2, base);
    }

    #[test]
    fn unmasked_element_gets_no_replacement() {
        let (mut compositor, mut tree, mut backend) = setup();
        let _m = soft_mask(&mut compositor, &mut tree);
        let lone = tree.create_node();
        frame(&mut compositor, &mut tree, &mut backend);

        let out =
            compositor.replacement_material(&mut tree, &backend, lone, MaterialId(1), "UI/Default");
        assert!(out.is_none());
    }

    #[test]
    fn raycast_respects_buffer_alpha() {
        let (mut compositor, mut tree, mut backend) = setup();
        let m = soft_mask(&mut compositor, &mut tree);
        let d = tree.create_node();
        tree.add_child(m, d);
        tree.set_alpha_hit_test(m, true);
        frame(&mut compositor, &mut tree, &mut backend);

        backend.alpha = 0.0;
        assert!(!compositor.raycast_valid(&mut tree, &backend, d, Point::new(10.0, 10.0)));

        // New frame flushes the memoized answer.
        backend.alpha = 0.75;
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(compositor.raycast_valid(&mut tree, &backend, d, Point::new(10.0, 10.0)));
    }

    #[test]
    fn raycast_chain_requires_every_mask() {
        let (mut compositor, mut tree, mut backend) = setup();
        let outer = soft_mask(&mut compositor, &mut tree);
        let inner = soft_mask(&mut compositor, &mut tree);
        let d = tree.create_node();
        tree.add_child(outer, inner);
        tree.add_child(inner, d);
        frame(&mut compositor, &mut tree, &mut backend);

        backend.geometric_hit = true;
        assert!(compositor.raycast_valid(&mut tree, &backend, d, Point::new(1.0, 1.0)));

        backend.geometric_hit = false;
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(!compositor.raycast_valid(&mut tree, &backend, d, Point::new(1.0, 1.0)));
    }

    #[test]
    fn disabling_releases_everything() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        let old = compositor.target_of(a).unwrap();

        let mut settings = *compositor.settings();
        settings.enabled = false;
        compositor.apply_settings(&mut tree, settings);
        assert!(compositor.target_of(a).is_none());
        assert!(compositor.drain_released_targets().contains(&old));

        backend.executed.clear();
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(backend.executed.is_empty());

        // Re-enabling rebuilds from scratch.
        settings.enabled = true;
        compositor.apply_settings(&mut tree, settings);
        frame(&mut compositor, &mut tree, &mut backend);
        assert_eq!(backend.executed.len(), 1);
    }

    #[test]
    fn destroyed_mask_resources_are_dropped() {
        let (mut compositor, mut tree, mut backend) = setup();
        let a = soft_mask(&mut compositor, &mut tree);
        frame(&mut compositor, &mut tree, &mut backend);
        let old = compositor.target_of(a).unwrap();

        tree.destroy_node(a);
        frame(&mut compositor, &mut tree, &mut backend);
        assert!(compositor.drain_released_targets().contains(&old));
    }

    #[test]
    fn too_deep_masks_are_skipped() {
        let (mut compositor, mut tree, mut backend) = setup();
        let mut parent = soft_mask(&mut compositor, &mut tree);
        let mut all = alloc::vec![parent];
        for _ in 0..4 {
            let next = soft_mask(&mut compositor, &mut tree);
            tree.add_child(parent, next);
            all.push(next);
            parent = next;
        }

        frame(&mut compositor, &mut tree, &mut backend);
        // Depths 0..=3 render; the fifth level exceeds the channel budget.
        assert_eq!(backend.executed.len(), 4);
        assert!(compositor.target_of(all[4]).is_none());
    }
}
