// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command IR for mask-buffer rendering.
//!
//! The compositor records buffer renders as ordered [`MaskCommand`] lists and
//! hands them to the host backend for execution. The IR is deliberately
//! small: one render target bound at a time, explicit view state, and
//! additive or reverse-subtractive single-channel draws.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;
use softmask_core::node::{MeshId, TextureId};
use softmask_core::range::SoftnessRange;
use softmask_core::target::TargetId;
use softmask_core::transform::Transform3d;

/// Blend operation for a mask draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// `dst + src` — union shapes into the mask.
    #[default]
    Add,
    /// `dst - src` — cut shapes out of the mask.
    ReverseSubtract,
}

/// Per-draw parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawParams {
    /// Which buffer channel the draw writes (0 = R .. 3 = A); all other
    /// channels are write-masked off.
    pub channel: u8,
    /// Texture sampled while drawing, if the shape has one.
    pub texture: Option<TextureId>,
    /// Alpha threshold range applied in the mask shader.
    pub threshold: SoftnessRange,
    /// How the draw combines with existing buffer content.
    pub blend: BlendOp,
}

/// A single step in a buffer render.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskCommand {
    /// Binds the render target for subsequent commands, creating it at the
    /// given size if the host has not seen the id before.
    SetTarget {
        /// The buffer's identity.
        target: TargetId,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Clears the bound target to a constant color.
    Clear {
        /// RGBA clear color.
        color: [f32; 4],
    },
    /// Copies another buffer's full contents into the bound target.
    CopyFrom {
        /// The source buffer.
        source: TargetId,
    },
    /// Sets the view and projection matrices for subsequent draws.
    SetViewProjection {
        /// World-to-view transform.
        view: Transform3d,
        /// View-to-clip transform.
        projection: Transform3d,
    },
    /// Restricts subsequent draws to a normalized sub-rectangle of the
    /// target (used for per-eye halves in stereo).
    SetViewport {
        /// Viewport in normalized `[0, 1]` target coordinates.
        rect: Rect,
    },
    /// Draws a mesh into one channel of the bound target.
    Draw {
        /// The mesh to draw.
        mesh: MeshId,
        /// Model (world) transform of the mesh.
        transform: Transform3d,
        /// Channel, texture, threshold, and blend state.
        params: DrawParams,
    },
}

/// An ordered, reusable list of [`MaskCommand`]s for one buffer render.
///
/// Lists are pooled by the compositor; [`clear`](Self::clear) resets one for
/// reuse without dropping its allocation.
#[derive(Clone, Debug, Default)]
pub struct CommandList {
    commands: Vec<MaskCommand>,
}

impl CommandList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(&mut self, cmd: MaskCommand) {
        self.commands.push(cmd);
    }

    /// The recorded commands, in execution order.
    #[must_use]
    pub fn commands(&self) -> &[MaskCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns whether no commands are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Resets the list for reuse, keeping its allocation.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of `Draw` commands recorded.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "command lists hold at most a few draws per eye"
    )]
    pub fn draw_count(&self) -> u32 {
        self.commands
            .iter()
            .filter(|c| matches!(c, MaskCommand::Draw { .. }))
            .count() as u32
    }
}

/// CPU-side geometry for one mask shape.
///
/// Filled by the host's mesh-generation hook whenever the source element's
/// geometry changes; positions are in the element's local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeMesh {
    /// Vertex positions, local space.
    pub positions: Vec<[f32; 2]>,
    /// Texture coordinates, one per vertex.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle indices.
    pub indices: Vec<u16>,
}

impl ShapeMesh {
    /// Empties the mesh, keeping allocations.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.uvs.clear();
        self.indices.clear();
    }

    /// Returns whether the mesh has no geometry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Owns all shape meshes, addressed by [`MeshId`].
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: BTreeMap<u32, ShapeMesh>,
    next_id: u32,
}

impl MeshStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a mesh and returns its id.
    pub fn insert(&mut self, mesh: ShapeMesh) -> MeshId {
        self.next_id += 1;
        let id = MeshId(self.next_id);
        self.meshes.insert(id.0, mesh);
        id
    }

    /// Looks up a mesh.
    #[must_use]
    pub fn get(&self, id: MeshId) -> Option<&ShapeMesh> {
        self.meshes.get(&id.0)
    }

    /// Looks up a mesh for in-place regeneration.
    #[must_use]
    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut ShapeMesh> {
        self.meshes.get_mut(&id.0)
    }

    /// Removes a mesh, returning it if present.
    pub fn remove(&mut self, id: MeshId) -> Option<ShapeMesh> {
        self.meshes.remove(&id.0)
    }

    /// Number of stored meshes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
