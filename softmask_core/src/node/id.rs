// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types for tree nodes and the host resources they draw with.

use core::fmt;

/// Sentinel index meaning "no node" in the arena's link columns.
pub const INVALID: u32 = u32::MAX;

/// A generational handle to a node in a [`MaskTree`](super::MaskTree).
///
/// The tree panics on a handle whose generation no longer matches its slot,
/// so a `NodeId` held across `destroy_node` fails loudly instead of silently
/// reading whatever node recycled the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Slot index into the tree's columns.
    pub(crate) idx: u32,
    /// Generation counter — must match the tree's generation for this slot.
    pub(crate) generation: u32,
}

impl NodeId {
    /// Returns the raw slot index.
    ///
    /// Stable for the node's lifetime; the render layer keys its per-node
    /// buffer and material bookkeeping by this value.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}

/// An opaque reference to a generated shape mesh.
///
/// Meshes are filled by the host's vertex-generation hooks and stored by the
/// render layer. A node with `Some(MeshId)` as its shape draws that mesh into
/// its mask buffer; `None` means the node has no drawable shape this frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u32);

impl fmt::Debug for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshId({})", self.0)
    }
}

/// An opaque reference to a host-managed texture sampled while drawing a
/// mask shape (the shape's main texture).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u64);

impl fmt::Debug for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureId({})", self.0)
    }
}
