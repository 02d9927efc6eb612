// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mask node tree data model.
//!
//! A *node* is a mask-capable element in a retained UI tree. Each node has:
//!
//! - An identity ([`NodeId`]) — a generational handle that becomes stale when
//!   the node is destroyed, preventing use-after-free bugs at the API level.
//! - Topology — parent, first-child, and sibling links forming an ordered tree
//!   (mirroring the host UI hierarchy).
//! - **Local properties** set by the caller: [`transform`](MaskTree::set_transform),
//!   [`mask`](MaskTree::set_mask), [`threshold`](MaskTree::set_threshold),
//!   [`clear_color`](MaskTree::set_clear_color),
//!   [`shape_mesh`](MaskTree::set_shape_mesh), and
//!   [`aux shapes`](MaskTree::add_aux_shape).
//! - **Computed properties**: `world_transform` produced by
//!   [`evaluate`](MaskTree::evaluate), and the derived mask-forest links
//!   (`mask_parent`/`mask_children`) maintained incrementally on every
//!   structural or role change.
//!
//! Nodes are stored in struct-of-arrays layout with index-based handles
//! for cache-friendly traversal.
//!
//! # Dirty tracking
//!
//! Property mutations automatically mark the corresponding dirty state:
//!
//! - **TRANSFORM** channel — propagates to all descendants, since world
//!   transforms are inherited.
//! - **TOPOLOGY** channel — structural changes (add/remove child,
//!   create/destroy node).
//! - **Buffer dirtiness** — a per-node flag propagated downward through the
//!   mask forest by [`mark_buffer_dirty`](MaskTree::mark_buffer_dirty); a
//!   mask that re-renders forces every mask nested inside it to re-render.
//! - **Stencil dirtiness** — a per-node flag invalidating the cached
//!   [`StencilAllocation`](crate::stencil::StencilAllocation).

mod evaluate;
mod id;
mod store;
mod traverse;

pub use evaluate::FrameChanges;
pub use id::{INVALID, MeshId, NodeId, TextureId};
pub use store::{AuxShape, MaskKind, MaskMethod, MaskTree};
pub use traverse::{Ancestors, Children};
