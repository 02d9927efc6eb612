// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! The element tree uses multi-channel dirty tracking (via
//! [`understory_dirty`]) for the properties whose recomputation follows the
//! *element* hierarchy:
//!
//! - **Propagating** — [`TRANSFORM`] uses
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) with child→parent
//!   dependency edges. A local transform change marks all descendants,
//!   because world transforms are inherited.
//!
//! - **Structural** — [`TOPOLOGY`] is marked on attach/detach/reparent and
//!   create/destroy. It surfaces as `topology_changed` in
//!   [`FrameChanges`](crate::node::FrameChanges).
//!
//! Buffer dirtiness and stencil recalculation requests deliberately do *not*
//! use channels: they follow the derived mask forest (nearest-enabled-mask
//! links), not the element hierarchy, and are stored as per-node flags on
//! [`MaskTree`](crate::node::MaskTree) with explicit downward propagation.

use understory_dirty::Channel;

/// Local transform changed — requires world transform recomputation for the
/// node and its element descendants.
pub const TRANSFORM: Channel = Channel::new(0);

/// Element topology changed — attach, detach, reparent, create, destroy.
pub const TOPOLOGY: Channel = Channel::new(1);
