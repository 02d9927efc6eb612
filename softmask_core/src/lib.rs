// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core data model for hierarchical soft-mask compositing.
//!
//! `softmask_core` provides the retained tree of mask-capable elements and
//! the bookkeeping a compositor needs to keep mask buffers, stencil bits,
//! and derived resources consistent across frames. It is `no_std` compatible
//! (with `alloc`) and uses array-based struct-of-arrays storage with index
//! handles for cache-friendly traversal.
//!
//! # Architecture
//!
//! The crate is organized around an incremental frame loop:
//!
//! ```text
//!   Host mutations (transforms, topology, mask roles)
//!       │
//!       ▼
//!   MaskTree ──► evaluate() ──► FrameChanges
//!       │                           │
//!       │  mask forest + dirty      ▼
//!       │  flags                compositor (softmask_render)
//!       ▼                           │
//!   StencilAllocation ◄─────────────┘
//! ```
//!
//! **[`node`]** — Struct-of-arrays element tree with generational handles,
//! plus the derived *mask forest*: each soft mask links to the nearest
//! enabled soft-mask ancestor, and buffer dirtiness propagates downward
//! through those links with lazy pruning of stale entries.
//!
//! **[`dirty`]** — Multi-channel dirty tracking via `understory_dirty` for
//! the properties that follow the element hierarchy (TRANSFORM, TOPOLOGY).
//!
//! **[`stencil`]** — Per-node depth, stencil-bit, and nearest-soft-mask
//! allocation, cached and recomputed only after structural changes.
//!
//! **[`pool`]**, **[`frame_cache`]**, **[`repository`]**, **[`target`]** —
//! Resource management: frame-scoped object pooling, per-frame memoization,
//! content-hashed sharing of derived objects, and render-target identity
//! with epoch-based invalidation.
//!
//! **[`settings`]** — Engine-wide configuration ([`MaskSettings`]) passed in
//! by the host rather than read from globals.
//!
//! **[`callback`]** — Explicit subscriber lists for buffer-size broadcasts.
//!
//! **[`transform`]** — 3D affine transform type with the approximate
//! comparison used for movement-sensitivity checks.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! compositor instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod callback;
pub mod dirty;
pub mod frame_cache;
pub mod node;
pub mod pool;
pub mod range;
pub mod repository;
pub mod settings;
pub mod stencil;
pub mod target;
pub mod trace;
pub mod transform;

pub use settings::MaskSettings;
