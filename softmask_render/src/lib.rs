// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositing engine for hierarchical soft masks.
//!
//! This crate turns the tree and bookkeeping in [`softmask_core`] into
//! actual mask-buffer renders. It defines:
//!
//! - [`MaskCommand`] / [`CommandList`] — the command IR one buffer render is
//!   recorded as
//! - [`MaskBackend`] — the host contract: executes command lists and answers
//!   platform questions (visibility, cameras, stereo, readback)
//! - [`MaskCompositor`] — cross-frame state and the dirty-driven render
//!   algorithm, driven by [`run_frame`]
//! - [`ShaderRegistry`] / [`MaskMaterial`] — resolution and content-hashed
//!   sharing of mask-aware replacement materials
//! - Mask-aware hit testing via
//!   [`raycast_valid`](MaskCompositor::raycast_valid)
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables compositor instrumentation
//!   through [`softmask_core::trace`].

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

mod command;
mod compositor;
mod hit;
mod host;
mod material;

pub use command::{BlendOp, CommandList, DrawParams, MaskCommand, MeshStore, ShapeMesh};
pub use compositor::{MaskCompositor, run_frame};
pub use host::{Eye, MaskBackend, RenderMode};
pub use material::{
    DEFAULT_SOFT_MASKABLE_SHADER, MaskMaterial, MaterialId, SOFT_MASKABLE_SUFFIX, ShaderRegistry,
    material_hash,
};
