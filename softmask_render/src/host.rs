// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host contract for platform integrations.
//!
//! The compositor is platform-neutral: it decides *what* to render into each
//! mask buffer and records it as command lists, while a [`MaskBackend`]
//! supplied by the host executes those lists and answers the questions only
//! the platform can (visibility, camera matrices, stereo, pixel readback).
//!
//! # Crate boundaries
//!
//! `softmask_core` owns the tree, dirty tracking, and resource bookkeeping.
//! This crate owns the compositing algorithm and this contract. Host code
//! implements `MaskBackend`, drives
//! [`run_frame`](crate::compositor::run_frame), and translates
//! [`CommandList`]s into GPU work.

use kurbo::Point;
use softmask_core::node::{MaskTree, NodeId};
use softmask_core::target::TargetId;
use softmask_core::transform::Transform3d;

use crate::command::{CommandList, MeshStore};

/// Which eye a set of view matrices targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Non-stereo rendering; the whole buffer.
    Mono,
    /// Left half of the buffer.
    Left,
    /// Right half of the buffer.
    Right,
}

/// How a root presents its content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Screen-space overlay; the view never moves, so buffers only
    /// re-render when content changes.
    #[default]
    Overlay,
    /// Rendered through a tracked camera; the compositor watches the view
    /// matrices and re-renders the root's masks when they move.
    Tracked,
}

/// Platform services the compositor depends on.
///
/// Every method except [`execute`](Self::execute) has a default suitable for
/// a screen-space overlay host, so minimal integrations and test doubles
/// implement one method.
pub trait MaskBackend {
    /// Executes a recorded command list against real GPU resources.
    fn execute(&mut self, list: &CommandList, meshes: &MeshStore);

    /// Whether any part of the node is inside the visible screen area.
    ///
    /// Off-screen masks get their buffers cleared instead of rendered.
    fn in_screen(&self, tree: &MaskTree, node: NodeId) -> bool {
        _ = (tree, node);
        true
    }

    /// How the given root presents its content.
    fn render_mode(&self, tree: &MaskTree, root: NodeId) -> RenderMode {
        _ = (tree, root);
        RenderMode::Overlay
    }

    /// The world-to-view and view-to-clip transforms for the given root
    /// and eye.
    fn view_projection(
        &self,
        tree: &MaskTree,
        root: NodeId,
        eye: Eye,
    ) -> (Transform3d, Transform3d) {
        _ = (tree, root, eye);
        (Transform3d::IDENTITY, Transform3d::IDENTITY)
    }

    /// Whether the given root renders in stereo (one buffer half per eye).
    fn is_stereo(&self, tree: &MaskTree, root: NodeId) -> bool {
        _ = (tree, root);
        false
    }

    /// Geometric hit test of a screen point against a node's shape.
    fn hit_test(&self, tree: &MaskTree, node: NodeId, point: Point) -> bool {
        _ = (tree, node, point);
        true
    }

    /// Reads back one channel of a mask buffer at a screen point, for
    /// alpha-accurate hit testing. Hosts that cannot read back return full
    /// coverage.
    fn sample_alpha(&self, target: TargetId, channel: u8, point: Point) -> f32 {
        _ = (target, channel, point);
        1.0
    }
}
