// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the compositing loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! compositor instrumentation calls at each stage. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a mask buffer is (re)rendered.
#[derive(Clone, Copy, Debug)]
pub struct BufferRenderEvent {
    /// Slot index of the mask node.
    pub node_index: u32,
    /// The node's mask depth (buffer channel).
    pub depth: i32,
    /// How many eyes were rendered (1 mono, 2 stereo).
    pub eyes: u8,
    /// Number of draw commands recorded.
    pub draws: u32,
}

/// Emitted when an off-screen mask's buffer is cleared instead of rendered.
#[derive(Clone, Copy, Debug)]
pub struct BufferClearEvent {
    /// Slot index of the mask node.
    pub node_index: u32,
}

/// Emitted when a render target is allocated or re-allocated.
#[derive(Clone, Copy, Debug)]
pub struct TargetAllocEvent {
    /// Slot index of the owning mask node.
    pub owner: u32,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
}

/// Emitted when a render target is released back to the host.
#[derive(Clone, Copy, Debug)]
pub struct TargetReleaseEvent {
    /// Slot index of the owning mask node.
    pub owner: u32,
}

/// Emitted when the per-frame cache is flushed at a frame boundary.
#[derive(Clone, Copy, Debug)]
pub struct FrameCacheClearEvent {
    /// How many entries were discarded.
    pub entries: u32,
}

/// Emitted when a tracked root's view-projection hash changed, forcing its
/// masks to re-render.
#[derive(Clone, Copy, Debug)]
pub struct ViewChangeEvent {
    /// Slot index of the root node.
    pub root_index: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the compositing loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a mask buffer has been rendered.
    fn on_buffer_render(&mut self, e: &BufferRenderEvent) {
        _ = e;
    }

    /// Called when an off-screen mask's buffer is cleared without rendering.
    fn on_buffer_clear(&mut self, e: &BufferClearEvent) {
        _ = e;
    }

    /// Called when a render target is allocated.
    fn on_target_alloc(&mut self, e: &TargetAllocEvent) {
        _ = e;
    }

    /// Called when a render target is released.
    fn on_target_release(&mut self, e: &TargetReleaseEvent) {
        _ = e;
    }

    /// Called when the per-frame cache is flushed.
    fn on_frame_cache_clear(&mut self, e: &FrameCacheClearEvent) {
        _ = e;
    }

    /// Called when a tracked root's view changed.
    fn on_view_change(&mut self, e: &ViewChangeEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`BufferRenderEvent`].
    #[inline]
    pub fn buffer_render(&mut self, e: &BufferRenderEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_buffer_render(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BufferClearEvent`].
    #[inline]
    pub fn buffer_clear(&mut self, e: &BufferClearEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_buffer_clear(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TargetAllocEvent`].
    #[inline]
    pub fn target_alloc(&mut self, e: &TargetAllocEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_target_alloc(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TargetReleaseEvent`].
    #[inline]
    pub fn target_release(&mut self, e: &TargetReleaseEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_target_release(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameCacheClearEvent`].
    #[inline]
    pub fn frame_cache_clear(&mut self, e: &FrameCacheClearEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_cache_clear(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`ViewChangeEvent`].
    #[inline]
    pub fn view_change(&mut self, e: &ViewChangeEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_view_change(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}
