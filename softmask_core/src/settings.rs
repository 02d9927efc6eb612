// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine-wide configuration.
//!
//! A [`MaskSettings`] value is owned by the compositor and passed in by the
//! host at construction; there is no global state. Changing a setting takes
//! effect on the next frame.

/// What to substitute when no mask-aware variant of a shader exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackBehavior {
    /// Substitute the stock mask-aware UI shader.
    #[default]
    DefaultSoftMaskable,
    /// Keep the base shader; the element renders unmasked.
    None,
}

/// How aggressively transform movement triggers buffer re-renders.
///
/// Each level maps to an epsilon compared against per-element world-transform
/// deltas; smaller epsilon means more re-renders and crisper tracking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransformSensitivity {
    /// Epsilon `1/2^2`.
    Low,
    /// Epsilon `1/2^5`.
    #[default]
    Medium,
    /// Epsilon `1/2^12`.
    High,
}

impl TransformSensitivity {
    /// The movement epsilon for this level.
    #[must_use]
    pub const fn epsilon(self) -> f64 {
        match self {
            Self::Low => 1.0 / (1 << 2) as f64,
            Self::Medium => 1.0 / (1 << 5) as f64,
            Self::High => 1.0 / (1 << 12) as f64,
        }
    }
}

/// Resolution tier of mask buffers relative to the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownSampleTier {
    /// Full screen resolution.
    None,
    /// Half resolution per axis.
    #[default]
    X2,
    /// Quarter resolution per axis.
    X4,
}

impl DownSampleTier {
    /// The per-axis divisor applied to the screen size.
    #[must_use]
    pub const fn divisor(self) -> u32 {
        match self {
            Self::None => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskSettings {
    /// Master switch. When `false`, all buffers and derived materials are
    /// released and elements render as if unmasked.
    pub enabled: bool,
    /// Whether stereo roots render one buffer half per eye.
    pub stereo_enabled: bool,
    /// Shader substitution when no mask-aware variant exists.
    pub fallback: FallbackBehavior,
    /// Movement threshold for re-rendering buffers.
    pub sensitivity: TransformSensitivity,
    /// Mask buffer resolution tier.
    pub down_sample: DownSampleTier,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            stereo_enabled: false,
            fallback: FallbackBehavior::default(),
            sensitivity: TransformSensitivity::default(),
            down_sample: DownSampleTier::default(),
        }
    }
}
