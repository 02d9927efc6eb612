// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clamped `[0, 1]` min/max range for soft-mask thresholds.

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// An ordered `(min, max)` pair clamped to the unit interval.
///
/// Used as the alpha threshold of a soft mask: alpha below `min` is fully
/// masked out, alpha above `max` fully passes, and values in between form
/// the gradient edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoftnessRange {
    min: f32,
    max: f32,
}

impl Default for SoftnessRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl SoftnessRange {
    /// Creates a range, clamping both ends to `[0, 1]` and ordering them.
    #[must_use]
    pub fn new(min: f32, max: f32) -> Self {
        let lo = min.min(max).clamp(0.0, 1.0);
        let hi = min.max(max).clamp(0.0, 1.0);
        Self { min: lo, max: hi }
    }

    /// The lower threshold.
    #[inline]
    #[must_use]
    pub const fn min(self) -> f32 {
        self.min
    }

    /// The upper threshold.
    #[inline]
    #[must_use]
    pub const fn max(self) -> f32 {
        self.max
    }

    /// Returns whether both ends match `other` to within `f32` epsilon.
    #[must_use]
    pub fn approx_eq(self, other: Self) -> bool {
        (self.min - other.min).abs() <= f32::EPSILON * 8.0
            && (self.max - other.max).abs() <= f32::EPSILON * 8.0
    }
}
