// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derived mask-aware materials and shader resolution.
//!
//! Elements under a soft mask cannot render with their original material:
//! they need a variant of its shader that samples the mask buffer. This
//! module resolves that variant by probing an explicit candidate table
//! against the host's registered shader set, and describes the derived
//! material the host should build. Identical derivations are shared through
//! [`ObjectRepository`](softmask_core::repository::ObjectRepository), keyed
//! by [`material_hash`].

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use softmask_core::repository::ContentHash;
use softmask_core::settings::FallbackBehavior;
use softmask_core::target::TargetId;

/// An opaque reference to a host-managed base material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u64);

/// Suffix that marks a shader as mask-aware.
pub const SOFT_MASKABLE_SUFFIX: &str = " (SoftMaskable)";

/// The stock mask-aware UI shader substituted when no variant of the base
/// shader exists and the fallback behavior allows it.
pub const DEFAULT_SOFT_MASKABLE_SHADER: &str = "Hidden/UI/Default (SoftMaskable)";

/// A derived material description the host builds GPU state from.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskMaterial {
    /// The base material this derives from.
    pub base: MaterialId,
    /// Resolved mask-aware shader name.
    pub shader: String,
    /// The mask buffer the shader samples.
    pub buffer: Option<TargetId>,
    /// Stencil reference bits from the hard-mask ancestry.
    pub stencil_bits: u32,
    /// Mask depth; selects the buffer channel to sample.
    pub depth: i32,
    /// Whether the buffer holds per-eye halves.
    pub stereo: bool,
}

/// Hashes the inputs that make two derived materials interchangeable.
#[must_use]
pub fn material_hash(
    base: MaterialId,
    buffer: Option<TargetId>,
    stencil_bits: u32,
    stereo: bool,
    depth: i32,
) -> ContentHash {
    ContentHash::of(&[
        base.0,
        buffer.map_or(0, |t| t.0),
        u64::from(stencil_bits) | (u64::from(stereo) << 8),
        depth as u64,
    ])
}

/// The set of mask-aware shaders the host ships, probed in a fixed order.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    known: BTreeSet<String>,
}

impl ShaderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shader the host can instantiate.
    pub fn register(&mut self, name: impl Into<String>) {
        self.known.insert(name.into());
    }

    /// Returns whether a shader is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// The ordered candidate names probed for a base shader:
    ///
    /// 1. The base name itself, only when it already carries the
    ///    mask-aware suffix.
    /// 2. `Hidden/{base} (SoftMaskable)`
    /// 3. `{base} (SoftMaskable)`
    #[must_use]
    pub fn candidates(base: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(3);
        if base.ends_with(SOFT_MASKABLE_SUFFIX) {
            out.push(String::from(base));
        }
        out.push(format!("Hidden/{base}{SOFT_MASKABLE_SUFFIX}"));
        out.push(format!("{base}{SOFT_MASKABLE_SUFFIX}"));
        out
    }

    /// Resolves the mask-aware shader for a base shader name.
    ///
    /// Probes the candidate table in order; when nothing is registered, the
    /// fallback behavior decides between the stock shader and `None`
    /// (render unmasked).
    #[must_use]
    pub fn resolve(&self, base: &str, fallback: FallbackBehavior) -> Option<String> {
        for candidate in Self::candidates(base) {
            if self.known.contains(&candidate) {
                return Some(candidate);
            }
        }
        match fallback {
            FallbackBehavior::DefaultSoftMaskable => {
                Some(String::from(DEFAULT_SOFT_MASKABLE_SHADER))
            }
            FallbackBehavior::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_follow_probe_order() {
        let c = ShaderRegistry::candidates("UI/Rounded");
        assert_eq!(
            c,
            alloc::vec![
                String::from("Hidden/UI/Rounded (SoftMaskable)"),
                String::from("UI/Rounded (SoftMaskable)"),
            ]
        );
    }

    #[test]
    fn already_maskable_base_probes_itself_first() {
        let c = ShaderRegistry::candidates("UI/Rounded (SoftMaskable)");
        assert_eq!(c[0], "UI/Rounded (SoftMaskable)");
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn resolve_prefers_hidden_variant() {
        let mut reg = ShaderRegistry::new();
        reg.register("Hidden/UI/Rounded (SoftMaskable)");
        reg.register("UI/Rounded (SoftMaskable)");
        assert_eq!(
            reg.resolve("UI/Rounded", FallbackBehavior::DefaultSoftMaskable),
            Some(String::from("Hidden/UI/Rounded (SoftMaskable)"))
        );
    }

    #[test]
    fn resolve_falls_back_per_behavior() {
        let reg = ShaderRegistry::new();
        assert_eq!(
            reg.resolve("UI/Unknown", FallbackBehavior::DefaultSoftMaskable),
            Some(String::from(DEFAULT_SOFT_MASKABLE_SHADER))
        );
        assert_eq!(reg.resolve("UI/Unknown", FallbackBehavior::None), None);
    }

    #[test]
    fn hash_separates_every_input() {
        let base = material_hash(MaterialId(1), Some(TargetId(2)), 0b01, false, 0);
        assert_ne!(
            base,
            material_hash(MaterialId(2), Some(TargetId(2)), 0b01, false, 0)
        );
        assert_ne!(
            base,
            material_hash(MaterialId(1), Some(TargetId(3)), 0b01, false, 0)
        );
        assert_ne!(
            base,
            material_hash(MaterialId(1), Some(TargetId(2)), 0b10, false, 0)
        );
        assert_ne!(
            base,
            material_hash(MaterialId(1), Some(TargetId(2)), 0b01, true, 0)
        );
        assert_ne!(
            base,
            material_hash(MaterialId(1), Some(TargetId(2)), 0b01, false, 1)
        );
    }
}
