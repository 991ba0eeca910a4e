//! Effect system - stage trait, settings and the per-stem chain
//!
//! Every stem runs the same fixed cascade:
//!
//! ```text
//! source → EQ → compressor → reverb → stem gain
//! ```
//!
//! The [`Effect`] trait is the live-node side (block processing, bypass,
//! reset). [`EffectsChain`] is the state side: it owns each stem's
//! [`StemEffects`] and pushes derived parameters into a [`MixGraph`].
//!
//! [`MixGraph`]: crate::graph::MixGraph

mod chain;
pub mod native;
pub mod settings;

pub use chain::EffectsChain;
pub use settings::{
    compressor_preset, eq_preset, reverb_preset, CompressorSettings, CompressorUpdate,
    EffectStage, EqSettings, EqUpdate, ReverbSettings, ReverbUpdate, StemEffects,
};

use crate::types::StereoBuffer;

/// Information about an effect node
#[derive(Debug, Clone)]
pub struct EffectInfo {
    /// Effect name for display
    pub name: String,
    /// Effect category (e.g., "EQ", "Dynamics", "Reverb")
    pub category: String,
    /// Processing latency in samples
    pub latency_samples: u32,
}

impl EffectInfo {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            latency_samples: 0,
        }
    }
}

/// The core effect trait - implemented by every processing node
///
/// Nodes process stereo blocks in place at the sample rate they were built
/// with. A bypassed node must leave the block untouched.
pub trait Effect: Send {
    /// Process a stereo buffer in-place
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Get the latency of this effect in samples
    fn latency_samples(&self) -> u32;

    /// Get information about this effect
    fn info(&self) -> &EffectInfo;

    /// Set the bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Check if the effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Reset the effect state (filter memories, envelopes, delay lines)
    fn reset(&mut self);
}

/// Base implementation helper for effects
///
/// Holds the info and bypass state shared by every node.
#[derive(Debug, Clone)]
pub struct EffectBase {
    info: EffectInfo,
    bypassed: bool,
}

impl EffectBase {
    pub fn new(info: EffectInfo) -> Self {
        Self {
            info,
            bypassed: false,
        }
    }

    pub fn info(&self) -> &EffectInfo {
        &self.info
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_base_bypass() {
        let mut base = EffectBase::new(EffectInfo::new("Test", "Utility"));
        assert!(!base.is_bypassed());
        base.set_bypass(true);
        assert!(base.is_bypassed());
        assert_eq!(base.info().category, "Utility");
        assert_eq!(base.info().latency_samples, 0);
    }
}
