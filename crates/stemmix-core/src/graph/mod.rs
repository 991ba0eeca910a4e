//! Live mix graph
//!
//! Controllers own plain data and push derived parameters through the
//! [`MixGraph`] interface. [`AudioGraphManager`] is the real implementation;
//! tests inject a recording fake implementing the same trait.
//!
//! ```text
//! source → EQ → compressor → reverb → stem gain → stem tap ─┐
//! source → EQ → compressor → reverb → stem gain → stem tap ─┼→ master gain → splitter → L/R taps → destination
//! ...                                                       ┘
//! ```

mod analyser;
mod manager;

pub use analyser::{AnalyserTap, TapChannel};
pub use manager::{AudioGraphManager, ConnectOutcome, MASTER_BUS_NODES, STEM_GRAPH_NODES};

use crate::effect::{CompressorSettings, EqSettings, ReverbSettings};
use crate::types::StemId;

/// Push interface between mix state and the live graph
///
/// Every call is applied immediately; the last write wins. Calls for stems
/// without a live graph are ignored.
pub trait MixGraph {
    /// Set the effective (post mute/solo) gain of a stem
    fn set_stem_gain(&mut self, stem: &StemId, gain: f32);

    fn set_master_gain(&mut self, gain: f32);

    fn set_eq(&mut self, stem: &StemId, settings: &EqSettings);

    fn set_compressor(&mut self, stem: &StemId, settings: &CompressorSettings);

    fn set_reverb(&mut self, stem: &StemId, settings: &ReverbSettings);

    /// Bypass every stage of every stem (stages stay wired)
    fn set_effects_enabled(&mut self, enabled: bool);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A pushed parameter, as seen by the graph
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Push {
        StemGain(StemId, f32),
        MasterGain(f32),
        Eq(StemId, EqSettings),
        Compressor(StemId, CompressorSettings),
        Reverb(StemId, ReverbSettings),
        EffectsEnabled(bool),
    }

    /// Fake graph that records every push
    #[derive(Debug, Default)]
    pub(crate) struct RecordingGraph {
        pub pushes: Vec<Push>,
    }

    impl RecordingGraph {
        pub fn new() -> Self {
            Self::default()
        }

        /// Latest gain pushed for a stem
        pub fn stem_gain(&self, stem: &str) -> Option<f32> {
            self.pushes.iter().rev().find_map(|p| match p {
                Push::StemGain(id, gain) if id.as_str() == stem => Some(*gain),
                _ => None,
            })
        }

        pub fn stem_gain_pushes(&self) -> usize {
            self.pushes
                .iter()
                .filter(|p| matches!(p, Push::StemGain(..)))
                .count()
        }

        pub fn last(&self) -> Option<&Push> {
            self.pushes.last()
        }

        pub fn clear(&mut self) {
            self.pushes.clear();
        }
    }

    impl MixGraph for RecordingGraph {
        fn set_stem_gain(&mut self, stem: &StemId, gain: f32) {
            self.pushes.push(Push::StemGain(stem.clone(), gain));
        }

        fn set_master_gain(&mut self, gain: f32) {
            self.pushes.push(Push::MasterGain(gain));
        }

        fn set_eq(&mut self, stem: &StemId, settings: &EqSettings) {
            self.pushes.push(Push::Eq(stem.clone(), *settings));
        }

        fn set_compressor(&mut self, stem: &StemId, settings: &CompressorSettings) {
            self.pushes.push(Push::Compressor(stem.clone(), *settings));
        }

        fn set_reverb(&mut self, stem: &StemId, settings: &ReverbSettings) {
            self.pushes.push(Push::Reverb(stem.clone(), *settings));
        }

        fn set_effects_enabled(&mut self, enabled: bool) {
            self.pushes.push(Push::EffectsEnabled(enabled));
        }
    }
}
