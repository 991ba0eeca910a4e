//! Per-stem effect state and its push path into the graph

use std::collections::BTreeMap;

use crate::graph::MixGraph;
use crate::types::StemId;

use super::settings::{
    compressor_preset, eq_preset, reverb_preset, CompressorUpdate, EffectStage, EqUpdate,
    ReverbUpdate, StemEffects,
};

/// Owns every stem's [`StemEffects`] plus the track-wide enable toggle
///
/// Each setter updates the stored settings first, then pushes the result
/// into the graph. Setters for unknown stems change nothing and return
/// `false`.
#[derive(Debug, Clone)]
pub struct EffectsChain {
    stems: BTreeMap<StemId, StemEffects>,
    enabled: bool,
}

impl Default for EffectsChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectsChain {
    pub fn new() -> Self {
        Self {
            stems: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Register a stem with default (transparent) settings
    pub fn add_stem(&mut self, stem: StemId) {
        self.stems.entry(stem).or_default();
    }

    pub fn remove_stem(&mut self, stem: &StemId) {
        self.stems.remove(stem);
    }

    pub fn clear(&mut self) {
        self.stems.clear();
    }

    pub fn effects(&self, stem: &StemId) -> Option<&StemEffects> {
        self.stems.get(stem)
    }

    pub fn all(&self) -> &BTreeMap<StemId, StemEffects> {
        &self.stems
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Merge a partial EQ update and push it
    pub fn set_eq(&mut self, stem: &StemId, update: &EqUpdate, graph: &mut dyn MixGraph) -> bool {
        let Some(effects) = self.stems.get_mut(stem) else {
            log::debug!("set_eq: unknown stem {}", stem);
            return false;
        };
        effects.eq.merge(update);
        graph.set_eq(stem, &effects.eq);
        true
    }

    /// Merge a partial compressor update and push it
    pub fn set_compressor(
        &mut self,
        stem: &StemId,
        update: &CompressorUpdate,
        graph: &mut dyn MixGraph,
    ) -> bool {
        let Some(effects) = self.stems.get_mut(stem) else {
            log::debug!("set_compressor: unknown stem {}", stem);
            return false;
        };
        effects.compressor.merge(update);
        graph.set_compressor(stem, &effects.compressor);
        true
    }

    /// Merge a partial reverb update and push it
    pub fn set_reverb(
        &mut self,
        stem: &StemId,
        update: &ReverbUpdate,
        graph: &mut dyn MixGraph,
    ) -> bool {
        let Some(effects) = self.stems.get_mut(stem) else {
            log::debug!("set_reverb: unknown stem {}", stem);
            return false;
        };
        effects.reverb.merge(update);
        graph.set_reverb(stem, &effects.reverb);
        true
    }

    /// Replace one stage's settings with a named preset
    ///
    /// Unlike the setters this is not a merge. Unknown preset names are
    /// ignored with a warning and return `false`.
    pub fn apply_preset(
        &mut self,
        stem: &StemId,
        stage: EffectStage,
        name: &str,
        graph: &mut dyn MixGraph,
    ) -> bool {
        let Some(effects) = self.stems.get_mut(stem) else {
            log::debug!("apply_preset: unknown stem {}", stem);
            return false;
        };

        let applied = match stage {
            EffectStage::Eq => eq_preset(name).map(|eq| {
                effects.eq = eq;
                graph.set_eq(stem, &effects.eq);
            }),
            EffectStage::Compressor => compressor_preset(name).map(|compressor| {
                effects.compressor = compressor;
                graph.set_compressor(stem, &effects.compressor);
            }),
            EffectStage::Reverb => reverb_preset(name).map(|reverb| {
                effects.reverb = reverb;
                graph.set_reverb(stem, &effects.reverb);
            }),
        };

        if applied.is_none() {
            log::warn!("apply_preset: unknown {} preset '{}'", stage, name);
        }
        applied.is_some()
    }

    /// Replace all three stages at once (preset load)
    pub fn replace(&mut self, stem: &StemId, effects: StemEffects, graph: &mut dyn MixGraph) -> bool {
        let Some(current) = self.stems.get_mut(stem) else {
            return false;
        };
        *current = effects.clamped();
        Self::push_stem(stem, current, graph);
        true
    }

    /// Restore a stem's stages to their defaults
    pub fn reset(&mut self, stem: &StemId, graph: &mut dyn MixGraph) -> bool {
        self.replace(stem, StemEffects::default(), graph)
    }

    /// Track-wide toggle: disabled stages stay wired but pass audio through
    pub fn set_enabled(&mut self, enabled: bool, graph: &mut dyn MixGraph) {
        self.enabled = enabled;
        graph.set_effects_enabled(enabled);
    }

    /// Re-push one stem's stored settings (after its graph was rebuilt)
    pub fn sync_stem(&self, stem: &StemId, graph: &mut dyn MixGraph) {
        if let Some(effects) = self.stems.get(stem) {
            Self::push_stem(stem, effects, graph);
        }
        graph.set_effects_enabled(self.enabled);
    }

    fn push_stem(stem: &StemId, effects: &StemEffects, graph: &mut dyn MixGraph) {
        graph.set_eq(stem, &effects.eq);
        graph.set_compressor(stem, &effects.compressor);
        graph.set_reverb(stem, &effects.reverb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::settings::{EqSettings, ReverbSettings};
    use crate::graph::testing::{Push, RecordingGraph};

    fn chain_with(stems: &[&str]) -> EffectsChain {
        let mut chain = EffectsChain::new();
        for stem in stems {
            chain.add_stem(StemId::from(*stem));
        }
        chain
    }

    #[test]
    fn test_set_eq_merges_and_pushes() {
        let mut chain = chain_with(&["vocals"]);
        let mut graph = RecordingGraph::new();
        let vocals = StemId::from("vocals");

        chain.set_eq(&vocals, &EqUpdate { low_gain: Some(4.0), ..Default::default() }, &mut graph);
        chain.set_eq(&vocals, &EqUpdate { high_gain: Some(-3.0), ..Default::default() }, &mut graph);

        let eq = chain.effects(&vocals).unwrap().eq;
        assert_eq!(eq.low_gain, 4.0);
        assert_eq!(eq.high_gain, -3.0);
        assert_eq!(graph.last(), Some(&Push::Eq(vocals, eq)));
    }

    #[test]
    fn test_last_write_wins() {
        let mut chain = chain_with(&["drums"]);
        let mut graph = RecordingGraph::new();
        let drums = StemId::from("drums");
        for mix in [0.1, 0.7, 0.3] {
            chain.set_reverb(&drums, &ReverbUpdate { mix: Some(mix), ..Default::default() }, &mut graph);
        }
        assert_eq!(chain.effects(&drums).unwrap().reverb.mix, 0.3);
        assert_eq!(graph.pushes.len(), 3);
    }

    #[test]
    fn test_apply_preset_replaces_whole_stage() {
        let mut chain = chain_with(&["vocals"]);
        let mut graph = RecordingGraph::new();
        let vocals = StemId::from("vocals");

        chain.set_eq(&vocals, &EqUpdate { low_freq: Some(500.0), ..Default::default() }, &mut graph);
        assert!(chain.apply_preset(&vocals, EffectStage::Eq, "warm", &mut graph));

        // Corner frequency reset to the preset's, not merged
        assert_eq!(chain.effects(&vocals).unwrap().eq, EqSettings::gains(3.0, -1.0, -2.0));
    }

    #[test]
    fn test_unknown_preset_is_ignored() {
        let mut chain = chain_with(&["vocals"]);
        let mut graph = RecordingGraph::new();
        let vocals = StemId::from("vocals");
        assert!(!chain.apply_preset(&vocals, EffectStage::Reverb, "cathedral", &mut graph));
        assert_eq!(chain.effects(&vocals).unwrap().reverb, ReverbSettings::default());
        assert!(graph.pushes.is_empty());
    }

    #[test]
    fn test_unknown_stem_is_ignored() {
        let mut chain = chain_with(&["vocals"]);
        let mut graph = RecordingGraph::new();
        let ghost = StemId::from("ghost");
        assert!(!chain.set_compressor(&ghost, &CompressorUpdate::default(), &mut graph));
        assert!(!chain.apply_preset(&ghost, EffectStage::Eq, "flat", &mut graph));
        assert!(graph.pushes.is_empty());
    }

    #[test]
    fn test_toggle_keeps_settings() {
        let mut chain = chain_with(&["bass"]);
        let mut graph = RecordingGraph::new();
        let bass = StemId::from("bass");
        chain.apply_preset(&bass, EffectStage::Compressor, "heavy", &mut graph);

        chain.set_enabled(false, &mut graph);
        assert_eq!(graph.last(), Some(&Push::EffectsEnabled(false)));
        chain.set_enabled(true, &mut graph);

        assert!(chain.is_enabled());
        assert_eq!(
            chain.effects(&bass).unwrap().compressor,
            compressor_preset("heavy").unwrap()
        );
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut chain = chain_with(&["other"]);
        let mut graph = RecordingGraph::new();
        let other = StemId::from("other");
        chain.apply_preset(&other, EffectStage::Reverb, "ambient", &mut graph);
        graph.clear();

        assert!(chain.reset(&other, &mut graph));
        assert_eq!(chain.effects(&other), Some(&StemEffects::default()));
        assert_eq!(graph.pushes.len(), 3);
    }
}
