//! Per-stem channel strip state and solo/mute resolution

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::MixGraph;
use crate::types::{clamp_unit, StemId};

/// Volume, mute and solo of one stem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemChannelState {
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
}

impl Default for StemChannelState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            solo: false,
        }
    }
}

/// Owns every stem's channel state and the master volume
///
/// Audibility is a pure function of the whole set of states: a stem is
/// audible when it is not muted and either no stem is soloed or it is
/// soloed itself. Its effective gain is its volume when audible, else 0.
#[derive(Debug, Clone)]
pub struct StemChannelController {
    stems: BTreeMap<StemId, StemChannelState>,
    master_volume: f32,
}

impl Default for StemChannelController {
    fn default() -> Self {
        Self::new()
    }
}

impl StemChannelController {
    pub fn new() -> Self {
        Self {
            stems: BTreeMap::new(),
            master_volume: 1.0,
        }
    }

    pub fn add_stem(&mut self, stem: StemId) {
        self.stems.entry(stem).or_default();
    }

    pub fn remove_stem(&mut self, stem: &StemId) {
        self.stems.remove(stem);
    }

    pub fn clear(&mut self) {
        self.stems.clear();
    }

    pub fn contains(&self, stem: &StemId) -> bool {
        self.stems.contains_key(stem)
    }

    pub fn state(&self, stem: &StemId) -> Option<&StemChannelState> {
        self.stems.get(stem)
    }

    pub fn states(&self) -> &BTreeMap<StemId, StemChannelState> {
        &self.stems
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    fn any_solo(&self) -> bool {
        self.stems.values().any(|s| s.solo)
    }

    pub fn is_audible(&self, stem: &StemId) -> bool {
        self.stems
            .get(stem)
            .is_some_and(|s| !s.muted && (s.solo || !self.any_solo()))
    }

    pub fn effective_gain(&self, stem: &StemId) -> f32 {
        match self.stems.get(stem) {
            Some(state) if self.is_audible(stem) => state.volume,
            _ => 0.0,
        }
    }

    /// Effective gain of every stem
    pub fn effective_gains(&self) -> BTreeMap<StemId, f32> {
        let any_solo = self.any_solo();
        self.stems
            .iter()
            .map(|(id, s)| {
                let audible = !s.muted && (s.solo || !any_solo);
                (id.clone(), if audible { s.volume } else { 0.0 })
            })
            .collect()
    }

    /// Clamp and store a stem's volume, then push that stem's gain
    pub fn set_volume(&mut self, stem: &StemId, volume: f32, graph: &mut dyn MixGraph) -> bool {
        let Some(state) = self.stems.get_mut(stem) else {
            return false;
        };
        state.volume = clamp_unit(volume);
        graph.set_stem_gain(stem, self.effective_gain(stem));
        true
    }

    pub fn toggle_mute(&mut self, stem: &StemId, graph: &mut dyn MixGraph) -> bool {
        let Some(muted) = self.stems.get(stem).map(|s| s.muted) else {
            return false;
        };
        self.set_muted(stem, !muted, graph)
    }

    pub fn set_muted(&mut self, stem: &StemId, muted: bool, graph: &mut dyn MixGraph) -> bool {
        let Some(state) = self.stems.get_mut(stem) else {
            return false;
        };
        state.muted = muted;
        // Muting one stem never changes another stem's audibility
        graph.set_stem_gain(stem, self.effective_gain(stem));
        true
    }

    pub fn toggle_solo(&mut self, stem: &StemId, graph: &mut dyn MixGraph) -> bool {
        let Some(solo) = self.stems.get(stem).map(|s| s.solo) else {
            return false;
        };
        self.set_solo(stem, !solo, graph)
    }

    /// Solo changes can flip every stem, so all gains are pushed
    pub fn set_solo(&mut self, stem: &StemId, solo: bool, graph: &mut dyn MixGraph) -> bool {
        let Some(state) = self.stems.get_mut(stem) else {
            return false;
        };
        state.solo = solo;
        self.push_stem_gains(graph);
        true
    }

    pub fn set_master_volume(&mut self, volume: f32, graph: &mut dyn MixGraph) {
        self.master_volume = clamp_unit(volume);
        graph.set_master_gain(self.master_volume);
    }

    /// Re-push every gain (after the graph was rebuilt)
    pub fn sync_all(&self, graph: &mut dyn MixGraph) {
        self.push_stem_gains(graph);
        graph.set_master_gain(self.master_volume);
    }

    fn push_stem_gains(&self, graph: &mut dyn MixGraph) {
        for (stem, gain) in self.effective_gains() {
            graph.set_stem_gain(&stem, gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{Push, RecordingGraph};

    fn controller(stems: &[&str]) -> StemChannelController {
        let mut controller = StemChannelController::new();
        for stem in stems {
            controller.add_stem(StemId::from(*stem));
        }
        controller
    }

    fn id(s: &str) -> StemId {
        StemId::from(s)
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut mixer = controller(&["vocals"]);
        let mut graph = RecordingGraph::new();
        for (input, stored) in [(1.7, 1.0), (-0.2, 0.0), (0.4, 0.4), (f32::NAN, 0.0)] {
            mixer.set_volume(&id("vocals"), input, &mut graph);
            assert_eq!(mixer.state(&id("vocals")).unwrap().volume, stored);
            assert_eq!(graph.stem_gain("vocals"), Some(stored));
        }
        mixer.set_master_volume(3.0, &mut graph);
        assert_eq!(mixer.master_volume(), 1.0);
        assert_eq!(graph.last(), Some(&Push::MasterGain(1.0)));
    }

    #[test]
    fn test_set_volume_pushes_only_that_stem() {
        let mut mixer = controller(&["vocals", "drums", "bass"]);
        let mut graph = RecordingGraph::new();
        mixer.set_volume(&id("drums"), 0.5, &mut graph);
        assert_eq!(graph.pushes, vec![Push::StemGain(id("drums"), 0.5)]);
    }

    #[test]
    fn test_mute_silences_stem() {
        let mut mixer = controller(&["vocals", "drums"]);
        let mut graph = RecordingGraph::new();
        mixer.toggle_mute(&id("drums"), &mut graph);
        assert_eq!(graph.stem_gain("drums"), Some(0.0));
        assert!(mixer.is_audible(&id("vocals")));
        mixer.toggle_mute(&id("drums"), &mut graph);
        assert_eq!(graph.stem_gain("drums"), Some(1.0));
    }

    #[test]
    fn test_solo_dominance() {
        let mut mixer = controller(&["vocals", "drums", "bass", "other"]);
        let mut graph = RecordingGraph::new();
        mixer.toggle_solo(&id("vocals"), &mut graph);

        assert_eq!(graph.stem_gain_pushes(), 4);
        assert_eq!(graph.stem_gain("vocals"), Some(1.0));
        for stem in ["drums", "bass", "other"] {
            assert_eq!(graph.stem_gain(stem), Some(0.0));
            assert!(!mixer.is_audible(&id(stem)));
        }

        mixer.toggle_solo(&id("vocals"), &mut graph);
        for stem in ["vocals", "drums", "bass", "other"] {
            assert_eq!(graph.stem_gain(stem), Some(1.0));
        }
    }

    #[test]
    fn test_muted_solo_stem_is_silent() {
        let mut mixer = controller(&["vocals", "drums"]);
        let mut graph = RecordingGraph::new();
        mixer.set_solo(&id("vocals"), true, &mut graph);
        mixer.set_muted(&id("vocals"), true, &mut graph);
        let gains = mixer.effective_gains();
        assert_eq!(gains[&id("vocals")], 0.0);
        assert_eq!(gains[&id("drums")], 0.0);
    }

    #[test]
    fn test_effective_gains_match_audibility() {
        let mut mixer = controller(&["vocals", "drums", "bass"]);
        let mut graph = RecordingGraph::new();
        mixer.set_volume(&id("bass"), 0.3, &mut graph);
        mixer.set_solo(&id("bass"), true, &mut graph);
        mixer.set_solo(&id("drums"), true, &mut graph);
        for (stem, gain) in mixer.effective_gains() {
            assert_eq!(gain, mixer.effective_gain(&stem));
        }
        assert_eq!(mixer.effective_gain(&id("bass")), 0.3);
        assert_eq!(mixer.effective_gain(&id("vocals")), 0.0);
    }

    #[test]
    fn test_unknown_stem_is_ignored() {
        let mut mixer = controller(&["vocals"]);
        let mut graph = RecordingGraph::new();
        assert!(!mixer.set_volume(&id("ghost"), 0.5, &mut graph));
        assert!(!mixer.toggle_solo(&id("ghost"), &mut graph));
        assert!(graph.pushes.is_empty());
        assert_eq!(mixer.effective_gain(&id("ghost")), 0.0);
    }

    #[test]
    fn test_sync_all_pushes_everything() {
        let mixer = controller(&["vocals", "drums"]);
        let mut graph = RecordingGraph::new();
        mixer.sync_all(&mut graph);
        assert_eq!(graph.stem_gain_pushes(), 2);
        assert_eq!(graph.last(), Some(&Push::MasterGain(1.0)));
    }
}
