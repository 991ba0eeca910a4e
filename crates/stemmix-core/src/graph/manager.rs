//! Graph construction, teardown and block rendering for one track session

use std::collections::BTreeMap;

use crate::audio::{
    conform_rate, AudioContext, ContextState, GraphError, GraphResult, MediaSource, NodeKind,
    NodeLease,
};
use crate::effect::native::{CompressorNode, EqNode, GainNode, ReverbNode};
use crate::effect::{CompressorSettings, Effect, EqSettings, ReverbSettings};
use crate::meter::LevelTaps;
use crate::types::{clamp_unit, StemId, StereoBuffer, StereoSample};

use super::analyser::{AnalyserTap, TapChannel};
use super::MixGraph;

/// Nodes leased by one stem graph (source, EQ, compressor, reverb, gain, tap)
pub const STEM_GRAPH_NODES: usize = 6;

/// Nodes leased by the master bus (gain, splitter, left and right taps)
pub const MASTER_BUS_NODES: usize = 4;

/// Result of a successful [`AudioGraphManager::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new stem graph was built
    Connected,
    /// The stem was already wired to this source; nothing changed
    AlreadyConnected,
}

/// Per-stem chain: source → EQ → compressor → reverb → gain → tap
struct StemGraph {
    source: Box<dyn MediaSource>,
    eq: EqNode,
    compressor: CompressorNode,
    reverb: ReverbNode,
    gain: GainNode,
    tap: AnalyserTap,
    _leases: Vec<NodeLease>,
}

impl StemGraph {
    fn build(
        context: &AudioContext,
        source: Box<dyn MediaSource>,
        tap_size: usize,
        effects_enabled: bool,
    ) -> GraphResult<Self> {
        // Leases taken so far are returned by drop if a later one fails
        let leases = [
            NodeKind::Source,
            NodeKind::Equalizer,
            NodeKind::Compressor,
            NodeKind::Reverb,
            NodeKind::Gain,
            NodeKind::Analyser,
        ]
        .into_iter()
        .map(|kind| context.allocate(kind))
        .collect::<GraphResult<Vec<_>>>()?;

        let sample_rate = context.sample_rate();
        let mut stem = Self {
            source,
            eq: EqNode::new(sample_rate),
            compressor: CompressorNode::new(sample_rate),
            reverb: ReverbNode::new(sample_rate),
            gain: GainNode::new(1.0),
            tap: AnalyserTap::new(tap_size, TapChannel::Loudest),
            _leases: leases,
        };
        stem.set_bypass(!effects_enabled);
        Ok(stem)
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.eq.set_bypass(bypass);
        self.compressor.set_bypass(bypass);
        self.reverb.set_bypass(bypass);
    }

    fn process(&mut self, buffer: &mut StereoBuffer, frames: usize) {
        buffer.set_len_from_capacity(frames);
        let read = self.source.read(buffer.as_mut_slice());
        buffer.as_mut_slice()[read..].fill(StereoSample::silence());

        self.eq.process(buffer);
        self.compressor.process(buffer);
        self.reverb.process(buffer);
        self.gain.process(buffer);
        self.tap.push_block(buffer);
    }
}

/// Shared bus: master gain → channel splitter → left/right taps
struct MasterBus {
    gain: GainNode,
    left: AnalyserTap,
    right: AnalyserTap,
    _leases: Vec<NodeLease>,
}

impl MasterBus {
    fn build(context: &AudioContext, tap_size: usize, gain: f32) -> GraphResult<Self> {
        let leases = [
            NodeKind::Gain,
            NodeKind::Splitter,
            NodeKind::Analyser,
            NodeKind::Analyser,
        ]
        .into_iter()
        .map(|kind| context.allocate(kind))
        .collect::<GraphResult<Vec<_>>>()?;

        Ok(Self {
            gain: GainNode::new(gain),
            left: AnalyserTap::new(tap_size, TapChannel::Left),
            right: AnalyserTap::new(tap_size, TapChannel::Right),
            _leases: leases,
        })
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        self.gain.process(buffer);
        self.left.push_block(buffer);
        self.right.push_block(buffer);
    }
}

/// Owns the live node graph of exactly one track session
///
/// Nodes are leased from the [`AudioContext`] pool and released when their
/// stem (or the whole session) is disconnected.
pub struct AudioGraphManager {
    context: AudioContext,
    tap_size: usize,
    stems: BTreeMap<StemId, StemGraph>,
    master: Option<MasterBus>,
    master_gain: f32,
    effects_enabled: bool,
    mix: StereoBuffer,
    scratch: StereoBuffer,
}

impl AudioGraphManager {
    pub fn new(context: AudioContext, tap_size: usize) -> Self {
        let block = context.block_size();
        Self {
            context,
            tap_size,
            stems: BTreeMap::new(),
            master: None,
            master_gain: 1.0,
            effects_enabled: true,
            mix: StereoBuffer::with_capacity(block),
            scratch: StereoBuffer::with_capacity(block),
        }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Wire a stem to a media source
    ///
    /// Connecting a stem to the source it already plays is a no-op. Any
    /// other source replaces the stem's previous graph. On error the stem
    /// is left without a graph and no leases are held for it.
    pub fn connect(
        &mut self,
        stem_id: &StemId,
        source: Box<dyn MediaSource>,
    ) -> GraphResult<ConnectOutcome> {
        if let Some(existing) = self.stems.get(stem_id) {
            if existing.source.source_id() == source.source_id() {
                log::debug!("connect: {} already wired to {}", stem_id, source.source_id());
                return Ok(ConnectOutcome::AlreadyConnected);
            }
        }

        if self.stems.remove(stem_id).is_some() {
            log::debug!("connect: replacing graph for {}", stem_id);
        }

        let built = conform_rate(source, self.context.sample_rate())
            .map_err(GraphError::UnsupportedSource)
            .and_then(|source| self.build_stem(source));
        match built {
            Ok(stem) => {
                self.stems.insert(stem_id.clone(), stem);
                log::info!(
                    "connect: {} wired ({} live nodes)",
                    stem_id,
                    self.context.live_nodes()
                );
                Ok(ConnectOutcome::Connected)
            }
            Err(e) => {
                if self.stems.is_empty() {
                    self.master = None;
                }
                Err(e)
            }
        }
    }

    fn build_stem(&mut self, source: Box<dyn MediaSource>) -> GraphResult<StemGraph> {
        if self.master.is_none() {
            self.master = Some(MasterBus::build(&self.context, self.tap_size, self.master_gain)?);
        }
        StemGraph::build(&self.context, source, self.tap_size, self.effects_enabled)
    }

    /// Release one stem's nodes. Returns whether the stem was connected.
    pub fn disconnect(&mut self, stem_id: &StemId) -> bool {
        let removed = self.stems.remove(stem_id).is_some();
        if self.stems.is_empty() {
            self.master = None;
        }
        removed
    }

    /// Release every node of the session. Safe to call when nothing is wired.
    pub fn disconnect_all(&mut self) {
        if self.stems.is_empty() && self.master.is_none() {
            return;
        }
        let count = self.stems.len();
        self.stems.clear();
        self.master = None;
        log::info!("disconnect_all: released {} stem graph(s)", count);
    }

    pub fn is_connected(&self, stem_id: &StemId) -> bool {
        self.stems.contains_key(stem_id)
    }

    pub fn connected_stems(&self) -> impl Iterator<Item = &StemId> {
        self.stems.keys()
    }

    /// Whether any stem (and therefore the master bus) is wired
    pub fn is_live(&self) -> bool {
        self.master.is_some()
    }

    /// Nodes currently held by this session
    pub fn node_count(&self) -> usize {
        let master = if self.master.is_some() { MASTER_BUS_NODES } else { 0 };
        self.stems.len() * STEM_GRAPH_NODES + master
    }

    /// Whether every connected source has run out of frames
    pub fn sources_finished(&self) -> bool {
        self.stems.values().all(|stem| stem.source.is_finished())
    }

    /// Current gain reduction of a stem's compressor in dB
    pub fn compressor_reduction(&self, stem_id: &StemId) -> Option<f32> {
        self.stems.get(stem_id).map(|stem| stem.compressor.reduction_db())
    }

    /// Clear filter memories, envelopes and reverb tails of one stem
    pub fn reset_stem(&mut self, stem_id: &StemId) {
        if let Some(stem) = self.stems.get_mut(stem_id) {
            stem.eq.reset();
            stem.compressor.reset();
            stem.reverb.reset();
        }
    }

    /// Render `frames` frames into the context destination
    ///
    /// Returns the number of frames rendered (0 when nothing is wired).
    pub fn render(&mut self, frames: usize) -> usize {
        if self.master.is_none() || frames == 0 {
            return 0;
        }
        let block = self.context.block_size();
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(block);
            self.render_block(n);
            remaining -= n;
        }
        frames
    }

    /// Render whatever the destination wants right now (one frame tick)
    pub fn render_pending(&mut self) -> usize {
        if self.context.state() != ContextState::Running {
            return 0;
        }
        let wanted = self.context.frames_wanted();
        self.render(wanted)
    }

    fn render_block(&mut self, frames: usize) {
        self.mix.set_len_from_capacity(frames);
        self.mix.fill_silence();

        for stem in self.stems.values_mut() {
            stem.process(&mut self.scratch, frames);
            self.mix.add_buffer(&self.scratch);
        }

        if let Some(master) = self.master.as_mut() {
            master.process(&mut self.mix);
        }
        self.context.write_destination(&self.mix);
    }
}

impl Drop for AudioGraphManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl MixGraph for AudioGraphManager {
    fn set_stem_gain(&mut self, stem: &StemId, gain: f32) {
        if let Some(graph) = self.stems.get_mut(stem) {
            graph.gain.set_target(clamp_unit(gain));
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = clamp_unit(gain);
        if let Some(master) = self.master.as_mut() {
            master.gain.set_target(self.master_gain);
        }
    }

    fn set_eq(&mut self, stem: &StemId, settings: &EqSettings) {
        if let Some(graph) = self.stems.get_mut(stem) {
            graph.eq.set_settings(settings);
        }
    }

    fn set_compressor(&mut self, stem: &StemId, settings: &CompressorSettings) {
        if let Some(graph) = self.stems.get_mut(stem) {
            graph.compressor.set_settings(settings);
        }
    }

    fn set_reverb(&mut self, stem: &StemId, settings: &ReverbSettings) {
        if let Some(graph) = self.stems.get_mut(stem) {
            graph.reverb.set_settings(settings);
        }
    }

    fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
        for graph in self.stems.values_mut() {
            graph.set_bypass(!enabled);
        }
        log::debug!("effects {}", if enabled { "enabled" } else { "bypassed" });
    }
}

impl LevelTaps for AudioGraphManager {
    fn stem_tap(&self, stem: &StemId) -> Option<&AnalyserTap> {
        self.stems.get(stem).map(|graph| &graph.tap)
    }

    fn master_taps(&self) -> Option<(&AnalyserTap, &AnalyserTap)> {
        self.master.as_ref().map(|master| (&master.left, &master.right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BufferSource, CaptureDestination, CaptureHandle};
    use crate::effect::eq_preset;

    const BLOCK: usize = 64;

    fn manager(max_nodes: usize) -> (AudioGraphManager, CaptureHandle) {
        let capture = CaptureDestination::new(BLOCK);
        let handle = capture.handle();
        let context = AudioContext::with_destination(48000, BLOCK, max_nodes, Box::new(capture));
        context.resume_if_suspended().unwrap();
        (AudioGraphManager::new(context, 256), handle)
    }

    fn constant_source(id: &str, level: f32) -> Box<dyn MediaSource> {
        Box::new(BufferSource::new(id, vec![StereoSample::mono(level); 48000], 48000))
    }

    fn stem(id: &str) -> StemId {
        StemId::from(id)
    }

    #[test]
    fn test_connect_builds_stem_and_master() {
        let (mut graph, _) = manager(64);
        let outcome = graph.connect(&stem("vocals"), constant_source("vocals.wav", 0.5)).unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert!(graph.is_live());
        assert_eq!(graph.node_count(), STEM_GRAPH_NODES + MASTER_BUS_NODES);
        assert_eq!(graph.context().live_nodes(), graph.node_count());
    }

    #[test]
    fn test_connect_same_source_is_idempotent() {
        let (mut graph, capture) = manager(64);
        graph.connect(&stem("vocals"), constant_source("vocals.wav", 0.5)).unwrap();
        graph.render(BLOCK);
        let before = capture.take();

        let outcome = graph.connect(&stem("vocals"), constant_source("vocals.wav", 0.5)).unwrap();
        assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
        assert_eq!(graph.node_count(), STEM_GRAPH_NODES + MASTER_BUS_NODES);

        graph.render(BLOCK);
        let after = capture.take();
        assert_eq!(before.last(), after.last());
    }

    #[test]
    fn test_connect_new_source_replaces_graph() {
        let (mut graph, _) = manager(64);
        graph.connect(&stem("vocals"), constant_source("take-1.wav", 0.5)).unwrap();
        let outcome = graph.connect(&stem("vocals"), constant_source("take-2.wav", 0.5)).unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert_eq!(graph.context().live_nodes(), STEM_GRAPH_NODES + MASTER_BUS_NODES);
    }

    #[test]
    fn test_allocation_failure_leaks_nothing() {
        // Room for the master bus and part of a stem graph only
        let (mut graph, _) = manager(MASTER_BUS_NODES + 3);
        let err = graph.connect(&stem("drums"), constant_source("drums.wav", 0.5)).unwrap_err();
        assert!(matches!(err, GraphError::NodeAllocation { .. }));
        assert!(!graph.is_connected(&stem("drums")));
        assert!(!graph.is_live());
        assert_eq!(graph.context().live_nodes(), 0);
    }

    #[test]
    fn test_connect_on_closed_context_fails() {
        let (mut graph, _) = manager(64);
        graph.context().close().unwrap();
        let err = graph.connect(&stem("bass"), constant_source("bass.wav", 0.5)).unwrap_err();
        assert!(matches!(err, GraphError::ContextClosed));
    }

    #[test]
    fn test_disconnect_all_is_idempotent_and_releases() {
        let (mut graph, _) = manager(64);
        graph.disconnect_all();
        graph.connect(&stem("vocals"), constant_source("v.wav", 0.5)).unwrap();
        graph.connect(&stem("drums"), constant_source("d.wav", 0.5)).unwrap();
        graph.disconnect_all();
        graph.disconnect_all();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.context().live_nodes(), 0);
        assert_eq!(graph.render(BLOCK), 0);
    }

    #[test]
    fn test_render_mixes_stems_with_gain() {
        let (mut graph, capture) = manager(64);
        graph.connect(&stem("vocals"), constant_source("v.wav", 0.25)).unwrap();
        graph.connect(&stem("drums"), constant_source("d.wav", 0.25)).unwrap();
        graph.set_stem_gain(&stem("drums"), 0.0);
        graph.set_master_gain(0.5);

        assert_eq!(graph.render(BLOCK * 2), BLOCK * 2);
        let frames = capture.take();
        assert_eq!(frames.len(), BLOCK * 2);
        assert!((frames[BLOCK].left - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_effects_disabled_is_dry() {
        let (mut graph, capture) = manager(64);
        graph.connect(&stem("vocals"), constant_source("v.wav", 0.25)).unwrap();
        graph.set_eq(&stem("vocals"), &eq_preset("bass_boost").unwrap());
        graph.set_effects_enabled(false);
        graph.render(BLOCK * 4);
        assert!(capture.take().iter().all(|s| (s.left - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_exhausted_source_renders_silence() {
        let (mut graph, capture) = manager(64);
        let short = BufferSource::new("short", vec![StereoSample::mono(0.5); 10], 48000);
        graph.connect(&stem("vocals"), Box::new(short)).unwrap();
        graph.set_effects_enabled(false);
        graph.render(BLOCK);
        let frames = capture.take();
        assert_eq!(frames[9].left, 0.5);
        assert_eq!(frames[10].left, 0.0);
        assert!(graph.sources_finished());
    }

    #[test]
    fn test_taps_follow_connection() {
        let (mut graph, _) = manager(64);
        assert!(graph.stem_tap(&stem("vocals")).is_none());
        assert!(graph.master_taps().is_none());
        graph.connect(&stem("vocals"), constant_source("v.wav", 0.5)).unwrap();
        graph.render(BLOCK);
        assert_eq!(graph.stem_tap(&stem("vocals")).unwrap().len(), BLOCK);
        graph.disconnect(&stem("vocals"));
        assert!(graph.stem_tap(&stem("vocals")).is_none());
        assert!(graph.master_taps().is_none());
    }

    #[test]
    fn test_source_at_other_rate_plays_at_context_rate() {
        let (mut graph, capture) = manager(64);
        let source = BufferSource::new("v44.wav", vec![StereoSample::mono(0.5); 44100], 44100);
        graph.connect(&stem("vocals"), Box::new(source)).unwrap();
        graph.set_effects_enabled(false);

        let mut rendered = 0;
        while !graph.sources_finished() && rendered < 96000 {
            rendered += graph.render(BLOCK);
            capture.take();
        }
        // One second of audio lasts one second at 48 kHz
        assert!(rendered >= 47900 && rendered <= 48000 + BLOCK, "{}", rendered);
    }

    #[test]
    fn test_unsupported_source_rate_leaves_nothing_wired() {
        let (mut graph, _) = manager(64);
        let broken = BufferSource::new("broken.wav", vec![StereoSample::mono(0.5); 64], 0);
        let err = graph.connect(&stem("bass"), Box::new(broken)).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedSource(_)));
        assert!(!graph.is_live());
        assert_eq!(graph.context().live_nodes(), 0);
    }

    #[test]
    fn test_out_of_phase_stem_is_metered() {
        let (mut graph, _) = manager(64);
        let wide = BufferSource::new("wide.wav", vec![StereoSample::new(0.5, -0.5); 4800], 48000);
        graph.connect(&stem("other"), Box::new(wide)).unwrap();
        graph.set_effects_enabled(false);
        graph.render(BLOCK);

        let mut samples = Vec::new();
        graph.stem_tap(&stem("other")).unwrap().time_domain(&mut samples);
        assert!(samples.iter().all(|s| s.abs() > 0.49));
    }

    #[test]
    fn test_pushes_for_unknown_stem_are_ignored() {
        let (mut graph, _) = manager(64);
        graph.set_stem_gain(&stem("ghost"), 0.3);
        graph.set_eq(&stem("ghost"), &EqSettings::default());
        assert!(graph.compressor_reduction(&stem("ghost")).is_none());
    }
}
