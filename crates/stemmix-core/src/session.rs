//! Track mixing session
//!
//! [`MixSession`] is the engine's public surface for one open track. It owns
//! the live graph, the channel and effect state, the level meter and the
//! preset store, and exposes the control, lifecycle, query and preset
//! operations a mixing view needs.
//!
//! All calls are synchronous and the last write wins. The only recurring
//! work is [`MixSession::on_frame`], which the host calls from its paint
//! callback.
//!
//! Nothing here fails playback control. Graph construction failures, stale
//! preset stems and unknown preset names are reported as [`EngineWarning`]s
//! on a side channel and the session carries on without live audio for the
//! affected stem.

use std::collections::BTreeMap;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{
    AudioConfig, AudioContext, GraphError, GraphResult, MediaSource, OutputBackend, SessionGuard,
};
use crate::config::EngineConfig;
use crate::effect::{
    CompressorUpdate, EffectStage, EffectsChain, EqUpdate, ReverbUpdate, StemEffects,
};
use crate::graph::{AudioGraphManager, ConnectOutcome, MixGraph};
use crate::meter::{LevelMeterService, Levels, MeterConfig, MeterMode};
use crate::mixer::StemChannelController;
use crate::preset::{
    snapshot_stems, FileStore, KeyValueStore, MixPreset, MixPresetStore, PresetResult,
    StemSnapshot,
};
use crate::types::StemId;

/// Non-fatal condition reported on the warning channel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineWarning {
    /// A stem has no live graph; it stays controllable but silent and unmetered
    #[error("Graph construction failed for stem {stem}: {reason}")]
    GraphConstruction { stem: StemId, reason: String },

    /// A preset refers to a stem the current track doesn't have
    #[error("Preset stem {stem} is not part of this track, skipped")]
    StaleStem { stem: StemId },

    #[error("Unknown {stage} preset '{name}' for stem {stem}")]
    UnknownPreset {
        stem: StemId,
        stage: EffectStage,
        name: String,
    },

    /// The configured output could not be opened; the session runs headless
    #[error("Audio output unavailable, running without device output: {reason}")]
    ContextUnavailable { reason: String },

    /// The audio context refused to start
    #[error("Audio context could not be resumed: {reason}")]
    ContextResume { reason: String },
}

/// Full mix state of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixState {
    pub master_volume: f32,
    pub effects_enabled: bool,
    pub stems: BTreeMap<StemId, StemSnapshot>,
}

impl MixState {
    pub fn from_preset(preset: &MixPreset) -> Self {
        Self {
            master_volume: preset.master_volume,
            effects_enabled: true,
            stems: preset.stems.clone(),
        }
    }
}

/// Outcome of re-applying a preset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<StemId>,
    /// Preset stems the track no longer has
    pub skipped: Vec<StemId>,
}

pub struct MixSession {
    track_id: String,
    graph: AudioGraphManager,
    mixer: StemChannelController,
    effects: EffectsChain,
    meter: LevelMeterService,
    presets: MixPresetStore,
    warnings_tx: Sender<EngineWarning>,
    warnings_rx: Receiver<EngineWarning>,
    playing: bool,
    _guard: SessionGuard,
}

impl MixSession {
    pub fn new(
        context: AudioContext,
        track_id: impl Into<String>,
        meter: MeterConfig,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let track_id = track_id.into();
        let meter = meter.validated();
        let (warnings_tx, warnings_rx) = channel::unbounded();
        let guard = context.acquire_session();
        log::info!("MixSession: opened track {}", track_id);

        Self {
            graph: AudioGraphManager::new(context, meter.tap_size),
            mixer: StemChannelController::new(),
            effects: EffectsChain::new(),
            meter: LevelMeterService::new(meter),
            presets: MixPresetStore::new(store, track_id.clone()),
            track_id,
            warnings_tx,
            warnings_rx,
            playing: false,
            _guard: guard,
        }
    }

    /// Open a session on the shared context with file-backed presets
    ///
    /// If the configured output can't be opened the session runs on a
    /// headless context instead and reports it as
    /// [`EngineWarning::ContextUnavailable`].
    pub fn from_config(config: &EngineConfig, track_id: impl Into<String>) -> GraphResult<Self> {
        let (context, unavailable) = match AudioContext::shared(&config.audio) {
            Ok(context) => (context, None),
            Err(GraphError::ContextUnavailable(e)) => {
                let headless = AudioConfig {
                    output: OutputBackend::Headless,
                    ..config.audio.clone()
                };
                (AudioContext::new(&headless)?, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let store = FileStore::new(config.presets.resolved_directory());
        let session = Self::new(context, track_id, config.meter.clone(), Box::new(store));
        if let Some(reason) = unavailable {
            session.warn(EngineWarning::ContextUnavailable { reason });
        }
        Ok(session)
    }

    fn warn(&self, warning: EngineWarning) {
        log::warn!("{}", warning);
        // The session holds a receiver, so the channel is never disconnected
        let _ = self.warnings_tx.send(warning);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_stem_volume(&mut self, stem: &StemId, volume: f32) -> bool {
        self.mixer.set_volume(stem, volume, &mut self.graph)
    }

    pub fn toggle_mute(&mut self, stem: &StemId) -> bool {
        self.mixer.toggle_mute(stem, &mut self.graph)
    }

    pub fn toggle_solo(&mut self, stem: &StemId) -> bool {
        self.mixer.toggle_solo(stem, &mut self.graph)
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.mixer.set_master_volume(volume, &mut self.graph);
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects.set_enabled(enabled, &mut self.graph);
    }

    pub fn set_eq(&mut self, stem: &StemId, update: &EqUpdate) -> bool {
        self.effects.set_eq(stem, update, &mut self.graph)
    }

    pub fn set_compressor(&mut self, stem: &StemId, update: &CompressorUpdate) -> bool {
        self.effects.set_compressor(stem, update, &mut self.graph)
    }

    pub fn set_reverb(&mut self, stem: &StemId, update: &ReverbUpdate) -> bool {
        self.effects.set_reverb(stem, update, &mut self.graph)
    }

    pub fn apply_stage_preset(&mut self, stem: &StemId, stage: EffectStage, name: &str) -> bool {
        if self.effects.apply_preset(stem, stage, name, &mut self.graph) {
            return true;
        }
        if self.effects.effects(stem).is_some() {
            self.warn(EngineWarning::UnknownPreset {
                stem: stem.clone(),
                stage,
                name: name.to_string(),
            });
        }
        false
    }

    pub fn reset_effects(&mut self, stem: &StemId) -> bool {
        let reset = self.effects.reset(stem, &mut self.graph);
        if reset {
            self.graph.reset_stem(stem);
        }
        reset
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Add a stem's channel and effect state without wiring any audio
    pub fn register_stem(&mut self, stem: &StemId) {
        if !self.mixer.contains(stem) {
            self.mixer.add_stem(stem.clone());
            self.effects.add_stem(stem.clone());
            // A new stem can be silenced by an existing solo
            self.mixer.sync_all(&mut self.graph);
        }
    }

    /// Wire a stem to its source
    ///
    /// Returns whether the stem has a live graph afterwards. On failure the
    /// stem stays registered and controllable, and a
    /// [`EngineWarning::GraphConstruction`] is sent.
    pub fn connect_stem(&mut self, stem: &StemId, source: Box<dyn MediaSource>) -> bool {
        self.register_stem(stem);

        match self.graph.connect(stem, source) {
            Ok(ConnectOutcome::AlreadyConnected) => true,
            Ok(ConnectOutcome::Connected) => {
                self.graph.set_stem_gain(stem, self.mixer.effective_gain(stem));
                self.graph.set_master_gain(self.mixer.master_volume());
                self.effects.sync_stem(stem, &mut self.graph);
                true
            }
            Err(e) => {
                self.warn(EngineWarning::GraphConstruction {
                    stem: stem.clone(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Start (or resume) playback and metering
    pub fn play(&mut self) -> bool {
        if let Err(e) = self.graph.context().resume_if_suspended() {
            self.warn(EngineWarning::ContextResume {
                reason: e.to_string(),
            });
            return false;
        }
        self.playing = true;
        self.meter.start();
        log::info!("MixSession: playing {}", self.track_id);
        true
    }

    /// Stop rendering but keep the graph. Meters decay to zero.
    pub fn pause(&mut self) {
        self.playing = false;
        self.meter.stop();
    }

    /// Stop playback and release the graph. Meters decay to zero.
    pub fn stop(&mut self) {
        self.playing = false;
        self.meter.stop();
        self.graph.disconnect_all();
        log::info!("MixSession: stopped {}", self.track_id);
    }

    /// Switch to another track
    ///
    /// Cancels metering, releases the graph, drops all stem state and
    /// registers the new track's stems with default settings.
    pub fn change_track(&mut self, track_id: impl Into<String>, stems: &[StemId]) {
        self.teardown();
        self.mixer.clear();
        self.effects.clear();
        self.track_id = track_id.into();
        self.presets.set_track(self.track_id.clone());
        for stem in stems {
            self.register_stem(stem);
        }
        log::info!("MixSession: switched to track {}", self.track_id);
    }

    /// Cancel metering and release the graph. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.playing = false;
        self.meter.cancel();
        self.graph.disconnect_all();
    }

    /// One host frame: render what the destination wants and tick the meter
    ///
    /// Does nothing when neither playback nor a meter decay is in progress.
    pub fn on_frame(&mut self, now: Instant) -> Option<Levels> {
        if self.playing {
            self.graph.render_pending();
        }
        if !self.meter.is_active() {
            return None;
        }
        let gains = self.mixer.effective_gains();
        self.meter.tick(now, &self.graph, &gains)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_connected(&self, stem: &StemId) -> bool {
        self.graph.is_connected(stem)
    }

    pub fn stems(&self) -> impl Iterator<Item = &StemId> {
        self.mixer.states().keys()
    }

    pub fn graph(&self) -> &AudioGraphManager {
        &self.graph
    }

    /// Last emitted level frame
    pub fn levels(&self) -> &Levels {
        self.meter.levels()
    }

    pub fn subscribe_levels(&mut self) -> Receiver<Levels> {
        self.meter.subscribe()
    }

    pub fn meter_mode(&self) -> MeterMode {
        self.meter.mode()
    }

    pub fn set_meter_mode(&mut self, mode: MeterMode) {
        self.meter.set_mode(mode);
    }

    pub fn warnings(&self) -> Receiver<EngineWarning> {
        self.warnings_rx.clone()
    }

    pub fn compressor_reduction(&self, stem: &StemId) -> Option<f32> {
        self.graph.compressor_reduction(stem)
    }

    pub fn current_state(&self) -> MixState {
        MixState {
            master_volume: self.mixer.master_volume(),
            effects_enabled: self.effects.is_enabled(),
            stems: snapshot_stems(self.mixer.states(), self.effects.all()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────────────

    pub fn quick_save(&mut self) -> PresetResult<MixPreset> {
        self.presets.quick_save(
            self.mixer.master_volume(),
            self.mixer.states(),
            self.effects.all(),
        )
    }

    pub fn save_preset(&mut self, name: &str) -> PresetResult<MixPreset> {
        self.presets.save_preset(
            name,
            self.mixer.master_volume(),
            self.mixer.states(),
            self.effects.all(),
        )
    }

    pub fn list_presets(&self) -> PresetResult<Vec<MixPreset>> {
        self.presets.list_presets()
    }

    /// Fetch a snapshot without touching the live mix
    pub fn load_preset(&self, id: &str) -> PresetResult<Option<MixPreset>> {
        self.presets.load_preset(id)
    }

    pub fn delete_preset(&mut self, id: &str) -> PresetResult<bool> {
        self.presets.delete_preset(id)
    }

    /// Re-apply a snapshot through the regular setters
    ///
    /// Stems of the track that the preset doesn't mention keep their state.
    pub fn apply_preset(&mut self, preset: &MixPreset) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.mixer.set_master_volume(preset.master_volume, &mut self.graph);

        for (stem, snapshot) in &preset.stems {
            if !self.mixer.contains(stem) {
                self.warn(EngineWarning::StaleStem { stem: stem.clone() });
                report.skipped.push(stem.clone());
                continue;
            }
            self.mixer.set_volume(stem, snapshot.volume, &mut self.graph);
            self.mixer.set_muted(stem, snapshot.muted, &mut self.graph);
            self.mixer.set_solo(stem, snapshot.solo, &mut self.graph);
            self.effects.replace(stem, snapshot.effects, &mut self.graph);
            report.applied.push(stem.clone());
        }

        log::info!(
            "MixSession: applied preset '{}' ({} stems, {} skipped)",
            preset.name,
            report.applied.len(),
            report.skipped.len()
        );
        report
    }

    /// Effects of one stem
    pub fn effects(&self, stem: &StemId) -> Option<&StemEffects> {
        self.effects.effects(stem)
    }
}

impl Drop for MixSession {
    fn drop(&mut self) {
        self.teardown();
        log::debug!("MixSession: closed track {}", self.track_id);
    }
}
