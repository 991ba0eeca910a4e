//! Level metering
//!
//! [`LevelMeterService`] is a cooperative sampler driven by the host's
//! frame callback. It never touches the graph beyond reading analyser taps
//! through [`LevelTaps`], and does no work at all while idle.
//!
//! ```text
//!            start()              stop()               levels < 1e-4
//!   Idle ───────────→ Sampling ───────────→ Decaying ───────────────→ Idle
//!    ↑                                                                  │
//!    └──────────────────────────── cancel() ────────────────────────────┘
//! ```

mod service;

pub use service::LevelMeterService;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{clamp_count, clamp_field};
use crate::graph::AnalyserTap;
use crate::types::StemId;

/// Read access to the analyser taps of a live graph
///
/// Taps are looked up on every tick. A tap that is missing (stem never
/// connected, or disconnected since the last tick) reads as silence.
pub trait LevelTaps {
    fn stem_tap(&self, stem: &StemId) -> Option<&AnalyserTap>;

    /// Left and right taps of the master bus
    fn master_taps(&self) -> Option<(&AnalyserTap, &AnalyserTap)>;
}

/// How per-stem levels are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterMode {
    /// Read each stem's own analyser tap
    #[default]
    Measured,
    /// Derive stem levels from the master tap scaled by each stem's gain
    Approximated,
}

/// Metering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub mode: MeterMode,
    /// Minimum time between emitted frames (ms)
    pub emit_interval_ms: u64,
    /// Per-tick multiplier while decaying after stop
    pub decay: f32,
    /// Release smoothing (0 = none, close to 1 = slow)
    pub smoothing: f32,
    /// Peak level at or above which a stem reports clipping
    pub clip_threshold: f32,
    /// Analyser ring size in samples
    pub tap_size: usize,
    /// Relative jitter applied in approximated mode
    pub jitter: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            mode: MeterMode::Measured,
            emit_interval_ms: 50,
            decay: 0.9,
            smoothing: 0.8,
            clip_threshold: 0.99,
            tap_size: 2048,
            jitter: 0.03,
        }
    }
}

/// Largest per-tick decay and release smoothing factor
///
/// Both must stay below 1 for levels to reach the silence floor after stop.
pub const MAX_DECAY: f32 = 0.995;

impl MeterConfig {
    /// Copy with every field in its supported range
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        Self {
            decay: clamp_field("meter.decay", self.decay, 0.0, MAX_DECAY, defaults.decay),
            smoothing: clamp_field(
                "meter.smoothing",
                self.smoothing,
                0.0,
                MAX_DECAY,
                defaults.smoothing,
            ),
            clip_threshold: clamp_field(
                "meter.clip_threshold",
                self.clip_threshold,
                0.01,
                1.0,
                defaults.clip_threshold,
            ),
            tap_size: clamp_count("meter.tap_size", self.tap_size, 32, 1 << 16),
            jitter: clamp_field("meter.jitter", self.jitter, 0.0, 0.5, defaults.jitter),
            ..self
        }
    }
}

/// Level of one stem
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StemLevel {
    pub rms: f32,
    pub peak: f32,
    pub clipping: bool,
}

/// Peak level of each master channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MasterLevel {
    pub left: f32,
    pub right: f32,
}

/// One emitted metering frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Levels {
    pub per_stem: BTreeMap<StemId, StemLevel>,
    pub master: MasterLevel,
    /// Stem levels were derived from the master tap, not measured
    pub approximated: bool,
}

impl Levels {
    /// Level of a stem, or silence if the stem is not metered
    pub fn stem(&self, stem: &StemId) -> StemLevel {
        self.per_stem.get(stem).copied().unwrap_or_default()
    }

    pub fn is_silent(&self) -> bool {
        self.master.left == 0.0
            && self.master.right == 0.0
            && self
                .per_stem
                .values()
                .all(|level| level.rms == 0.0 && level.peak == 0.0)
    }
}

/// Scheduling state of the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    Idle,
    Sampling,
    Decaying,
}
