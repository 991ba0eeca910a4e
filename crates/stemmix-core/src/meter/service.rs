//! Level meter service
//!
//! # Per-tick work
//!
//! - **Sampling**: read every tap, compute `rms = sqrt(mean(x²))` and
//!   `peak = max|x|` over samples clamped to [-1, 1], then smooth with an
//!   instant attack and an exponential release.
//! - **Decaying**: multiply every level by `decay`. Once all levels are
//!   below the silence floor they snap to zero, a final frame is emitted
//!   and the service goes idle.
//! - **Idle**: nothing.
//!
//! Frames are emitted at most once per `emit_interval_ms`, however often
//! the host ticks.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{LevelTaps, Levels, MasterLevel, MeterConfig, MeterMode, MeterState, StemLevel};
use crate::graph::AnalyserTap;
use crate::types::{clamp_unit, StemId};

/// Levels below this are treated as silence while decaying
const SILENCE_FLOOR: f32 = 1e-4;

/// Frames buffered per subscriber before new frames are dropped
const SUBSCRIBER_CAPACITY: usize = 16;

pub struct LevelMeterService {
    config: MeterConfig,
    state: MeterState,
    /// Smoothed levels, updated every tick
    current: Levels,
    /// Last frame handed out
    emitted: Levels,
    last_emit: Option<Instant>,
    subscribers: Vec<Sender<Levels>>,
    rng: StdRng,
    scratch: Vec<f32>,
}

impl LevelMeterService {
    pub fn new(config: MeterConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic jitter for approximated mode
    pub fn with_seed(config: MeterConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: MeterConfig, rng: StdRng) -> Self {
        let config = config.validated();
        let scratch = Vec::with_capacity(config.tap_size);
        Self {
            config,
            state: MeterState::Idle,
            current: Levels::default(),
            emitted: Levels::default(),
            last_emit: None,
            subscribers: Vec::new(),
            rng,
            scratch,
        }
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn mode(&self) -> MeterMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: MeterMode) {
        if self.config.mode != mode {
            log::info!("meter mode set to {:?}", mode);
            self.config.mode = mode;
        }
    }

    pub fn state(&self) -> MeterState {
        self.state
    }

    /// Whether ticks currently do any work
    pub fn is_active(&self) -> bool {
        self.state != MeterState::Idle
    }

    /// Playback started: sample on every tick
    pub fn start(&mut self) {
        if self.state != MeterState::Sampling {
            log::debug!("meter: sampling");
            self.state = MeterState::Sampling;
        }
    }

    /// Playback stopped: let levels fall toward zero
    pub fn stop(&mut self) {
        if self.state == MeterState::Sampling {
            log::debug!("meter: decaying");
            self.state = MeterState::Decaying;
        }
    }

    /// Drop the pending tick and reset every level to zero at once
    pub fn cancel(&mut self) {
        let was_silent = self.emitted.is_silent();
        self.state = MeterState::Idle;
        self.current = Levels::default();
        self.emitted = Levels::default();
        self.last_emit = None;
        if !was_silent {
            self.broadcast(&Levels::default());
        }
    }

    /// Last emitted frame
    pub fn levels(&self) -> &Levels {
        &self.emitted
    }

    /// Receive every emitted frame. A subscriber that falls behind misses frames.
    pub fn subscribe(&mut self) -> Receiver<Levels> {
        let (tx, rx) = channel::bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    /// Advance the meter by one host frame
    ///
    /// `gains` holds the effective gain of every stem to meter. Returns the
    /// frame emitted on this tick, if any.
    pub fn tick(
        &mut self,
        now: Instant,
        taps: &dyn LevelTaps,
        gains: &BTreeMap<StemId, f32>,
    ) -> Option<Levels> {
        match self.state {
            MeterState::Idle => None,
            MeterState::Sampling => {
                let measured = self.measure(taps, gains);
                self.smooth(measured);
                self.emit_throttled(now)
            }
            MeterState::Decaying => {
                if self.decay_step() {
                    self.zero_current();
                    self.state = MeterState::Idle;
                    log::debug!("meter: idle");
                    Some(self.emit(now))
                } else {
                    self.emit_throttled(now)
                }
            }
        }
    }

    fn measure(&mut self, taps: &dyn LevelTaps, gains: &BTreeMap<StemId, f32>) -> Levels {
        let (master, overall) = match taps.master_taps() {
            Some((left, right)) => {
                let left = self.read(left);
                let right = self.read(right);
                let overall = StemLevel {
                    rms: (left.rms + right.rms) * 0.5,
                    peak: left.peak.max(right.peak),
                    clipping: left.clipping || right.clipping,
                };
                (MasterLevel { left: left.peak, right: right.peak }, overall)
            }
            None => (MasterLevel::default(), StemLevel::default()),
        };

        let approximated = self.config.mode == MeterMode::Approximated;
        let mut per_stem = BTreeMap::new();
        for (stem, &gain) in gains {
            let level = if approximated {
                self.approximate(overall, gain)
            } else {
                match taps.stem_tap(stem) {
                    Some(tap) => self.read(tap),
                    None => StemLevel::default(),
                }
            };
            per_stem.insert(stem.clone(), level);
        }

        Levels { per_stem, master, approximated }
    }

    fn read(&mut self, tap: &AnalyserTap) -> StemLevel {
        tap.time_domain(&mut self.scratch);
        analyse(&self.scratch, self.config.clip_threshold)
    }

    /// Overall level scaled by a stem's effective gain, with jitter
    fn approximate(&mut self, overall: StemLevel, gain: f32) -> StemLevel {
        if gain <= 0.0 {
            return StemLevel::default();
        }
        let jitter = self.config.jitter.abs();
        let factor = if jitter > 0.0 {
            1.0 + self.rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        let peak = clamp_unit(overall.peak * gain * factor);
        StemLevel {
            rms: clamp_unit(overall.rms * gain * factor),
            peak,
            clipping: peak >= self.config.clip_threshold,
        }
    }

    fn smooth(&mut self, measured: Levels) {
        let s = self.config.smoothing;
        let per_stem = measured
            .per_stem
            .into_iter()
            .map(|(stem, raw)| {
                let prev = self.current.stem(&stem);
                let level = StemLevel {
                    rms: follow(prev.rms, raw.rms, s),
                    peak: follow(prev.peak, raw.peak, s),
                    clipping: raw.clipping,
                };
                (stem, level)
            })
            .collect();

        self.current = Levels {
            per_stem,
            master: MasterLevel {
                left: follow(self.current.master.left, measured.master.left, s),
                right: follow(self.current.master.right, measured.master.right, s),
            },
            approximated: measured.approximated,
        };
    }

    /// Returns true once every level is below the silence floor
    fn decay_step(&mut self) -> bool {
        let decay = self.config.decay;
        let mut loudest = 0.0f32;
        for level in self.current.per_stem.values_mut() {
            level.rms *= decay;
            level.peak *= decay;
            level.clipping = false;
            loudest = loudest.max(level.rms).max(level.peak);
        }
        let master = &mut self.current.master;
        master.left *= decay;
        master.right *= decay;
        loudest = loudest.max(master.left).max(master.right);
        loudest < SILENCE_FLOOR
    }

    fn zero_current(&mut self) {
        for level in self.current.per_stem.values_mut() {
            *level = StemLevel::default();
        }
        self.current.master = MasterLevel::default();
    }

    fn emit_throttled(&mut self, now: Instant) -> Option<Levels> {
        let interval = Duration::from_millis(self.config.emit_interval_ms);
        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        due.then(|| self.emit(now))
    }

    fn emit(&mut self, now: Instant) -> Levels {
        self.emitted = self.current.clone();
        self.last_emit = Some(now);
        let frame = self.emitted.clone();
        self.broadcast(&frame);
        frame
    }

    fn broadcast(&mut self, frame: &Levels) {
        self.subscribers.retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// RMS, peak and clip flag of a block of samples
fn analyse(samples: &[f32], clip_threshold: f32) -> StemLevel {
    if samples.is_empty() {
        return StemLevel::default();
    }
    let mut sum_sq = 0.0f32;
    let mut peak = 0.0f32;
    for &x in samples {
        let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        sum_sq += x * x;
        peak = peak.max(x.abs());
    }
    StemLevel {
        rms: (sum_sq / samples.len() as f32).sqrt(),
        peak,
        clipping: peak >= clip_threshold,
    }
}

/// Instant attack, exponential release
#[inline]
fn follow(prev: f32, next: f32, smoothing: f32) -> f32 {
    if next >= prev {
        next
    } else {
        next + (prev - next) * smoothing
    }
}
