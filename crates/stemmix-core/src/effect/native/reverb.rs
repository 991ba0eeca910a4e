//! Stereo reverb stage
//!
//! Freeverb-style network (eight damped combs into four allpasses per
//! channel) fed by a pre-delay line.
//!
//! Decay time sets the comb feedback from the RT60 relation over the mean
//! comb length: `g = 10^(-3 · L̄ / (fs · decay))`.

use crate::effect::settings::ReverbSettings;
use crate::effect::{Effect, EffectBase, EffectInfo};
use crate::types::StereoBuffer;

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// These are prime-ish numbers to avoid resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Stereo spread offset for right channel (in samples at 44.1kHz)
const STEREO_SPREAD: usize = 23;

/// Allpass feedback coefficient
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

/// High frequency damping inside the combs
const DAMPING: f32 = 0.5;

/// Upper bound on comb feedback for stability at long decays
const MAX_FEEDBACK: f32 = 0.98;

/// Longest supported pre-delay (ms)
const MAX_PRE_DELAY_MS: f32 = 100.0;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass for damping high frequencies
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;

        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Mono delay line for the reverb input
struct PreDelay {
    buffer: Vec<f32>,
    write_pos: usize,
    delay: usize,
}

impl PreDelay {
    fn new(max_len: usize) -> Self {
        Self {
            buffer: vec![0.0; max_len + 1],
            write_pos: 0,
            delay: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.delay == 0 {
            return input;
        }
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;
        let read_pos = (self.write_pos + len - self.delay) % len;
        self.write_pos = (self.write_pos + 1) % len;
        self.buffer[read_pos]
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

pub struct ReverbNode {
    base: EffectBase,
    sample_rate: f32,
    settings: ReverbSettings,
    feedback: f32,
    mean_comb_len: f32,
    pre_delay: PreDelay,
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
}

impl ReverbNode {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let scale = |len: usize| (len as f32 * sr / 44100.0) as usize;

        let combs_l: Vec<_> = COMB_LENGTHS.iter().map(|&len| CombFilter::new(scale(len))).collect();
        let combs_r: Vec<_> = COMB_LENGTHS
            .iter()
            .map(|&len| CombFilter::new(scale(len + STEREO_SPREAD)))
            .collect();
        let allpass_l: Vec<_> = ALLPASS_LENGTHS.iter().map(|&len| AllpassFilter::new(scale(len))).collect();
        let allpass_r: Vec<_> = ALLPASS_LENGTHS
            .iter()
            .map(|&len| AllpassFilter::new(scale(len + STEREO_SPREAD)))
            .collect();

        let mean_comb_len =
            combs_l.iter().map(|c| c.buffer.len() as f32).sum::<f32>() / combs_l.len() as f32;
        let max_pre_delay = (MAX_PRE_DELAY_MS / 1000.0 * sr).ceil() as usize;

        let mut node = Self {
            base: EffectBase::new(EffectInfo::new("Reverb", "Reverb")),
            sample_rate: sr,
            settings: ReverbSettings::default(),
            feedback: 0.0,
            mean_comb_len,
            pre_delay: PreDelay::new(max_pre_delay),
            combs_l,
            combs_r,
            allpass_l,
            allpass_r,
        };
        node.update_params();
        node
    }

    pub fn settings(&self) -> &ReverbSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: &ReverbSettings) {
        self.settings = settings.clamped();
        self.update_params();
    }

    fn update_params(&mut self) {
        let decay = self.settings.decay;
        self.feedback = 10.0_f32
            .powf(-3.0 * self.mean_comb_len / (self.sample_rate * decay))
            .min(MAX_FEEDBACK);
        let delay = (self.settings.pre_delay / 1000.0 * self.sample_rate).round() as usize;
        self.pre_delay.delay = delay.min(self.pre_delay.buffer.len() - 1);
    }

    /// Comb feedback derived from the decay time
    pub fn feedback(&self) -> f32 {
        self.feedback
    }
}

impl Effect for ReverbNode {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        // A dry-only reverb is an identity
        if self.base.is_bypassed() || self.settings.mix <= 0.0 {
            return;
        }

        let wet = self.settings.mix;
        let dry = 1.0 - wet;
        let feedback = self.feedback;

        for sample in buffer.iter_mut() {
            let input = self.pre_delay.process((sample.left + sample.right) * 0.5);

            let mut out_l = 0.0f32;
            let mut out_r = 0.0f32;
            for comb in &mut self.combs_l {
                out_l += comb.process(input, feedback);
            }
            for comb in &mut self.combs_r {
                out_r += comb.process(input, feedback);
            }
            out_l *= COMB_GAIN;
            out_r *= COMB_GAIN;

            for ap in &mut self.allpass_l {
                out_l = ap.process(out_l);
            }
            for ap in &mut self.allpass_r {
                out_r = ap.process(out_r);
            }

            sample.left = out_l * wet + sample.left * dry;
            sample.right = out_r * wet + sample.right * dry;
        }
    }

    fn latency_samples(&self) -> u32 {
        // The decay tail and pre-delay are intentional, not latency
        0
    }

    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.base.set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.base.is_bypassed()
    }

    fn reset(&mut self) {
        self.pre_delay.reset();
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            ap.reset();
        }
    }
}
