//! Dynamics compressor stage
//!
//! Feed-forward, stereo-linked compressor with a quadratic soft knee.
//!
//! # Algorithm
//!
//! 1. The detector level is the stereo peak of each sample, in dBFS.
//! 2. The static curve gives the target gain change for that level:
//!    - below `threshold - knee/2`: 0 dB
//!    - inside the knee: `(1/ratio - 1) · (over + knee/2)² / (2·knee)`
//!    - above the knee: `(1/ratio - 1) · over`
//! 3. A one-pole envelope smooths the gain change in the dB domain,
//!    using the attack coefficient while reduction grows and the release
//!    coefficient while it recovers: `coeff = exp(-1 / (τ · fs))`.
//! 4. Output is scaled by `10^((envelope + makeup) / 20)`.

use crate::effect::settings::CompressorSettings;
use crate::effect::{Effect, EffectBase, EffectInfo};
use crate::types::{db_to_linear, linear_to_db, StereoBuffer};

pub struct CompressorNode {
    base: EffectBase,
    sample_rate: f32,
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    makeup: f32,
    /// Smoothed gain change in dB (always ≤ 0)
    envelope_db: f32,
}

impl CompressorNode {
    pub fn new(sample_rate: u32) -> Self {
        let mut node = Self {
            base: EffectBase::new(EffectInfo::new("Compressor", "Dynamics")),
            sample_rate: sample_rate as f32,
            settings: CompressorSettings::default(),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup: 1.0,
            envelope_db: 0.0,
        };
        node.update_coeffs();
        node
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: &CompressorSettings) {
        self.settings = settings.clamped();
        self.update_coeffs();
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn reduction_db(&self) -> f32 {
        if self.base.is_bypassed() {
            0.0
        } else {
            self.envelope_db
        }
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_coeff(self.settings.attack, self.sample_rate);
        self.release_coeff = time_coeff(self.settings.release, self.sample_rate);
        self.makeup = db_to_linear(self.settings.makeup_gain);
    }

    /// Static curve: gain change in dB for a detector level in dBFS
    fn gain_change_db(&self, level_db: f32) -> f32 {
        let s = &self.settings;
        let slope = 1.0 / s.ratio - 1.0;
        let over = level_db - s.threshold;

        if 2.0 * over < -s.knee {
            0.0
        } else if s.knee > 0.0 && 2.0 * over.abs() <= s.knee {
            let x = over + s.knee / 2.0;
            slope * x * x / (2.0 * s.knee)
        } else {
            slope * over
        }
    }
}

/// One-pole smoothing coefficient for a time constant in seconds
#[inline]
fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

impl Effect for CompressorNode {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        for sample in buffer.iter_mut() {
            let target = self.gain_change_db(linear_to_db(sample.peak()));

            let coeff = if target < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = target + coeff * (self.envelope_db - target);

            let gain = db_to_linear(self.envelope_db) * self.makeup;
            sample.left *= gain;
            sample.right *= gain;
        }
    }

    fn latency_samples(&self) -> u32 {
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
        self.envelope_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::settings::compressor_preset;
    use crate::types::StereoSample;

    fn constant(level: f32, len: usize) -> StereoBuffer {
        StereoBuffer::from_vec(vec![StereoSample::mono(level); len])
    }

    #[test]
    fn test_static_curve_hard_knee() {
        let mut node = CompressorNode::new(48000);
        node.set_settings(&CompressorSettings::new(-20.0, 4.0, 0.0, 0.0, 0.0));
        assert_eq!(node.gain_change_db(-30.0), 0.0);
        // 8 dB over at 4:1 leaves 2 dB over: -6 dB change
        assert!((node.gain_change_db(-12.0) + 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_soft_knee_is_continuous() {
        let mut node = CompressorNode::new(48000);
        node.set_settings(&CompressorSettings::new(-24.0, 4.0, 0.0, 0.0, 20.0));
        let below = node.gain_change_db(-34.0001);
        let at_lower_edge = node.gain_change_db(-33.9999);
        assert!((below - at_lower_edge).abs() < 1e-3);
        let inside = node.gain_change_db(-14.0001);
        let outside = node.gain_change_db(-13.9999);
        assert!((inside - outside).abs() < 1e-3);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut node = CompressorNode::new(48000);
        node.set_settings(&compressor_preset("heavy").unwrap());
        let mut buffer = constant(0.9, 4800);
        node.process(&mut buffer);
        assert!(node.reduction_db() < -10.0, "reduction {}", node.reduction_db());
        assert!(buffer[4799].left < 0.3);
    }

    #[test]
    fn test_off_preset_is_transparent() {
        let mut node = CompressorNode::new(48000);
        node.set_settings(&compressor_preset("off").unwrap());
        let mut buffer = constant(0.95, 1024);
        node.process(&mut buffer);
        assert!(buffer.iter().all(|s| (s.left - 0.95).abs() < 1e-6));
        assert_eq!(node.reduction_db(), 0.0);
    }

    #[test]
    fn test_makeup_gain_applied() {
        let mut node = CompressorNode::new(48000);
        let mut settings = CompressorSettings::default();
        settings.makeup_gain = 6.0;
        node.set_settings(&settings);
        let mut buffer = constant(0.25, 16);
        node.process(&mut buffer);
        assert!((buffer[15].left - 0.25 * db_to_linear(6.0)).abs() < 1e-4);
    }

    #[test]
    fn test_release_recovers_after_reset() {
        let mut node = CompressorNode::new(48000);
        node.set_settings(&compressor_preset("moderate").unwrap());
        let mut buffer = constant(1.0, 2400);
        node.process(&mut buffer);
        assert!(node.reduction_db() < 0.0);
        node.reset();
        assert_eq!(node.reduction_db(), 0.0);
    }
}
