//! Three-band equalizer stage
//!
//! Low shelf → mid peak (1 kHz, Q 1) → high shelf. Bands at 0 dB use
//! passthrough coefficients so a flat EQ is sample-exact.

use crate::effect::settings::{EqSettings, EQ_MID_FREQ, EQ_MID_Q};
use crate::effect::{Effect, EffectBase, EffectInfo};
use crate::types::StereoBuffer;

use super::biquad::{BiquadCoeffs, BiquadState};

/// Band gains below this magnitude (dB) are treated as flat
const FLAT_EPSILON_DB: f32 = 0.01;

pub struct EqNode {
    base: EffectBase,
    sample_rate: f32,
    settings: EqSettings,
    coeffs: [BiquadCoeffs; 3],
    states: [BiquadState; 3],
}

impl EqNode {
    pub fn new(sample_rate: u32) -> Self {
        let mut node = Self {
            base: EffectBase::new(EffectInfo::new("Equalizer", "EQ")),
            sample_rate: sample_rate as f32,
            settings: EqSettings::default(),
            coeffs: [BiquadCoeffs::passthrough(); 3],
            states: [BiquadState::default(); 3],
        };
        node.update_coeffs();
        node
    }

    pub fn settings(&self) -> &EqSettings {
        &self.settings
    }

    /// Apply new band settings. Filter memory is kept so changes are smooth.
    pub fn set_settings(&mut self, settings: &EqSettings) {
        self.settings = settings.clamped();
        self.update_coeffs();
    }

    fn update_coeffs(&mut self) {
        let s = &self.settings;
        let sr = self.sample_rate;

        self.coeffs[0] = if s.low_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::low_shelf(s.low_freq, s.low_gain, sr)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.coeffs[1] = if s.mid_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::peaking(EQ_MID_FREQ, s.mid_gain, EQ_MID_Q, sr)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.coeffs[2] = if s.high_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::high_shelf(s.high_freq, s.high_gain, sr)
        } else {
            BiquadCoeffs::passthrough()
        };
    }
}

impl Effect for EqNode {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() || self.coeffs.iter().all(BiquadCoeffs::is_passthrough) {
            return;
        }

        for sample in buffer.iter_mut() {
            let (mut left, mut right) = (sample.left, sample.right);
            for (state, coeffs) in self.states.iter_mut().zip(self.coeffs.iter()) {
                (left, right) = state.process(left, right, coeffs);
            }
            sample.left = left;
            sample.right = right;
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
        for state in &mut self.states {
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    /// Steady-state amplitude of a sine at `freq` after the EQ
    fn sine_gain(node: &mut EqNode, freq: f32) -> f32 {
        let sr = 48000.0;
        let len = 9600;
        let samples = (0..len)
            .map(|i| StereoSample::mono((2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin() * 0.25))
            .collect();
        let mut buffer = StereoBuffer::from_vec(samples);
        node.process(&mut buffer);
        // Skip the transient
        let peak = buffer.iter().skip(len / 2).map(|s| s.left.abs()).fold(0.0, f32::max);
        peak / 0.25
    }

    #[test]
    fn test_flat_is_sample_exact() {
        let mut node = EqNode::new(48000);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::new(0.3, -0.7); 64]);
        node.process(&mut buffer);
        assert!(buffer.iter().all(|s| *s == StereoSample::new(0.3, -0.7)));
    }

    #[test]
    fn test_low_shelf_boosts_bass_only() {
        let mut node = EqNode::new(48000);
        node.set_settings(&EqSettings::gains(6.0, 0.0, 0.0));
        let low = sine_gain(&mut node, 60.0);
        node.reset();
        let high = sine_gain(&mut node, 10000.0);
        assert!(low > 1.7, "60 Hz gain {}", low);
        assert!((high - 1.0).abs() < 0.1, "10 kHz gain {}", high);
    }

    #[test]
    fn test_mid_cut_attenuates_1k() {
        let mut node = EqNode::new(48000);
        node.set_settings(&EqSettings::gains(0.0, -12.0, 0.0));
        let mid = sine_gain(&mut node, 1000.0);
        assert!(mid < 0.35, "1 kHz gain {}", mid);
    }

    #[test]
    fn test_bypass_leaves_signal() {
        let mut node = EqNode::new(48000);
        node.set_settings(&EqSettings::gains(12.0, 12.0, 12.0));
        node.set_bypass(true);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 32]);
        node.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.left == 0.5));
    }

    #[test]
    fn test_settings_are_clamped() {
        let mut node = EqNode::new(48000);
        node.set_settings(&EqSettings::gains(99.0, 0.0, -99.0));
        assert_eq!(node.settings().low_gain, 12.0);
        assert_eq!(node.settings().high_gain, -12.0);
    }
}
