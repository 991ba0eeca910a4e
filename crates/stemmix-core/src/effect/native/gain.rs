//! Gain stage with click-free parameter changes
//!
//! Used for per-stem volume (including the mute/solo override) and the
//! master bus. A new target is reached by a linear ramp across the next
//! processed block, so gain jumps never produce a discontinuity.

use crate::effect::{Effect, EffectBase, EffectInfo};
use crate::types::StereoBuffer;

pub struct GainNode {
    base: EffectBase,
    current: f32,
    target: f32,
    /// No block processed yet; the first target is applied immediately
    primed: bool,
}

impl GainNode {
    pub fn new(initial: f32) -> Self {
        Self {
            base: EffectBase::new(EffectInfo::new("Gain", "Utility")),
            current: initial,
            target: initial,
            primed: false,
        }
    }

    /// Set the gain that the next processed block ramps to
    pub fn set_target(&mut self, gain: f32) {
        self.target = gain;
        if !self.primed {
            self.current = gain;
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}

impl Effect for GainNode {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        self.primed = true;
        if self.base.is_bypassed() || buffer.is_empty() {
            return;
        }

        if self.current == self.target {
            if self.current != 1.0 {
                buffer.scale(self.current);
            }
            return;
        }

        let step = (self.target - self.current) / buffer.len() as f32;
        let mut gain = self.current;
        for sample in buffer.iter_mut() {
            gain += step;
            *sample *= gain;
        }
        self.current = self.target;
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
        self.current = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_first_target_applies_immediately() {
        let mut node = GainNode::new(1.0);
        node.set_target(0.0);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 8]);
        node.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.left == 0.0));
    }

    #[test]
    fn test_change_ramps_across_block() {
        let mut node = GainNode::new(1.0);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 4]);
        node.process(&mut buffer);

        node.set_target(0.0);
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 4]);
        node.process(&mut buffer);
        let values: Vec<f32> = buffer.iter().map(|s| s.left).collect();
        assert_eq!(values, vec![0.75, 0.5, 0.25, 0.0]);
        assert_eq!(node.current(), 0.0);

        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 4]);
        node.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.left == 0.0));
    }
}
