//! Analyser taps
//!
//! A tap is a read-only point in the graph. It keeps the most recent
//! `size` time-domain samples in a ring and never alters the signal.

use crate::types::StereoBuffer;

/// Which part of a stereo block a tap records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapChannel {
    /// Whichever channel is louder at each sample (per-stem taps)
    Loudest,
    Left,
    Right,
}

pub struct AnalyserTap {
    channel: TapChannel,
    buffer: Vec<f32>,
    write_pos: usize,
    filled: usize,
}

impl AnalyserTap {
    pub fn new(size: usize, channel: TapChannel) -> Self {
        Self {
            channel,
            buffer: vec![0.0; size.max(1)],
            write_pos: 0,
            filled: 0,
        }
    }

    /// Ring capacity in samples
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Samples recorded so far, capped at the ring capacity
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn channel(&self) -> TapChannel {
        self.channel
    }

    /// Record a processed block
    pub fn push_block(&mut self, block: &StereoBuffer) {
        for sample in block.iter() {
            let value = match self.channel {
                TapChannel::Loudest => {
                    if sample.left.abs() >= sample.right.abs() {
                        sample.left
                    } else {
                        sample.right
                    }
                }
                TapChannel::Left => sample.left,
                TapChannel::Right => sample.right,
            };
            self.push(value);
        }
    }

    #[inline]
    pub fn push(&mut self, value: f32) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.filled = (self.filled + 1).min(self.buffer.len());
    }

    /// Copy the recorded samples, oldest first, into `out`
    pub fn time_domain(&self, out: &mut Vec<f32>) {
        out.clear();
        let size = self.buffer.len();
        let start = (self.write_pos + size - self.filled) % size;
        out.extend((0..self.filled).map(|i| self.buffer[(start + i) % size]));
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
    }
}
