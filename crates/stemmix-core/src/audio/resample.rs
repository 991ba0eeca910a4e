//! Sample-rate conversion for stem sources
//!
//! Stems are decoded at their native rate while the graph runs at the
//! context rate. [`ResampledSource`] converts on the fly in fixed input
//! chunks, so it works for streaming and looping sources as well as for
//! decoded buffers.

use std::collections::VecDeque;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::{AudioError, AudioResult};
use super::source::MediaSource;
use crate::types::StereoSample;

/// Input frames handed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

/// Wrap `source` so it delivers frames at `rate`
///
/// Sources already at `rate` are returned unchanged.
pub fn conform_rate(source: Box<dyn MediaSource>, rate: u32) -> AudioResult<Box<dyn MediaSource>> {
    if source.sample_rate() == rate {
        return Ok(source);
    }
    Ok(Box::new(ResampledSource::new(source, rate)?))
}

/// A media source converted to another sample rate
pub struct ResampledSource {
    inner: Box<dyn MediaSource>,
    target_rate: u32,
    ratio: f64,
    resampler: SincFixedIn<f32>,
    scratch: Vec<StereoSample>,
    channels: [Vec<f32>; 2],
    pending: VecDeque<StereoSample>,
    /// Leading output frames still to drop (filter latency)
    skip: usize,
    consumed: usize,
    produced: usize,
    /// Total output length, known once the inner source runs dry
    limit: Option<usize>,
}

impl ResampledSource {
    pub fn new(inner: Box<dyn MediaSource>, target_rate: u32) -> AudioResult<Self> {
        let source_rate = inner.sample_rate();
        let resample_err = |reason: String| AudioError::Resample {
            source_id: inner.source_id().to_string(),
            reason,
        };
        if source_rate == 0 || target_rate == 0 {
            return Err(resample_err(format!("{}Hz to {}Hz", source_rate, target_rate)));
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 2)
            .map_err(|e| resample_err(e.to_string()))?;

        log::debug!(
            "Resampling {} from {}Hz to {}Hz",
            inner.source_id(),
            source_rate,
            target_rate
        );

        Ok(Self {
            skip: resampler.output_delay(),
            inner,
            target_rate,
            ratio,
            resampler,
            scratch: Vec::with_capacity(CHUNK_FRAMES),
            channels: [Vec::with_capacity(CHUNK_FRAMES), Vec::with_capacity(CHUNK_FRAMES)],
            pending: VecDeque::with_capacity(CHUNK_FRAMES * 2),
            consumed: 0,
            produced: 0,
            limit: None,
        })
    }

    fn output_len(&self, input_frames: usize) -> usize {
        (input_frames as f64 * self.ratio).round() as usize
    }

    fn is_drained(&self) -> bool {
        self.limit.is_some_and(|limit| self.produced >= limit)
    }

    /// Run one resampler call and queue its output
    fn fill(&mut self) {
        let waves = if self.limit.is_some() {
            // Inner source is dry: push silence through to flush the filter
            self.resampler.process_partial(None::<&[Vec<f32>]>, None)
        } else {
            let needed = self.resampler.input_frames_next();
            self.scratch.resize(needed, StereoSample::silence());
            let read = self.inner.read(&mut self.scratch[..needed]);
            self.consumed += read;

            let [left, right] = &mut self.channels;
            left.clear();
            right.clear();
            for frame in &self.scratch[..read] {
                left.push(frame.left);
                right.push(frame.right);
            }

            if read < needed {
                self.limit = Some(self.output_len(self.consumed));
                self.resampler.process_partial(Some(&self.channels[..]), None)
            } else {
                self.resampler.process(&self.channels[..], None)
            }
        };

        match waves {
            Ok(waves) => {
                let [left, right] = waves.as_slice() else {
                    self.limit = Some(self.produced);
                    return;
                };
                if left.is_empty() && self.limit.is_some() {
                    self.limit = Some(self.produced);
                }
                for (l, r) in left.iter().zip(right) {
                    if self.skip > 0 {
                        self.skip -= 1;
                        continue;
                    }
                    if self.is_drained() {
                        break;
                    }
                    self.pending.push_back(StereoSample::new(*l, *r));
                    self.produced += 1;
                }
            }
            Err(e) => {
                log::error!("Resampling {} failed: {}", self.inner.source_id(), e);
                self.limit = Some(self.produced);
            }
        }
    }
}

impl MediaSource for ResampledSource {
    fn source_id(&self) -> &str {
        self.inner.source_id()
    }

    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn read(&mut self, out: &mut [StereoSample]) -> usize {
        while self.pending.len() < out.len() && !self.is_drained() {
            self.fill();
        }
        let n = out.len().min(self.pending.len());
        for (slot, frame) in out.iter_mut().zip(self.pending.drain(..n)) {
            *slot = frame;
        }
        n
    }

    fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.is_drained()
    }

    fn rewind(&mut self) {
        self.inner.rewind();
        self.resampler.reset();
        self.skip = self.resampler.output_delay();
        self.pending.clear();
        self.consumed = 0;
        self.produced = 0;
        self.limit = None;
    }

    fn len_frames(&self) -> Option<usize> {
        self.inner.len_frames().map(|n| self.output_len(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferSource;

    fn read_all(source: &mut dyn MediaSource) -> Vec<StereoSample> {
        let mut out = Vec::new();
        let mut block = vec![StereoSample::silence(); 512];
        loop {
            let n = source.read(&mut block);
            out.extend_from_slice(&block[..n]);
            if n < block.len() {
                return out;
            }
        }
    }

    #[test]
    fn test_matching_rate_is_passed_through() {
        let source = Box::new(BufferSource::new("a", vec![StereoSample::mono(0.1); 100], 48000));
        let conformed = conform_rate(source, 48000).unwrap();
        assert_eq!(conformed.len_frames(), Some(100));
    }

    #[test]
    fn test_one_second_at_44k1_lasts_one_second_at_48k() {
        let source = BufferSource::new("dc", vec![StereoSample::mono(0.5); 44100], 44100);
        let mut resampled = ResampledSource::new(Box::new(source), 48000).unwrap();
        assert_eq!(resampled.sample_rate(), 48000);
        assert_eq!(resampled.len_frames(), Some(48000));

        let frames = read_all(&mut resampled);
        assert_eq!(frames.len(), 48000);
        assert!(resampled.is_finished());
        // Level is preserved away from the edges
        assert!((frames[24000].left - 0.5).abs() < 0.02, "{}", frames[24000].left);
        assert!((frames[24000].right - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_downsampling_shortens_source() {
        let source = BufferSource::new("dc", vec![StereoSample::mono(0.25); 9600], 96000);
        let mut resampled = ResampledSource::new(Box::new(source), 48000).unwrap();
        assert_eq!(read_all(&mut resampled).len(), 4800);
    }

    #[test]
    fn test_rewind_restarts_conversion() {
        let source = BufferSource::new("dc", vec![StereoSample::mono(0.5); 4410], 44100);
        let mut resampled = ResampledSource::new(Box::new(source), 48000).unwrap();
        let first = read_all(&mut resampled);
        resampled.rewind();
        assert!(!resampled.is_finished());
        let second = read_all(&mut resampled);
        assert_eq!(first.len(), 4800);
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let source = BufferSource::new("broken", vec![StereoSample::silence(); 8], 0);
        assert!(matches!(
            ResampledSource::new(Box::new(source), 48000),
            Err(AudioError::Resample { .. })
        ));
    }
}
