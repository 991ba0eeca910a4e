//! Media sources feeding stem inputs
//!
//! A source is identified by `source_id()`; reconnecting a stem to a source
//! with the same id is a no-op in the graph manager.

use std::path::Path;
use std::sync::Arc;

use super::error::{AudioError, AudioResult};
use crate::types::StereoSample;

/// A decoded or streaming audio source for one stem
pub trait MediaSource {
    /// Stable identity of the underlying asset (usually its source URL)
    fn source_id(&self) -> &str;

    /// Native sample rate of the source
    fn sample_rate(&self) -> u32;

    /// Fill `out` with the next frames, returning how many were written
    ///
    /// A short read means the source is exhausted; the caller pads with
    /// silence.
    fn read(&mut self, out: &mut [StereoSample]) -> usize;

    /// Whether the source has no more frames to deliver
    fn is_finished(&self) -> bool;

    /// Rewind to the first frame
    fn rewind(&mut self);

    /// Total length in frames, if known
    fn len_frames(&self) -> Option<usize> {
        None
    }
}

/// In-memory decoded stem audio
///
/// Frames are shared behind an `Arc` so the same decoded asset can back a
/// live source and an export render without copying.
#[derive(Clone)]
pub struct BufferSource {
    id: String,
    frames: Arc<[StereoSample]>,
    sample_rate: u32,
    position: usize,
    looping: bool,
}

impl BufferSource {
    pub fn new(id: impl Into<String>, frames: Vec<StereoSample>, sample_rate: u32) -> Self {
        Self {
            id: id.into(),
            frames: frames.into(),
            sample_rate,
            position: 0,
            looping: false,
        }
    }

    /// Loop back to the start when the end is reached
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Decode a WAV file into memory
    ///
    /// Mono files are duplicated to both channels; channels beyond the
    /// second are ignored. Integer formats are normalized to `[-1, 1]`.
    pub fn from_wav(path: &Path) -> AudioResult<Self> {
        let path_str = path.display().to_string();
        let load_err = |reason: String| AudioError::SourceLoad {
            path: path_str.clone(),
            reason,
        };

        let reader = hound::WavReader::open(path).map_err(|e| load_err(e.to_string()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(load_err("file has no channels".to_string()));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| load_err(e.to_string()))?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| load_err(e.to_string()))?
            }
        };

        let frames: Vec<StereoSample> = samples
            .chunks_exact(channels)
            .map(|frame| match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => StereoSample::silence(),
            })
            .collect();

        log::debug!(
            "Loaded {} ({} frames, {} ch, {}Hz)",
            path_str,
            frames.len(),
            channels,
            spec.sample_rate
        );

        Ok(Self::new(path_str, frames, spec.sample_rate))
    }
}

impl MediaSource for BufferSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [StereoSample]) -> usize {
        if self.frames.is_empty() {
            return 0;
        }

        let mut written = 0;
        while written < out.len() {
            if self.position >= self.frames.len() {
                if !self.looping {
                    break;
                }
                self.position = 0;
            }
            let n = (out.len() - written).min(self.frames.len() - self.position);
            out[written..written + n]
                .copy_from_slice(&self.frames[self.position..self.position + n]);
            self.position += n;
            written += n;
        }
        written
    }

    fn is_finished(&self) -> bool {
        !self.looping && self.position >= self.frames.len()
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn len_frames(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<StereoSample> {
        (0..n).map(|i| StereoSample::mono(i as f32 / n as f32)).collect()
    }

    #[test]
    fn test_short_read_at_end() {
        let mut source = BufferSource::new("ramp", ramp(10), 48000);
        let mut out = vec![StereoSample::silence(); 8];
        assert_eq!(source.read(&mut out), 8);
        assert!(!source.is_finished());
        assert_eq!(source.read(&mut out), 2);
        assert!(source.is_finished());
        assert_eq!(source.read(&mut out), 0);

        source.rewind();
        assert!(!source.is_finished());
    }

    #[test]
    fn test_looping_wraps() {
        let mut source = BufferSource::new("ramp", ramp(4), 48000).looping(true);
        let mut out = vec![StereoSample::silence(); 10];
        assert_eq!(source.read(&mut out), 10);
        assert_eq!(out[4], out[0]);
        assert!(!source.is_finished());
    }

    #[test]
    fn test_wav_roundtrip_mono_int() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [0i16, 16384, -16384, 32767] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let source = BufferSource::from_wav(&path).unwrap();
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.len_frames(), Some(4));
        assert!((source.frames[1].left - 0.5).abs() < 1e-4);
        assert_eq!(source.frames[2].left, source.frames[2].right);
    }

    #[test]
    fn test_missing_wav_is_source_error() {
        let err = BufferSource::from_wav(Path::new("/nonexistent/stem.wav"))
            .err()
            .unwrap();
        assert!(matches!(err, AudioError::SourceLoad { .. }));
    }
}
