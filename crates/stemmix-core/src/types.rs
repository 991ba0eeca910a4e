//! Common types for stemmix
//!
//! This module contains the fundamental audio types used throughout the
//! mixing engine: stereo sample/buffer handling, stem identity and the
//! clamping helpers every parameter passes through before reaching a node.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Default sample rate used throughout stemmix (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Kind of isolated component a stem represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemType {
    Vocals,
    Drums,
    Bass,
    Other,
    Piano,
    Guitar,
    Melody,
    Instrumental,
}

impl StemType {
    /// Get all stem types in display order
    pub const ALL: [StemType; 8] = [
        StemType::Vocals,
        StemType::Drums,
        StemType::Bass,
        StemType::Other,
        StemType::Piano,
        StemType::Guitar,
        StemType::Melody,
        StemType::Instrumental,
    ];

    /// Get the lowercase name of this stem type
    pub fn name(&self) -> &'static str {
        match self {
            StemType::Vocals => "vocals",
            StemType::Drums => "drums",
            StemType::Bass => "bass",
            StemType::Other => "other",
            StemType::Piano => "piano",
            StemType::Guitar => "guitar",
            StemType::Melody => "melody",
            StemType::Instrumental => "instrumental",
        }
    }

    /// Parse a stem type from its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for StemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stem identifier, unique within a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StemId(pub String);

impl StemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One isolated component of a track, immutable for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stem {
    pub id: StemId,
    pub stem_type: StemType,
    /// Address of the decoded audio asset produced by the separation backend
    pub source_url: String,
}

impl Stem {
    pub fn new(id: impl Into<StemId>, stem_type: StemType, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stem_type,
            source_url: source_url.into(),
        }
    }
}

/// Clamp a value into `[min, max]`, mapping NaN to `0.0` first
///
/// `f32::clamp` propagates NaN, which would leak straight into a gain stage.
#[inline]
pub fn clamp_param(value: f32, min: f32, max: f32) -> f32 {
    let value = if value.is_nan() { 0.0 } else { value };
    value.clamp(min, max)
}

/// Clamp a volume into `[0, 1]`
#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    clamp_param(value, 0.0, 1.0)
}

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear amplitude factor to decibels (floored at -120 dB)
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-6).log10()
}

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Average of both channels
    #[inline]
    pub fn mid(&self) -> Sample {
        (self.left + self.right) * 0.5
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// This is the block type every node in the mix graph processes in place.
/// Render-path buffers are pre-allocated once and resized within capacity.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new empty buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer
    ///
    /// Fills any newly exposed elements with silence. Never reallocates as
    /// long as `new_len <= capacity`.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_type_names_roundtrip() {
        for stem_type in StemType::ALL {
            assert_eq!(StemType::from_name(stem_type.name()), Some(stem_type));
        }
        assert_eq!(StemType::from_name("VOCALS"), Some(StemType::Vocals));
        assert_eq!(StemType::from_name("kazoo"), None);
    }

    #[test]
    fn test_stem_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&StemId::from("vocals-1")).unwrap();
        assert_eq!(json, "\"vocals-1\"");
    }

    #[test]
    fn test_clamp_param() {
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(0.25), 0.25);
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert_eq!(clamp_unit(f32::INFINITY), 1.0);
        assert_eq!(clamp_param(f32::NEG_INFINITY, -12.0, 12.0), -12.0);
    }

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0) - 0.501).abs() < 0.001);
        assert!((linear_to_db(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_buffer_set_len_preserves_capacity() {
        let mut buffer = StereoBuffer::with_capacity(64);
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 64);
        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.as_slice().iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_buffer_add_and_scale() {
        let mut a = StereoBuffer::from_vec(vec![StereoSample::new(0.5, -0.5); 4]);
        let b = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 4]);
        a.add_buffer(&b);
        a.scale(2.0);
        assert_eq!(a[0], StereoSample::new(1.5, -0.5));
        assert!((a.peak() - 1.5).abs() < 1e-6);
        assert_eq!(a.as_interleaved().len(), 8);
    }
}
