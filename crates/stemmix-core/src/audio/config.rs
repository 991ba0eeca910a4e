//! Audio context configuration
//!
//! Defines the sample rate, render block size, node pool limit and the
//! destination backend the context writes to.

use serde::{Deserialize, Serialize};

use crate::config::clamp_count;

/// Default sample rate for the audio context (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default render block size (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Maximum render block size to pre-allocate
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Default node pool limit
///
/// A stem graph uses six nodes and the master bus four, so this covers
/// dozens of stems.
pub const DEFAULT_MAX_NODES: usize = 256;

/// Where the context sends its rendered output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputBackend {
    /// Discard output (tests, metering-only hosts)
    #[default]
    Headless,
    /// Play through an audio device via CPAL
    Device {
        /// Device name as reported by the system, or the default device if None
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<String>,
    },
}

/// Configuration for the audio context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Render block size in frames (clamped to [32, MAX_BLOCK_SIZE])
    pub block_size: usize,
    /// Maximum number of live graph nodes
    pub max_nodes: usize,
    /// Output destination
    pub output: OutputBackend,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_nodes: DEFAULT_MAX_NODES,
            output: OutputBackend::Headless,
        }
    }
}

impl AudioConfig {
    /// Headless configuration (no device output)
    pub fn headless() -> Self {
        Self::default()
    }

    /// Device output on the named device, or the default device
    pub fn device(name: Option<String>) -> Self {
        Self {
            output: OutputBackend::Device { device: name },
            ..Self::default()
        }
    }

    /// Copy with the sample rate and node limit in their supported ranges
    pub fn validated(self) -> Self {
        Self {
            sample_rate: clamp_count("audio.sample_rate", self.sample_rate, 8000, 384000),
            max_nodes: clamp_count("audio.max_nodes", self.max_nodes, 16, 1 << 16),
            ..self
        }
    }

    /// Block size after clamping to the supported range
    pub fn effective_block_size(&self) -> usize {
        self.block_size.clamp(32, MAX_BLOCK_SIZE)
    }
}
