//! Engine configuration
//!
//! One YAML file holds every section. Missing sections and fields take
//! their defaults, so an empty or absent file is a valid configuration.
//!
//! ```yaml
//! audio:
//!   sample_rate: 48000
//!   block_size: 512
//!   output:
//!     kind: device
//!     device: "USB Audio"
//! meter:
//!   mode: measured
//!   emit_interval_ms: 50
//! presets:
//!   directory: /home/me/.local/share/stemmix/presets
//! export:
//!   tail_seconds: 2.0
//!   bit_depth: float32
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_preset_dir};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::export::ExportConfig;
use crate::meter::MeterConfig;

/// Where mix presets are stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Preset directory, or the platform data directory if None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl PresetConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_preset_dir)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub meter: MeterConfig,
    pub presets: PresetConfig,
    pub export: ExportConfig,
}

impl EngineConfig {
    /// Load from `path` with every value in its supported range
    pub fn load(path: &Path) -> Self {
        load_config::<Self>(path).validated()
    }

    /// Clamp every section into its supported range
    ///
    /// Each corrected value is logged as a warning.
    pub fn validated(self) -> Self {
        Self {
            audio: self.audio.validated(),
            meter: self.meter.validated(),
            presets: self.presets,
            export: self.export.validated(),
        }
    }
}

/// Clamp a config value into `[min, max]`, or use `default` if it isn't a number
pub(crate) fn clamp_field(field: &str, value: f32, min: f32, max: f32, default: f32) -> f32 {
    let corrected = if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    };
    if corrected != value {
        log::warn!("config: {} = {} is out of range, using {}", field, value, corrected);
    }
    corrected
}

/// Integer counterpart of [`clamp_field`]
pub(crate) fn clamp_count<T>(field: &str, value: T, min: T, max: T) -> T
where
    T: Ord + Copy + std::fmt::Display,
{
    let corrected = value.clamp(min, max);
    if corrected != value {
        log::warn!("config: {} = {} is out of range, using {}", field, value, corrected);
    }
    corrected
}
