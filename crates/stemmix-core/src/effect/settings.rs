//! Stage parameter bags, partial updates and named preset tables
//!
//! Settings are plain data owned by [`EffectsChain`](super::EffectsChain);
//! nodes only ever see a clamped copy. Every field of an update is
//! optional so callers can change one knob without restating the others.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::clamp_param;

/// Fixed centre frequency of the mid band (Hz)
pub const EQ_MID_FREQ: f32 = 1000.0;
/// Fixed Q of the mid band
pub const EQ_MID_Q: f32 = 1.0;

/// Band gain range (dB)
pub const EQ_GAIN_RANGE: (f32, f32) = (-12.0, 12.0);
/// Low shelf corner range (Hz)
pub const EQ_LOW_FREQ_RANGE: (f32, f32) = (20.0, 1000.0);
/// High shelf corner range (Hz)
pub const EQ_HIGH_FREQ_RANGE: (f32, f32) = (1000.0, 20000.0);

// ═══════════════════════════════════════════════════════════════════════════════
// Stage Settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Three-band equalizer: low shelf, fixed mid peak, high shelf
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    /// Low shelf gain in dB
    pub low_gain: f32,
    /// Mid peak gain in dB
    pub mid_gain: f32,
    /// High shelf gain in dB
    pub high_gain: f32,
    /// Low shelf corner frequency in Hz
    pub low_freq: f32,
    /// High shelf corner frequency in Hz
    pub high_freq: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            low_gain: 0.0,
            mid_gain: 0.0,
            high_gain: 0.0,
            low_freq: 320.0,
            high_freq: 3200.0,
        }
    }
}

impl EqSettings {
    /// Band gains only, default corner frequencies
    pub fn gains(low_gain: f32, mid_gain: f32, high_gain: f32) -> Self {
        Self {
            low_gain,
            mid_gain,
            high_gain,
            ..Self::default()
        }
    }

    /// Copy with every field inside its legal range
    pub fn clamped(self) -> Self {
        let (gain_min, gain_max) = EQ_GAIN_RANGE;
        Self {
            low_gain: clamp_param(self.low_gain, gain_min, gain_max),
            mid_gain: clamp_param(self.mid_gain, gain_min, gain_max),
            high_gain: clamp_param(self.high_gain, gain_min, gain_max),
            low_freq: clamp_param(self.low_freq, EQ_LOW_FREQ_RANGE.0, EQ_LOW_FREQ_RANGE.1),
            high_freq: clamp_param(self.high_freq, EQ_HIGH_FREQ_RANGE.0, EQ_HIGH_FREQ_RANGE.1),
        }
    }

    pub fn merge(&mut self, update: &EqUpdate) {
        if let Some(v) = update.low_gain {
            self.low_gain = v;
        }
        if let Some(v) = update.mid_gain {
            self.mid_gain = v;
        }
        if let Some(v) = update.high_gain {
            self.high_gain = v;
        }
        if let Some(v) = update.low_freq {
            self.low_freq = v;
        }
        if let Some(v) = update.high_freq {
            self.high_freq = v;
        }
        *self = self.clamped();
    }

    /// True when every band is at 0 dB
    pub fn is_flat(&self) -> bool {
        self.low_gain == 0.0 && self.mid_gain == 0.0 && self.high_gain == 0.0
    }
}

/// Feed-forward dynamics compressor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    /// Threshold in dBFS
    pub threshold: f32,
    /// Compression ratio (1 = no compression)
    pub ratio: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
    /// Soft knee width in dB
    pub knee: f32,
    /// Makeup gain in dB
    pub makeup_gain: f32,
}

/// The default is transparent: a 1:1 ratio never changes gain, whatever
/// the threshold and knee.
impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            ratio: 1.0,
            attack: 0.003,
            release: 0.25,
            knee: 30.0,
            makeup_gain: 0.0,
        }
    }
}

impl CompressorSettings {
    pub fn new(threshold: f32, ratio: f32, attack: f32, release: f32, knee: f32) -> Self {
        Self {
            threshold,
            ratio,
            attack,
            release,
            knee,
            makeup_gain: 0.0,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            threshold: clamp_param(self.threshold, -100.0, 0.0),
            ratio: clamp_param(self.ratio, 1.0, 20.0),
            attack: clamp_param(self.attack, 0.0, 1.0),
            release: clamp_param(self.release, 0.0, 1.0),
            knee: clamp_param(self.knee, 0.0, 40.0),
            makeup_gain: clamp_param(self.makeup_gain, 0.0, 24.0),
        }
    }

    pub fn merge(&mut self, update: &CompressorUpdate) {
        if let Some(v) = update.threshold {
            self.threshold = v;
        }
        if let Some(v) = update.ratio {
            self.ratio = v;
        }
        if let Some(v) = update.attack {
            self.attack = v;
        }
        if let Some(v) = update.release {
            self.release = v;
        }
        if let Some(v) = update.knee {
            self.knee = v;
        }
        if let Some(v) = update.makeup_gain {
            self.makeup_gain = v;
        }
        *self = self.clamped();
    }
}

/// Algorithmic reverb send
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbSettings {
    /// Dry/wet balance (0 = dry only)
    pub mix: f32,
    /// Decay time in seconds
    pub decay: f32,
    /// Pre-delay in milliseconds
    pub pre_delay: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            mix: 0.0,
            decay: 2.0,
            pre_delay: 0.0,
        }
    }
}

impl ReverbSettings {
    pub fn new(mix: f32, decay: f32) -> Self {
        Self {
            mix,
            decay,
            pre_delay: 0.0,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            mix: clamp_param(self.mix, 0.0, 1.0),
            decay: clamp_param(self.decay, 0.1, 10.0),
            pre_delay: clamp_param(self.pre_delay, 0.0, 100.0),
        }
    }

    pub fn merge(&mut self, update: &ReverbUpdate) {
        if let Some(v) = update.mix {
            self.mix = v;
        }
        if let Some(v) = update.decay {
            self.decay = v;
        }
        if let Some(v) = update.pre_delay {
            self.pre_delay = v;
        }
        *self = self.clamped();
    }
}

/// Full effect state of one stem
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemEffects {
    pub eq: EqSettings,
    pub compressor: CompressorSettings,
    pub reverb: ReverbSettings,
}

impl StemEffects {
    pub fn clamped(self) -> Self {
        Self {
            eq: self.eq.clamped(),
            compressor: self.compressor.clamped(),
            reverb: self.reverb.clamped(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Partial Updates
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqUpdate {
    pub low_gain: Option<f32>,
    pub mid_gain: Option<f32>,
    pub high_gain: Option<f32>,
    pub low_freq: Option<f32>,
    pub high_freq: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorUpdate {
    pub threshold: Option<f32>,
    pub ratio: Option<f32>,
    pub attack: Option<f32>,
    pub release: Option<f32>,
    pub knee: Option<f32>,
    pub makeup_gain: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbUpdate {
    pub mix: Option<f32>,
    pub decay: Option<f32>,
    pub pre_delay: Option<f32>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stages and Presets
// ═══════════════════════════════════════════════════════════════════════════════

/// One stage of the fixed EQ → compressor → reverb cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectStage {
    Eq,
    Compressor,
    Reverb,
}

impl EffectStage {
    /// Stages in processing order
    pub const ALL: [EffectStage; 3] = [EffectStage::Eq, EffectStage::Compressor, EffectStage::Reverb];

    pub fn name(&self) -> &'static str {
        match self {
            EffectStage::Eq => "eq",
            EffectStage::Compressor => "compressor",
            EffectStage::Reverb => "reverb",
        }
    }

    /// Names of the built-in presets for this stage
    pub fn preset_names(&self) -> &'static [&'static str] {
        match self {
            EffectStage::Eq => &EQ_PRESET_NAMES,
            EffectStage::Compressor => &COMPRESSOR_PRESET_NAMES,
            EffectStage::Reverb => &REVERB_PRESET_NAMES,
        }
    }
}

impl fmt::Display for EffectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown effect stage: {}", s))
    }
}

pub const EQ_PRESET_NAMES: [&str; 6] = ["flat", "warm", "bright", "bass_boost", "vocal_presence", "scoop"];

pub const COMPRESSOR_PRESET_NAMES: [&str; 6] = ["off", "gentle", "moderate", "heavy", "vocals", "drums"];

pub const REVERB_PRESET_NAMES: [&str; 5] = ["off", "room", "hall", "plate", "ambient"];

/// Look up a named EQ preset
pub fn eq_preset(name: &str) -> Option<EqSettings> {
    let settings = match name {
        "flat" => EqSettings::default(),
        "warm" => EqSettings::gains(3.0, -1.0, -2.0),
        "bright" => EqSettings::gains(-2.0, 0.0, 4.0),
        "bass_boost" => EqSettings::gains(6.0, 0.0, 0.0),
        "vocal_presence" => EqSettings::gains(-2.0, 3.0, 2.0),
        "scoop" => EqSettings::gains(3.0, -4.0, 3.0),
        _ => return None,
    };
    Some(settings)
}

/// Look up a named compressor preset
///
/// `off` is the transparent default.
pub fn compressor_preset(name: &str) -> Option<CompressorSettings> {
    let settings = match name {
        "off" => CompressorSettings::default(),
        "gentle" => CompressorSettings::new(-20.0, 2.0, 0.01, 0.3, 30.0),
        "moderate" => CompressorSettings::new(-24.0, 4.0, 0.003, 0.25, 20.0),
        "heavy" => CompressorSettings::new(-30.0, 8.0, 0.001, 0.1, 10.0),
        "vocals" => CompressorSettings::new(-18.0, 3.0, 0.005, 0.2, 25.0),
        "drums" => CompressorSettings::new(-20.0, 6.0, 0.001, 0.15, 15.0),
        _ => return None,
    };
    Some(settings)
}

/// Look up a named reverb preset
pub fn reverb_preset(name: &str) -> Option<ReverbSettings> {
    let settings = match name {
        "off" => ReverbSettings::new(0.0, 2.0),
        "room" => ReverbSettings::new(0.2, 0.8),
        "hall" => ReverbSettings::new(0.35, 2.5),
        "plate" => ReverbSettings::new(0.4, 1.5),
        "ambient" => ReverbSettings::new(0.5, 4.0),
        _ => return None,
    };
    Some(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_merge_keeps_unspecified_fields() {
        let mut eq = EqSettings::gains(3.0, -1.0, -2.0);
        eq.merge(&EqUpdate {
            high_gain: Some(5.0),
            ..Default::default()
        });
        assert_eq!(eq.low_gain, 3.0);
        assert_eq!(eq.mid_gain, -1.0);
        assert_eq!(eq.high_gain, 5.0);
    }

    #[test]
    fn test_merge_clamps_out_of_range() {
        let mut eq = EqSettings::default();
        eq.merge(&EqUpdate {
            low_gain: Some(40.0),
            low_freq: Some(5.0),
            high_freq: Some(f32::NAN),
            ..Default::default()
        });
        assert_eq!(eq.low_gain, 12.0);
        assert_eq!(eq.low_freq, 20.0);
        assert_eq!(eq.high_freq, 1000.0);

        let mut comp = CompressorSettings::default();
        comp.merge(&CompressorUpdate {
            ratio: Some(0.5),
            makeup_gain: Some(-3.0),
            ..Default::default()
        });
        assert_eq!(comp.ratio, 1.0);
        assert_eq!(comp.makeup_gain, 0.0);

        let mut reverb = ReverbSettings::default();
        reverb.merge(&ReverbUpdate {
            mix: Some(1.7),
            decay: Some(0.0),
            pre_delay: Some(250.0),
        });
        assert_eq!(reverb, ReverbSettings { mix: 1.0, decay: 0.1, pre_delay: 100.0 });
    }

    #[test]
    fn test_every_listed_preset_resolves() {
        for name in EQ_PRESET_NAMES {
            assert!(eq_preset(name).is_some(), "eq preset {}", name);
        }
        for name in COMPRESSOR_PRESET_NAMES {
            assert!(compressor_preset(name).is_some(), "compressor preset {}", name);
        }
        for name in REVERB_PRESET_NAMES {
            assert!(reverb_preset(name).is_some(), "reverb preset {}", name);
        }
        assert!(eq_preset("loudness_war").is_none());
    }

    #[test]
    fn test_presets_are_within_range() {
        for name in COMPRESSOR_PRESET_NAMES {
            let preset = compressor_preset(name).unwrap();
            assert_eq!(preset, preset.clamped());
        }
        assert_eq!(eq_preset("warm").unwrap().low_freq, 320.0);
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("Reverb".parse::<EffectStage>().unwrap(), EffectStage::Reverb);
        assert!("chorus".parse::<EffectStage>().is_err());
    }

    #[test]
    fn test_partial_json_deserializes() {
        let update: CompressorUpdate = serde_json::from_str(r#"{"ratio": 6.0}"#).unwrap();
        assert_eq!(update.ratio, Some(6.0));
        assert_eq!(update.threshold, None);
    }
}
