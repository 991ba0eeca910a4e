//! Offline mix export
//!
//! Renders a set of stems through the same graph the live session uses,
//! with a given [`MixState`], into a stereo WAV file. The render runs on an
//! isolated context with a capture destination, as fast as the CPU allows.
//!
//! Length is the longest stem plus `tail_seconds`, so reverb tails ring out.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{
    conform_rate, AudioContext, AudioError, CaptureDestination, GraphError, MediaSource,
    DEFAULT_BLOCK_SIZE,
};
use crate::config::clamp_field;
use crate::effect::EffectsChain;
use crate::graph::{AudioGraphManager, MixGraph, MASTER_BUS_NODES, STEM_GRAPH_NODES};
use crate::mixer::StemChannelController;
use crate::session::MixState;
use crate::types::StemId;

/// Sample format of exported files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitDepth {
    #[default]
    Float32,
    Int16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Silence rendered after the longest stem (seconds)
    pub tail_seconds: f32,
    pub bit_depth: BitDepth,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tail_seconds: 2.0,
            bit_depth: BitDepth::Float32,
        }
    }
}

impl ExportConfig {
    /// Copy with the tail length in its supported range
    pub fn validated(self) -> Self {
        Self {
            tail_seconds: clamp_field("export.tail_seconds", self.tail_seconds, 0.0, 600.0, 2.0),
            ..self
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("Failed to create output directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to export: no stems given")]
    NoStems,

    /// A source without a known length can't bound the render
    #[error("Stem {0} has no known length")]
    UnknownLength(StemId),

    #[error("Stem source error: {0}")]
    Source(#[from] AudioError),

    #[error("Export graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// What an export produced
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub frames: usize,
    pub sample_rate: u32,
    pub stems: usize,
    /// Highest absolute sample value before conversion
    pub peak: f32,
}

impl ExportSummary {
    pub fn duration_secs(&self) -> f32 {
        self.frames as f32 / self.sample_rate as f32
    }
}

/// Render `stems` mixed according to `mix` into a WAV file at `path`
///
/// Stems missing from `mix` play at default settings; entries of `mix`
/// without a source are ignored.
pub fn render_mix_to_wav(
    path: &Path,
    stems: Vec<(StemId, Box<dyn MediaSource>)>,
    mix: &MixState,
    sample_rate: u32,
    config: &ExportConfig,
) -> ExportResult<ExportSummary> {
    if stems.is_empty() {
        return Err(ExportError::NoStems);
    }

    // Lengths are measured at the export rate
    let stems = stems
        .into_iter()
        .map(|(id, source)| Ok((id, conform_rate(source, sample_rate)?)))
        .collect::<ExportResult<Vec<_>>>()?;

    let mut longest = 0;
    for (id, source) in &stems {
        let len = source
            .len_frames()
            .ok_or_else(|| ExportError::UnknownLength(id.clone()))?;
        longest = longest.max(len);
    }
    let tail = (config.tail_seconds.max(0.0) * sample_rate as f32) as usize;
    let total = longest + tail;
    let stem_count = stems.len();

    let block = DEFAULT_BLOCK_SIZE;
    let capture = CaptureDestination::new(block);
    let output = capture.handle();
    let max_nodes = stem_count * STEM_GRAPH_NODES + MASTER_BUS_NODES;
    let context = AudioContext::with_destination(sample_rate, block, max_nodes, Box::new(capture));
    context.resume_if_suspended()?;

    // Offline renders read no meters
    let mut graph = AudioGraphManager::new(context, 1);
    let mut mixer = StemChannelController::new();
    let mut effects = EffectsChain::new();

    for (id, source) in stems {
        mixer.add_stem(id.clone());
        effects.add_stem(id.clone());
        graph.connect(&id, source)?;
    }
    apply_mix(mix, &mut mixer, &mut effects, &mut graph);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let spec = match config.bit_depth {
        BitDepth::Float32 => hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
        BitDepth::Int16 => hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    log::info!(
        "export: rendering {} stem(s), {} frames ({:.1}s) to {:?}",
        stem_count,
        total,
        total as f32 / sample_rate as f32,
        path
    );

    let mut peak = 0.0f32;
    let mut rendered = 0;
    while rendered < total {
        let n = (total - rendered).min(block);
        graph.render(n);
        for frame in output.take() {
            peak = peak.max(frame.peak());
            for sample in [frame.left, frame.right] {
                match config.bit_depth {
                    BitDepth::Float32 => writer.write_sample(sample)?,
                    BitDepth::Int16 => writer.write_sample(to_i16(sample))?,
                }
            }
        }
        rendered += n;
    }
    writer.finalize()?;

    if peak > 1.0 {
        log::warn!("export: mix peaks at {:.2} ({:.1} dBFS), output clips", peak, 20.0 * peak.log10());
    }
    log::info!("export: wrote {:?}", path);

    Ok(ExportSummary {
        path: path.to_path_buf(),
        frames: total,
        sample_rate,
        stems: stem_count,
        peak,
    })
}

/// Push a mix state through the regular setters
fn apply_mix(
    mix: &MixState,
    mixer: &mut StemChannelController,
    effects: &mut EffectsChain,
    graph: &mut dyn MixGraph,
) {
    for (id, snapshot) in &mix.stems {
        if !mixer.contains(id) {
            log::debug!("export: no source for stem {}, skipped", id);
            continue;
        }
        mixer.set_volume(id, snapshot.volume, graph);
        mixer.set_muted(id, snapshot.muted, graph);
        mixer.set_solo(id, snapshot.solo, graph);
        effects.replace(id, snapshot.effects, graph);
    }
    mixer.set_master_volume(mix.master_volume, graph);
    effects.set_enabled(mix.effects_enabled, graph);
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
