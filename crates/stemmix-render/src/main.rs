//! Stemmix Render - offline and live mixing of a track's stems
//!
//! Usage:
//!   stemmix-render render --track ID --stem ID=FILE.wav... --out FILE.wav
//!   stemmix-render play --track ID --stem ID=FILE.wav... [--seconds N]
//!   stemmix-render list --track ID
//!   stemmix-render init-config
//!
//! `render` and `play` take `--preset ID` to apply a stored preset (`last`
//! for the quick-save slot); without it every stem plays at unity.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use stemmix_core::audio::{BufferSource, MediaSource};
use stemmix_core::config::{default_config_path, save_config, EngineConfig};
use stemmix_core::export::{render_mix_to_wav, BitDepth};
use stemmix_core::preset::{FileStore, MixPreset, MixPresetStore, QUICK_SAVE_ID};
use stemmix_core::session::{MixSession, MixState};
use stemmix_core::StemId;

/// Host frame interval for live playback (~60 Hz)
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "stemmix-render", about = "Mix a track's stems offline or live")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Stems of one track and the preset to mix them with
#[derive(Args, Debug)]
struct MixInput {
    /// Track id presets are stored under
    #[arg(long)]
    track: String,

    /// Stem source, repeatable
    #[arg(long = "stem", value_name = "ID=FILE", value_parser = parse_stem, required = true)]
    stems: Vec<(StemId, PathBuf)>,

    /// Stored preset to apply
    #[arg(long)]
    preset: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the mix into a WAV file
    Render {
        #[command(flatten)]
        input: MixInput,

        /// Output WAV file
        #[arg(long)]
        out: PathBuf,

        /// Sample format: 16 (integer) or 32 (float)
        #[arg(long, value_parser = parse_bit_depth)]
        bit_depth: Option<BitDepth>,

        /// Seconds rendered after the longest stem
        #[arg(long, value_name = "SECONDS")]
        tail: Option<f32>,
    },
    /// Play the mix through the configured output and print meter levels
    Play {
        #[command(flatten)]
        input: MixInput,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f32>,
    },
    /// Print a track's stored presets
    List {
        #[arg(long)]
        track: String,
    },
    /// Write the default configuration file
    InitConfig,
}

fn parse_stem(arg: &str) -> Result<(StemId, PathBuf), String> {
    match arg.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((StemId::from(id), PathBuf::from(path)))
        }
        _ => Err(format!("expected ID=FILE, got '{}'", arg)),
    }
}

fn parse_bit_depth(arg: &str) -> Result<BitDepth, String> {
    match arg {
        "16" => Ok(BitDepth::Int16),
        "32" => Ok(BitDepth::Float32),
        other => Err(format!("unsupported bit depth '{}' (use 16 or 32)", other)),
    }
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = EngineConfig::load(&config_path);

    match cli.command {
        Commands::Render {
            input,
            out,
            bit_depth,
            tail,
        } => render(&input, &out, bit_depth, tail, &config),
        Commands::Play { input, seconds } => play(&input, seconds, &config),
        Commands::List { track } => list(&track, &config),
        Commands::InitConfig => {
            save_config(&EngineConfig::default(), &config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
            Ok(())
        }
    }
}

fn preset_store(config: &EngineConfig, track: &str) -> MixPresetStore {
    let dir = config.presets.resolved_directory();
    log::debug!("Preset directory: {:?}", dir);
    MixPresetStore::new(Box::new(FileStore::new(dir)), track)
}

fn find_preset(store: &MixPresetStore, id: &str) -> Result<MixPreset> {
    store
        .load_preset(id)?
        .with_context(|| format!("no preset '{}' for track {}", id, store.track_id()))
}

fn load_stems(input: &MixInput) -> Result<Vec<(StemId, BufferSource)>> {
    input
        .stems
        .iter()
        .map(|(id, path)| {
            let source = BufferSource::from_wav(path)
                .with_context(|| format!("Failed to load stem {} from {:?}", id, path))?;
            Ok((id.clone(), source))
        })
        .collect()
}

fn render(
    input: &MixInput,
    out: &Path,
    bit_depth: Option<BitDepth>,
    tail: Option<f32>,
    config: &EngineConfig,
) -> Result<()> {
    let stems = load_stems(input)?;

    let mix = match &input.preset {
        Some(id) => MixState::from_preset(&find_preset(&preset_store(config, &input.track), id)?),
        None => MixState {
            master_volume: 1.0,
            effects_enabled: true,
            stems: Default::default(),
        },
    };

    let mut export = config.export.clone();
    if let Some(bit_depth) = bit_depth {
        export.bit_depth = bit_depth;
    }
    if let Some(tail) = tail {
        export.tail_seconds = tail;
    }

    let sources = stems
        .into_iter()
        .map(|(id, source)| (id, Box::new(source) as Box<dyn MediaSource>))
        .collect();
    let summary = render_mix_to_wav(out, sources, &mix, config.audio.sample_rate, &export)
        .context("Export failed")?;

    println!(
        "Rendered {} stem(s), {:.1}s, peak {:.3} -> {}",
        summary.stems,
        summary.duration_secs(),
        summary.peak,
        summary.path.display()
    );
    Ok(())
}

fn play(input: &MixInput, seconds: Option<f32>, config: &EngineConfig) -> Result<()> {
    let track = input.track.as_str();
    let stems = load_stems(input)?;
    let mut session = MixSession::from_config(config, track).context("Failed to open audio")?;
    let warnings = session.warnings();

    for (id, source) in stems {
        session.connect_stem(&id, Box::new(source));
    }
    if let Some(id) = &input.preset {
        let preset = session
            .load_preset(id)?
            .with_context(|| format!("no preset '{}' for track {}", id, track))?;
        let report = session.apply_preset(&preset);
        log::info!("Applied preset '{}' to {} stem(s)", preset.name, report.applied.len());
    }

    if !session.play() {
        bail!("audio output could not be started");
    }

    let limit = seconds.map(Duration::from_secs_f32);
    let started = Instant::now();
    let mut last_print = started;
    loop {
        let now = Instant::now();
        session.on_frame(now);

        for warning in warnings.try_iter() {
            eprintln!("Warning: {}", warning);
        }

        if now.duration_since(last_print) >= Duration::from_secs(1) {
            last_print = now;
            let levels = session.levels();
            let stems: Vec<String> = levels
                .per_stem
                .iter()
                .map(|(id, level)| {
                    format!("{} {:.2}{}", id, level.rms, if level.clipping { "!" } else { "" })
                })
                .collect();
            println!(
                "master L {:.2} R {:.2} | {}",
                levels.master.left,
                levels.master.right,
                stems.join("  ")
            );
        }

        if session.graph().sources_finished() || limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    session.stop();
    session.close();
    Ok(())
}

fn list(track: &str, config: &EngineConfig) -> Result<()> {
    let store = preset_store(config, track);

    if let Some(last) = store.load_preset(QUICK_SAVE_ID)? {
        println!("last        (quick save, {})", last.updated_at.format("%Y-%m-%d %H:%M"));
    }
    let presets = store.list_presets()?;
    if presets.is_empty() {
        println!("No saved presets for track {}", track);
    }
    for preset in presets {
        println!(
            "{}  {}  ({} stems, master {:.2}, updated {})",
            preset.id,
            preset.name,
            preset.stems.len(),
            preset.master_volume,
            preset.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("stemmix-render").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_render_args() {
        let parsed = cli(&[
            "render", "--track", "t1", "--stem", "vocals=v.wav", "--stem", "drums=d.wav",
            "--out", "mix.wav", "--bit-depth", "16", "--tail", "0.5",
        ])
        .unwrap();
        let Commands::Render {
            input,
            out,
            bit_depth,
            tail,
        } = parsed.command
        else {
            panic!("expected render, got {:?}", parsed.command);
        };
        assert_eq!(input.track, "t1");
        assert_eq!(input.stems.len(), 2);
        assert_eq!(input.stems[1], (StemId::from("drums"), PathBuf::from("d.wav")));
        assert_eq!(out, PathBuf::from("mix.wav"));
        assert_eq!(bit_depth, Some(BitDepth::Int16));
        assert_eq!(tail, Some(0.5));
    }

    #[test]
    fn test_config_flag_is_global() {
        let parsed = cli(&["list", "--track", "t1", "--config", "/tmp/stemmix.yaml"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("/tmp/stemmix.yaml")));
        assert!(matches!(parsed.command, Commands::List { ref track } if track == "t1"));
        assert!(matches!(cli(&["init-config"]).unwrap().command, Commands::InitConfig));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(cli(&[]).is_err());
        assert!(cli(&["render", "--track", "t1", "--stem", "novalue", "--out", "x.wav"]).is_err());
        assert!(cli(&["render", "--track", "t1", "--out", "x.wav"]).is_err());
        assert!(cli(&["render", "--track"]).is_err());
        assert!(cli(&["render", "--bogus"]).is_err());
        assert!(cli(&[
            "render", "--track", "t1", "--stem", "a=a.wav", "--out", "x.wav", "--bit-depth", "24",
        ])
        .is_err());
    }

    #[test]
    fn test_stem_and_bit_depth_parsers() {
        assert_eq!(parse_stem("bass=stems/b.wav").unwrap().0, StemId::from("bass"));
        assert!(parse_stem("=b.wav").is_err());
        assert!(parse_stem("bass=").is_err());
        assert_eq!(parse_bit_depth("32").unwrap(), BitDepth::Float32);
    }
}
