//! CPAL device destination
//!
//! The engine thread renders master blocks and pushes them into a
//! lock-free ring buffer; the CPAL callback only pops from it.
//!
//! ```text
//! ┌──────────────────┐   push()    ┌─────────────────────┐   pop()   ┌───────────────────┐
//! │  Engine thread   │────────────►│  Sample ring (SPSC) │──────────►│ CPAL audio thread │
//! │ (frame tick)     │             │  4 × block size     │           │ (device callback) │
//! └──────────────────┘             └─────────────────────┘           └───────────────────┘
//! ```
//!
//! The callback never blocks. An empty ring plays silence.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};

use super::destination::Destination;
use super::error::{AudioError, AudioResult};
use crate::types::{StereoBuffer, StereoSample};

/// Destination that plays through an audio device
///
/// Keeps the output stream alive. Drop this to stop audio.
pub struct DeviceDestination {
    producer: rtrb::Producer<StereoSample>,
    _stream: Stream,
    name: String,
}

impl DeviceDestination {
    /// Open an output stream on the named device (or the default device)
    pub fn open(device_name: Option<&str>, sample_rate: u32, block_size: usize) -> AudioResult<Self> {
        let device = match device_name {
            Some(name) => find_device_by_name(name)?,
            None => default_device()?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", name);

        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
            .map(|c| c.with_sample_rate(SampleRate(sample_rate)))
            .ok_or_else(|| {
                AudioError::ConfigError(format!("{} has no f32 output at {}Hz", name, sample_rate))
            })?;

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        log::info!(
            "Audio config: {} channels, {}Hz, ring {} frames",
            config.channels,
            sample_rate,
            block_size * 4
        );

        // 4x block size absorbs jitter between frame ticks and device callbacks
        let (producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(block_size * 4);
        let stream = build_output_stream(&device, &config, consumer)?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        Ok(Self {
            producer,
            _stream: stream,
            name,
        })
    }
}

impl Destination for DeviceDestination {
    fn frames_wanted(&self) -> usize {
        self.producer.slots()
    }

    fn write(&mut self, block: &StereoBuffer) {
        for sample in block.iter() {
            if self.producer.push(*sample).is_err() {
                log::debug!("Device ring full, dropping {} frames", block.len());
                break;
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

fn find_device_by_name(name: &str) -> AudioResult<cpal::Device> {
    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(mut devices) = host.output_devices() {
                if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    return Ok(device);
                }
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: rtrb::Consumer<StereoSample>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    match consumer.pop() {
                        Ok(sample) => {
                            frame[0] = sample.left;
                            if channels > 1 {
                                frame[1] = sample.right;
                            }
                            for ch in frame.iter_mut().skip(2) {
                                *ch = 0.0;
                            }
                        }
                        Err(_) => {
                            // Underrun: nothing rendered yet
                            frame.fill(0.0);
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
