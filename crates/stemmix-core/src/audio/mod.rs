//! Audio context, sources and destinations
//!
//! The mix graph never talks to a device directly. It renders blocks into
//! the [`AudioContext`], which forwards them to a [`Destination`]:
//!
//! - **Headless**: output discarded, one block per frame tick
//! - **Capture**: output recorded (offline export, tests)
//! - **Device**: output pushed through a lock-free ring to a CPAL stream
//!
//! # Example Usage
//!
//! ```ignore
//! use stemmix_core::audio::{AudioConfig, AudioContext};
//!
//! let context = AudioContext::shared(&AudioConfig::device(None))?;
//! // After the first user gesture
//! context.resume_if_suspended()?;
//! ```

mod config;
mod context;
mod destination;
mod error;
mod resample;
mod source;

#[cfg(feature = "device-output")]
mod cpal_output;

pub use config::{
    AudioConfig, OutputBackend, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_NODES, DEFAULT_SAMPLE_RATE,
    MAX_BLOCK_SIZE,
};
pub use context::{AudioContext, ContextState, NodeKind, NodeLease, SessionGuard};
pub use destination::{CaptureDestination, CaptureHandle, Destination, NullDestination};
pub use error::{AudioError, AudioResult, GraphError, GraphResult};
pub use resample::{conform_rate, ResampledSource};
pub use source::{BufferSource, MediaSource};

#[cfg(feature = "device-output")]
pub use cpal_output::DeviceDestination;
