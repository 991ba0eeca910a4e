//! Audio and graph error types

use thiserror::Error;

/// Errors raised by audio devices and media sources
#[derive(Error, Debug)]
pub enum AudioError {
    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device output was requested but the crate was built without it
    #[error("Device output is not available in this build")]
    DeviceOutputDisabled,

    /// A stem source could not be decoded
    #[error("Failed to load audio source {path}: {reason}")]
    SourceLoad { path: String, reason: String },

    /// A stem source could not be converted to the context rate
    #[error("Failed to resample {source_id}: {reason}")]
    Resample { source_id: String, reason: String },
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors raised while building or tearing down the live mix graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// The platform audio context could not be created
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(#[from] AudioError),

    /// The shared audio context was closed and will not be recreated
    #[error("Audio context is closed")]
    ContextClosed,

    /// The context is still held by an active session
    #[error("Audio context is in use by {sessions} session(s)")]
    ContextInUse { sessions: usize },

    /// The node pool is exhausted
    #[error("Node allocation failed: {live} of {limit} nodes in use")]
    NodeAllocation { live: usize, limit: usize },

    /// A stem source can't be played at the context rate
    #[error("Unsupported stem source: {0}")]
    UnsupportedSource(#[source] AudioError),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
