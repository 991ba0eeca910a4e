//! Preset storage errors

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresetError {
    /// File-backed store I/O failure
    #[error("Preset file error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded
    #[error("Failed to serialize presets: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Preset name must not be empty")]
    EmptyName,
}

/// Result type for preset operations
pub type PresetResult<T> = Result<T, PresetError>;
