//! Stemmix Core - Multi-stem mixing and metering engine

pub mod audio;
pub mod config;
pub mod types;
pub mod effect;
pub mod graph;
pub mod mixer;
pub mod meter;
pub mod preset;
pub mod session;
pub mod export;

pub use types::*;
