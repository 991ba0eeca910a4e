//! Native Rust processing nodes
//!
//! One node type per stage of the stem chain, plus the gain stage used
//! for stem volume and the master bus.

mod biquad;
mod compressor;
mod eq;
mod gain;
mod reverb;

pub use compressor::CompressorNode;
pub use eq::EqNode;
pub use gain::GainNode;
pub use reverb::ReverbNode;
