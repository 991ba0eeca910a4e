//! Channel strip control: volume, mute, solo and master volume

mod channel;

pub use channel::{StemChannelController, StemChannelState};
