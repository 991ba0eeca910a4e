//! Output destinations for the audio context
//!
//! A destination accepts rendered master blocks. The engine asks how many
//! frames it wants on each frame tick and renders exactly that much, so a
//! device destination paces rendering through its ring buffer fill level.

use std::cell::RefCell;
use std::rc::Rc;

use crate::types::{StereoBuffer, StereoSample};

/// Sink for rendered master output
pub trait Destination {
    /// Frames the destination can accept right now
    fn frames_wanted(&self) -> usize;

    /// Accept a rendered block
    ///
    /// Frames beyond what the destination can hold are dropped.
    fn write(&mut self, block: &StereoBuffer);

    /// Name for logging
    fn name(&self) -> &str;
}

/// Headless destination that discards output
///
/// Wants one block per frame tick.
pub struct NullDestination {
    block_size: usize,
}

impl NullDestination {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl Destination for NullDestination {
    fn frames_wanted(&self) -> usize {
        self.block_size
    }

    fn write(&mut self, _block: &StereoBuffer) {}

    fn name(&self) -> &str {
        "null"
    }
}

/// Shared view of the frames written to a [`CaptureDestination`]
#[derive(Clone, Default)]
pub struct CaptureHandle {
    frames: Rc<RefCell<Vec<StereoSample>>>,
}

impl CaptureHandle {
    /// Number of captured frames not yet taken
    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// Take all captured frames, leaving the capture empty
    pub fn take(&self) -> Vec<StereoSample> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }

    /// Copy of the captured frames
    pub fn snapshot(&self) -> Vec<StereoSample> {
        self.frames.borrow().clone()
    }
}

/// Destination that records everything written to it
///
/// Used by the offline exporter and by tests that inspect the master output.
pub struct CaptureDestination {
    block_size: usize,
    handle: CaptureHandle,
}

impl CaptureDestination {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            handle: CaptureHandle::default(),
        }
    }

    /// Handle for reading the captured output after the destination moved
    /// into a context
    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }
}

impl Destination for CaptureDestination {
    fn frames_wanted(&self) -> usize {
        self.block_size
    }

    fn write(&mut self, block: &StereoBuffer) {
        self.handle
            .frames
            .borrow_mut()
            .extend_from_slice(block.as_slice());
    }

    fn name(&self) -> &str {
        "capture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_and_takes() {
        let mut dest = CaptureDestination::new(4);
        let handle = dest.handle();
        dest.write(&StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 4]));
        dest.write(&StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 2]));
        assert_eq!(handle.len(), 6);
        let frames = handle.take();
        assert_eq!(frames[5], StereoSample::mono(0.25));
        assert!(handle.is_empty());
    }

    #[test]
    fn test_null_wants_one_block() {
        let dest = NullDestination::new(256);
        assert_eq!(dest.frames_wanted(), 256);
    }
}
