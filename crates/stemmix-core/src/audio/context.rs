//! Process-wide audio context
//!
//! The context owns the sample rate, the render block size, the node pool
//! and the output destination. One shared instance is created lazily on the
//! engine thread and reused by every track session:
//!
//! - [`AudioContext::shared`] is get-or-create. A closed shared context is
//!   reported as [`GraphError::ContextClosed`], never silently recreated.
//! - A fresh context starts suspended; [`AudioContext::resume_if_suspended`]
//!   is called once the host has seen a user gesture.
//! - [`AudioContext::close`] is refused while any session holds the context.
//!
//! The engine is single-threaded, so the context is reference counted with
//! `Rc` and its counters are plain `Cell`s. Graph nodes hold a
//! [`NodeLease`] that returns its pool slot when dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::config::{AudioConfig, OutputBackend};
use super::destination::{Destination, NullDestination};
use super::error::{GraphError, GraphResult};
use crate::types::StereoBuffer;

thread_local! {
    static SHARED_CONTEXT: RefCell<Option<AudioContext>> = const { RefCell::new(None) };
}

/// Lifecycle state of the audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not yet allowed to produce sound
    Suspended,
    Running,
    Closed,
}

/// Kind of node a lease was taken for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Equalizer,
    Compressor,
    Reverb,
    Gain,
    Analyser,
    Splitter,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Source => "source",
            NodeKind::Equalizer => "eq",
            NodeKind::Compressor => "compressor",
            NodeKind::Reverb => "reverb",
            NodeKind::Gain => "gain",
            NodeKind::Analyser => "analyser",
            NodeKind::Splitter => "splitter",
        };
        f.write_str(name)
    }
}

struct ContextInner {
    sample_rate: u32,
    block_size: usize,
    max_nodes: usize,
    state: Cell<ContextState>,
    live_nodes: Cell<usize>,
    sessions: Cell<usize>,
    destination: RefCell<Box<dyn Destination>>,
}

/// Handle to an audio context. Cloning shares the same context.
#[derive(Clone)]
pub struct AudioContext {
    inner: Rc<ContextInner>,
}

impl AudioContext {
    /// Create an isolated context from configuration
    ///
    /// Device output is opened immediately; failures surface as
    /// [`GraphError::ContextUnavailable`].
    pub fn new(config: &AudioConfig) -> GraphResult<Self> {
        let config = config.clone().validated();
        let block_size = config.effective_block_size();
        let destination: Box<dyn Destination> = match &config.output {
            OutputBackend::Headless => Box::new(NullDestination::new(block_size)),
            OutputBackend::Device { device } => {
                open_device(device.as_deref(), config.sample_rate, block_size)?
            }
        };
        Ok(Self::with_destination(
            config.sample_rate,
            block_size,
            config.max_nodes,
            destination,
        ))
    }

    /// Create an isolated context writing to the given destination
    pub fn with_destination(
        sample_rate: u32,
        block_size: usize,
        max_nodes: usize,
        destination: Box<dyn Destination>,
    ) -> Self {
        log::info!(
            "Audio context created: {}Hz, block {} frames, {} node limit, destination {}",
            sample_rate,
            block_size,
            max_nodes,
            destination.name()
        );
        Self {
            inner: Rc::new(ContextInner {
                sample_rate,
                block_size,
                max_nodes,
                state: Cell::new(ContextState::Suspended),
                live_nodes: Cell::new(0),
                sessions: Cell::new(0),
                destination: RefCell::new(destination),
            }),
        }
    }

    /// Get the shared context for this engine thread, creating it on first use
    pub fn shared(config: &AudioConfig) -> GraphResult<Self> {
        SHARED_CONTEXT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(context) = slot.as_ref() {
                if context.state() == ContextState::Closed {
                    return Err(GraphError::ContextClosed);
                }
                return Ok(context.clone());
            }
            let context = Self::new(config)?;
            *slot = Some(context.clone());
            Ok(context)
        })
    }

    pub fn state(&self) -> ContextState {
        self.inner.state.get()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Resume a suspended context. Running contexts are left alone.
    pub fn resume_if_suspended(&self) -> GraphResult<()> {
        match self.state() {
            ContextState::Suspended => {
                self.inner.state.set(ContextState::Running);
                log::info!("Audio context resumed");
                Ok(())
            }
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(GraphError::ContextClosed),
        }
    }

    pub fn suspend(&self) {
        if self.state() == ContextState::Running {
            self.inner.state.set(ContextState::Suspended);
            log::debug!("Audio context suspended");
        }
    }

    /// Close the context. Refused while a session holds it.
    pub fn close(&self) -> GraphResult<()> {
        let sessions = self.inner.sessions.get();
        if sessions > 0 {
            return Err(GraphError::ContextInUse { sessions });
        }
        if self.state() != ContextState::Closed {
            self.inner.state.set(ContextState::Closed);
            log::info!("Audio context closed");
        }
        Ok(())
    }

    /// Number of node leases currently alive
    pub fn live_nodes(&self) -> usize {
        self.inner.live_nodes.get()
    }

    pub fn max_nodes(&self) -> usize {
        self.inner.max_nodes
    }

    /// Number of sessions currently holding the context
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.get()
    }

    /// Take a node slot from the pool
    pub fn allocate(&self, kind: NodeKind) -> GraphResult<NodeLease> {
        if self.state() == ContextState::Closed {
            return Err(GraphError::ContextClosed);
        }
        let live = self.inner.live_nodes.get();
        if live >= self.inner.max_nodes {
            return Err(GraphError::NodeAllocation {
                live,
                limit: self.inner.max_nodes,
            });
        }
        self.inner.live_nodes.set(live + 1);
        Ok(NodeLease {
            context: Rc::downgrade(&self.inner),
            kind,
        })
    }

    /// Register a session; the context cannot close until the guard drops
    pub fn acquire_session(&self) -> SessionGuard {
        self.inner.sessions.set(self.inner.sessions.get() + 1);
        SessionGuard {
            context: Rc::downgrade(&self.inner),
        }
    }

    /// Frames the destination can take right now (0 unless running)
    pub fn frames_wanted(&self) -> usize {
        if self.state() != ContextState::Running {
            return 0;
        }
        self.inner.destination.borrow().frames_wanted()
    }

    /// Hand a rendered master block to the destination
    pub fn write_destination(&self, block: &StereoBuffer) {
        self.inner.destination.borrow_mut().write(block);
    }
}

#[cfg(feature = "device-output")]
fn open_device(
    device: Option<&str>,
    sample_rate: u32,
    block_size: usize,
) -> GraphResult<Box<dyn Destination>> {
    let destination = super::cpal_output::DeviceDestination::open(device, sample_rate, block_size)?;
    Ok(Box::new(destination))
}

#[cfg(not(feature = "device-output"))]
fn open_device(
    _device: Option<&str>,
    _sample_rate: u32,
    _block_size: usize,
) -> GraphResult<Box<dyn Destination>> {
    Err(super::error::AudioError::DeviceOutputDisabled.into())
}

/// A slot in the context's node pool, released on drop
pub struct NodeLease {
    context: Weak<ContextInner>,
    kind: NodeKind,
}

impl NodeLease {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        if let Some(inner) = self.context.upgrade() {
            inner.live_nodes.set(inner.live_nodes.get().saturating_sub(1));
        }
    }
}

/// Marks a session as holding the context
pub struct SessionGuard {
    context: Weak<ContextInner>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.context.upgrade() {
            inner.sessions.set(inner.sessions.get().saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_context(max_nodes: usize) -> AudioContext {
        AudioContext::with_destination(48000, 128, max_nodes, Box::new(NullDestination::new(128)))
    }

    #[test]
    fn test_starts_suspended_and_resumes() {
        let context = small_context(8);
        assert_eq!(context.state(), ContextState::Suspended);
        assert_eq!(context.frames_wanted(), 0);
        context.resume_if_suspended().unwrap();
        assert_eq!(context.state(), ContextState::Running);
        assert_eq!(context.frames_wanted(), 128);
        // Idempotent
        context.resume_if_suspended().unwrap();
        assert_eq!(context.state(), ContextState::Running);
    }

    #[test]
    fn test_node_pool_limit_and_release() {
        let context = small_context(2);
        let a = context.allocate(NodeKind::Gain).unwrap();
        let _b = context.allocate(NodeKind::Analyser).unwrap();
        assert_eq!(context.live_nodes(), 2);
        assert!(matches!(
            context.allocate(NodeKind::Gain),
            Err(GraphError::NodeAllocation { live: 2, limit: 2 })
        ));
        drop(a);
        assert_eq!(context.live_nodes(), 1);
        assert!(context.allocate(NodeKind::Source).is_ok());
    }

    #[test]
    fn test_close_refused_while_session_active() {
        let context = small_context(4);
        let guard = context.acquire_session();
        assert!(matches!(
            context.close(),
            Err(GraphError::ContextInUse { sessions: 1 })
        ));
        drop(guard);
        context.close().unwrap();
        assert_eq!(context.state(), ContextState::Closed);
        assert!(matches!(context.resume_if_suspended(), Err(GraphError::ContextClosed)));
        assert!(matches!(context.allocate(NodeKind::Gain), Err(GraphError::ContextClosed)));
    }

    #[test]
    fn test_shared_context_is_reused_and_not_recreated() {
        // Each test runs on its own thread, so this slot is fresh
        let config = AudioConfig::headless();
        let first = AudioContext::shared(&config).unwrap();
        let second = AudioContext::shared(&config).unwrap();
        assert!(Rc::ptr_eq(&first.inner, &second.inner));

        first.close().unwrap();
        assert!(matches!(
            AudioContext::shared(&config),
            Err(GraphError::ContextClosed)
        ));
    }
}
