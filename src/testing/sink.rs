//! Render surface test double

use crate::errors::RenderError;
use crate::render::FrameSink;
use crate::types::VideoFrame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// How a [`RecordingSink`] reacts to frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehavior {
    Record,
    Fail,
    Panic,
}

/// Surface that remembers the sequence number of every frame it got
pub struct RecordingSink {
    behavior: SinkBehavior,
    sequences: Mutex<Vec<u64>>,
    calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(SinkBehavior::Record)
    }

    pub fn failing() -> Arc<Self> {
        Self::with_behavior(SinkBehavior::Fail)
    }

    pub fn panicking() -> Arc<Self> {
        Self::with_behavior(SinkBehavior::Panic)
    }

    pub fn with_behavior(behavior: SinkBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            sequences: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Sequence numbers of recorded frames, in arrival order
    pub fn frames(&self) -> Vec<u64> {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `on_frame` calls, whatever the outcome
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Upcast for `attach_renderer` and friends
    pub fn as_sink(self: &Arc<Self>) -> Arc<dyn FrameSink> {
        self.clone()
    }
}

impl FrameSink for RecordingSink {
    fn on_frame(&self, frame: &VideoFrame) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SinkBehavior::Record => {
                self.sequences
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(frame.sequence);
                Ok(())
            }
            SinkBehavior::Fail => Err(RenderError::new("surface lost")),
            SinkBehavior::Panic => panic!("surface exploded on frame {}", frame.sequence),
        }
    }
}
