//! Retargetable frame forwarding between an engine and the UI
//!
//! The engine is handed the proxy once at construction and keeps calling
//! [`FrameSinkProxy::on_frame`] from its decode thread. The UI binds and
//! unbinds concrete surfaces at any time. Target swaps and deliveries share
//! one mutex, so once `set_target(None)` returns the previous surface will
//! never see another frame.

use super::FrameSink;
use crate::errors::RenderError;
use crate::types::VideoFrame;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

struct ProxyState {
    target: Option<Weak<dyn FrameSink>>,
    suspended: bool,
}

/// Frame delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub struct FrameSinkProxy {
    state: Mutex<ProxyState>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl FrameSinkProxy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProxyState {
                target: None,
                suspended: false,
            }),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    // A panicking sink is caught inside the critical section, so poisoning
    // can only come from a bug in this module; the state stays consistent.
    fn lock_state(&self) -> MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the forwarding target
    ///
    /// The proxy only keeps a weak reference; the surface's lifetime stays
    /// with its owner.
    pub fn set_target(&self, sink: Option<&Arc<dyn FrameSink>>) {
        let mut state = self.lock_state();
        state.target = sink.map(Arc::downgrade);
        log::debug!(
            "Frame sink proxy target {}",
            if sink.is_some() { "attached" } else { "cleared" }
        );
    }

    /// Clear the target only if it is still `sink`
    ///
    /// Returns false when a newer surface already replaced it, in which case
    /// the newer binding is left untouched.
    pub fn detach_if_matches(&self, sink: &Arc<dyn FrameSink>) -> bool {
        let mut state = self.lock_state();
        let matches = state
            .target
            .as_ref()
            .is_some_and(|current| same_sink(current, sink));

        if matches {
            state.target = None;
            log::debug!("Frame sink proxy target detached");
        } else {
            log::debug!("Ignoring stale detach for a surface that is no longer the target");
        }
        matches
    }

    /// Whether a live target is currently bound
    pub fn has_target(&self) -> bool {
        self.lock_state()
            .target
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Clear the target and drop every frame until [`resume_delivery`] is called
    ///
    /// Used while an engine is being torn down; a surface attached in the
    /// meantime is kept and starts receiving once delivery resumes.
    ///
    /// [`resume_delivery`]: FrameSinkProxy::resume_delivery
    pub fn suspend_delivery(&self) {
        let mut state = self.lock_state();
        state.target = None;
        state.suspended = true;
    }

    pub fn resume_delivery(&self) {
        self.lock_state().suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.lock_state().suspended
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, frame: &VideoFrame) {
        let mut state = self.lock_state();
        if state.suspended {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(weak) = state.target.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let Some(sink) = weak.upgrade() else {
            // The surface went away without detaching.
            state.target = None;
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| sink.on_frame(frame))) {
            Ok(Ok(())) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("Render target failed on frame {}: {}", frame.sequence, e);
            }
            Err(panic) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Render target panicked on frame {}: {}",
                    frame.sequence,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

impl Default for FrameSinkProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for FrameSinkProxy {
    /// Producer entry point; render failures never reach the decode thread
    fn on_frame(&self, frame: &VideoFrame) -> Result<(), RenderError> {
        self.deliver(frame);
        Ok(())
    }
}

fn same_sink(current: &Weak<dyn FrameSink>, sink: &Arc<dyn FrameSink>) -> bool {
    std::ptr::addr_eq(current.as_ptr(), Arc::as_ptr(sink))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
