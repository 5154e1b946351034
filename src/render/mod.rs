//! Render-side plumbing: frame sinks, the retargetable proxy and the shared
//! rendering context handed to every engine.

pub mod proxy;

pub use proxy::{FrameSinkProxy, ProxyStats};

use crate::errors::RenderError;
use crate::types::VideoFrame;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Consumer of frames produced by an engine's decode thread
///
/// Implementations are called from a native thread and must not block for
/// long; the proxy holds its mutex for the duration of the call.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &VideoFrame) -> Result<(), RenderError>;
}

/// Shared hardware-rendering context
///
/// One context is created by the host and injected into the coordinator;
/// every engine built by the coordinator is bound to it.
#[derive(Debug)]
pub struct RenderContext {
    id: Uuid,
    label: String,
    created_at: DateTime<Utc>,
}

impl RenderContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            created_at: Utc::now(),
        }
    }

    /// Convenience for the common case of a context shared behind an `Arc`
    pub fn shared(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(label))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
