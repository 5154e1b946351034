//! Contract with the native streaming engine
//!
//! The session manager treats the engine as an opaque resource: it is built
//! by a factory against the shared render context, produces one local offer,
//! accepts one remote answer, renders frames into the sink it was built with
//! and is disposed exactly once.

use crate::errors::EngineError;
use crate::render::{FrameSink, RenderContext};
use async_trait::async_trait;
use std::sync::Arc;

/// One native per-camera connection
#[async_trait]
pub trait StreamEngine: Send {
    /// Produce the local connection offer (SDP)
    async fn create_offer(&mut self) -> Result<String, EngineError>;

    /// Apply the remote answer (SDP) returned by signaling
    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<(), EngineError>;

    /// Release native resources
    ///
    /// Once this returns the engine performs no further frame callbacks.
    /// Called at most once by [`StreamSession`](crate::session::StreamSession).
    async fn dispose(&mut self) -> Result<(), EngineError>;
}

/// Builds engines bound to the shared render context
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        context: &Arc<RenderContext>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Box<dyn StreamEngine>, EngineError>;
}
