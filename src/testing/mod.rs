//! Test doubles and synthetic data
//!
//! A synthetic engine, a scripted signaling endpoint and a recording render
//! surface. The CLI runs on these too, so the switching logic can be driven
//! end to end without a media server.

pub mod engine;
pub mod signaling;
pub mod sink;
pub mod synthetic_data;

pub use engine::{EngineFailure, SyntheticEngine, SyntheticEngineFactory};
pub use signaling::{ScriptedSignaling, SignalingScript};
pub use sink::{RecordingSink, SinkBehavior};
pub use synthetic_data::{synthetic_answer_sdp, synthetic_frame, synthetic_offer_sdp};

use crate::config::SessionConfig;
use crate::directory::StaticDeviceDirectory;
use crate::render::{FrameSink, FrameSinkProxy, RenderContext};
use crate::session::{SessionCoordinator, SessionEnvironment};
use crate::types::{DeviceId, StreamPath};
use std::sync::Arc;

/// Wires synthetic collaborators together with short timings
pub struct TestHarness {
    pub directory: Arc<StaticDeviceDirectory>,
    pub engines: SyntheticEngineFactory,
    pub signaling: Arc<ScriptedSignaling>,
    pub render_context: Arc<RenderContext>,
    pub proxy: Arc<FrameSinkProxy>,
    pub session_config: SessionConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_parts(SyntheticEngineFactory::new(), ScriptedSignaling::new())
    }

    pub fn with_parts(engines: SyntheticEngineFactory, signaling: ScriptedSignaling) -> Self {
        Self {
            directory: Arc::new(StaticDeviceDirectory::new()),
            engines,
            signaling: Arc::new(signaling),
            render_context: RenderContext::shared("test-egl"),
            proxy: Arc::new(FrameSinkProxy::new()),
            session_config: SessionConfig {
                quiescence_delay_ms: 5,
                signaling_timeout_ms: 2_000,
            },
        }
    }

    /// Register a device under `live/<id>` and return its id
    pub fn device(&self, id: &str) -> DeviceId {
        let device_id = DeviceId::from(id);
        self.directory
            .insert(device_id.clone(), StreamPath::new("live", id, "play"));
        device_id
    }

    /// Environment for driving a `StreamSession` directly; frames go to `proxy`
    pub fn environment(&self) -> SessionEnvironment {
        let sink: Arc<dyn FrameSink> = self.proxy.clone();
        SessionEnvironment {
            directory: self.directory.clone(),
            signaling: self.signaling.clone(),
            engines: Arc::new(self.engines.clone()),
            render_context: Arc::clone(&self.render_context),
            sink,
            signaling_timeout: self.session_config.signaling_timeout(),
        }
    }

    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        self.coordinator_with(self.session_config.clone())
    }

    pub fn coordinator_with(&self, config: SessionConfig) -> Arc<SessionCoordinator> {
        Arc::new(SessionCoordinator::new(
            self.directory.clone(),
            self.signaling.clone(),
            Arc::new(self.engines.clone()),
            Arc::clone(&self.render_context),
            &config,
        ))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
