//! One device's live connection
//!
//! A `StreamSession` owns exactly one engine. Establishment walks the
//! directory -> engine -> offer -> signaling -> answer sequence, and any
//! failure along the way releases the engine before `establish` returns, so
//! callers never inherit a half-built native object.

use crate::directory::DeviceDirectory;
use crate::engine::{EngineFactory, StreamEngine};
use crate::errors::{SessionError, SignalingError};
use crate::render::{FrameSink, RenderContext};
use crate::signaling::SignalingEndpoint;
use crate::types::{ConnectionPayload, DeviceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Collaborators a session needs to establish itself
#[derive(Clone)]
pub struct SessionEnvironment {
    pub directory: Arc<dyn DeviceDirectory>,
    pub signaling: Arc<dyn SignalingEndpoint>,
    pub engines: Arc<dyn EngineFactory>,
    pub render_context: Arc<RenderContext>,
    /// Where the engine delivers frames; the coordinator passes its proxy
    pub sink: Arc<dyn FrameSink>,
    /// Upper bound on the signaling exchange
    pub signaling_timeout: Duration,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Establishing,
    Connected,
    Failed,
    /// Engine released after a successful or never-started session
    Disposed,
}

/// Serializable view of a session for stats and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub device_id: DeviceId,
    pub state: SessionState,
    pub has_engine: bool,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

pub struct StreamSession {
    id: Uuid,
    device_id: DeviceId,
    state: SessionState,
    engine: Option<Box<dyn StreamEngine>>,
    payload: Option<ConnectionPayload>,
    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
}

impl StreamSession {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            state: SessionState::Created,
            engine: None,
            payload: None,
            created_at: Utc::now(),
            connected_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn payload(&self) -> Option<&ConnectionPayload> {
        self.payload.as_ref()
    }

    /// True while the session holds a native engine handle
    pub fn is_live(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.payload.is_some()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            device_id: self.device_id.clone(),
            state: self.state,
            has_engine: self.is_live(),
            created_at: self.created_at,
            connected_at: self.connected_at,
        }
    }

    /// Bring the session from `Created` to `Connected`
    ///
    /// On error the session is `Failed` and its engine, if one was built,
    /// has already been disposed.
    pub async fn establish(
        &mut self,
        env: &SessionEnvironment,
    ) -> Result<ConnectionPayload, SessionError> {
        if self.state != SessionState::Created {
            return Err(SessionError::InvalidState(format!(
                "session {} cannot establish from {:?}",
                self.id, self.state
            )));
        }

        self.state = SessionState::Establishing;
        log::info!(
            "Establishing session {} for device {}",
            self.id,
            self.device_id
        );

        match self.negotiate(env).await {
            Ok(payload) => {
                self.state = SessionState::Connected;
                self.payload = Some(payload.clone());
                self.connected_at = Some(Utc::now());
                log::info!(
                    "Session {} connected to device {} (stream {})",
                    self.id,
                    self.device_id,
                    payload.stream_id
                );
                Ok(payload)
            }
            Err(e) => {
                log::warn!(
                    "Session {} for device {} failed ({}): {}",
                    self.id,
                    self.device_id,
                    e.kind(),
                    e
                );
                self.state = SessionState::Failed;
                self.payload = None;
                if let Err(dispose_err) = self.release_engine().await {
                    log::warn!(
                        "Cleanup after failed establishment of session {}: {}",
                        self.id,
                        dispose_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn negotiate(
        &mut self,
        env: &SessionEnvironment,
    ) -> Result<ConnectionPayload, SessionError> {
        let path = env
            .directory
            .resolve_stream_path(&self.device_id)
            .await
            .map_err(|e| SessionError::PathResolution {
                device_id: self.device_id.clone(),
                reason: e.to_string(),
            })?;

        if !path.is_usable() {
            return Err(SessionError::PathResolution {
                device_id: self.device_id.clone(),
                reason: format!("unusable stream path {}", path),
            });
        }
        log::debug!("Device {} resolved to {}", self.device_id, path);

        let engine = env
            .engines
            .create(&env.render_context, Arc::clone(&env.sink))
            .await
            .map_err(|e| SessionError::EngineInit(e.to_string()))?;
        let engine = self.engine.insert(engine);

        let offer = engine
            .create_offer()
            .await
            .map_err(|e| SessionError::OfferCreation(e.to_string()))?;

        let answer = tokio::time::timeout(
            env.signaling_timeout,
            env.signaling.exchange(&path, &offer),
        )
        .await
        .map_err(|_| SignalingError::Timeout(env.signaling_timeout))??;
        let accepted = answer.into_result()?;

        engine
            .apply_answer(&accepted.remote_sdp)
            .await
            .map_err(|e| SessionError::AnswerRejected(e.to_string()))?;

        Ok(ConnectionPayload {
            stream_id: accepted.stream_id,
            remote_sdp: accepted.remote_sdp,
        })
    }

    /// Release the engine; later calls are no-ops
    ///
    /// The handle is dropped even when the engine reports a disposal error.
    pub async fn dispose(&mut self) -> Result<(), SessionError> {
        let result = self.release_engine().await;
        self.payload = None;
        if self.state != SessionState::Failed {
            self.state = SessionState::Disposed;
        }
        result
    }

    async fn release_engine(&mut self) -> Result<(), SessionError> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };

        log::debug!(
            "Disposing engine of session {} (device {})",
            self.id,
            self.device_id
        );
        engine
            .dispose()
            .await
            .map_err(|e| SessionError::EngineDisposal(e.to_string()))
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        log::warn!(
            "Session {} for device {} dropped without dispose",
            self.id,
            self.device_id
        );
        let session_id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = engine.dispose().await {
                        log::warn!("Background disposal of session {} failed: {}", session_id, e);
                    }
                });
            }
            Err(_) => {
                log::error!(
                    "No runtime to dispose session {}; native resources are leaked",
                    session_id
                );
            }
        }
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("state", &self.state)
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}
