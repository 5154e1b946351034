//! Serialized session switching
//!
//! All switches and stops run under one exclusive session lock, held across
//! teardown, the quiescence delay, construction and establishment. Native
//! engines crash when a new one is built on the shared render context while
//! the previous one is still unwinding, so correctness wins over latency
//! here. Published state goes through a `watch` channel and is always
//! replaced as a whole snapshot.
//!
//! Cancellation is cooperative: every request takes a ticket, and a request
//! whose ticket is no longer the newest stops at its next checkpoint without
//! touching the engine. An engine call already in progress is never
//! interrupted.

use super::stream::{SessionEnvironment, SessionInfo, StreamSession};
use crate::config::SessionConfig;
use crate::directory::DeviceDirectory;
use crate::engine::EngineFactory;
use crate::errors::SessionError;
use crate::render::{FrameSink, FrameSinkProxy, ProxyStats, RenderContext};
use crate::signaling::SignalingEndpoint;
use crate::types::{ConnectionPayload, DeviceId, SessionSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Result of a `switch_to` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// A new session connected and was published
    Connected(ConnectionPayload),
    /// The device was already connected; nothing was touched
    Unchanged,
    /// A newer request arrived first; this one stopped early
    Superseded,
    /// Establishment failed and state was reset to "not connected"
    Failed(SessionError),
}

impl SwitchOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, SwitchOutcome::Connected(_))
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            SwitchOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Coordinator activity counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub switch_requests: u64,
    pub connected: u64,
    pub failed: u64,
    pub superseded: u64,
    pub seamless_reselects: u64,
    pub stops: u64,
    pub disposal_errors: u64,
    pub frames: ProxyStats,
    pub collected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    switch_requests: AtomicU64,
    connected: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
    seamless_reselects: AtomicU64,
    stops: AtomicU64,
    disposal_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State guarded by the session lock
#[derive(Default)]
struct SessionSlot {
    session: Option<StreamSession>,
    last_disposal: Option<Instant>,
}

impl SessionSlot {
    fn is_seamless(&self, device_id: &DeviceId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.device_id() == device_id && s.is_connected())
    }
}

/// Publishes an idle snapshot if a switch is abandoned mid-flight
///
/// Covers the caller dropping the `switch_to` future while it holds the
/// lock; without it the UI would keep showing a spinner.
struct SwitchingGuard<'a> {
    state: &'a watch::Sender<SessionSnapshot>,
    armed: bool,
}

impl<'a> SwitchingGuard<'a> {
    fn arm(state: &'a watch::Sender<SessionSnapshot>) -> Self {
        state.send_modify(|s| s.is_switching = true);
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SwitchingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(SessionSnapshot::default());
        }
    }
}

pub struct SessionCoordinator {
    env: SessionEnvironment,
    proxy: Arc<FrameSinkProxy>,
    quiescence_delay: Duration,
    slot: Mutex<SessionSlot>,
    state: watch::Sender<SessionSnapshot>,
    generation: AtomicU64,
    counters: Counters,
}

impl SessionCoordinator {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        signaling: Arc<dyn SignalingEndpoint>,
        engines: Arc<dyn EngineFactory>,
        render_context: Arc<RenderContext>,
        config: &SessionConfig,
    ) -> Self {
        let proxy = Arc::new(FrameSinkProxy::new());
        let sink: Arc<dyn FrameSink> = proxy.clone();
        let (state, _) = watch::channel(SessionSnapshot::default());

        log::info!(
            "Session coordinator bound to render context {} ({}), quiescence {:?}, signaling timeout {:?}",
            render_context.label(),
            render_context.id(),
            config.quiescence_delay(),
            config.signaling_timeout()
        );

        Self {
            env: SessionEnvironment {
                directory,
                signaling,
                engines,
                render_context,
                sink,
                signaling_timeout: config.signaling_timeout(),
            },
            proxy,
            quiescence_delay: config.quiescence_delay(),
            slot: Mutex::new(SessionSlot::default()),
            state,
            generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    fn next_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != ticket
    }

    /// Show `device_id`, tearing down whatever is currently playing
    ///
    /// Reselecting the connected device without `force_reconnect` is a no-op.
    /// Errors never escape as `Err`: the published state is reset to "not
    /// connected" and the error is returned inside [`SwitchOutcome::Failed`].
    pub async fn switch_to(&self, device_id: DeviceId, force_reconnect: bool) -> SwitchOutcome {
        let ticket = self.next_ticket();
        self.run_switch(ticket, device_id, force_reconnect).await
    }

    /// Run `switch_to` on a background task
    ///
    /// The ticket is taken before spawning, so request order decides which
    /// request wins regardless of task scheduling.
    pub fn request_switch(
        self: &Arc<Self>,
        device_id: DeviceId,
        force_reconnect: bool,
    ) -> JoinHandle<SwitchOutcome> {
        let ticket = self.next_ticket();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_switch(ticket, device_id, force_reconnect).await })
    }

    async fn run_switch(
        &self,
        ticket: u64,
        device_id: DeviceId,
        force_reconnect: bool,
    ) -> SwitchOutcome {
        Counters::bump(&self.counters.switch_requests);

        if !force_reconnect {
            if let Ok(slot) = self.slot.try_lock() {
                if slot.is_seamless(&device_id) {
                    log::debug!("Device {} already connected, seamless reselect", device_id);
                    Counters::bump(&self.counters.seamless_reselects);
                    return SwitchOutcome::Unchanged;
                }
            }
        }

        let mut slot = self.slot.lock().await;

        if self.is_superseded(ticket) {
            log::debug!("Switch to {} superseded before acquiring the session", device_id);
            Counters::bump(&self.counters.superseded);
            return SwitchOutcome::Superseded;
        }

        if !force_reconnect && slot.is_seamless(&device_id) {
            log::debug!("Device {} already connected after waiting, seamless reselect", device_id);
            Counters::bump(&self.counters.seamless_reselects);
            return SwitchOutcome::Unchanged;
        }

        log::info!(
            "Switching to device {}{}",
            device_id,
            if force_reconnect { " (forced reconnect)" } else { "" }
        );

        let guard = SwitchingGuard::arm(&self.state);
        self.proxy.suspend_delivery();
        self.state.send_modify(|s| s.connection_payload = None);
        self.teardown(&mut slot).await;
        self.quiesce(slot.last_disposal).await;
        self.proxy.resume_delivery();

        if self.is_superseded(ticket) {
            log::debug!("Switch to {} superseded after teardown", device_id);
            Counters::bump(&self.counters.superseded);
            // Nothing is live now; dropping the armed guard publishes idle.
            drop(guard);
            return SwitchOutcome::Superseded;
        }

        // The session sits in the slot while it establishes, so a switch whose
        // future is dropped leaves its engine to the next locked teardown.
        let session = slot.session.insert(StreamSession::new(device_id.clone()));
        let outcome = match session.establish(&self.env).await {
            Ok(payload) => {
                self.state.send_replace(SessionSnapshot {
                    current_device_id: Some(device_id),
                    connection_payload: Some(payload.clone()),
                    is_switching: false,
                });
                Counters::bump(&self.counters.connected);
                SwitchOutcome::Connected(payload)
            }
            Err(e) => {
                self.recover_from_failure(&mut slot, &e).await;
                Counters::bump(&self.counters.failed);
                SwitchOutcome::Failed(e)
            }
        };
        guard.disarm();
        outcome
    }

    /// Dispose and drop the active session, swallowing disposal errors
    async fn teardown(&self, slot: &mut SessionSlot) {
        let Some(mut session) = slot.session.take() else {
            return;
        };

        log::info!(
            "Tearing down session {} for device {}",
            session.id(),
            session.device_id()
        );
        if let Err(e) = session.dispose().await {
            Counters::bump(&self.counters.disposal_errors);
            log::warn!("Ignoring disposal error for session {}: {}", session.id(), e);
        }
        slot.last_disposal = Some(Instant::now());
    }

    /// Wait until the quiescence delay has elapsed since the last disposal
    ///
    /// The fixed delay only approximates "native threads have unwound"; an
    /// engine that can join its threads should do so inside `dispose`.
    async fn quiesce(&self, last_disposal: Option<Instant>) {
        if let Some(disposed_at) = last_disposal {
            let ready_at = disposed_at + self.quiescence_delay;
            if ready_at > Instant::now() {
                log::debug!("Waiting for native teardown to settle");
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    async fn recover_from_failure(&self, slot: &mut SessionSlot, error: &SessionError) {
        if let Some(session) = slot.session.as_ref() {
            log::error!(
                "Switch to device {} failed ({}): {}",
                session.device_id(),
                error.kind(),
                error
            );
        }

        self.teardown(slot).await;

        self.state.send_replace(SessionSnapshot::default());
    }

    /// Stop streaming and forget the current device
    ///
    /// A stop that a newer switch overtakes while waiting for the session
    /// leaves that switch's result in place.
    pub async fn stop(&self) {
        let ticket = self.next_ticket();
        self.run_stop(ticket).await;
    }

    pub fn request_stop(self: &Arc<Self>) -> JoinHandle<()> {
        let ticket = self.next_ticket();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_stop(ticket).await })
    }

    async fn run_stop(&self, ticket: u64) {
        let mut slot = self.slot.lock().await;
        if self.is_superseded(ticket) {
            log::debug!("Stop superseded by a newer request");
            Counters::bump(&self.counters.superseded);
            return;
        }
        log::info!("Stopping live view");

        self.proxy.suspend_delivery();
        self.teardown(&mut slot).await;
        self.proxy.resume_delivery();
        self.state.send_replace(SessionSnapshot::default());
        Counters::bump(&self.counters.stops);
    }

    /// Stop and release everything; for host shutdown paths
    pub async fn shutdown(&self) {
        self.stop().await;
        self.proxy.set_target(None);
        log::info!("Session coordinator shut down");
    }

    /// Bind a render surface to the live stream
    ///
    /// Independent of session switches; a surface attached mid-switch starts
    /// receiving frames from the next engine.
    pub fn attach_renderer(&self, surface: &Arc<dyn FrameSink>) {
        self.proxy.set_target(Some(surface));
    }

    /// Unbind `surface` if it is still the current target
    pub fn detach_renderer(&self, surface: &Arc<dyn FrameSink>) -> bool {
        self.proxy.detach_if_matches(surface)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn current_device_id(&self) -> Option<DeviceId> {
        self.state.borrow().current_device_id.clone()
    }

    pub fn connection_payload(&self) -> Option<ConnectionPayload> {
        self.state.borrow().connection_payload.clone()
    }

    pub fn is_switching(&self) -> bool {
        self.state.borrow().is_switching
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn proxy(&self) -> &Arc<FrameSinkProxy> {
        &self.proxy
    }

    pub fn render_context(&self) -> &Arc<RenderContext> {
        &self.env.render_context
    }

    /// Details of the active session; waits for any in-flight switch
    pub async fn active_session(&self) -> Option<SessionInfo> {
        self.slot.lock().await.session.as_ref().map(StreamSession::info)
    }

    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.counters;
        CoordinatorStats {
            switch_requests: c.switch_requests.load(Ordering::Relaxed),
            connected: c.connected.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            superseded: c.superseded.load(Ordering::Relaxed),
            seamless_reselects: c.seamless_reselects.load(Ordering::Relaxed),
            stops: c.stops.load(Ordering::Relaxed),
            disposal_errors: c.disposal_errors.load(Ordering::Relaxed),
            frames: self.proxy.stats(),
            collected_at: Utc::now(),
        }
    }
}
