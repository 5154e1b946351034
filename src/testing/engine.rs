//! Synthetic engine
//!
//! Behaves like a native engine from the session manager's point of view:
//! construction is bound to a render context, a decode thread pushes frames
//! into the sink once an answer is applied, and `dispose` joins that thread
//! so no callback happens after it returns. The factory keeps counters that
//! tests use to check how many handles are live at once.

use super::synthetic_data::{synthetic_frame, synthetic_offer_sdp};
use crate::engine::{EngineFactory, StreamEngine};
use crate::errors::EngineError;
use crate::render::{FrameSink, RenderContext};
use crate::timing::FrameClock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// Engine step that should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFailure {
    Create,
    Offer,
    Answer,
    Dispose,
}

struct Settings {
    failure: Option<EngineFailure>,
    create_delay: Duration,
    frame_interval: Option<Duration>,
    frame_size: (u32, u32),
}

struct FactoryInner {
    settings: Mutex<Settings>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    created: AtomicUsize,
    disposed: AtomicUsize,
    next_engine_id: AtomicU64,
    emitted: AtomicU64,
    current: Mutex<Option<(u64, Arc<dyn FrameSink>)>>,
    contexts: Mutex<Vec<Uuid>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory for [`SyntheticEngine`]s
#[derive(Clone)]
pub struct SyntheticEngineFactory {
    inner: Arc<FactoryInner>,
}

impl SyntheticEngineFactory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                settings: Mutex::new(Settings {
                    failure: None,
                    create_delay: Duration::ZERO,
                    frame_interval: None,
                    frame_size: (64, 48),
                }),
                live: AtomicUsize::new(0),
                max_live: AtomicUsize::new(0),
                created: AtomicUsize::new(0),
                disposed: AtomicUsize::new(0),
                next_engine_id: AtomicU64::new(1),
                emitted: AtomicU64::new(0),
                current: Mutex::new(None),
                contexts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Engines emit frames on their own thread at this interval
    pub fn with_frame_interval(self, interval: Duration) -> Self {
        lock(&self.inner.settings).frame_interval = Some(interval);
        self
    }

    pub fn with_frame_size(self, width: u32, height: u32) -> Self {
        lock(&self.inner.settings).frame_size = (width, height);
        self
    }

    /// Simulate slow native construction
    pub fn with_create_delay(self, delay: Duration) -> Self {
        lock(&self.inner.settings).create_delay = delay;
        self
    }

    /// Make every engine fail at `step` until cleared with `None`
    pub fn set_failure(&self, failure: Option<EngineFailure>) {
        lock(&self.inner.settings).failure = failure;
    }

    /// Handles constructed and not yet disposed
    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live handles ever observed
    pub fn max_live(&self) -> usize {
        self.inner.max_live.load(Ordering::SeqCst)
    }

    pub fn created_count(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    pub fn disposed_count(&self) -> usize {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Render contexts engines were bound to, in construction order
    pub fn contexts(&self) -> Vec<Uuid> {
        lock(&self.inner.contexts).clone()
    }

    /// Push one frame from the current live engine, as its decode thread would
    ///
    /// Returns false when no engine is live.
    pub fn emit_frame(&self) -> bool {
        let current = lock(&self.inner.current).clone();
        let Some((_, sink)) = current else {
            return false;
        };

        let (width, height) = lock(&self.inner.settings).frame_size;
        let sequence = self.inner.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(e) = sink.on_frame(&synthetic_frame(sequence, width, height)) {
            log::warn!("Synthetic frame {} rejected: {}", sequence, e);
        }
        true
    }

    fn failure(&self) -> Option<EngineFailure> {
        lock(&self.inner.settings).failure
    }
}

impl Default for SyntheticEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineFactory for SyntheticEngineFactory {
    async fn create(
        &self,
        context: &Arc<RenderContext>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Box<dyn StreamEngine>, EngineError> {
        let delay = lock(&self.inner.settings).create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failure() == Some(EngineFailure::Create) {
            return Err(EngineError::new("native peer connection construction failed"));
        }

        let engine_id = self.inner.next_engine_id.fetch_add(1, Ordering::SeqCst);
        let live = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_live.fetch_max(live, Ordering::SeqCst);
        self.inner.created.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.contexts).push(context.id());
        *lock(&self.inner.current) = Some((engine_id, Arc::clone(&sink)));

        log::debug!(
            "Synthetic engine {} created on context {} ({} live)",
            engine_id,
            context.label(),
            live
        );

        Ok(Box::new(SyntheticEngine {
            engine_id,
            factory: self.clone(),
            sink,
            clock: FrameClock::new(),
            decoder: None,
            disposed: false,
        }))
    }
}

struct DecodeThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Engine produced by [`SyntheticEngineFactory`]
pub struct SyntheticEngine {
    engine_id: u64,
    factory: SyntheticEngineFactory,
    sink: Arc<dyn FrameSink>,
    clock: FrameClock,
    decoder: Option<DecodeThread>,
    disposed: bool,
}

impl SyntheticEngine {
    fn start_decoder(&mut self, interval: Duration, frame_size: (u32, u32)) -> Result<(), EngineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let sink = Arc::clone(&self.sink);
        let clock = self.clock.clone();
        let counters = Arc::clone(&self.factory.inner);
        let (width, height) = frame_size;

        let handle = std::thread::Builder::new()
            .name(format!("crabview-synthetic-decode-{}", self.engine_id))
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    let sequence = counters.emitted.fetch_add(1, Ordering::SeqCst) + 1;
                    let frame = synthetic_frame(sequence, width, height)
                        .with_sequence(sequence, clock.timestamp_us());
                    let _ = sink.on_frame(&frame);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| EngineError::new(format!("decode thread spawn failed: {e}")))?;

        self.decoder = Some(DecodeThread { stop, handle });
        Ok(())
    }
}

#[async_trait]
impl StreamEngine for SyntheticEngine {
    async fn create_offer(&mut self) -> Result<String, EngineError> {
        if self.factory.failure() == Some(EngineFailure::Offer) {
            return Err(EngineError::new("createOffer failed"));
        }
        Ok(synthetic_offer_sdp(self.engine_id))
    }

    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<(), EngineError> {
        if self.factory.failure() == Some(EngineFailure::Answer) {
            return Err(EngineError::new("setRemoteDescription failed"));
        }
        if !answer_sdp.starts_with("v=0") {
            return Err(EngineError::new("answer is not a session description"));
        }

        let (interval, frame_size) = {
            let settings = lock(&self.factory.inner.settings);
            (settings.frame_interval, settings.frame_size)
        };
        if let Some(interval) = interval {
            self.start_decoder(interval, frame_size)?;
        }
        Ok(())
    }

    async fn dispose(&mut self) -> Result<(), EngineError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        if let Some(decoder) = self.decoder.take() {
            decoder.stop.store(true, Ordering::SeqCst);
            match tokio::task::spawn_blocking(move || decoder.handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => log::warn!("Decode thread of engine {} panicked", self.engine_id),
                Err(e) => log::warn!("Joining decode thread of engine {} failed: {}", self.engine_id, e),
            }
        }

        let inner = &self.factory.inner;
        {
            let mut current = lock(&inner.current);
            if current.as_ref().is_some_and(|(id, _)| *id == self.engine_id) {
                *current = None;
            }
        }
        inner.live.fetch_sub(1, Ordering::SeqCst);
        inner.disposed.fetch_add(1, Ordering::SeqCst);
        log::debug!("Synthetic engine {} disposed", self.engine_id);

        if self.factory.failure() == Some(EngineFailure::Dispose) {
            return Err(EngineError::new("native dispose reported an error"));
        }
        Ok(())
    }
}

impl Drop for SyntheticEngine {
    fn drop(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.stop.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FrameSinkProxy;

    fn proxy_sink() -> Arc<dyn FrameSink> {
        Arc::new(FrameSinkProxy::new())
    }

    #[tokio::test]
    async fn test_create_and_dispose_tracks_live_handles() {
        let factory = SyntheticEngineFactory::new();
        let context = RenderContext::shared("test");

        let mut engine = factory.create(&context, proxy_sink()).await.unwrap();
        assert_eq!(factory.live_count(), 1);
        assert_eq!(factory.contexts(), vec![context.id()]);

        engine.dispose().await.unwrap();
        engine.dispose().await.unwrap();
        assert_eq!(factory.live_count(), 0);
        assert_eq!(factory.disposed_count(), 1);
    }

    #[tokio::test]
    async fn test_decode_thread_stops_on_dispose() {
        let factory = SyntheticEngineFactory::new().with_frame_interval(Duration::from_millis(1));
        let proxy = Arc::new(FrameSinkProxy::new());
        let sink: Arc<dyn FrameSink> = proxy.clone();
        let context = RenderContext::shared("test");

        let mut engine = factory.create(&context, sink).await.unwrap();
        engine.create_offer().await.unwrap();
        engine.apply_answer("v=0\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.dispose().await.unwrap();

        let after_dispose = proxy.stats().dropped;
        assert!(after_dispose > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(proxy.stats().dropped, after_dispose);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let factory = SyntheticEngineFactory::new();
        let context = RenderContext::shared("test");

        factory.set_failure(Some(EngineFailure::Create));
        assert!(factory.create(&context, proxy_sink()).await.is_err());
        assert_eq!(factory.live_count(), 0);

        factory.set_failure(Some(EngineFailure::Dispose));
        let mut engine = factory.create(&context, proxy_sink()).await.unwrap();
        assert!(engine.dispose().await.is_err());
        assert_eq!(factory.live_count(), 0);
    }

    #[tokio::test]
    async fn test_emit_frame_requires_live_engine() {
        let factory = SyntheticEngineFactory::new();
        assert!(!factory.emit_frame());

        let context = RenderContext::shared("test");
        let mut engine = factory.create(&context, proxy_sink()).await.unwrap();
        assert!(factory.emit_frame());

        engine.dispose().await.unwrap();
        assert!(!factory.emit_frame());
    }
}
