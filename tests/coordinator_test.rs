//! Session coordinator scenarios

use crabview::config::SessionConfig;
use crabview::errors::SignalingError;
use crabview::testing::{
    EngineFailure, RecordingSink, ScriptedSignaling, SignalingScript, SyntheticEngineFactory,
    TestHarness,
};
use crabview::{SessionState, SwitchOutcome};
use futures::future::join_all;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_rapid_requests_collapse_to_the_last_one() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cams: Vec<_> = ["cam-1", "cam-2", "cam-3"]
        .iter()
        .map(|id| harness.device(id))
        .collect();

    let handles: Vec<_> = cams
        .iter()
        .map(|cam| coordinator.request_switch(cam.clone(), false))
        .collect();

    let outcomes: Vec<SwitchOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes[0], SwitchOutcome::Superseded);
    assert_eq!(outcomes[1], SwitchOutcome::Superseded);
    assert!(outcomes[2].is_connected());
    assert_eq!(coordinator.current_device_id(), Some(cams[2].clone()));
    assert_eq!(harness.engines.created_count(), 1);
    assert_eq!(coordinator.stats().superseded, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutual_exclusion_under_concurrent_requests() {
    let harness = TestHarness::with_parts(
        SyntheticEngineFactory::new()
            .with_create_delay(Duration::from_millis(2))
            .with_frame_interval(Duration::from_millis(1)),
        ScriptedSignaling::new(),
    );
    harness.signaling.set_default(SignalingScript::Delay(Duration::from_millis(3)));
    let coordinator = harness.coordinator();
    let cams: Vec<_> = (0..4).map(|n| harness.device(&format!("cam-{n}"))).collect();

    let mut handles = Vec::new();
    for i in 0..20 {
        handles.push(coordinator.request_switch(cams[i % cams.len()].clone(), false));
        if i % 3 == 0 {
            tokio::time::sleep(Duration::from_millis(4)).await;
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(harness.engines.max_live() <= 1);
    assert_eq!(harness.engines.live_count(), 1);
    assert_eq!(coordinator.current_device_id(), Some(cams[19 % cams.len()].clone()));
    assert!(!coordinator.is_switching());
}

#[tokio::test]
async fn test_idempotent_reselect_does_no_work() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cam = harness.device("cam-1");

    let first = coordinator.switch_to(cam.clone(), false).await;
    let mut rx = coordinator.subscribe();
    let _ = rx.borrow_and_update();

    let second = coordinator.switch_to(cam.clone(), false).await;

    assert!(first.is_connected());
    assert_eq!(second, SwitchOutcome::Unchanged);
    assert_eq!(harness.engines.created_count(), 1);
    assert_eq!(harness.signaling.call_count(), 1);
    assert!(!rx.has_changed().unwrap());
    assert_eq!(coordinator.stats().seamless_reselects, 1);
}

#[tokio::test]
async fn test_signaling_failure_clears_state() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cam_a = harness.device("cam-a");
    let cam_b = harness.device("cam-b");

    assert!(coordinator.switch_to(cam_a, false).await.is_connected());

    harness.signaling.push(SignalingScript::Fail(SignalingError::Transport(
        "503 from media server".to_string(),
    )));
    let outcome = coordinator.switch_to(cam_b, false).await;

    assert_eq!(outcome.error().map(|e| e.kind()), Some("signaling"));
    let snapshot = coordinator.snapshot();
    assert!(snapshot.is_idle());
    assert!(snapshot.connection_payload.is_none());
    assert_eq!(harness.engines.live_count(), 0);
    assert!(coordinator.active_session().await.is_none());
    assert_eq!(coordinator.stats().failed, 1);
}

#[tokio::test]
async fn test_failed_device_can_be_retried() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cam = harness.device("cam-1");

    harness.engines.set_failure(Some(EngineFailure::Create));
    assert!(coordinator.switch_to(cam.clone(), false).await.error().is_some());

    harness.engines.set_failure(None);
    assert!(coordinator.switch_to(cam.clone(), false).await.is_connected());
    assert_eq!(coordinator.current_device_id(), Some(cam));
}

#[tokio::test]
async fn test_a_b_a_sequence() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cam_a = harness.device("cam-a");
    let cam_b = harness.device("cam-b");

    for cam in [&cam_a, &cam_b, &cam_a] {
        let outcome = coordinator.request_switch(cam.clone(), false).await.unwrap();
        assert!(outcome.is_connected());
    }

    assert_eq!(harness.engines.created_count(), 3);
    assert_eq!(harness.engines.disposed_count(), 2);
    assert_eq!(harness.engines.max_live(), 1);
    assert_eq!(coordinator.current_device_id(), Some(cam_a.clone()));

    let session = coordinator.active_session().await.unwrap();
    assert_eq!(session.device_id, cam_a);
    assert_eq!(session.state, SessionState::Connected);
    assert!(session.has_engine);
}

#[tokio::test]
async fn test_attach_after_connect_misses_no_frames() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let surface = RecordingSink::new();

    coordinator.switch_to(harness.device("cam-1"), false).await;
    coordinator.attach_renderer(&surface.as_sink());

    for _ in 0..10 {
        assert!(harness.engines.emit_frame());
    }

    assert_eq!(surface.count(), 10);
    assert_eq!(surface.frames(), (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_switch_clears_target_and_engine_stops_delivering() {
    let harness = TestHarness::with_parts(
        SyntheticEngineFactory::new().with_frame_interval(Duration::from_millis(1)),
        ScriptedSignaling::new(),
    );
    let coordinator = harness.coordinator();
    let surface = RecordingSink::new();

    coordinator.switch_to(harness.device("cam-a"), false).await;
    coordinator.attach_renderer(&surface.as_sink());
    tokio::time::sleep(Duration::from_millis(20)).await;

    coordinator.switch_to(harness.device("cam-b"), false).await;
    let seen = surface.count();
    assert!(seen > 0);
    assert!(!coordinator.proxy().has_target());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(surface.count(), seen);
}

#[tokio::test]
async fn test_renderer_attached_mid_switch_receives_new_stream() {
    let harness = TestHarness::new();
    harness.signaling.push(SignalingScript::Delay(Duration::from_millis(50)));
    let coordinator = harness.coordinator();
    let surface = RecordingSink::new();

    let pending = coordinator.request_switch(harness.device("cam-1"), false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(coordinator.is_switching());
    coordinator.attach_renderer(&surface.as_sink());

    assert!(pending.await.unwrap().is_connected());
    assert!(harness.engines.emit_frame());
    assert_eq!(surface.count(), 1);
}

#[tokio::test]
async fn test_subscribers_see_switching_flag() {
    let harness = TestHarness::new();
    harness.signaling.push(SignalingScript::Delay(Duration::from_millis(30)));
    let coordinator = harness.coordinator();
    let mut rx = coordinator.subscribe();

    let pending = coordinator.request_switch(harness.device("cam-1"), false);
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_switching);

    pending.await.unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert!(!snapshot.is_switching);
    assert!(snapshot.is_connected());
}

#[tokio::test]
async fn test_disposal_error_does_not_block_next_switch() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();

    coordinator.switch_to(harness.device("cam-a"), false).await;
    harness.engines.set_failure(Some(EngineFailure::Dispose));
    let outcome = coordinator.switch_to(harness.device("cam-b"), false).await;

    assert!(outcome.is_connected());
    assert_eq!(harness.engines.live_count(), 1);
    assert_eq!(coordinator.stats().disposal_errors, 1);
}

#[tokio::test]
async fn test_quiescence_delay_separates_teardown_and_construction() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator_with(SessionConfig {
        quiescence_delay_ms: 60,
        signaling_timeout_ms: 2_000,
    });

    coordinator.switch_to(harness.device("cam-a"), false).await;
    let started = Instant::now();
    coordinator.switch_to(harness.device("cam-b"), false).await;

    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_stop_supersedes_pending_switch() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();

    let pending = coordinator.request_switch(harness.device("cam-1"), false);
    let stopping = coordinator.request_stop();

    assert_eq!(pending.await.unwrap(), SwitchOutcome::Superseded);
    stopping.await.unwrap();
    assert!(coordinator.snapshot().is_idle());
    assert_eq!(harness.engines.created_count(), 0);
}

#[tokio::test]
async fn test_stop_issued_before_switch_does_not_override_it() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let cam_b = harness.device("cam-b");

    assert!(coordinator.switch_to(harness.device("cam-a"), false).await.is_connected());

    let stopping = coordinator.request_stop();
    assert!(coordinator.switch_to(cam_b.clone(), false).await.is_connected());
    stopping.await.unwrap();

    assert_eq!(coordinator.current_device_id(), Some(cam_b));
    assert!(coordinator.snapshot().is_connected());
    assert_eq!(harness.engines.live_count(), 1);
    assert!(coordinator.stats().superseded >= 1);
}

#[tokio::test]
async fn test_cancelled_switch_leaves_engine_for_next_teardown() {
    let harness = TestHarness::new();
    harness.signaling.push(SignalingScript::Delay(Duration::from_millis(100)));
    let coordinator = harness.coordinator();
    let cam_b = harness.device("cam-b");

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        coordinator.switch_to(harness.device("cam-a"), false),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(!coordinator.is_switching());
    assert!(coordinator.snapshot().is_idle());

    assert!(coordinator.switch_to(cam_b.clone(), false).await.is_connected());

    assert!(harness.engines.max_live() <= 1);
    assert_eq!(harness.engines.live_count(), 1);
    assert_eq!(harness.engines.disposed_count(), 1);
    assert_eq!(coordinator.current_device_id(), Some(cam_b));
}

#[tokio::test]
async fn test_stale_detach_through_coordinator() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let old_surface = RecordingSink::new();
    let new_surface = RecordingSink::new();

    coordinator.switch_to(harness.device("cam-1"), false).await;
    coordinator.attach_renderer(&old_surface.as_sink());
    coordinator.attach_renderer(&new_surface.as_sink());

    assert!(!coordinator.detach_renderer(&old_surface.as_sink()));
    harness.engines.emit_frame();

    assert_eq!(new_surface.count(), 1);
    assert_eq!(old_surface.count(), 0);
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let surface = RecordingSink::new();

    coordinator.switch_to(harness.device("cam-1"), false).await;
    coordinator.attach_renderer(&surface.as_sink());
    coordinator.shutdown().await;

    assert!(coordinator.snapshot().is_idle());
    assert!(!coordinator.proxy().has_target());
    assert_eq!(harness.engines.live_count(), 0);
}
