// crates/progress-sync/tests/coordinator_tests.rs
//! Integration tests for the progress coordinator

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamsync_progress::{
    calculate_progress, find_current_scene, is_completed, ConflictResolution, ConflictResolver,
    DeviceType, MemoryTransport, MessageType, PlaybackPosition, ProgressConfig,
    ProgressCoordinator, ProgressEvent, ProgressEventKind, ProgressMessage, ProgressTrackingState,
    SceneContext, SessionInfo, SessionPositions, SyncStrategy,
};

const ALL_KINDS: [ProgressEventKind; 8] = [
    ProgressEventKind::ProgressUpdated,
    ProgressEventKind::ProgressSynced,
    ProgressEventKind::ProgressRequested,
    ProgressEventKind::ProgressCleared,
    ProgressEventKind::ProgressConflict,
    ProgressEventKind::SceneChanged,
    ProgressEventKind::VideoCompleted,
    ProgressEventKind::SyncRequired,
];

fn record_events(coordinator: &ProgressCoordinator) -> Arc<Mutex<Vec<ProgressEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in ALL_KINDS {
        let sink = Arc::clone(&events);
        coordinator
            .on(kind, move |event| sink.lock().unwrap().push(event.clone()))
            .unwrap();
    }
    events
}

fn kinds(events: &Arc<Mutex<Vec<ProgressEvent>>>) -> Vec<ProgressEventKind> {
    events.lock().unwrap().iter().map(|e| e.kind()).collect()
}

fn laptop() -> SessionInfo {
    SessionInfo::new("laptop", DeviceType::Desktop).with_session_id("laptop-session")
}

fn phone() -> SessionInfo {
    SessionInfo::new("phone", DeviceType::Mobile).with_session_id("phone-session")
}

fn update(coordinator: &ProgressCoordinator, position: f64) {
    coordinator
        .update_progress(
            "player",
            "video-1",
            "user-1",
            PlaybackPosition::new(position, 100.0, true),
            laptop(),
            ProgressTrackingState::Active,
        )
        .unwrap();
}

#[test]
fn test_progress_and_completion_math() {
    assert_eq!(calculate_progress(25.0, 50.0), 50.0);
    assert_eq!(calculate_progress(150.0, 100.0), 100.0);
    assert_eq!(calculate_progress(-5.0, 100.0), 0.0);
    assert_eq!(calculate_progress(42.0, 0.0), 0.0);

    assert!(is_completed(96.0, 100.0, 95.0));
    assert!(!is_completed(94.0, 100.0, 95.0));
}

#[test]
fn test_scene_lookup_edges() {
    let scenes = vec![
        SceneContext::new("a", "A", 0.0, 60.0),
        SceneContext::new("b", "B", 60.0, 120.0),
    ];
    assert_eq!(find_current_scene(59.0, &scenes).unwrap().scene_id, "a");
    assert_eq!(find_current_scene(60.0, &scenes).unwrap().scene_id, "b");
    assert!(find_current_scene(125.0, &scenes).is_none());
}

#[test]
fn test_conflict_strategies() {
    let now = Utc::now();
    let older = laptop().with_last_activity(now - ChronoDuration::seconds(30));
    let newer = phone().with_last_activity(now);
    let sessions = vec![older, newer];

    let latest = ConflictResolver::resolve(
        &sessions,
        &SessionPositions::new(),
        ConflictResolution::UseLatest,
    );
    assert_eq!(latest.unwrap().session_id, "phone-session");

    let positions: SessionPositions = [
        ("laptop-session".to_string(), PlaybackPosition::new(90.0, 100.0, false)),
        ("phone-session".to_string(), PlaybackPosition::new(30.0, 100.0, false)),
    ]
    .into_iter()
    .collect();
    let furthest =
        ConflictResolver::resolve(&sessions, &positions, ConflictResolution::UseFurthest);
    assert_eq!(furthest.unwrap().session_id, "laptop-session");
}

#[test]
fn test_repeated_update_is_idempotent() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    coordinator
        .set_scenes("video-1", vec![SceneContext::new("intro", "Intro", 0.0, 60.0)])
        .unwrap();
    let events = record_events(&coordinator);

    update(&coordinator, 30.0);
    let first = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();
    update(&coordinator, 30.0);
    let second = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();

    assert_eq!(first.position, second.position);
    assert_eq!(first.session, second.session);
    assert_eq!(first.last_scene_id, second.last_scene_id);
    assert_eq!(
        kinds(&events),
        vec![
            ProgressEventKind::ProgressUpdated,
            ProgressEventKind::SceneChanged,
            ProgressEventKind::ProgressUpdated,
        ]
    );
}

#[test]
fn test_watch_then_clear_scenario() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    let events = record_events(&coordinator);

    update(&coordinator, 50.0);
    assert_eq!(kinds(&events), vec![ProgressEventKind::ProgressUpdated]);

    update(&coordinator, 96.0);
    assert!(kinds(&events).contains(&ProgressEventKind::VideoCompleted));
    assert!(!kinds(&events).contains(&ProgressEventKind::SceneChanged));

    coordinator
        .clear_progress("player", "video-1", "user-1", None)
        .unwrap();
    assert!(coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .is_none());
    assert_eq!(coordinator.tracked_count(), 0);
}

#[test]
fn test_inbound_messages_through_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let coordinator = Arc::new(
        ProgressCoordinator::with_transport(ProgressConfig::default(), transport.clone()).unwrap(),
    );
    coordinator.attach().unwrap();
    coordinator.attach().unwrap();
    assert_eq!(transport.subscriber_count(MessageType::UpdateProgress), 1);

    let events = record_events(&coordinator);

    let delivered = transport
        .deliver(json!({
            "type": "updateProgress",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "position": {
                "position": 61.0,
                "duration": 100.0,
                "progress": 12.0,
                "isPlaying": true,
                "currentScene": {
                    "sceneId": "chase",
                    "title": "Chase",
                    "startTime": 60.0,
                    "endTime": 120.0
                }
            },
            "session": serde_json::to_value(phone()).unwrap(),
            "state": "active",
            "timestamp": Utc::now()
        }))
        .unwrap();
    assert_eq!(delivered, 1);

    let state = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();
    assert_eq!(state.position.progress, 61.0);
    assert_eq!(state.last_scene_id.as_deref(), Some("chase"));
    assert_eq!(state.session.session_id, "phone-session");
    assert_eq!(
        kinds(&events),
        vec![
            ProgressEventKind::ProgressUpdated,
            ProgressEventKind::SceneChanged
        ]
    );
    // Inbound updates are not echoed
    assert!(transport.sent().is_empty());

    transport
        .deliver(json!({
            "type": "requestProgress",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "deviceId": "tv"
        }))
        .unwrap();
    assert_eq!(
        kinds(&events).last(),
        Some(&ProgressEventKind::ProgressRequested)
    );

    transport
        .deliver(json!({
            "type": "progressCleared",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "reason": "completion",
            "timestamp": Utc::now()
        }))
        .unwrap();
    assert!(coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .is_none());
}

#[test]
fn test_malformed_inbound_is_dropped() {
    let transport = Arc::new(MemoryTransport::new());
    let coordinator = Arc::new(
        ProgressCoordinator::with_transport(ProgressConfig::default(), transport.clone()).unwrap(),
    );
    coordinator.attach().unwrap();
    let events = record_events(&coordinator);

    transport
        .deliver(json!({"type": "updateProgress", "videoId": "video-1"}))
        .unwrap();
    transport
        .deliver(json!({
            "type": "requestProgress",
            "surfaceId": "player",
            "videoId": "",
            "userId": "user-1",
            "deviceId": "tv"
        }))
        .unwrap();

    assert!(kinds(&events).is_empty());
    assert_eq!(coordinator.tracked_count(), 0);
}

#[test]
fn test_sync_message_overwrites_record() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    update(&coordinator, 20.0);
    let events = record_events(&coordinator);

    let sync = ProgressMessage::from_json(
        &json!({
            "type": "progressSync",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "position": {"position": 70.0, "duration": 100.0, "isPlaying": false},
            "sourceSession": serde_json::to_value(phone()).unwrap(),
            "isResume": true,
            "lastSavedAt": Utc::now()
        })
        .to_string(),
    )
    .unwrap();
    coordinator.handle_message(sync).unwrap();

    let state = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();
    assert_eq!(state.position.position, 70.0);
    assert_eq!(state.state, ProgressTrackingState::Paused);
    assert_eq!(state.session.session_id, "phone-session");
    assert_eq!(kinds(&events), vec![ProgressEventKind::ProgressSynced]);

    // Without a source session nothing is written but the event still fires
    let anonymous = ProgressMessage::from_json(
        &json!({
            "type": "progressSync",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "position": {"position": 5.0, "duration": 100.0, "isPlaying": true},
            "isResume": false,
            "lastSavedAt": Utc::now()
        })
        .to_string(),
    )
    .unwrap();
    coordinator.handle_message(anonymous).unwrap();

    let state = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();
    assert_eq!(state.position.position, 70.0);
    assert_eq!(events.lock().unwrap().len(), 2);
}

fn conflict_message(resolution: &str) -> serde_json::Value {
    json!({
        "type": "progressConflict",
        "surfaceId": "player",
        "videoId": "video-1",
        "userId": "user-1",
        "conflictingSessions": [
            serde_json::to_value(laptop()).unwrap(),
            serde_json::to_value(phone()).unwrap()
        ],
        "resolution": resolution,
        "timestamp": Utc::now()
    })
}

fn resolved_session(events: &Arc<Mutex<Vec<ProgressEvent>>>) -> Option<Option<String>> {
    events.lock().unwrap().iter().rev().find_map(|event| match event {
        ProgressEvent::ProgressConflict { conflict, .. } => Some(
            conflict
                .resolved_session
                .as_ref()
                .map(|s| s.session_id.clone()),
        ),
        _ => None,
    })
}

#[test]
fn test_conflict_message_resolution() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    update(&coordinator, 40.0);
    let events = record_events(&coordinator);

    coordinator
        .handle_json(conflict_message("use_furthest"))
        .unwrap();
    assert_eq!(
        resolved_session(&events),
        Some(Some("laptop-session".to_string()))
    );

    coordinator
        .handle_json(conflict_message("prompt_user"))
        .unwrap();
    assert_eq!(resolved_session(&events), Some(None));
}

#[test]
fn test_conflict_resolution_disabled() {
    let config = ProgressConfig::default().with_conflict_resolution(false);
    let coordinator = ProgressCoordinator::new(config).unwrap();
    update(&coordinator, 40.0);
    let events = record_events(&coordinator);

    coordinator.handle_json(conflict_message("use_latest")).unwrap();
    assert_eq!(resolved_session(&events), Some(None));
}

#[test]
fn test_conflict_without_record_stays_unresolved() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    let events = record_events(&coordinator);

    coordinator
        .handle_json(conflict_message("use_furthest"))
        .unwrap();

    assert_eq!(resolved_session(&events), Some(None));
    assert!(coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .is_none());
}

#[test]
fn test_conflict_winner_takes_over_record() {
    let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
    update(&coordinator, 40.0);
    let events = record_events(&coordinator);

    let now = Utc::now();
    let stale_laptop = laptop().with_last_activity(now - ChronoDuration::seconds(30));
    let active_phone = phone().with_last_activity(now);
    coordinator
        .handle_json(json!({
            "type": "progressConflict",
            "surfaceId": "player",
            "videoId": "video-1",
            "userId": "user-1",
            "conflictingSessions": [
                serde_json::to_value(stale_laptop).unwrap(),
                serde_json::to_value(active_phone).unwrap()
            ],
            "resolution": "use_latest",
            "timestamp": now
        }))
        .unwrap();

    assert_eq!(
        resolved_session(&events),
        Some(Some("phone-session".to_string()))
    );
    let state = coordinator
        .get_progress_state("video-1", "user-1")
        .unwrap()
        .unwrap();
    assert_eq!(state.session.session_id, "phone-session");
    assert_eq!(state.position.position, 40.0);
}

#[test]
fn test_scene_boundary_strategy() {
    let config = ProgressConfig::default().with_sync_strategy(SyncStrategy::SceneBoundary);
    let coordinator = ProgressCoordinator::new(config).unwrap();
    coordinator
        .set_scenes(
            "video-1",
            vec![
                SceneContext::new("a", "A", 0.0, 50.0),
                SceneContext::new("b", "B", 50.0, 100.0),
            ],
        )
        .unwrap();
    let events = record_events(&coordinator);

    update(&coordinator, 10.0);
    update(&coordinator, 20.0);
    update(&coordinator, 55.0);

    let sync_required = kinds(&events)
        .into_iter()
        .filter(|k| *k == ProgressEventKind::SyncRequired)
        .count();
    assert_eq!(sync_required, 2);
}

#[test]
fn test_request_and_answer_round() {
    let transport = Arc::new(MemoryTransport::new());
    let coordinator =
        ProgressCoordinator::with_transport(ProgressConfig::default(), transport.clone()).unwrap();

    coordinator
        .request_progress("player", "video-1", "user-1", "tv")
        .unwrap();
    assert_eq!(
        transport.take_sent()[0].message_type(),
        MessageType::RequestProgress
    );

    update(&coordinator, 100.0);
    transport.take_sent();
    let answer = coordinator
        .sync_progress("player", "video-1", "user-1")
        .unwrap()
        .unwrap();
    assert!(!answer.is_resume);
    assert!(answer.next_scenes.is_none());
    assert_eq!(answer.active_sessions.unwrap().len(), 1);
    assert_eq!(transport.sent().len(), 1);
}

#[test]
fn test_config_from_toml() {
    let config = ProgressConfig::from_toml_str(
        r#"
        sync_strategy = "manual"
        sync_interval_ms = 2500
        default_conflict_resolution = "use_latest"
        "#,
    )
    .unwrap();
    assert_eq!(config.sync_strategy, SyncStrategy::Manual);
    assert_eq!(config.sync_interval(), Duration::from_millis(2500));

    let coordinator = ProgressCoordinator::new(config).unwrap();
    assert!(!coordinator.start().unwrap());
}

#[tokio::test]
async fn test_scheduler_lifecycle() {
    let config = ProgressConfig::default().with_sync_interval(Duration::from_millis(100));
    let coordinator = ProgressCoordinator::new(config).unwrap();
    let events = record_events(&coordinator);

    update(&coordinator, 10.0);
    assert!(coordinator.start().unwrap());
    assert!(coordinator.start().unwrap());
    assert!(coordinator.is_syncing());

    tokio::time::sleep(Duration::from_millis(350)).await;
    coordinator.stop();
    assert!(!coordinator.is_syncing());

    let raised = kinds(&events)
        .into_iter()
        .filter(|k| *k == ProgressEventKind::SyncRequired)
        .count();
    assert!(raised >= 1, "expected a stale record to be flagged");

    tokio::time::sleep(Duration::from_millis(250)).await;
    let after = kinds(&events)
        .into_iter()
        .filter(|k| *k == ProgressEventKind::SyncRequired)
        .count();
    assert_eq!(raised, after);
}

#[tokio::test]
async fn test_stop_from_sync_handler() {
    let config = ProgressConfig::default().with_sync_interval(Duration::from_millis(100));
    let coordinator = Arc::new(ProgressCoordinator::new(config).unwrap());
    update(&coordinator, 10.0);

    let calls = Arc::new(Mutex::new(0usize));
    let weak = Arc::downgrade(&coordinator);
    let counter = Arc::clone(&calls);
    coordinator
        .on(ProgressEventKind::SyncRequired, move |_| {
            *counter.lock().unwrap() += 1;
            if let Some(c) = weak.upgrade() {
                c.stop();
            }
        })
        .unwrap();

    coordinator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(!coordinator.is_syncing());
    coordinator.shutdown().unwrap();
}
