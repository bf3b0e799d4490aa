// crates/progress-sync/src/coordinator.rs
//! Progress coordinator
//!
//! Owns the canonical records and routes every write through one path:
//! update the store, detect a scene change, check completion, then emit
//! events once the store lock has been released.

use crate::config::{ProgressConfig, SyncStrategy};
use crate::conflict::{ConflictInfo, ConflictResolver, SessionPositions};
use crate::error::{ProgressError, ProgressResult};
use crate::events::{EventBus, ProgressEvent, ProgressEventKind, SubscriptionId};
use crate::protocol::{
    ClearReason, MessageType, ProgressClearedMessage, ProgressConflictMessage, ProgressMessage,
    ProgressSyncMessage, RequestProgressMessage, UpdateProgressMessage,
};
use crate::scenes::SceneIndex;
use crate::scheduler::SyncScheduler;
use crate::store::ProgressStore;
use crate::types::{
    transition, PlaybackPosition, ProgressState, ProgressTrackingState, SceneContext, SessionInfo,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Upcoming scenes included with a progress sync
const NEXT_SCENE_LIMIT: usize = 3;

/// What a session needs to offer "resume where you left off"
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeContext {
    /// Canonical position
    pub position: PlaybackPosition,
    /// Scene containing the position
    pub scene: Option<SceneContext>,
    /// Scenes after the position
    pub next_scenes: Vec<SceneContext>,
    /// Tracking state
    pub state: ProgressTrackingState,
    /// Session that wrote the position
    pub session: SessionInfo,
}

/// Reconciles progress reports from every session of a user
pub struct ProgressCoordinator {
    config: ProgressConfig,
    store: Arc<Mutex<ProgressStore>>,
    scenes: Mutex<SceneIndex>,
    events: Arc<EventBus>,
    resolver: ConflictResolver,
    scheduler: SyncScheduler,
    transport: Option<Arc<dyn crate::transport::ProgressTransport>>,
    attached: AtomicBool,
}

impl ProgressCoordinator {
    /// Creates a coordinator without a transport
    pub fn new(config: ProgressConfig) -> ProgressResult<Self> {
        config.validate().map_err(ProgressError::InvalidConfig)?;

        let resolver = ConflictResolver::new(config.default_conflict_resolution);
        let scheduler = SyncScheduler::new(config.sync_interval());

        Ok(Self {
            config,
            store: Arc::new(Mutex::new(ProgressStore::new())),
            scenes: Mutex::new(SceneIndex::new()),
            events: Arc::new(EventBus::new()),
            resolver,
            scheduler,
            transport: None,
            attached: AtomicBool::new(false),
        })
    }

    /// Creates a coordinator that sends through `transport`
    pub fn with_transport(
        config: ProgressConfig,
        transport: Arc<dyn crate::transport::ProgressTransport>,
    ) -> ProgressResult<Self> {
        let mut coordinator = Self::new(config)?;
        coordinator.transport = Some(transport);
        Ok(coordinator)
    }

    /// Subscribes to every inbound message type on the transport
    ///
    /// Handlers hold a weak reference, so the transport never keeps the
    /// coordinator alive. Malformed messages are logged and dropped.
    pub fn attach(self: &Arc<Self>) -> ProgressResult<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| ProgressError::Transport("no transport configured".to_string()))?;

        if self.attached.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for message_type in MessageType::ALL {
            let coordinator = Arc::downgrade(self);
            transport.subscribe(
                message_type,
                Arc::new(move |value: serde_json::Value| {
                    let Some(coordinator) = coordinator.upgrade() else {
                        return;
                    };
                    if let Err(e) = coordinator.handle_json(value) {
                        log::warn!("Dropping inbound {} message: {}", message_type, e);
                    }
                }),
            );
        }
        log::debug!("Coordinator attached to transport");
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Subscribes to an event kind
    pub fn on<F>(&self, kind: ProgressEventKind, handler: F) -> ProgressResult<SubscriptionId>
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    /// Removes a subscription
    pub fn off(&self, kind: ProgressEventKind, id: SubscriptionId) -> ProgressResult<bool> {
        self.events.off(kind, id)
    }

    /// Replaces the scene list for a video
    pub fn set_scenes(&self, video_id: &str, scenes: Vec<SceneContext>) -> ProgressResult<()> {
        log::debug!("Registered {} scene(s) for {}", scenes.len(), video_id);
        self.scenes.lock()?.set_scenes(video_id, scenes);
        Ok(())
    }

    /// Scenes registered for a video
    pub fn scenes_for(&self, video_id: &str) -> ProgressResult<Vec<SceneContext>> {
        Ok(self.scenes.lock()?.scenes(video_id).to_vec())
    }

    /// Records progress reported by the local session
    ///
    /// The scene is looked up in the local scene index. When `auto_sync`
    /// is on, the update is echoed to the transport.
    pub fn update_progress(
        &self,
        surface_id: &str,
        video_id: &str,
        user_id: &str,
        position: PlaybackPosition,
        session: SessionInfo,
        state: ProgressTrackingState,
    ) -> ProgressResult<ProgressState> {
        let mut position = position.normalized();
        let scene = self
            .scenes
            .lock()?
            .current_scene(video_id, position.position)
            .cloned();
        position.current_scene = scene.clone();

        let (record, events) =
            self.write_update(video_id, user_id, position, session, state, scene)?;

        if self.config.auto_sync {
            let message = ProgressMessage::UpdateProgress(UpdateProgressMessage {
                surface_id: surface_id.to_string(),
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                position: record.position.clone(),
                session: record.session.clone(),
                state: record.state,
                timestamp: record.last_synced_at,
            });
            self.send_outbound(&message);
        }

        self.emit_all(&events);
        Ok(record)
    }

    /// Decodes and handles a raw inbound message
    pub fn handle_json(&self, value: serde_json::Value) -> ProgressResult<()> {
        let message = ProgressMessage::decode(value)?;
        self.handle_message(message)
    }

    /// Handles a decoded inbound message
    pub fn handle_message(&self, message: ProgressMessage) -> ProgressResult<()> {
        log::debug!(
            "Handling {} for {}/{}",
            message.message_type(),
            message.target().0,
            message.target().1
        );

        match message {
            ProgressMessage::UpdateProgress(m) => self.on_update(m),
            ProgressMessage::ProgressSync(m) => self.on_sync(m),
            ProgressMessage::RequestProgress(m) => self.on_request(m),
            ProgressMessage::ProgressCleared(m) => self.on_cleared(m),
            ProgressMessage::ProgressConflict(m) => self.on_conflict(m),
        }
    }

    fn on_update(&self, message: UpdateProgressMessage) -> ProgressResult<()> {
        let position = message.position.normalized();
        let scene = position.current_scene.clone();
        let (_, events) = self.write_update(
            &message.video_id,
            &message.user_id,
            position,
            message.session,
            message.state,
            scene,
        )?;
        self.emit_all(&events);
        Ok(())
    }

    fn on_sync(&self, message: ProgressSyncMessage) -> ProgressResult<()> {
        let position = message.position.normalized();

        if let Some(source) = &message.source_session {
            let mut store = self.store.lock()?;
            let previous = store.get(&message.video_id, &message.user_id);
            let state = transition(
                previous.map(|p| p.state),
                ProgressTrackingState::from_playing(position.is_playing),
            );
            let last_scene_id = previous.and_then(|p| p.last_scene_id.clone());

            store.set(ProgressState {
                video_id: message.video_id.clone(),
                user_id: message.user_id.clone(),
                position: position.clone(),
                session: source.clone(),
                state,
                last_synced_at: Utc::now(),
                last_scene_id,
            });
        }

        self.events.emit(&ProgressEvent::ProgressSynced {
            video_id: message.video_id,
            user_id: message.user_id,
            position,
            session: message.source_session,
        });
        Ok(())
    }

    fn on_request(&self, message: RequestProgressMessage) -> ProgressResult<()> {
        self.events.emit(&ProgressEvent::ProgressRequested {
            video_id: message.video_id,
            user_id: message.user_id,
        });
        Ok(())
    }

    fn on_cleared(&self, message: ProgressClearedMessage) -> ProgressResult<()> {
        self.store.lock()?.delete(&message.video_id, &message.user_id);
        self.events.emit(&ProgressEvent::ProgressCleared {
            video_id: message.video_id,
            user_id: message.user_id,
        });
        Ok(())
    }

    fn on_conflict(&self, message: ProgressConflictMessage) -> ProgressResult<()> {
        let strategy = message.resolution;
        let mut resolved = None;

        if self.config.enable_conflict_resolution && strategy.is_automatic() {
            let mut store = self.store.lock()?;
            let positions: SessionPositions = store
                .get(&message.video_id, &message.user_id)
                .map(|record| (record.session.session_id.clone(), record.position.clone()))
                .into_iter()
                .collect();

            resolved =
                ConflictResolver::resolve(&message.conflicting_sessions, &positions, strategy)
                    .cloned();

            if let Some(winner) = &resolved {
                if let Some(record) = store.get_mut(&message.video_id, &message.user_id) {
                    record.session = winner.clone();
                }
            }
        }

        match &resolved {
            Some(winner) => log::info!(
                "Conflict for {}/{} resolved by {} in favour of {}",
                message.video_id,
                message.user_id,
                strategy,
                winner.session_id
            ),
            None => log::info!(
                "Conflict for {}/{} left for the user ({} session(s))",
                message.video_id,
                message.user_id,
                message.conflicting_sessions.len()
            ),
        }

        self.events.emit(&ProgressEvent::ProgressConflict {
            video_id: message.video_id,
            user_id: message.user_id,
            conflict: ConflictInfo {
                conflicting_sessions: message.conflicting_sessions,
                resolution: strategy,
                resolved_session: resolved,
            },
        });
        Ok(())
    }

    /// Writes a record and collects the events it causes
    fn write_update(
        &self,
        video_id: &str,
        user_id: &str,
        position: PlaybackPosition,
        session: SessionInfo,
        reported: ProgressTrackingState,
        scene: Option<SceneContext>,
    ) -> ProgressResult<(ProgressState, Vec<ProgressEvent>)> {
        let (record, scene_changed) = {
            let mut store = self.store.lock()?;
            let previous = store.get(video_id, user_id);
            let previous_scene = previous.and_then(|p| p.last_scene_id.as_deref());
            let scene_changed = scene
                .as_ref()
                .is_some_and(|s| previous_scene != Some(s.scene_id.as_str()));

            let record = ProgressState {
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                position,
                session,
                state: transition(previous.map(|p| p.state), reported),
                last_synced_at: Utc::now(),
                last_scene_id: scene.as_ref().map(|s| s.scene_id.clone()),
            };
            store.set(record.clone());
            (record, scene_changed)
        };

        let mut events = vec![ProgressEvent::ProgressUpdated {
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            position: record.position.clone(),
            session: record.session.clone(),
        }];

        if let (true, Some(scene)) = (scene_changed, scene) {
            events.push(ProgressEvent::SceneChanged {
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                position: record.position.clone(),
                scene,
            });
        }

        if record.is_completed(self.config.completion_threshold) {
            events.push(ProgressEvent::VideoCompleted {
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                position: record.position.clone(),
            });
        }

        if scene_changed && self.config.sync_strategy == SyncStrategy::SceneBoundary {
            events.push(ProgressEvent::SyncRequired {
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                position: record.position.clone(),
                session: record.session.clone(),
            });
        }

        Ok((record, events))
    }

    /// Canonical record for a video/user pair
    pub fn get_progress_state(
        &self,
        video_id: &str,
        user_id: &str,
    ) -> ProgressResult<Option<ProgressState>> {
        Ok(self.store.lock()?.get(video_id, user_id).cloned())
    }

    /// Removes the record locally and tells the other sessions
    pub fn clear_progress(
        &self,
        surface_id: &str,
        video_id: &str,
        user_id: &str,
        reason: Option<ClearReason>,
    ) -> ProgressResult<Option<ProgressState>> {
        let removed = self.store.lock()?.delete(video_id, user_id);

        self.send_outbound(&ProgressMessage::ProgressCleared(ProgressClearedMessage {
            surface_id: surface_id.to_string(),
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            reason,
            timestamp: Utc::now(),
        }));

        self.events.emit(&ProgressEvent::ProgressCleared {
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(removed)
    }

    /// Asks the other sessions for their progress
    pub fn request_progress(
        &self,
        surface_id: &str,
        video_id: &str,
        user_id: &str,
        device_id: &str,
    ) -> ProgressResult<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| ProgressError::Transport("no transport configured".to_string()))?;

        transport.send(&ProgressMessage::RequestProgress(RequestProgressMessage {
            surface_id: surface_id.to_string(),
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        }))
    }

    /// Sends the canonical record to the other sessions
    ///
    /// This is the answer to a `progressRequested` event. Returns `None`
    /// when nothing is tracked for the pair.
    pub fn sync_progress(
        &self,
        surface_id: &str,
        video_id: &str,
        user_id: &str,
    ) -> ProgressResult<Option<ProgressSyncMessage>> {
        let Some(record) = self.get_progress_state(video_id, user_id)? else {
            return Ok(None);
        };

        let next_scenes =
            self.scenes
                .lock()?
                .next_scenes(video_id, record.position.position, NEXT_SCENE_LIMIT);
        let is_resume = record.position.position > 0.0
            && !record.is_completed(self.config.completion_threshold);

        let message = ProgressSyncMessage {
            surface_id: surface_id.to_string(),
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            position: record.position,
            source_session: Some(record.session.clone()),
            active_sessions: Some(vec![record.session]),
            is_resume,
            last_saved_at: record.last_synced_at,
            next_scenes: (!next_scenes.is_empty()).then_some(next_scenes),
        };

        self.send_outbound(&ProgressMessage::ProgressSync(message.clone()));
        Ok(Some(message))
    }

    /// Position, scene and upcoming scenes for resuming playback
    pub fn resume_context(
        &self,
        video_id: &str,
        user_id: &str,
    ) -> ProgressResult<Option<ResumeContext>> {
        let Some(record) = self.get_progress_state(video_id, user_id)? else {
            return Ok(None);
        };

        let scenes = self.scenes.lock()?;
        let scene = scenes
            .current_scene(video_id, record.position.position)
            .cloned()
            .or_else(|| record.position.current_scene.clone());
        let next_scenes = scenes.next_scenes(video_id, record.position.position, NEXT_SCENE_LIMIT);

        Ok(Some(ResumeContext {
            position: record.position,
            scene,
            next_scenes,
            state: record.state,
            session: record.session,
        }))
    }

    /// Applies the session a user picked for an unresolved conflict
    ///
    /// Returns false if no record exists for the pair.
    pub fn apply_conflict_resolution(
        &self,
        video_id: &str,
        user_id: &str,
        conflicting_sessions: Vec<SessionInfo>,
        chosen: SessionInfo,
    ) -> ProgressResult<bool> {
        let applied = match self.store.lock()?.get_mut(video_id, user_id) {
            Some(record) => {
                record.session = chosen.clone();
                true
            }
            None => false,
        };

        if applied {
            log::info!(
                "User resolved conflict for {}/{} in favour of {}",
                video_id,
                user_id,
                chosen.session_id
            );
            self.events.emit(&ProgressEvent::ProgressConflict {
                video_id: video_id.to_string(),
                user_id: user_id.to_string(),
                conflict: ConflictInfo {
                    conflicting_sessions,
                    resolution: crate::types::ConflictResolution::PromptUser,
                    resolved_session: Some(chosen),
                },
            });
        }
        Ok(applied)
    }

    /// Picks a session with the configured default strategy
    pub fn resolve_conflict(
        &self,
        sessions: &[SessionInfo],
        positions: &SessionPositions,
    ) -> Option<SessionInfo> {
        self.resolver.resolve_default(sessions, positions).cloned()
    }

    /// Number of tracked video/user pairs, 0 with a warning if the store is poisoned
    pub fn tracked_count(&self) -> usize {
        match self.store.lock() {
            Ok(store) => store.len(),
            Err(_) => {
                log::warn!("Progress store lock poisoned, reporting no tracked records");
                0
            }
        }
    }

    /// Starts the recurring sync check if the configuration calls for it
    ///
    /// Returns whether the check is scheduled. Safe to call repeatedly.
    pub fn start(&self) -> ProgressResult<bool> {
        if !self.config.schedules_sync() {
            log::debug!(
                "Recurring sync check disabled (auto_sync={}, strategy={:?})",
                self.config.auto_sync,
                self.config.sync_strategy
            );
            return Ok(false);
        }

        self.scheduler
            .start(Arc::clone(&self.store), Arc::clone(&self.events))?;
        Ok(true)
    }

    /// Stops the recurring sync check
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Returns true while the recurring check runs
    pub fn is_syncing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stops the scheduler and drops every event subscription
    pub fn shutdown(&self) -> ProgressResult<()> {
        self.stop();
        self.events.clear()
    }

    fn send_outbound(&self, message: &ProgressMessage) {
        let Some(transport) = &self.transport else {
            return;
        };
        if let Err(e) = transport.send(message) {
            log::warn!("Failed to send {}: {}", message.message_type(), e);
        }
    }

    fn emit_all(&self, events: &[ProgressEvent]) {
        for event in events {
            self.events.emit(event);
        }
    }
}

impl std::fmt::Debug for ProgressCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCoordinator")
            .field("config", &self.config)
            .field("tracked", &self.tracked_count())
            .field("syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}
