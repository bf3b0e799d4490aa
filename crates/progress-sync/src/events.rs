// crates/progress-sync/src/events.rs
//! Local event subscriptions
//!
//! Handlers are registered per event kind. Emission takes a snapshot of
//! the handler list first, so a handler may subscribe or unsubscribe
//! (itself included) without disturbing the dispatch in progress.

use crate::conflict::ConflictInfo;
use crate::error::ProgressResult;
use crate::types::{PlaybackPosition, SceneContext, SessionInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Event handler type
pub type EventHandler = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Names of the events a coordinator emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressEventKind {
    /// A position was written
    ProgressUpdated,
    /// A sync message was processed
    ProgressSynced,
    /// A session asked for progress
    ProgressRequested,
    /// A record was removed
    ProgressCleared,
    /// Sessions disagreed about progress
    ProgressConflict,
    /// Playback moved into another scene
    SceneChanged,
    /// Progress crossed the completion threshold
    VideoCompleted,
    /// A record needs re-synchronization
    SyncRequired,
}

impl ProgressEventKind {
    /// Event name as exposed to subscribers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgressUpdated => "progressUpdated",
            Self::ProgressSynced => "progressSynced",
            Self::ProgressRequested => "progressRequested",
            Self::ProgressCleared => "progressCleared",
            Self::ProgressConflict => "progressConflict",
            Self::SceneChanged => "sceneChanged",
            Self::VideoCompleted => "videoCompleted",
            Self::SyncRequired => "syncRequired",
        }
    }
}

/// Payload delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A position was written
    ProgressUpdated {
        video_id: String,
        user_id: String,
        position: PlaybackPosition,
        session: SessionInfo,
    },
    /// A sync message was processed
    ProgressSynced {
        video_id: String,
        user_id: String,
        position: PlaybackPosition,
        session: Option<SessionInfo>,
    },
    /// A session asked for progress
    ProgressRequested { video_id: String, user_id: String },
    /// A record was removed
    ProgressCleared { video_id: String, user_id: String },
    /// Sessions disagreed about progress
    ProgressConflict {
        video_id: String,
        user_id: String,
        conflict: ConflictInfo,
    },
    /// Playback moved into another scene
    SceneChanged {
        video_id: String,
        user_id: String,
        position: PlaybackPosition,
        scene: SceneContext,
    },
    /// Progress crossed the completion threshold
    VideoCompleted {
        video_id: String,
        user_id: String,
        position: PlaybackPosition,
    },
    /// A record needs re-synchronization
    SyncRequired {
        video_id: String,
        user_id: String,
        position: PlaybackPosition,
        session: SessionInfo,
    },
}

impl ProgressEvent {
    /// Kind of this event
    pub fn kind(&self) -> ProgressEventKind {
        match self {
            Self::ProgressUpdated { .. } => ProgressEventKind::ProgressUpdated,
            Self::ProgressSynced { .. } => ProgressEventKind::ProgressSynced,
            Self::ProgressRequested { .. } => ProgressEventKind::ProgressRequested,
            Self::ProgressCleared { .. } => ProgressEventKind::ProgressCleared,
            Self::ProgressConflict { .. } => ProgressEventKind::ProgressConflict,
            Self::SceneChanged { .. } => ProgressEventKind::SceneChanged,
            Self::VideoCompleted { .. } => ProgressEventKind::VideoCompleted,
            Self::SyncRequired { .. } => ProgressEventKind::SyncRequired,
        }
    }

    /// Video and user the event concerns
    pub fn target(&self) -> (&str, &str) {
        match self {
            Self::ProgressUpdated { video_id, user_id, .. }
            | Self::ProgressSynced { video_id, user_id, .. }
            | Self::ProgressRequested { video_id, user_id }
            | Self::ProgressCleared { video_id, user_id }
            | Self::ProgressConflict { video_id, user_id, .. }
            | Self::SceneChanged { video_id, user_id, .. }
            | Self::VideoCompleted { video_id, user_id, .. }
            | Self::SyncRequired { video_id, user_id, .. } => (video_id.as_str(), user_id.as_str()),
        }
    }
}

/// Handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event subscriptions keyed by kind
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<ProgressEventKind, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to one event kind
    pub fn on<F>(&self, kind: ProgressEventKind, handler: F) -> ProgressResult<SubscriptionId>
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock()?;
        handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Removes a subscription, returning whether it existed
    pub fn off(&self, kind: ProgressEventKind, id: SubscriptionId) -> ProgressResult<bool> {
        let mut handlers = self.handlers.lock()?;
        let Some(list) = handlers.get_mut(&kind) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        Ok(list.len() != before)
    }

    /// Delivers an event to every current subscriber of its kind
    pub fn emit(&self, event: &ProgressEvent) {
        let snapshot: Vec<EventHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => {
                log::warn!("Event handler lock poisoned, dropping {}", event.kind().as_str());
                return;
            }
        };

        log::debug!(
            "Emitting {} to {} handler(s)",
            event.kind().as_str(),
            snapshot.len()
        );
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of handlers for a kind
    pub fn handler_count(&self, kind: ProgressEventKind) -> usize {
        self.handlers
            .lock()
            .map(|h| h.get(&kind).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Removes every subscription
    pub fn clear(&self) -> ProgressResult<()> {
        self.handlers.lock()?.clear();
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
