// crates/progress-sync/src/lib.rs
//! Cross-session playback progress synchronization
//!
//! A [`ProgressCoordinator`] keeps one canonical record per (video, user)
//! pair and reconciles reports from every device session watching it:
//! - Progress updates from the local player and from remote sessions
//! - Scene tracking and completion detection
//! - Resume information for newly joined sessions
//! - Conflict resolution between sessions that disagree
//! - A recurring check that flags records needing re-synchronization
//!
//! # Example
//!
//! ```rust
//! use streamsync_progress::{
//!     DeviceType, PlaybackPosition, ProgressConfig, ProgressCoordinator, ProgressEventKind,
//!     ProgressTrackingState, SceneContext, SessionInfo,
//! };
//!
//! let coordinator = ProgressCoordinator::new(ProgressConfig::default()).unwrap();
//! coordinator
//!     .set_scenes("movie-1", vec![SceneContext::new("opening", "Opening", 0.0, 300.0)])
//!     .unwrap();
//!
//! coordinator
//!     .on(ProgressEventKind::SceneChanged, |event| {
//!         println!("scene changed: {:?}", event.target());
//!     })
//!     .unwrap();
//!
//! let state = coordinator
//!     .update_progress(
//!         "player",
//!         "movie-1",
//!         "user-1",
//!         PlaybackPosition::new(42.0, 5400.0, true),
//!         SessionInfo::new("living-room", DeviceType::Tv),
//!         ProgressTrackingState::Active,
//!     )
//!     .unwrap();
//!
//! assert_eq!(state.last_scene_id.as_deref(), Some("opening"));
//! ```

mod config;
mod conflict;
mod coordinator;
mod error;
mod events;
mod protocol;
mod scenes;
mod scheduler;
mod store;
mod transport;
mod types;

pub use config::{ProgressConfig, SyncStrategy, ValidationError};
pub use conflict::{ConflictInfo, ConflictResolver, SessionPositions};
pub use coordinator::{ProgressCoordinator, ResumeContext};
pub use error::{ProgressError, ProgressResult};
pub use events::{EventBus, EventHandler, ProgressEvent, ProgressEventKind, SubscriptionId};
pub use protocol::{
    ClearReason, MessageType, ProgressClearedMessage, ProgressConflictMessage, ProgressMessage,
    ProgressSyncMessage, RequestProgressMessage, UpdateProgressMessage,
};
pub use scenes::{find_current_scene, get_next_scenes, SceneIndex};
pub use scheduler::SyncScheduler;
pub use store::ProgressStore;
pub use transport::{MemoryTransport, MessageHandler, ProgressTransport};
pub use types::{
    calculate_progress, is_completed, transition, ConflictResolution, DeviceType,
    PlaybackPosition, ProgressKey, ProgressState, ProgressTrackingState, SceneContext,
    SessionInfo,
};
