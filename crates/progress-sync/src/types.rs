// crates/progress-sync/src/types.rs
//! Core progress types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Computes playback progress as a percentage clamped to `0..=100`
///
/// A non-positive duration always yields zero.
pub fn calculate_progress(position: f64, duration: f64) -> f64 {
    if duration <= 0.0 || duration.is_nan() || position.is_nan() {
        return 0.0;
    }
    (position / duration * 100.0).clamp(0.0, 100.0)
}

/// Returns true when the progress for `position` reaches `threshold` percent
pub fn is_completed(position: f64, duration: f64, threshold: f64) -> bool {
    calculate_progress(position, duration) >= threshold
}

/// Composite key for a canonical record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey {
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
}

impl ProgressKey {
    /// Creates a key from a video/user pair
    pub fn new(video_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.video_id, self.user_id)
    }
}

/// A named time interval within a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneContext {
    /// Scene identifier
    pub scene_id: String,
    /// Scene title
    pub title: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds (exclusive)
    pub end_time: f64,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional thumbnail URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl SceneContext {
    /// Creates a new scene
    pub fn new(
        scene_id: impl Into<String>,
        title: impl Into<String>,
        start_time: f64,
        end_time: f64,
    ) -> Self {
        Self {
            scene_id: scene_id.into(),
            title: title.into(),
            start_time,
            end_time,
            description: None,
            thumbnail: None,
        }
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the thumbnail URL
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Checks if a position falls within this scene
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_time && position < self.end_time
    }

    /// Scene length in seconds
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Playback position as reported by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPosition {
    /// Position in seconds
    pub position: f64,
    /// Total duration in seconds
    pub duration: f64,
    /// Progress percentage, always derived from position and duration
    #[serde(default)]
    pub progress: f64,
    /// Whether playback is running
    pub is_playing: bool,
    /// Scene containing the position, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_scene: Option<SceneContext>,
    /// Playback speed multiplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
    /// Stream quality label (e.g. "1080p")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Volume level (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Whether audio is muted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

impl PlaybackPosition {
    /// Creates a position with progress computed from `position`/`duration`
    pub fn new(position: f64, duration: f64, is_playing: bool) -> Self {
        Self {
            position,
            duration,
            progress: calculate_progress(position, duration),
            is_playing,
            current_scene: None,
            playback_rate: None,
            quality: None,
            volume: None,
            is_muted: None,
        }
    }

    /// Recomputes `progress`, discarding whatever value was reported
    pub fn normalized(mut self) -> Self {
        self.progress = calculate_progress(self.position, self.duration);
        self
    }

    /// Sets the current scene
    pub fn with_scene(mut self, scene: SceneContext) -> Self {
        self.current_scene = Some(scene);
        self
    }

    /// Sets the playback rate
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = Some(rate);
        self
    }

    /// Returns true if progress reaches `threshold` percent
    pub fn is_completed(&self, threshold: f64) -> bool {
        is_completed(self.position, self.duration, threshold)
    }
}

/// Kind of device a session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Desktop browser or app
    Desktop,
    /// Phone
    Mobile,
    /// Tablet
    Tablet,
    /// Television or set-top box
    Tv,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Tv => "tv",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One device connection reporting progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Unique per device connection
    pub session_id: String,
    /// Device identifier
    pub device_id: String,
    /// Device kind
    pub device_type: DeviceType,
    /// When the session began
    pub started_at: DateTime<Utc>,
    /// Last activity reported by the client
    pub last_activity_at: DateTime<Utc>,
    /// Human-readable device name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Client user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Client IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl SessionInfo {
    /// Creates a session with a fresh id, started now
    pub fn new(device_id: impl Into<String>, device_type: DeviceType) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            device_type,
            started_at: now,
            last_activity_at: now,
            device_name: None,
            user_agent: None,
            ip_address: None,
        }
    }

    /// Overrides the session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the device name
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Sets the last activity timestamp
    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity_at = at;
        self
    }

    /// Marks the session as active now
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

/// Tracking state of a canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressTrackingState {
    /// Playing
    #[default]
    Active,
    /// Paused
    Paused,
    /// Watched to the end
    Completed,
    /// Left unfinished
    Abandoned,
}

impl ProgressTrackingState {
    /// `Active` while playing, `Paused` otherwise
    pub fn from_playing(is_playing: bool) -> Self {
        if is_playing {
            Self::Active
        } else {
            Self::Paused
        }
    }

    /// States that the sync scheduler watches for staleness
    pub fn is_syncable(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl std::fmt::Display for ProgressTrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Chooses the state a record moves to when a new state is reported
///
/// Every reported state is accepted, including leaving `Completed` or
/// `Abandoned`. A stricter state machine replaces this function only.
pub fn transition(
    _previous: Option<ProgressTrackingState>,
    reported: ProgressTrackingState,
) -> ProgressTrackingState {
    reported
}

/// Conflict resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Session with the most recent activity wins
    UseLatest,
    /// Session furthest into the video wins
    UseFurthest,
    /// Defer to the user
    PromptUser,
}

impl ConflictResolution {
    /// Returns true if the strategy can be applied without a user
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::PromptUser)
    }
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UseLatest => "use_latest",
            Self::UseFurthest => "use_furthest",
            Self::PromptUser => "prompt_user",
        };
        f.write_str(name)
    }
}

/// Canonical progress record for one (video, user) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Latest position
    pub position: PlaybackPosition,
    /// Session that wrote the latest position
    pub session: SessionInfo,
    /// Tracking state
    pub state: ProgressTrackingState,
    /// When this record was last written
    pub last_synced_at: DateTime<Utc>,
    /// Scene the position was in at the last write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scene_id: Option<String>,
}

impl ProgressState {
    /// Returns the store key for this record
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.video_id.clone(), self.user_id.clone())
    }

    /// Time elapsed since the last write, as seen at `now`
    pub fn since_last_sync(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_synced_at
    }

    /// Returns true if progress reaches `threshold` percent
    pub fn is_completed(&self, threshold: f64) -> bool {
        self.position.is_completed(threshold)
    }
}
