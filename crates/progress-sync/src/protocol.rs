// crates/progress-sync/src/protocol.rs
//! Wire messages exchanged over the transport
//!
//! Every message is a JSON object whose `type` field names the variant.
//! Decoding validates the shape before a message reaches the coordinator;
//! anything that fails is reported as [`ProgressError::InvalidMessage`].

use crate::error::{ProgressError, ProgressResult};
use crate::types::{
    ConflictResolution, PlaybackPosition, ProgressTrackingState, SceneContext, SessionInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message type names used for transport subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `updateProgress`
    UpdateProgress,
    /// `progressSync`
    ProgressSync,
    /// `requestProgress`
    RequestProgress,
    /// `progressCleared`
    ProgressCleared,
    /// `progressConflict`
    ProgressConflict,
}

impl MessageType {
    /// All inbound message types
    pub const ALL: [MessageType; 5] = [
        MessageType::UpdateProgress,
        MessageType::ProgressSync,
        MessageType::RequestProgress,
        MessageType::ProgressCleared,
        MessageType::ProgressConflict,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::UpdateProgress => "updateProgress",
            MessageType::ProgressSync => "progressSync",
            MessageType::RequestProgress => "requestProgress",
            MessageType::ProgressCleared => "progressCleared",
            MessageType::ProgressConflict => "progressConflict",
        }
    }

    /// Parses a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why progress was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    /// User asked for it
    UserAction,
    /// Record aged out
    Expiration,
    /// Video was finished
    Completion,
    /// Administrative reset
    Reset,
}

/// A session reports its playback position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressMessage {
    /// Originating UI surface
    pub surface_id: String,
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Reported position
    pub position: PlaybackPosition,
    /// Reporting session
    pub session: SessionInfo,
    /// Reported tracking state
    pub state: ProgressTrackingState,
    /// When the report was made
    pub timestamp: DateTime<Utc>,
}

/// Canonical progress pushed to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSyncMessage {
    /// Target UI surface
    pub surface_id: String,
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Canonical position
    pub position: PlaybackPosition,
    /// Session the position came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session: Option<SessionInfo>,
    /// Sessions currently watching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sessions: Option<Vec<SessionInfo>>,
    /// Whether the receiver should offer to resume
    pub is_resume: bool,
    /// When the position was last saved
    pub last_saved_at: DateTime<Utc>,
    /// Upcoming scenes for contextual resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scenes: Option<Vec<SceneContext>>,
}

/// A session asks for the canonical progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestProgressMessage {
    /// Requesting UI surface
    pub surface_id: String,
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Requesting device
    pub device_id: String,
}

/// Progress for a pair was removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressClearedMessage {
    /// Originating UI surface
    pub surface_id: String,
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Why it was cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ClearReason>,
    /// When it was cleared
    pub timestamp: DateTime<Utc>,
}

/// Several sessions disagree about progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressConflictMessage {
    /// Originating UI surface
    pub surface_id: String,
    /// Video identifier
    pub video_id: String,
    /// User identifier
    pub user_id: String,
    /// Sessions in conflict
    pub conflicting_sessions: Vec<SessionInfo>,
    /// Suggested resolution
    pub resolution: ConflictResolution,
    /// When the conflict was detected
    pub timestamp: DateTime<Utc>,
}

/// Any message carried by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressMessage {
    /// Position report
    UpdateProgress(UpdateProgressMessage),
    /// Canonical progress push
    ProgressSync(ProgressSyncMessage),
    /// Progress request
    RequestProgress(RequestProgressMessage),
    /// Progress removal
    ProgressCleared(ProgressClearedMessage),
    /// Session conflict
    ProgressConflict(ProgressConflictMessage),
}

impl ProgressMessage {
    /// Decodes and validates a raw JSON message
    pub fn decode(value: serde_json::Value) -> ProgressResult<Self> {
        let name = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProgressError::InvalidMessage("missing \"type\" field".to_string()))?;

        if MessageType::from_name(name).is_none() {
            return Err(ProgressError::UnknownMessageType(name.to_string()));
        }

        let message: ProgressMessage = serde_json::from_value(value)
            .map_err(|e| ProgressError::InvalidMessage(e.to_string()))?;
        message.validate()?;
        Ok(message.normalized())
    }

    /// Decodes and validates a JSON string
    pub fn from_json(json: &str) -> ProgressResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::decode(value)
    }

    /// Encodes the message as JSON
    pub fn to_json(&self) -> ProgressResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Type of this message
    pub fn message_type(&self) -> MessageType {
        match self {
            ProgressMessage::UpdateProgress(_) => MessageType::UpdateProgress,
            ProgressMessage::ProgressSync(_) => MessageType::ProgressSync,
            ProgressMessage::RequestProgress(_) => MessageType::RequestProgress,
            ProgressMessage::ProgressCleared(_) => MessageType::ProgressCleared,
            ProgressMessage::ProgressConflict(_) => MessageType::ProgressConflict,
        }
    }

    /// Video and user the message concerns
    pub fn target(&self) -> (&str, &str) {
        match self {
            ProgressMessage::UpdateProgress(m) => (m.video_id.as_str(), m.user_id.as_str()),
            ProgressMessage::ProgressSync(m) => (m.video_id.as_str(), m.user_id.as_str()),
            ProgressMessage::RequestProgress(m) => (m.video_id.as_str(), m.user_id.as_str()),
            ProgressMessage::ProgressCleared(m) => (m.video_id.as_str(), m.user_id.as_str()),
            ProgressMessage::ProgressConflict(m) => (m.video_id.as_str(), m.user_id.as_str()),
        }
    }

    /// Checks the fields serde cannot
    pub fn validate(&self) -> ProgressResult<()> {
        let (video_id, user_id) = self.target();
        require_id(video_id, "videoId")?;
        require_id(user_id, "userId")?;

        match self {
            ProgressMessage::UpdateProgress(m) => {
                require_id(&m.surface_id, "surfaceId")?;
                validate_position(&m.position)?;
                validate_session(&m.session)
            }
            ProgressMessage::ProgressSync(m) => {
                require_id(&m.surface_id, "surfaceId")?;
                validate_position(&m.position)?;
                if let Some(session) = &m.source_session {
                    validate_session(session)?;
                }
                for session in m.active_sessions.iter().flatten() {
                    validate_session(session)?;
                }
                for scene in m.next_scenes.iter().flatten() {
                    validate_scene(scene)?;
                }
                Ok(())
            }
            ProgressMessage::RequestProgress(m) => {
                require_id(&m.surface_id, "surfaceId")?;
                require_id(&m.device_id, "deviceId")
            }
            ProgressMessage::ProgressCleared(m) => require_id(&m.surface_id, "surfaceId"),
            ProgressMessage::ProgressConflict(m) => {
                require_id(&m.surface_id, "surfaceId")?;
                m.conflicting_sessions.iter().try_for_each(validate_session)
            }
        }
    }

    fn normalized(self) -> Self {
        match self {
            ProgressMessage::UpdateProgress(mut m) => {
                m.position = m.position.normalized();
                ProgressMessage::UpdateProgress(m)
            }
            ProgressMessage::ProgressSync(mut m) => {
                m.position = m.position.normalized();
                ProgressMessage::ProgressSync(m)
            }
            other => other,
        }
    }
}

fn require_id(value: &str, field: &str) -> ProgressResult<()> {
    if value.trim().is_empty() {
        Err(ProgressError::InvalidMessage(format!(
            "{} must not be empty",
            field
        )))
    } else {
        Ok(())
    }
}

fn validate_position(position: &PlaybackPosition) -> ProgressResult<()> {
    if !position.position.is_finite() || position.position < 0.0 {
        return Err(ProgressError::InvalidMessage(format!(
            "position must be a non-negative number (got: {})",
            position.position
        )));
    }
    if !position.duration.is_finite() || position.duration < 0.0 {
        return Err(ProgressError::InvalidMessage(format!(
            "duration must be a non-negative number (got: {})",
            position.duration
        )));
    }
    if let Some(rate) = position.playback_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ProgressError::InvalidMessage(format!(
                "playbackRate must be positive (got: {})",
                rate
            )));
        }
    }
    if let Some(volume) = position.volume {
        if !(0.0..=1.0).contains(&volume) {
            return Err(ProgressError::InvalidMessage(format!(
                "volume must be between 0 and 1 (got: {})",
                volume
            )));
        }
    }
    if let Some(scene) = &position.current_scene {
        validate_scene(scene)?;
    }
    Ok(())
}

fn validate_session(session: &SessionInfo) -> ProgressResult<()> {
    require_id(&session.session_id, "sessionId")?;
    require_id(&session.device_id, "deviceId")
}

fn validate_scene(scene: &SceneContext) -> ProgressResult<()> {
    require_id(&scene.scene_id, "sceneId")?;
    if scene.start_time < scene.end_time {
        Ok(())
    } else {
        Err(ProgressError::InvalidMessage(format!(
            "scene {} must start before it ends",
            scene.scene_id
        )))
    }
}
