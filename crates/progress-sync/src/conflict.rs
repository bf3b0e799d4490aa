// crates/progress-sync/src/conflict.rs
//! Conflict detection and resolution between sessions

use crate::types::{ConflictResolution, PlaybackPosition, SessionInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Positions known for each session, keyed by session id
pub type SessionPositions = HashMap<String, PlaybackPosition>;

/// Outcome of a conflict between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// Sessions that reported inconsistent progress
    pub conflicting_sessions: Vec<SessionInfo>,
    /// Strategy that was requested
    pub resolution: ConflictResolution,
    /// Winning session; `None` means the user must choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_session: Option<SessionInfo>,
}

impl ConflictInfo {
    /// Returns true if a winner was picked
    pub fn is_resolved(&self) -> bool {
        self.resolved_session.is_some()
    }
}

/// Picks a winning session among conflicting ones
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    default_strategy: ConflictResolution,
}

impl ConflictResolver {
    /// Creates a resolver with a default strategy
    pub fn new(default_strategy: ConflictResolution) -> Self {
        Self { default_strategy }
    }

    /// Strategy used by [`ConflictResolver::resolve_default`]
    pub fn default_strategy(&self) -> ConflictResolution {
        self.default_strategy
    }

    /// Resolves using the default strategy
    pub fn resolve_default<'a>(
        &self,
        sessions: &'a [SessionInfo],
        positions: &SessionPositions,
    ) -> Option<&'a SessionInfo> {
        Self::resolve(sessions, positions, self.default_strategy)
    }

    /// Picks the winning session for `strategy`
    ///
    /// Ties go to the session listed first. `PromptUser` never resolves,
    /// and neither does an empty session list.
    pub fn resolve<'a>(
        sessions: &'a [SessionInfo],
        positions: &SessionPositions,
        strategy: ConflictResolution,
    ) -> Option<&'a SessionInfo> {
        match strategy {
            ConflictResolution::UseLatest => Self::latest(sessions),
            ConflictResolution::UseFurthest => Self::furthest(sessions, positions),
            ConflictResolution::PromptUser => None,
        }
    }

    fn latest(sessions: &[SessionInfo]) -> Option<&SessionInfo> {
        sessions.iter().reduce(|best, session| {
            if session.last_activity_at > best.last_activity_at {
                session
            } else {
                best
            }
        })
    }

    fn furthest<'a>(
        sessions: &'a [SessionInfo],
        positions: &SessionPositions,
    ) -> Option<&'a SessionInfo> {
        sessions
            .iter()
            .filter_map(|session| {
                positions
                    .get(&session.session_id)
                    .map(|position| (session, position.position))
            })
            .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
            .map(|(session, _)| session)
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictResolution::UseFurthest)
    }
}
