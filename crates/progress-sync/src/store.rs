// crates/progress-sync/src/store.rs
//! Canonical progress records keyed by (video, user)

use crate::types::{ProgressKey, ProgressState};
use std::collections::HashMap;

/// Holds the canonical record for each (video, user) pair
///
/// No validation happens here and the store is not synchronized; the
/// coordinator keeps it behind a single lock.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    records: HashMap<ProgressKey, ProgressState>,
}

impl ProgressStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the record for a video/user pair
    pub fn get(&self, video_id: &str, user_id: &str) -> Option<&ProgressState> {
        self.records.get(&ProgressKey::new(video_id, user_id))
    }

    /// Gets a mutable record for a video/user pair
    pub fn get_mut(&mut self, video_id: &str, user_id: &str) -> Option<&mut ProgressState> {
        self.records.get_mut(&ProgressKey::new(video_id, user_id))
    }

    /// Stores a record, returning the one it replaced
    pub fn set(&mut self, state: ProgressState) -> Option<ProgressState> {
        self.records.insert(state.key(), state)
    }

    /// Removes the record for a video/user pair
    pub fn delete(&mut self, video_id: &str, user_id: &str) -> Option<ProgressState> {
        self.records.remove(&ProgressKey::new(video_id, user_id))
    }

    /// Removes all records
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Iterates over all records
    pub fn iter(&self) -> impl Iterator<Item = &ProgressState> {
        self.records.values()
    }

    /// Number of tracked pairs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceType, PlaybackPosition, ProgressTrackingState, SessionInfo};
    use chrono::Utc;

    fn record(video_id: &str, user_id: &str, position: f64) -> ProgressState {
        ProgressState {
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            position: PlaybackPosition::new(position, 100.0, true),
            session: SessionInfo::new("device-1", DeviceType::Desktop),
            state: ProgressTrackingState::Active,
            last_synced_at: Utc::now(),
            last_scene_id: None,
        }
    }

    #[test]
    fn test_store_creation() {
        let store = ProgressStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut store = ProgressStore::new();
        assert!(store.set(record("video-1", "user-1", 10.0)).is_none());

        let stored = store.get("video-1", "user-1").unwrap();
        assert_eq!(stored.position.position, 10.0);
        assert!(store.get("video-1", "user-2").is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let mut store = ProgressStore::new();
        store.set(record("video-1", "user-1", 10.0));
        let previous = store.set(record("video-1", "user-1", 20.0)).unwrap();

        assert_eq!(previous.position.position, 10.0);
        assert_eq!(store.get("video-1", "user-1").unwrap().position.position, 20.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_mut() {
        let mut store = ProgressStore::new();
        store.set(record("video-1", "user-1", 10.0));
        store.get_mut("video-1", "user-1").unwrap().state = ProgressTrackingState::Paused;
        assert_eq!(
            store.get("video-1", "user-1").unwrap().state,
            ProgressTrackingState::Paused
        );
    }

    #[test]
    fn test_delete() {
        let mut store = ProgressStore::new();
        store.set(record("video-1", "user-1", 10.0));
        store.set(record("video-2", "user-1", 20.0));

        assert!(store.delete("video-1", "user-1").is_some());
        assert!(store.delete("video-1", "user-1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = ProgressStore::new();
        store.set(record("video-1", "user-1", 10.0));
        store.set(record("video-1", "user-2", 20.0));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_with_delimiters_stay_distinct() {
        let mut store = ProgressStore::new();
        store.set(record("a:b", "c", 10.0));
        store.set(record("a", "b:c", 20.0));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a:b", "c").unwrap().position.position, 10.0);
        assert_eq!(store.get("a", "b:c").unwrap().position.position, 20.0);
    }
}
