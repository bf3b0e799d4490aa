// crates/progress-sync/src/scenes.rs
//! Per-video scene lists and position lookup
//!
//! Lookups scan the list in the order given. Callers that need
//! chronological answers must register scenes sorted by `start_time`;
//! nothing here re-sorts or checks for overlap.

use crate::types::SceneContext;
use std::collections::HashMap;

/// Returns the first scene containing `position`, in list order
pub fn find_current_scene(position: f64, scenes: &[SceneContext]) -> Option<&SceneContext> {
    scenes.iter().find(|scene| scene.contains(position))
}

/// Returns up to `limit` scenes starting after `position`, in list order
pub fn get_next_scenes(position: f64, scenes: &[SceneContext], limit: usize) -> Vec<SceneContext> {
    scenes
        .iter()
        .filter(|scene| scene.start_time > position)
        .take(limit)
        .cloned()
        .collect()
}

/// Scene lists keyed by video
#[derive(Debug, Clone, Default)]
pub struct SceneIndex {
    scenes: HashMap<String, Vec<SceneContext>>,
}

impl SceneIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scene list for a video
    pub fn set_scenes(&mut self, video_id: impl Into<String>, scenes: Vec<SceneContext>) {
        self.scenes.insert(video_id.into(), scenes);
    }

    /// Returns the scenes for a video, empty if none were registered
    pub fn scenes(&self, video_id: &str) -> &[SceneContext] {
        self.scenes.get(video_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes the scene list for a video
    pub fn remove(&mut self, video_id: &str) -> Option<Vec<SceneContext>> {
        self.scenes.remove(video_id)
    }

    /// Finds the scene containing `position` in a video
    pub fn current_scene(&self, video_id: &str, position: f64) -> Option<&SceneContext> {
        find_current_scene(position, self.scenes(video_id))
    }

    /// Scenes following `position` in a video
    pub fn next_scenes(&self, video_id: &str, position: f64, limit: usize) -> Vec<SceneContext> {
        get_next_scenes(position, self.scenes(video_id), limit)
    }

    /// Number of videos with registered scenes
    pub fn video_count(&self) -> usize {
        self.scenes.len()
    }
}
