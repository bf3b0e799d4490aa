// crates/progress-sync/src/config.rs
//! Coordinator configuration
//!
//! Configuration is fixed once a coordinator is constructed. Values can be
//! built in code or parsed from a TOML document:
//!
//! ```toml
//! auto_sync = true
//! sync_strategy = "scene-boundary"
//! sync_interval_ms = 5000
//! completion_threshold = 90.0
//! ```

use crate::error::{ProgressError, ProgressResult};
use crate::types::ConflictResolution;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the coordinator asks for re-synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// Only on explicit request
    Manual,
    /// On a recurring staleness check
    Automatic,
    /// Whenever playback crosses into a new scene
    SceneBoundary,
}

/// Progress coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Echo local updates to the transport and run the recurring check
    pub auto_sync: bool,

    /// Re-synchronization trigger
    pub sync_strategy: SyncStrategy,

    /// Staleness interval and check period in milliseconds
    pub sync_interval_ms: u64,

    /// Distance from a scene edge, in seconds, that counts as "near" it.
    /// Reserved; nothing reads it yet.
    pub scene_boundary_threshold_secs: f64,

    /// Progress percentage at which a video counts as watched
    pub completion_threshold: f64,

    /// Resolve conflicts automatically when the strategy allows it
    pub enable_conflict_resolution: bool,

    /// Strategy for locally initiated conflict resolution
    pub default_conflict_resolution: ConflictResolution,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_strategy: SyncStrategy::Automatic,
            sync_interval_ms: 10_000,
            scene_boundary_threshold_secs: 5.0,
            completion_threshold: 95.0,
            enable_conflict_resolution: true,
            default_conflict_resolution: ConflictResolution::UseFurthest,
        }
    }
}

impl ProgressConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> ProgressResult<Self> {
        let config: ProgressConfig = toml::from_str(contents)?;
        config.validate().map_err(ProgressError::InvalidConfig)?;
        Ok(config)
    }

    /// Validates all fields, collecting every error
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.sync_interval_ms, 100, 3_600_000, "sync_interval_ms"),
            Validator::in_range(
                self.completion_threshold,
                0.0,
                100.0,
                "completion_threshold",
            ),
            Validator::in_range(
                self.scene_boundary_threshold_secs,
                0.0,
                600.0,
                "scene_boundary_threshold_secs",
            ),
        ])
    }

    /// Recurring check period as a `Duration`
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Returns true if the recurring staleness check should run
    pub fn schedules_sync(&self) -> bool {
        self.auto_sync && self.sync_strategy == SyncStrategy::Automatic
    }

    /// Sets the sync strategy
    pub fn with_sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    /// Sets the sync interval
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the completion threshold percentage
    pub fn with_completion_threshold(mut self, threshold: f64) -> Self {
        self.completion_threshold = threshold;
        self
    }

    /// Enables or disables automatic conflict resolution
    pub fn with_conflict_resolution(mut self, enabled: bool) -> Self {
        self.enable_conflict_resolution = enabled;
        self
    }

    /// Enables or disables auto sync
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }
}

/// Validation error for a specific config field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field name
    pub field: String,

    /// Human-readable error message
    pub message: String,

    /// The invalid value, if available
    pub value: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Creates a validation error with the invalid value
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: Some(value.to_string()),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}': {}", self.field, self.message)?;
        if let Some(ref value) = self.value {
            write!(f, " (got: {})", value)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

struct Validator;

impl Validator {
    fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        // NaN fails both comparisons, so test for inclusion instead
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        }
    }

    fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
