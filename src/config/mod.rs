//! Configuration for the Scrumline core.
//!
//! The closed-status sets and the legal point scale are project/system-wide
//! values injected into the rollup and statistics engines; they are not owned
//! by the engines themselves. Configuration lives in `scrumline.toml` inside
//! the storage root; a missing file means compiled-in defaults.
//!
//! ```toml
//! story_closed_statuses = ["completed", "closed"]
//! task_closed_statuses = ["completed", "closed", "workaround"]
//! point_scale = [-1, 0, -2, 1, 2, 3, 5, 8, 10, 15, 20, 40]
//! max_alloc_retries = 100
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{Points, StoryStatus, TaskStatus};
use crate::Result;

/// Config file name inside the storage root.
pub const CONFIG_FILE: &str = "scrumline.toml";

/// Legal point values, including the two sentinels (-1 unestimated, -2 half).
pub const DEFAULT_POINT_SCALE: &[i32] = &[-1, 0, -2, 1, 2, 3, 5, 8, 10, 15, 20, 40];

/// Default bound on allocator retries before `AllocationExhausted`.
pub const DEFAULT_MAX_ALLOC_RETRIES: u32 = 100;

/// Injected configuration for the allocation, rollup, and statistics engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Story statuses counted as "done" for point aggregation
    pub story_closed_statuses: Vec<StoryStatus>,

    /// Task statuses counted as "done" for the rollup and task counts
    pub task_closed_statuses: Vec<TaskStatus>,

    /// Legal `points` values
    pub point_scale: Vec<i32>,

    /// Bound on reference/slug allocation retries
    pub max_alloc_retries: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            story_closed_statuses: vec![StoryStatus::Completed, StoryStatus::Closed],
            task_closed_statuses: vec![
                TaskStatus::Completed,
                TaskStatus::Closed,
                TaskStatus::Workaround,
            ],
            point_scale: DEFAULT_POINT_SCALE.to_vec(),
            max_alloc_retries: DEFAULT_MAX_ALLOC_RETRIES,
        }
    }
}

impl CoreConfig {
    /// Load configuration from `scrumline.toml` in the given storage root.
    /// A missing file yields the defaults.
    pub fn load(storage_root: &Path) -> Result<Self> {
        let path = storage_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Whether a story status counts as "done".
    pub fn is_story_closed(&self, status: StoryStatus) -> bool {
        self.story_closed_statuses.contains(&status)
    }

    /// Whether a task status counts as "done".
    pub fn is_task_closed(&self, status: TaskStatus) -> bool {
        self.task_closed_statuses.contains(&status)
    }

    /// Whether a point value is on the configured scale.
    pub fn is_legal_points(&self, points: Points) -> bool {
        self.point_scale.contains(&points.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_original_scale() {
        let config = CoreConfig::default();
        assert!(config.is_legal_points(Points(-1)));
        assert!(config.is_legal_points(Points(-2)));
        assert!(config.is_legal_points(Points(40)));
        assert!(!config.is_legal_points(Points(4)));
        assert!(!config.is_legal_points(Points(7)));
    }

    #[test]
    fn default_closed_sets() {
        let config = CoreConfig::default();
        assert!(config.is_story_closed(StoryStatus::Completed));
        assert!(config.is_story_closed(StoryStatus::Closed));
        assert!(!config.is_story_closed(StoryStatus::Progress));

        assert!(config.is_task_closed(TaskStatus::Workaround));
        assert!(!config.is_task_closed(TaskStatus::Postponed));
        assert!(!config.is_task_closed(TaskStatus::Open));
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_alloc_retries, DEFAULT_MAX_ALLOC_RETRIES);
    }

    #[test]
    fn load_parses_partial_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "task_closed_statuses = [\"completed\", \"closed\"]\nmax_alloc_retries = 3\n",
        )
        .unwrap();

        let config = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_alloc_retries, 3);
        assert!(!config.is_task_closed(TaskStatus::Workaround));
        // untouched fields keep their defaults
        assert!(config.is_story_closed(StoryStatus::Closed));
        assert!(config.is_legal_points(Points(8)));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "point_scale = \"big\"\n").unwrap();
        assert!(CoreConfig::load(dir.path()).is_err());
    }
}
