//! Data models for Scrumline entities.
//!
//! This module defines the core data structures:
//! - `Project` - Top-level container with a globally unique slug
//! - `Milestone` - A time-boxed sprint with estimated start/finish dates
//! - `UserStory` - Backlog work with points and a rolled-up status
//! - `Task` - Work items whose statuses drive the story rollup
//! - `Document` / `Question` - Entities carrying their own slug namespaces
//! - `MilestoneStats` / `BurndownData` - Statistics output shapes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// User-story status. Always derived from the story's task set; stored for
/// querying but recomputed on every task mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Open,
    Progress,
    Completed,
    Closed,
}

impl StoryStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }
}

/// Task status. Superset of the story statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Progress,
    Completed,
    Closed,
    Workaround,
    Needinfo,
    Postponed,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Workaround => "workaround",
            Self::Needinfo => "needinfo",
            Self::Postponed => "postponed",
        }
    }
}

/// Kind of task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Task,
    Bug,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "progress" | "in-progress" | "in_progress" => Ok(Self::Progress),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            _ => Err(Error::InvalidInput(format!("invalid story status: {}", s))),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "progress" | "in-progress" | "in_progress" => Ok(Self::Progress),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            "workaround" => Ok(Self::Workaround),
            "needinfo" | "needs-info" => Ok(Self::Needinfo),
            "postponed" => Ok(Self::Postponed),
            _ => Err(Error::InvalidInput(format!("invalid task status: {}", s))),
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            _ => Err(Error::InvalidInput(format!("invalid task kind: {}", s))),
        }
    }
}

/// Story points from the configured discrete scale.
///
/// Two sentinels: `-1` means "not estimated" (excluded from sums) and `-2`
/// means "half point" (contributes 0.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Points(pub i32);

/// Sentinel for "not estimated".
pub const POINTS_UNESTIMATED: i32 = -1;
/// Sentinel for "half point".
pub const POINTS_HALF: i32 = -2;

impl Points {
    /// Numeric value used in point sums, or `None` for unestimated stories.
    pub fn value(self) -> Option<f64> {
        match self.0 {
            POINTS_UNESTIMATED => None,
            POINTS_HALF => Some(0.5),
            v => Some(f64::from(v)),
        }
    }
}

impl Default for Points {
    fn default() -> Self {
        Self(POINTS_UNESTIMATED)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            POINTS_UNESTIMATED => f.write_str("?"),
            POINTS_HALF => f.write_str("1/2"),
            v => write!(f, "{}", v),
        }
    }
}

/// Entity kind for reference allocation. References are unique within a
/// (project, kind) scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Story,
    Task,
}

impl RefKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Story => "user_story",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slug namespace. Each namespace is independently unique across its whole
/// entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugNamespace {
    Project,
    Document,
    Question,
}

impl SlugNamespace {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Document => "document",
            Self::Question => "question",
        }
    }
}

impl fmt::Display for SlugNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Project name (unique)
    pub name: String,

    /// URL-safe handle, globally unique across all projects
    pub slug: String,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,

    /// Last update timestamp
    pub modified_date: DateTime<Utc>,
}

impl Project {
    /// Create a new project with the given name and slug.
    pub fn new(name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            slug,
            created_date: now,
            modified_date: now,
        }
    }
}

/// A time-boxed sprint containing a subset of a project's stories and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Milestone name (unique per project)
    pub name: String,

    /// First day of the sprint
    pub estimated_start: NaiveDate,

    /// Last day of the sprint (start <= finish, enforced at the boundary)
    pub estimated_finish: NaiveDate,

    /// Whether the sprint has been closed
    pub closed: bool,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,

    /// Last update timestamp
    pub modified_date: DateTime<Utc>,
}

impl Milestone {
    /// Create a new milestone for a project.
    pub fn new(
        project_id: i64,
        name: String,
        estimated_start: NaiveDate,
        estimated_finish: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            name,
            estimated_start,
            estimated_finish,
            closed: false,
            created_date: now,
            modified_date: now,
        }
    }
}

/// A unit of product backlog work, decomposed into tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStory {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Sprint assignment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,

    /// Human-facing reference, unique per project, assigned exactly once
    #[serde(rename = "ref")]
    pub ref_code: String,

    /// Story subject
    pub subject: String,

    /// Story points (see `Points` sentinels)
    pub points: Points,

    /// Rolled-up status, derived from the task set
    pub status: StoryStatus,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,

    /// Last update timestamp
    pub modified_date: DateTime<Utc>,
}

impl UserStory {
    /// Create a new story with an already-allocated reference.
    pub fn new(project_id: i64, ref_code: String, subject: String, points: Points) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            milestone_id: None,
            ref_code,
            subject,
            points,
            status: StoryStatus::Open,
            created_date: now,
            modified_date: now,
        }
    }
}

/// A work item, optionally attached to a user story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Story this task belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_story_id: Option<i64>,

    /// Direct sprint assignment for tasks without a story
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,

    /// Human-facing reference, unique per project, assigned exactly once
    #[serde(rename = "ref")]
    pub ref_code: String,

    /// Task subject
    pub subject: String,

    /// Current status
    pub status: TaskStatus,

    /// Task or bug
    pub kind: TaskKind,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,

    /// Last update timestamp
    pub modified_date: DateTime<Utc>,
}

impl Task {
    /// Create a new task with an already-allocated reference.
    pub fn new(project_id: i64, ref_code: String, subject: String, kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            user_story_id: None,
            milestone_id: None,
            ref_code,
            subject,
            status: TaskStatus::Open,
            kind,
            created_date: now,
            modified_date: now,
        }
    }
}

/// A project document; slugs are unique across all documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Document title
    pub title: String,

    /// URL-safe handle, unique across the document namespace
    pub slug: String,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,
}

impl Document {
    pub fn new(project_id: i64, title: String, slug: String) -> Self {
        Self {
            id: 0,
            project_id,
            title,
            slug,
            created_date: Utc::now(),
        }
    }
}

/// A project question; slugs are unique across all questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Row ID (0 before first persistence)
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Question subject
    pub subject: String,

    /// URL-safe handle, unique across the question namespace
    pub slug: String,

    /// Whether the question has been closed
    pub closed: bool,

    /// Creation timestamp
    pub created_date: DateTime<Utc>,
}

impl Question {
    pub fn new(project_id: i64, subject: String, slug: String) -> Self {
        Self {
            id: 0,
            project_id,
            subject,
            slug,
            closed: false,
            created_date: Utc::now(),
        }
    }
}

/// Aggregate statistics for a milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneStats {
    /// Sum of points over all stories (sentinel rules applied)
    pub total_points: f64,
    /// Same sum restricted to closed stories
    pub completed_points: f64,
    /// completed * 100 / total; 0 when total is 0
    pub percentage_completed: f64,
    /// Number of stories in the milestone
    pub us_number: usize,
    /// Number of closed stories
    pub us_completed_number: usize,
    /// Number of tasks of kind `task`
    pub task_number: usize,
    /// Number of completed tasks of kind `task`
    pub task_completed_number: usize,
}

/// Burndown series for a milestone, one entry per sprint day plus one
/// trailing entry at `estimated_finish + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurndownData {
    /// Points already done as of each day's midnight
    pub points_done_on_date: Vec<f64>,
    /// Total points in the sprint
    pub sprint_points: f64,
    /// First day of the sprint
    pub begin_date: NaiveDate,
    /// Last day of the sprint
    pub end_date: NaiveDate,
    /// Fractional x-axis position of "now", absent outside the sprint window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_position: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_parse_roundtrips() {
        for value in [
            StoryStatus::Open,
            StoryStatus::Progress,
            StoryStatus::Completed,
            StoryStatus::Closed,
        ] {
            let reparsed = StoryStatus::from_str(value.as_str()).unwrap();
            assert_eq!(value, reparsed);
        }

        for value in [
            TaskStatus::Open,
            TaskStatus::Progress,
            TaskStatus::Completed,
            TaskStatus::Closed,
            TaskStatus::Workaround,
            TaskStatus::Needinfo,
            TaskStatus::Postponed,
        ] {
            let reparsed = TaskStatus::from_str(value.as_str()).unwrap();
            assert_eq!(value, reparsed);
        }
    }

    #[test]
    fn status_parse_rejects_unknown_values() {
        assert!(StoryStatus::from_str("workaround").is_err());
        assert!(TaskStatus::from_str("done").is_err());
        assert!(TaskKind::from_str("epic").is_err());
    }

    #[test]
    fn status_json_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&StoryStatus::Progress).unwrap(),
            "\"progress\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Workaround).unwrap(),
            "\"workaround\""
        );
    }

    #[test]
    fn points_sentinels() {
        assert_eq!(Points(POINTS_UNESTIMATED).value(), None);
        assert_eq!(Points(POINTS_HALF).value(), Some(0.5));
        assert_eq!(Points(0).value(), Some(0.0));
        assert_eq!(Points(8).value(), Some(8.0));
    }

    #[test]
    fn points_display() {
        assert_eq!(Points(-1).to_string(), "?");
        assert_eq!(Points(-2).to_string(), "1/2");
        assert_eq!(Points(5).to_string(), "5");
    }

    #[test]
    fn points_serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&Points(-2)).unwrap(), "-2");
        let p: Points = serde_json::from_str("3").unwrap();
        assert_eq!(p, Points(3));
    }

    #[test]
    fn story_ref_serializes_as_ref() {
        let story = UserStory::new(1, "4".into(), "subject".into(), Points(3));
        let json = serde_json::to_value(&story).unwrap();
        assert_eq!(json["ref"], "4");
        assert_eq!(json["status"], "open");
    }
}
