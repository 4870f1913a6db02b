//! Storage layer for Scrumline data.
//!
//! Entities live in a SQLite database under
//! `~/.local/share/scrumline/<workspace-hash>/core.db`. The allocator's
//! contract (atomic counter reservation, UNIQUE-constraint-backed refs and
//! slugs) is what pins SQLite as the store.
//!
//! The `SCL_DATA_DIR` environment variable overrides the data directory;
//! the `*_with_data_dir` constructors are the dependency-injection path used
//! by tests.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::{
    Document, Milestone, Points, Project, Question, RefKind, SlugNamespace, StoryStatus, Task,
    TaskKind, TaskStatus, UserStory,
};
use crate::{Error, Result};

const DB_FILE: &str = "core.db";

const PROJECT_COLS: &str = "id, name, slug, created_date, modified_date";
const MILESTONE_COLS: &str =
    "id, project_id, name, estimated_start, estimated_finish, closed, created_date, modified_date";
const STORY_COLS: &str =
    "id, project_id, milestone_id, ref, subject, points, status, created_date, modified_date";
const TASK_COLS: &str = "id, project_id, user_story_id, milestone_id, ref, subject, status, kind, created_date, modified_date";

/// Storage manager for a single workspace.
pub struct Storage {
    /// Root directory for this workspace's data
    pub root: PathBuf,
    /// SQLite connection
    conn: Connection,
}

impl Storage {
    /// Open existing storage for the given workspace path.
    pub fn open(workspace: &Path) -> Result<Self> {
        let root = get_storage_dir(workspace)?;
        Self::open_at(root)
    }

    /// Initialize storage for a new workspace.
    pub fn init(workspace: &Path) -> Result<Self> {
        let root = get_storage_dir(workspace)?;
        Self::init_at(root)
    }

    /// Check if storage exists for the given workspace.
    pub fn exists(workspace: &Path) -> Result<bool> {
        let root = get_storage_dir(workspace)?;
        Ok(root.join(DB_FILE).exists())
    }

    /// Open storage rooted under an explicit data directory (DI for tests).
    pub fn open_with_data_dir(workspace: &Path, data_dir: &Path) -> Result<Self> {
        let root = storage_dir_under(workspace, data_dir)?;
        Self::open_at(root)
    }

    /// Initialize storage rooted under an explicit data directory (DI for tests).
    pub fn init_with_data_dir(workspace: &Path, data_dir: &Path) -> Result<Self> {
        let root = storage_dir_under(workspace, data_dir)?;
        Self::init_at(root)
    }

    /// Check for storage under an explicit data directory (DI for tests).
    pub fn exists_with_data_dir(workspace: &Path, data_dir: &Path) -> Result<bool> {
        let root = storage_dir_under(workspace, data_dir)?;
        Ok(root.join(DB_FILE).exists())
    }

    fn open_at(root: PathBuf) -> Result<Self> {
        if !root.join(DB_FILE).exists() {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(root.join(DB_FILE))?;
        Self::init_schema(&conn)?;

        Ok(Self { root, conn })
    }

    fn init_at(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;

        let conn = Connection::open(root.join(DB_FILE))?;
        Self::init_schema(&conn)?;

        tracing::debug!(root = %root.display(), "storage initialized");
        Ok(Self { root, conn })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                created_date TEXT NOT NULL,
                modified_date TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS milestones (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                estimated_start TEXT NOT NULL,
                estimated_finish TEXT NOT NULL,
                closed INTEGER NOT NULL DEFAULT 0,
                created_date TEXT NOT NULL,
                modified_date TEXT NOT NULL,
                UNIQUE (project_id, name)
            );

            CREATE TABLE IF NOT EXISTS user_stories (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                milestone_id INTEGER REFERENCES milestones(id) ON DELETE SET NULL,
                ref TEXT NOT NULL,
                subject TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT -1,
                status TEXT NOT NULL DEFAULT 'open',
                created_date TEXT NOT NULL,
                modified_date TEXT NOT NULL,
                UNIQUE (project_id, ref)
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_story_id INTEGER REFERENCES user_stories(id) ON DELETE SET NULL,
                milestone_id INTEGER REFERENCES milestones(id) ON DELETE SET NULL,
                ref TEXT NOT NULL,
                subject TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                kind TEXT NOT NULL DEFAULT 'task',
                created_date TEXT NOT NULL,
                modified_date TEXT NOT NULL,
                UNIQUE (project_id, ref)
            );

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_date TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                closed INTEGER NOT NULL DEFAULT 0,
                created_date TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ref_counters (
                project_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                next_seq INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (project_id, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_milestones_project ON milestones(project_id);
            CREATE INDEX IF NOT EXISTS idx_user_stories_milestone ON user_stories(milestone_id);
            CREATE INDEX IF NOT EXISTS idx_user_stories_status ON user_stories(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_story ON tasks(user_story_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_milestone ON tasks(milestone_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            "#,
        )?;

        Ok(())
    }

    // === Transactions ===

    /// Begin an IMMEDIATE transaction. Callers must pair with `commit` or
    /// `rollback`; the rollup engine uses this to serialize per-story
    /// recomputation against concurrent writers.
    pub fn begin_immediate(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Roll back the open transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // === Projects ===

    /// Add a new project. Sets `project.id` from the inserted row.
    pub fn add_project(&mut self, project: &mut Project) -> Result<()> {
        self.conn.execute(
            "INSERT INTO projects (name, slug, created_date, modified_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project.name,
                project.slug,
                fmt_dt(project.created_date),
                fmt_dt(project.modified_date),
            ],
        )?;
        project.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Get a project by slug.
    pub fn get_project(&self, slug: &str) -> Result<Project> {
        let sql = format!("SELECT {PROJECT_COLS} FROM projects WHERE slug = ?1");
        self.conn
            .query_row(&sql, [slug], project_from_row)
            .map_err(|e| not_found(e, format!("project '{}'", slug)))
    }

    /// Check whether a project name is already taken.
    pub fn project_name_exists(&self, name: &str) -> Result<bool> {
        let taken = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    /// List all projects, oldest first.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let sql = format!("SELECT {PROJECT_COLS} FROM projects ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], project_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // === Milestones ===

    /// Add a new milestone. Sets `milestone.id` from the inserted row.
    pub fn add_milestone(&mut self, milestone: &mut Milestone) -> Result<()> {
        self.conn.execute(
            "INSERT INTO milestones
             (project_id, name, estimated_start, estimated_finish, closed, created_date, modified_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                milestone.project_id,
                milestone.name,
                milestone.estimated_start.to_string(),
                milestone.estimated_finish.to_string(),
                milestone.closed,
                fmt_dt(milestone.created_date),
                fmt_dt(milestone.modified_date),
            ],
        )?;
        milestone.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Get a milestone by project and name.
    pub fn get_milestone(&self, project_id: i64, name: &str) -> Result<Milestone> {
        let sql = format!("SELECT {MILESTONE_COLS} FROM milestones WHERE project_id = ?1 AND name = ?2");
        self.conn
            .query_row(&sql, params![project_id, name], milestone_from_row)
            .map_err(|e| not_found(e, format!("milestone '{}'", name)))
    }

    /// List a project's milestones, newest first.
    pub fn list_milestones(&self, project_id: i64) -> Result<Vec<Milestone>> {
        let sql =
            format!("SELECT {MILESTONE_COLS} FROM milestones WHERE project_id = ?1 ORDER BY id DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], milestone_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark a milestone closed and bump its modified date.
    pub fn close_milestone(&mut self, id: i64, modified: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE milestones SET closed = 1, modified_date = ?2 WHERE id = ?1",
            params![id, fmt_dt(modified)],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("milestone id {}", id)));
        }
        Ok(())
    }

    // === User stories ===

    /// Add a new story. Sets `story.id` from the inserted row.
    pub fn add_story(&mut self, story: &mut UserStory) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_stories
             (project_id, milestone_id, ref, subject, points, status, created_date, modified_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                story.project_id,
                story.milestone_id,
                story.ref_code,
                story.subject,
                story.points.0,
                story.status.as_str(),
                fmt_dt(story.created_date),
                fmt_dt(story.modified_date),
            ],
        )?;
        story.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Get a story by project and reference.
    pub fn get_story(&self, project_id: i64, ref_code: &str) -> Result<UserStory> {
        let sql = format!("SELECT {STORY_COLS} FROM user_stories WHERE project_id = ?1 AND ref = ?2");
        self.conn
            .query_row(&sql, params![project_id, ref_code], story_from_row)
            .map_err(|e| not_found(e, format!("user story #{}", ref_code)))
    }

    /// Get a story by row ID.
    pub fn get_story_by_id(&self, id: i64) -> Result<UserStory> {
        let sql = format!("SELECT {STORY_COLS} FROM user_stories WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], story_from_row)
            .map_err(|e| not_found(e, format!("user story id {}", id)))
    }

    /// List a project's stories, oldest first.
    pub fn list_stories(&self, project_id: i64) -> Result<Vec<UserStory>> {
        let sql = format!("SELECT {STORY_COLS} FROM user_stories WHERE project_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], story_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List the stories assigned to a milestone.
    pub fn stories_for_milestone(&self, milestone_id: i64) -> Result<Vec<UserStory>> {
        let sql =
            format!("SELECT {STORY_COLS} FROM user_stories WHERE milestone_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([milestone_id], story_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Persist a recomputed story status together with its modified date.
    pub fn update_story_status(
        &mut self,
        id: i64,
        status: StoryStatus,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE user_stories SET status = ?2, modified_date = ?3 WHERE id = ?1",
            params![id, status.as_str(), fmt_dt(modified)],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user story id {}", id)));
        }
        Ok(())
    }

    /// Reassign a story to a milestone (or back to the backlog with `None`).
    pub fn update_story_milestone(
        &mut self,
        id: i64,
        milestone_id: Option<i64>,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE user_stories SET milestone_id = ?2, modified_date = ?3 WHERE id = ?1",
            params![id, milestone_id, fmt_dt(modified)],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user story id {}", id)));
        }
        Ok(())
    }

    // === Tasks ===

    /// Add a new task. Sets `task.id` from the inserted row.
    pub fn add_task(&mut self, task: &mut Task) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tasks
             (project_id, user_story_id, milestone_id, ref, subject, status, kind, created_date, modified_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.project_id,
                task.user_story_id,
                task.milestone_id,
                task.ref_code,
                task.subject,
                task.status.as_str(),
                task.kind.as_str(),
                fmt_dt(task.created_date),
                fmt_dt(task.modified_date),
            ],
        )?;
        task.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Get a task by project and reference.
    pub fn get_task(&self, project_id: i64, ref_code: &str) -> Result<Task> {
        let sql = format!("SELECT {TASK_COLS} FROM tasks WHERE project_id = ?1 AND ref = ?2");
        self.conn
            .query_row(&sql, params![project_id, ref_code], task_from_row)
            .map_err(|e| not_found(e, format!("task #{}", ref_code)))
    }

    /// List a project's tasks, oldest first.
    pub fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLS} FROM tasks WHERE project_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], task_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List the tasks linked to a story.
    pub fn tasks_for_story(&self, story_id: i64) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLS} FROM tasks WHERE user_story_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([story_id], task_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List a milestone's tasks: tasks attached directly plus tasks of the
    /// milestone's stories.
    pub fn tasks_for_milestone(&self, milestone_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLS} FROM tasks
             WHERE milestone_id = ?1
                OR user_story_id IN (SELECT id FROM user_stories WHERE milestone_id = ?1)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([milestone_id], task_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Update a task's status together with its modified date.
    pub fn update_task_status(
        &mut self,
        id: i64,
        status: TaskStatus,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET status = ?2, modified_date = ?3 WHERE id = ?1",
            params![id, status.as_str(), fmt_dt(modified)],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("task id {}", id)));
        }
        Ok(())
    }

    /// Relink a task to a story (or detach it with `None`).
    pub fn update_task_story(
        &mut self,
        id: i64,
        user_story_id: Option<i64>,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET user_story_id = ?2, modified_date = ?3 WHERE id = ?1",
            params![id, user_story_id, fmt_dt(modified)],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("task id {}", id)));
        }
        Ok(())
    }

    /// Delete a task by row ID.
    pub fn delete_task(&mut self, id: i64) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("task id {}", id)));
        }
        Ok(())
    }

    /// Whether a story has at least one task modified strictly before the
    /// cutoff. Used as the completion-time proxy for burndown.
    pub fn has_task_modified_before(
        &self,
        story_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<bool> {
        let hit = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE user_story_id = ?1 AND modified_date < ?2)",
            params![story_id, fmt_dt(cutoff)],
            |row| row.get(0),
        )?;
        Ok(hit)
    }

    // === Reference and slug scopes ===

    /// Atomically reserve the next reference sequence value for a
    /// (project, kind) scope. Reserved values are never handed out twice,
    /// even when the subsequent insert fails.
    pub fn reserve_ref_seq(&mut self, project_id: i64, kind: RefKind) -> Result<u64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO ref_counters (project_id, kind, next_seq) VALUES (?1, ?2, 1)
             ON CONFLICT(project_id, kind) DO UPDATE SET next_seq = next_seq + 1",
            params![project_id, kind.as_str()],
        )?;
        let seq: i64 = tx.query_row(
            "SELECT next_seq FROM ref_counters WHERE project_id = ?1 AND kind = ?2",
            params![project_id, kind.as_str()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(seq as u64)
    }

    /// Whether a candidate reference is already taken within (project, kind).
    pub fn ref_exists(&self, project_id: i64, kind: RefKind, candidate: &str) -> Result<bool> {
        let table = match kind {
            RefKind::Story => "user_stories",
            RefKind::Task => "tasks",
        };
        let sql =
            format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE project_id = ?1 AND ref = ?2)");
        let taken = self
            .conn
            .query_row(&sql, params![project_id, candidate], |row| row.get(0))?;
        Ok(taken)
    }

    /// Whether a candidate slug is already taken within its namespace.
    pub fn slug_exists(&self, namespace: SlugNamespace, candidate: &str) -> Result<bool> {
        let table = match namespace {
            SlugNamespace::Project => "projects",
            SlugNamespace::Document => "documents",
            SlugNamespace::Question => "questions",
        };
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE slug = ?1)");
        let taken = self.conn.query_row(&sql, [candidate], |row| row.get(0))?;
        Ok(taken)
    }

    // === Documents and questions ===

    /// Add a new document. Sets `document.id` from the inserted row.
    pub fn add_document(&mut self, document: &mut Document) -> Result<()> {
        self.conn.execute(
            "INSERT INTO documents (project_id, title, slug, created_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                document.project_id,
                document.title,
                document.slug,
                fmt_dt(document.created_date),
            ],
        )?;
        document.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Add a new question. Sets `question.id` from the inserted row.
    pub fn add_question(&mut self, question: &mut Question) -> Result<()> {
        self.conn.execute(
            "INSERT INTO questions (project_id, subject, slug, closed, created_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                question.project_id,
                question.subject,
                question.slug,
                question.closed,
                fmt_dt(question.created_date),
            ],
        )?;
        question.id = self.conn.last_insert_rowid();
        Ok(())
    }
}

/// Get the storage directory for a workspace.
///
/// Uses a hash of the workspace path to create a unique directory under
/// `~/.local/share/scrumline/`, or under `SCL_DATA_DIR` when set.
pub fn get_storage_dir(workspace: &Path) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SCL_DATA_DIR") {
        return storage_dir_under(workspace, Path::new(&dir));
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    storage_dir_under(workspace, &data_dir.join("scrumline"))
}

fn storage_dir_under(workspace: &Path, base: &Path) -> Result<PathBuf> {
    let canonical = workspace
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize workspace path: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());

    Ok(base.join(&hash_hex[..12]))
}

// === Row mapping ===

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    raw.parse::<NaiveDate>().map_err(|e| conversion_err(idx, e))
}

fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_err(idx, e))
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_date: dt_col(row, 3)?,
        modified_date: dt_col(row, 4)?,
    })
}

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        estimated_start: date_col(row, 3)?,
        estimated_finish: date_col(row, 4)?,
        closed: row.get(5)?,
        created_date: dt_col(row, 6)?,
        modified_date: dt_col(row, 7)?,
    })
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<UserStory> {
    Ok(UserStory {
        id: row.get(0)?,
        project_id: row.get(1)?,
        milestone_id: row.get(2)?,
        ref_code: row.get(3)?,
        subject: row.get(4)?,
        points: Points(row.get(5)?),
        status: enum_col(row, 6)?,
        created_date: dt_col(row, 7)?,
        modified_date: dt_col(row, 8)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_story_id: row.get(2)?,
        milestone_id: row.get(3)?,
        ref_code: row.get(4)?,
        subject: row.get(5)?,
        status: enum_col(row, 6)?,
        kind: enum_col::<TaskKind>(row, 7)?,
        created_date: dt_col(row, 8)?,
        modified_date: dt_col(row, 9)?,
    })
}

fn not_found(e: rusqlite::Error, what: String) -> Error {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound(what),
        other => Error::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskKind, TaskStatus};
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn seeded_project(storage: &mut Storage) -> Project {
        let mut project = Project::new("Greenfield".into(), "greenfield".into());
        storage.add_project(&mut project).unwrap();
        project
    }

    #[test]
    fn open_before_init_fails() {
        let env = TestEnv::new();
        match Storage::open_with_data_dir(env.path(), env.data_path()) {
            Err(Error::NotInitialized) => {}
            other => panic!("expected NotInitialized, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn project_roundtrip() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);
        assert!(project.id > 0);

        let loaded = storage.get_project("greenfield").unwrap();
        assert_eq!(loaded.id, project.id);
        assert_eq!(loaded.name, "Greenfield");
        assert!(storage.project_name_exists("Greenfield").unwrap());
        assert!(!storage.project_name_exists("Other").unwrap());
    }

    #[test]
    fn story_and_task_roundtrip() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        let mut story = UserStory::new(project.id, "1".into(), "login flow".into(), Points(3));
        storage.add_story(&mut story).unwrap();

        let mut task = Task::new(project.id, "1".into(), "backend".into(), TaskKind::Task);
        task.user_story_id = Some(story.id);
        storage.add_task(&mut task).unwrap();

        let loaded = storage.get_story(project.id, "1").unwrap();
        assert_eq!(loaded.subject, "login flow");
        assert_eq!(loaded.points, Points(3));

        let tasks = storage.tasks_for_story(story.id).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Open);

        // story and task references live in separate scopes
        assert!(storage.ref_exists(project.id, RefKind::Story, "1").unwrap());
        assert!(storage.ref_exists(project.id, RefKind::Task, "1").unwrap());
        assert!(!storage.ref_exists(project.id, RefKind::Task, "2").unwrap());
    }

    #[test]
    fn ref_counter_is_monotonic_per_scope() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        let a = storage.reserve_ref_seq(project.id, RefKind::Story).unwrap();
        let b = storage.reserve_ref_seq(project.id, RefKind::Story).unwrap();
        let c = storage.reserve_ref_seq(project.id, RefKind::Task).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, 1);
    }

    #[test]
    fn tasks_for_milestone_includes_direct_and_story_tasks() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        let mut milestone = Milestone::new(
            project.id,
            "Sprint 1".into(),
            "2026-01-05".parse().unwrap(),
            "2026-01-09".parse().unwrap(),
        );
        storage.add_milestone(&mut milestone).unwrap();

        let mut story = UserStory::new(project.id, "1".into(), "story".into(), Points(1));
        story.milestone_id = Some(milestone.id);
        storage.add_story(&mut story).unwrap();

        let mut linked = Task::new(project.id, "1".into(), "linked".into(), TaskKind::Task);
        linked.user_story_id = Some(story.id);
        storage.add_task(&mut linked).unwrap();

        let mut direct = Task::new(project.id, "2".into(), "direct".into(), TaskKind::Bug);
        direct.milestone_id = Some(milestone.id);
        storage.add_task(&mut direct).unwrap();

        let mut unrelated = Task::new(project.id, "3".into(), "unrelated".into(), TaskKind::Task);
        storage.add_task(&mut unrelated).unwrap();

        let tasks = storage.tasks_for_milestone(milestone.id).unwrap();
        let refs: Vec<&str> = tasks.iter().map(|t| t.ref_code.as_str()).collect();
        assert_eq!(refs, vec!["1", "2"]);
    }

    #[test]
    fn task_modified_cutoff_is_strict() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        let mut story = UserStory::new(project.id, "1".into(), "story".into(), Points(1));
        storage.add_story(&mut story).unwrap();

        let mut task = Task::new(project.id, "1".into(), "task".into(), TaskKind::Task);
        task.user_story_id = Some(story.id);
        storage.add_task(&mut task).unwrap();

        let modified = task.modified_date;
        assert!(!storage.has_task_modified_before(story.id, modified).unwrap());
        assert!(storage
            .has_task_modified_before(story.id, modified + Duration::microseconds(1))
            .unwrap());
    }

    #[test]
    fn slug_scopes_are_independent() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        let mut doc = Document::new(project.id, "Setup".into(), "setup".into());
        storage.add_document(&mut doc).unwrap();

        assert!(storage.slug_exists(SlugNamespace::Document, "setup").unwrap());
        assert!(!storage.slug_exists(SlugNamespace::Question, "setup").unwrap());
        assert!(storage
            .slug_exists(SlugNamespace::Project, "greenfield")
            .unwrap());
    }

    #[test]
    fn missing_entities_report_not_found() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let project = seeded_project(&mut storage);

        assert!(matches!(
            storage.get_story(project.id, "zz"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            storage.get_milestone(project.id, "nope"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(storage.delete_task(42), Err(Error::NotFound(_))));
    }

    #[test]
    fn storage_survives_reopen() {
        let env = TestEnv::new();
        {
            let mut storage = env.init_storage();
            seeded_project(&mut storage);
        }
        let storage = env.open_storage();
        assert_eq!(storage.list_projects().unwrap().len(), 1);
    }
}
