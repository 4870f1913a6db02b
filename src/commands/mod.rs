//! Command implementations for the Scrumline CLI.
//!
//! This module contains the business logic for each CLI command. Entity
//! creation runs reference/slug allocation and persists through the
//! allocator's retry path; every task mutation that touches a story triggers
//! a status rollup. Milestone date
//! ranges are validated here, at the boundary, so the statistics engine never
//! sees a start after a finish from our own writes.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::alloc::ReferenceAllocator;
use crate::config::CoreConfig;
use crate::models::{
    BurndownData, Document, Milestone, MilestoneStats, Points, Project, Question, RefKind,
    SlugNamespace, Task, TaskKind, TaskStatus, UserStory,
};
use crate::rollup::StatusRollupEngine;
use crate::stats::{format_points, StatisticsEngine};
use crate::storage::Storage;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output: Serialize {
    /// Format for human-readable output.
    fn to_human(&self) -> String;

    /// Serialize to JSON string.
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Open storage and load the injected configuration for a workspace.
struct Context {
    storage: Storage,
    config: CoreConfig,
}

impl Context {
    fn open(workspace: &Path) -> Result<Self> {
        let storage = Storage::open(workspace)?;
        let config = CoreConfig::load(&storage.root)?;
        Ok(Self { storage, config })
    }
}

// === System ===

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub data_dir: String,
}

impl Output for InitOutput {
    fn to_human(&self) -> String {
        format!("Initialized scrumline storage at {}", self.data_dir)
    }
}

/// Initialize storage for the workspace.
pub fn system_init(workspace: &Path) -> Result<InitOutput> {
    let storage = Storage::init(workspace)?;
    Ok(InitOutput {
        data_dir: storage.root.display().to_string(),
    })
}

// === Projects ===

/// Create a project, allocating its globally unique slug from the name.
pub fn project_create(workspace: &Path, name: &str) -> Result<Project> {
    let mut ctx = Context::open(workspace)?;

    if ctx.storage.project_name_exists(name)? {
        return Err(Error::InvalidInput(format!(
            "project name '{}' already exists",
            name
        )));
    }

    let allocator = ReferenceAllocator::new(&ctx.config);
    allocator.insert_with_slug(
        &mut ctx.storage,
        SlugNamespace::Project,
        name,
        |store, slug| {
            let mut project = Project::new(name.to_string(), slug);
            store.add_project(&mut project)?;
            Ok(project)
        },
    )
}

pub fn project_show(workspace: &Path, slug: &str) -> Result<Project> {
    let ctx = Context::open(workspace)?;
    ctx.storage.get_project(slug)
}

pub fn project_list(workspace: &Path) -> Result<ProjectList> {
    let ctx = Context::open(workspace)?;
    Ok(ProjectList(ctx.storage.list_projects()?))
}

// === Milestones ===

/// Create a milestone, rejecting inverted date ranges at this boundary.
pub fn milestone_create(
    workspace: &Path,
    project_slug: &str,
    name: &str,
    start: &str,
    finish: &str,
) -> Result<Milestone> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let estimated_start = parse_date(start)?;
    let estimated_finish = parse_date(finish)?;
    if estimated_start > estimated_finish {
        return Err(Error::InvalidInput(format!(
            "estimated start {} is after estimated finish {}",
            estimated_start, estimated_finish
        )));
    }

    let mut milestone = Milestone::new(
        project.id,
        name.to_string(),
        estimated_start,
        estimated_finish,
    );
    ctx.storage.add_milestone(&mut milestone)?;
    Ok(milestone)
}

pub fn milestone_list(workspace: &Path, project_slug: &str) -> Result<MilestoneList> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    Ok(MilestoneList(ctx.storage.list_milestones(project.id)?))
}

pub fn milestone_stats(
    workspace: &Path,
    project_slug: &str,
    name: &str,
) -> Result<MilestoneStats> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let milestone = ctx.storage.get_milestone(project.id, name)?;

    let engine = StatisticsEngine::new(&ctx.config);
    engine.milestone_stats(&ctx.storage, milestone.id)
}

pub fn milestone_burndown(
    workspace: &Path,
    project_slug: &str,
    name: &str,
) -> Result<BurndownData> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let milestone = ctx.storage.get_milestone(project.id, name)?;

    let engine = StatisticsEngine::new(&ctx.config);
    engine.burndown(&ctx.storage, &milestone, Utc::now())
}

pub fn milestone_close(workspace: &Path, project_slug: &str, name: &str) -> Result<Milestone> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let milestone = ctx.storage.get_milestone(project.id, name)?;

    ctx.storage.close_milestone(milestone.id, Utc::now())?;
    ctx.storage.get_milestone(project.id, name)
}

// === Stories ===

/// Create a story with an allocated ref, validating points against the scale.
pub fn story_create(
    workspace: &Path,
    project_slug: &str,
    subject: &str,
    points: i32,
    milestone: Option<&str>,
) -> Result<UserStory> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let points = Points(points);
    if !ctx.config.is_legal_points(points) {
        return Err(Error::InvalidInput(format!(
            "points {} are not on the configured scale",
            points.0
        )));
    }

    let milestone_id = match milestone {
        Some(name) => Some(ctx.storage.get_milestone(project.id, name)?.id),
        None => None,
    };

    let allocator = ReferenceAllocator::new(&ctx.config);
    let ref_code = allocator.allocate_ref(&mut ctx.storage, project.id, RefKind::Story)?;

    let mut story = UserStory::new(project.id, ref_code, subject.to_string(), points);
    story.milestone_id = milestone_id;
    ctx.storage.add_story(&mut story)?;
    Ok(story)
}

pub fn story_show(workspace: &Path, project_slug: &str, story_ref: &str) -> Result<UserStory> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    ctx.storage.get_story(project.id, story_ref)
}

pub fn story_list(workspace: &Path, project_slug: &str) -> Result<StoryList> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    Ok(StoryList(ctx.storage.list_stories(project.id)?))
}

pub fn story_move(
    workspace: &Path,
    project_slug: &str,
    story_ref: &str,
    milestone: Option<&str>,
) -> Result<UserStory> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let story = ctx.storage.get_story(project.id, story_ref)?;

    let milestone_id = match milestone {
        Some(name) => Some(ctx.storage.get_milestone(project.id, name)?.id),
        None => None,
    };

    ctx.storage
        .update_story_milestone(story.id, milestone_id, Utc::now())?;
    ctx.storage.get_story(project.id, story_ref)
}

// === Tasks ===

/// Create a task with an allocated ref; attaching it to a story rolls the
/// story's status up immediately.
pub fn task_create(
    workspace: &Path,
    project_slug: &str,
    subject: &str,
    story: Option<&str>,
    milestone: Option<&str>,
    kind: &str,
) -> Result<Task> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let kind: TaskKind = kind.parse()?;
    let story_id = match story {
        Some(ref_code) => Some(ctx.storage.get_story(project.id, ref_code)?.id),
        None => None,
    };
    let milestone_id = match milestone {
        Some(name) => Some(ctx.storage.get_milestone(project.id, name)?.id),
        None => None,
    };

    let allocator = ReferenceAllocator::new(&ctx.config);
    let ref_code = allocator.allocate_ref(&mut ctx.storage, project.id, RefKind::Task)?;

    let mut task = Task::new(project.id, ref_code, subject.to_string(), kind);
    task.user_story_id = story_id;
    task.milestone_id = milestone_id;
    ctx.storage.add_task(&mut task)?;

    if let Some(story_id) = story_id {
        StatusRollupEngine::new(&ctx.config).recompute(&mut ctx.storage, story_id)?;
    }

    Ok(task)
}

pub fn task_show(workspace: &Path, project_slug: &str, task_ref: &str) -> Result<Task> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    ctx.storage.get_task(project.id, task_ref)
}

/// Change a task's status and roll its story's status up.
pub fn task_status(
    workspace: &Path,
    project_slug: &str,
    task_ref: &str,
    status: &str,
) -> Result<Task> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let task = ctx.storage.get_task(project.id, task_ref)?;

    let status: TaskStatus = status.parse()?;
    ctx.storage.update_task_status(task.id, status, Utc::now())?;

    if let Some(story_id) = task.user_story_id {
        StatusRollupEngine::new(&ctx.config).recompute(&mut ctx.storage, story_id)?;
    }

    ctx.storage.get_task(project.id, task_ref)
}

/// Relink a task to another story (or detach it); both the former and the
/// new story get their statuses rolled up.
pub fn task_move(
    workspace: &Path,
    project_slug: &str,
    task_ref: &str,
    story: Option<&str>,
) -> Result<Task> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let task = ctx.storage.get_task(project.id, task_ref)?;

    let new_story_id = match story {
        Some(ref_code) => Some(ctx.storage.get_story(project.id, ref_code)?.id),
        None => None,
    };

    ctx.storage
        .update_task_story(task.id, new_story_id, Utc::now())?;

    let engine = StatusRollupEngine::new(&ctx.config);
    if let Some(old_story_id) = task.user_story_id {
        engine.recompute(&mut ctx.storage, old_story_id)?;
    }
    if let Some(story_id) = new_story_id {
        if Some(story_id) != task.user_story_id {
            engine.recompute(&mut ctx.storage, story_id)?;
        }
    }

    ctx.storage.get_task(project.id, task_ref)
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub deleted: String,
}

impl Output for DeleteOutput {
    fn to_human(&self) -> String {
        format!("Deleted task #{}", self.deleted)
    }
}

/// Delete a task and roll its former story's status up.
pub fn task_delete(workspace: &Path, project_slug: &str, task_ref: &str) -> Result<DeleteOutput> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;
    let task = ctx.storage.get_task(project.id, task_ref)?;

    ctx.storage.delete_task(task.id)?;

    if let Some(story_id) = task.user_story_id {
        StatusRollupEngine::new(&ctx.config).recompute(&mut ctx.storage, story_id)?;
    }

    Ok(DeleteOutput {
        deleted: task.ref_code,
    })
}

pub fn task_list(
    workspace: &Path,
    project_slug: &str,
    story: Option<&str>,
) -> Result<TaskList> {
    let ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let tasks = match story {
        Some(ref_code) => {
            let story = ctx.storage.get_story(project.id, ref_code)?;
            ctx.storage.tasks_for_story(story.id)?
        }
        None => ctx.storage.list_tasks(project.id)?,
    };
    Ok(TaskList(tasks))
}

// === Documents and questions ===

pub fn doc_create(workspace: &Path, project_slug: &str, title: &str) -> Result<Document> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let allocator = ReferenceAllocator::new(&ctx.config);
    allocator.insert_with_slug(
        &mut ctx.storage,
        SlugNamespace::Document,
        title,
        |store, slug| {
            let mut document = Document::new(project.id, title.to_string(), slug);
            store.add_document(&mut document)?;
            Ok(document)
        },
    )
}

pub fn question_create(workspace: &Path, project_slug: &str, subject: &str) -> Result<Question> {
    let mut ctx = Context::open(workspace)?;
    let project = ctx.storage.get_project(project_slug)?;

    let allocator = ReferenceAllocator::new(&ctx.config);
    allocator.insert_with_slug(
        &mut ctx.storage,
        SlugNamespace::Question,
        subject,
        |store, slug| {
            let mut question = Question::new(project.id, subject.to_string(), slug);
            store.add_question(&mut question)?;
            Ok(question)
        },
    )
}

// === Version ===

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

impl Output for VersionInfo {
    fn to_human(&self) -> String {
        format!(
            "scl {} ({}, built {})",
            self.version, self.commit, self.built_at
        )
    }
}

pub fn version() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("SCL_GIT_COMMIT"),
        built_at: env!("SCL_BUILD_TIMESTAMP"),
    }
}

// === Output impls ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ProjectList(pub Vec<Project>);

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct MilestoneList(pub Vec<Milestone>);

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct StoryList(pub Vec<UserStory>);

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TaskList(pub Vec<Task>);

impl Output for Project {
    fn to_human(&self) -> String {
        format!("{} ({})", self.name, self.slug)
    }
}

impl Output for Milestone {
    fn to_human(&self) -> String {
        let state = if self.closed { " [closed]" } else { "" };
        format!(
            "{}: {} -> {}{}",
            self.name, self.estimated_start, self.estimated_finish, state
        )
    }
}

impl Output for UserStory {
    fn to_human(&self) -> String {
        format!(
            "#{} {} [{}] points={}",
            self.ref_code, self.subject, self.status, self.points
        )
    }
}

impl Output for Task {
    fn to_human(&self) -> String {
        format!(
            "#{} {} [{}] ({})",
            self.ref_code, self.subject, self.status, self.kind
        )
    }
}

impl Output for Document {
    fn to_human(&self) -> String {
        format!("{} ({})", self.title, self.slug)
    }
}

impl Output for Question {
    fn to_human(&self) -> String {
        let state = if self.closed { " [closed]" } else { "" };
        format!("{} ({}){}", self.subject, self.slug, state)
    }
}

impl Output for MilestoneStats {
    fn to_human(&self) -> String {
        format!(
            "points: {}/{} ({}%)\nstories: {}/{} completed\ntasks: {}/{} completed",
            format_points(self.completed_points),
            format_points(self.total_points),
            format_points(self.percentage_completed),
            self.us_completed_number,
            self.us_number,
            self.task_completed_number,
            self.task_number,
        )
    }
}

impl Output for BurndownData {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "sprint {} -> {} ({} points)",
            self.begin_date,
            self.end_date,
            format_points(self.sprint_points)
        ));
        for (offset, value) in self.points_done_on_date.iter().enumerate() {
            let day = self.begin_date + chrono::Duration::days(offset as i64);
            lines.push(format!("  {}: {}", day, format_points(*value)));
        }
        if let Some(position) = self.now_position {
            lines.push(format!("now at x={:.2}", position));
        }
        lines.join("\n")
    }
}

impl Output for ProjectList {
    fn to_human(&self) -> String {
        list_human(self.0.iter().map(Output::to_human))
    }
}

impl Output for MilestoneList {
    fn to_human(&self) -> String {
        list_human(self.0.iter().map(Output::to_human))
    }
}

impl Output for StoryList {
    fn to_human(&self) -> String {
        list_human(self.0.iter().map(Output::to_human))
    }
}

impl Output for TaskList {
    fn to_human(&self) -> String {
        list_human(self.0.iter().map(Output::to_human))
    }
}

fn list_human(lines: impl Iterator<Item = String>) -> String {
    let collected: Vec<String> = lines.collect();
    if collected.is_empty() {
        "(none)".to_string()
    } else {
        collected.join("\n")
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .map_err(|_| Error::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", raw)))
}
