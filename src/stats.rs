//! Milestone statistics and burndown computation.
//!
//! Everything here is read-only over the store: point totals, completion
//! percentage, the per-day burndown series, and the "now" marker position.
//! Zero totals are well-defined (percentage 0, empty sums), never errors.
//!
//! Point sums apply the sentinel rules from `Points`: unestimated stories are
//! skipped, half-point stories contribute 0.5. Sums stay `f64` internally and
//! are only formatted to one decimal at the output boundary
//! ([`format_points`]).

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::config::CoreConfig;
use crate::models::{BurndownData, Milestone, MilestoneStats, TaskKind, UserStory};
use crate::storage::Storage;
use crate::Result;

/// Computes aggregate and time-series statistics for milestones.
pub struct StatisticsEngine<'a> {
    config: &'a CoreConfig,
}

impl<'a> StatisticsEngine<'a> {
    pub fn new(config: &'a CoreConfig) -> Self {
        Self { config }
    }

    /// Sum of points over all of the milestone's stories.
    pub fn total_points(&self, store: &Storage, milestone_id: i64) -> Result<f64> {
        let stories = store.stories_for_milestone(milestone_id)?;
        Ok(sum_points(&stories))
    }

    /// Sum of points over the milestone's closed stories.
    pub fn completed_points(&self, store: &Storage, milestone_id: i64) -> Result<f64> {
        let stories = store.stories_for_milestone(milestone_id)?;
        Ok(self.completed_points_of(&stories))
    }

    /// `completed * 100 / total`, or 0 when the milestone has no points.
    pub fn percentage_completed(&self, store: &Storage, milestone_id: i64) -> Result<f64> {
        let stories = store.stories_for_milestone(milestone_id)?;
        let total = sum_points(&stories);
        let completed = self.completed_points_of(&stories);
        Ok(percentage(completed, total))
    }

    /// Points that were already complete as of `date`: the sum over closed
    /// stories having at least one task modified strictly before the date's
    /// midnight (task modification history as a completion-time proxy).
    pub fn points_done_at_date(
        &self,
        store: &Storage,
        milestone_id: i64,
        date: NaiveDate,
    ) -> Result<f64> {
        let cutoff = start_of_day(date);
        let mut total = 0.0;

        for story in store.stories_for_milestone(milestone_id)? {
            if !self.config.is_story_closed(story.status) {
                continue;
            }
            if !store.has_task_modified_before(story.id, cutoff)? {
                continue;
            }
            if let Some(value) = story.points.value() {
                total += value;
            }
        }

        Ok(total)
    }

    /// Lazy per-day burndown values: one entry per calendar day from
    /// `estimated_start` to `estimated_finish` inclusive, plus one trailing
    /// entry at `finish + 1` (the chart's inclusive-of-"now" convention).
    /// An inverted date range yields an empty series.
    pub fn burndown_series<'s>(
        &'s self,
        store: &'s Storage,
        milestone: &Milestone,
    ) -> impl Iterator<Item = Result<f64>> + 's {
        let start = milestone.estimated_start;
        let finish = milestone.estimated_finish;
        let milestone_id = milestone.id;

        let entries = if start > finish {
            0
        } else {
            (finish - start).num_days() + 2
        };

        (0..entries)
            .map(move |offset| self.points_done_at_date(store, milestone_id, start + Duration::days(offset)))
    }

    /// Assemble the full burndown payload for a milestone.
    pub fn burndown(
        &self,
        store: &Storage,
        milestone: &Milestone,
        now: DateTime<Utc>,
    ) -> Result<BurndownData> {
        let points_done_on_date = self
            .burndown_series(store, milestone)
            .collect::<Result<Vec<_>>>()?;
        let sprint_points = self.total_points(store, milestone.id)?;

        Ok(BurndownData {
            points_done_on_date,
            sprint_points,
            begin_date: milestone.estimated_start,
            end_date: milestone.estimated_finish,
            now_position: now_position(
                milestone.estimated_start,
                milestone.estimated_finish,
                now,
            ),
        })
    }

    /// Assemble the dashboard aggregate for a milestone. Task counts cover
    /// tasks of kind `task` only; bugs are excluded.
    pub fn milestone_stats(&self, store: &Storage, milestone_id: i64) -> Result<MilestoneStats> {
        let stories = store.stories_for_milestone(milestone_id)?;
        let tasks = store.tasks_for_milestone(milestone_id)?;

        let total_points = sum_points(&stories);
        let completed_points = self.completed_points_of(&stories);

        let us_completed_number = stories
            .iter()
            .filter(|s| self.config.is_story_closed(s.status))
            .count();

        let plain_tasks: Vec<_> = tasks.iter().filter(|t| t.kind == TaskKind::Task).collect();
        let task_completed_number = plain_tasks
            .iter()
            .filter(|t| self.config.is_task_closed(t.status))
            .count();

        Ok(MilestoneStats {
            total_points,
            completed_points,
            percentage_completed: percentage(completed_points, total_points),
            us_number: stories.len(),
            us_completed_number,
            task_number: plain_tasks.len(),
            task_completed_number,
        })
    }

    fn completed_points_of(&self, stories: &[UserStory]) -> f64 {
        stories
            .iter()
            .filter(|s| self.config.is_story_closed(s.status))
            .filter_map(|s| s.points.value())
            .sum()
    }
}

/// Sum story points, skipping unestimated stories and counting half points
/// as 0.5.
pub fn sum_points(stories: &[UserStory]) -> f64 {
    stories.iter().filter_map(|s| s.points.value()).sum()
}

/// Fractional x-axis position of `now` along the burndown chart, present only
/// when `now` falls strictly between the start-of-day of `start` and the
/// start-of-day of `finish`. The first data point occupies axis position 1.
pub fn now_position(start: NaiveDate, finish: NaiveDate, now: DateTime<Utc>) -> Option<f64> {
    let begin = start_of_day(start);
    let end = start_of_day(finish);

    if begin < now && now < end {
        let now_seconds = (now - begin).num_seconds() as f64;
        let end_seconds = (end - begin).num_seconds() as f64;
        let day_span = (end - begin).num_days() as f64;
        Some(now_seconds * day_span / end_seconds + 1.0)
    } else {
        None
    }
}

/// Format a point value or percentage for display, one digit after the
/// decimal point.
pub fn format_points(value: f64) -> String {
    format!("{:.1}", value)
}

fn percentage(completed: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        completed * 100.0 / total
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
