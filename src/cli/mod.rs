//! CLI argument definitions for Scrumline.

use clap::{Parser, Subcommand};

/// Scrumline - a Scrum tracking core for projects, sprints, stories, and tasks.
#[derive(Parser, Debug)]
#[command(name = "scl")]
#[command(author, version, about = "Track Scrum projects, sprints, and burndown from the command line", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if scl was started in <path> instead of the current directory.
    /// Can also be set via the SCL_WORKSPACE environment variable.
    #[arg(short = 'C', long = "workspace", global = true, env = "SCL_WORKSPACE")]
    pub workspace: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// System-level commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Project management commands
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Milestone (sprint) management commands
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },

    /// User story management commands
    Story {
        #[command(subcommand)]
        command: StoryCommands,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Document management commands
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Question management commands
    Question {
        #[command(subcommand)]
        command: QuestionCommands,
    },

    /// Show version and build information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Initialize storage for this workspace
    Init,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a new project (allocates its slug)
    Create {
        /// Project name
        name: String,
    },
    /// Show a project by slug
    Show {
        /// Project slug
        slug: String,
    },
    /// List all projects
    List,
}

#[derive(Subcommand, Debug)]
pub enum MilestoneCommands {
    /// Create a new milestone in a project
    Create {
        /// Project slug
        project: String,
        /// Milestone name
        name: String,
        /// First day of the sprint (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last day of the sprint (YYYY-MM-DD)
        #[arg(long)]
        finish: String,
    },
    /// List a project's milestones
    List {
        /// Project slug
        project: String,
    },
    /// Show aggregate statistics for a milestone
    Stats {
        /// Project slug
        project: String,
        /// Milestone name
        name: String,
    },
    /// Show the burndown series for a milestone
    Burndown {
        /// Project slug
        project: String,
        /// Milestone name
        name: String,
    },
    /// Close a milestone
    Close {
        /// Project slug
        project: String,
        /// Milestone name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum StoryCommands {
    /// Create a new user story (allocates its ref)
    Create {
        /// Project slug
        project: String,
        /// Story subject
        subject: String,
        /// Story points (-1 = unestimated, -2 = half point)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        points: i32,
        /// Milestone name to assign the story to
        #[arg(long)]
        milestone: Option<String>,
    },
    /// Show a story by ref
    Show {
        /// Project slug
        project: String,
        /// Story ref
        story_ref: String,
    },
    /// List a project's stories
    List {
        /// Project slug
        project: String,
    },
    /// Move a story into a milestone (or back to the backlog)
    Move {
        /// Project slug
        project: String,
        /// Story ref
        story_ref: String,
        /// Target milestone name; omit to move back to the backlog
        #[arg(long)]
        milestone: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task (allocates its ref, rolls up the story status)
    Create {
        /// Project slug
        project: String,
        /// Task subject
        subject: String,
        /// Story ref to attach the task to
        #[arg(long)]
        story: Option<String>,
        /// Milestone name for tasks without a story
        #[arg(long)]
        milestone: Option<String>,
        /// Task kind: task or bug
        #[arg(long, default_value = "task")]
        kind: String,
    },
    /// Show a task by ref
    Show {
        /// Project slug
        project: String,
        /// Task ref
        task_ref: String,
    },
    /// Change a task's status (rolls up the story status)
    Status {
        /// Project slug
        project: String,
        /// Task ref
        task_ref: String,
        /// New status: open, progress, completed, closed, workaround,
        /// needinfo, or postponed
        status: String,
    },
    /// Move a task to another story, or detach it (rolls up both stories)
    Move {
        /// Project slug
        project: String,
        /// Task ref
        task_ref: String,
        /// Target story ref; omit to detach
        #[arg(long)]
        story: Option<String>,
    },
    /// Delete a task (rolls up the former story)
    Delete {
        /// Project slug
        project: String,
        /// Task ref
        task_ref: String,
    },
    /// List a project's tasks
    List {
        /// Project slug
        project: String,
        /// Only tasks of this story ref
        #[arg(long)]
        story: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocCommands {
    /// Create a new document (allocates its slug)
    Create {
        /// Project slug
        project: String,
        /// Document title
        title: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum QuestionCommands {
    /// Create a new question (allocates its slug)
    Create {
        /// Project slug
        project: String,
        /// Question subject
        subject: String,
    },
}
