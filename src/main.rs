//! Scrumline CLI - a Scrum tracking core for projects, sprints, and tasks.

use clap::Parser;
use scrumline::cli::{
    Cli, Commands, DocCommands, MilestoneCommands, ProjectCommands, QuestionCommands,
    StoryCommands, SystemCommands, TaskCommands,
};
use scrumline::commands::{self, Output};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let human = cli.human_readable;

    // Workspace path: --workspace flag > SCL_WORKSPACE env (via clap) > cwd
    let workspace = resolve_workspace(cli.workspace, human);

    if let Err(e) = run_command(cli.command, &workspace, human) {
        report_error(&e.to_string(), human);
        process::exit(1);
    }
}

/// Resolve the workspace path, verifying explicit paths exist.
fn resolve_workspace(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                report_error(
                    &format!("Specified workspace path does not exist: {}", path.display()),
                    human,
                );
                process::exit(1);
            }
            path
        }
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print an error to stderr, as plain text or as a JSON object whose message
/// is properly escaped.
fn report_error(message: &str, human: bool) {
    if human {
        eprintln!("Error: {}", message);
    } else {
        eprintln!("{}", serde_json::json!({ "error": message }));
    }
}

fn run_command(command: Commands, workspace: &Path, human: bool) -> Result<(), scrumline::Error> {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init => output(&commands::system_init(workspace)?, human),
        },

        Commands::Project { command } => match command {
            ProjectCommands::Create { name } => {
                output(&commands::project_create(workspace, &name)?, human)
            }
            ProjectCommands::Show { slug } => {
                output(&commands::project_show(workspace, &slug)?, human)
            }
            ProjectCommands::List => output(&commands::project_list(workspace)?, human),
        },

        Commands::Milestone { command } => match command {
            MilestoneCommands::Create {
                project,
                name,
                start,
                finish,
            } => output(
                &commands::milestone_create(workspace, &project, &name, &start, &finish)?,
                human,
            ),
            MilestoneCommands::List { project } => {
                output(&commands::milestone_list(workspace, &project)?, human)
            }
            MilestoneCommands::Stats { project, name } => {
                output(&commands::milestone_stats(workspace, &project, &name)?, human)
            }
            MilestoneCommands::Burndown { project, name } => output(
                &commands::milestone_burndown(workspace, &project, &name)?,
                human,
            ),
            MilestoneCommands::Close { project, name } => {
                output(&commands::milestone_close(workspace, &project, &name)?, human)
            }
        },

        Commands::Story { command } => match command {
            StoryCommands::Create {
                project,
                subject,
                points,
                milestone,
            } => output(
                &commands::story_create(
                    workspace,
                    &project,
                    &subject,
                    points,
                    milestone.as_deref(),
                )?,
                human,
            ),
            StoryCommands::Show { project, story_ref } => {
                output(&commands::story_show(workspace, &project, &story_ref)?, human)
            }
            StoryCommands::List { project } => {
                output(&commands::story_list(workspace, &project)?, human)
            }
            StoryCommands::Move {
                project,
                story_ref,
                milestone,
            } => output(
                &commands::story_move(workspace, &project, &story_ref, milestone.as_deref())?,
                human,
            ),
        },

        Commands::Task { command } => match command {
            TaskCommands::Create {
                project,
                subject,
                story,
                milestone,
                kind,
            } => output(
                &commands::task_create(
                    workspace,
                    &project,
                    &subject,
                    story.as_deref(),
                    milestone.as_deref(),
                    &kind,
                )?,
                human,
            ),
            TaskCommands::Show { project, task_ref } => {
                output(&commands::task_show(workspace, &project, &task_ref)?, human)
            }
            TaskCommands::Status {
                project,
                task_ref,
                status,
            } => output(
                &commands::task_status(workspace, &project, &task_ref, &status)?,
                human,
            ),
            TaskCommands::Move {
                project,
                task_ref,
                story,
            } => output(
                &commands::task_move(workspace, &project, &task_ref, story.as_deref())?,
                human,
            ),
            TaskCommands::Delete { project, task_ref } => {
                output(&commands::task_delete(workspace, &project, &task_ref)?, human)
            }
            TaskCommands::List { project, story } => output(
                &commands::task_list(workspace, &project, story.as_deref())?,
                human,
            ),
        },

        Commands::Doc { command } => match command {
            DocCommands::Create { project, title } => {
                output(&commands::doc_create(workspace, &project, &title)?, human)
            }
        },

        Commands::Question { command } => match command {
            QuestionCommands::Create { project, subject } => {
                output(&commands::question_create(workspace, &project, &subject)?, human)
            }
        },

        Commands::Version => output(&commands::version(), human),
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
