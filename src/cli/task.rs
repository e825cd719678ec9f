//! Task CLI commands

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Subcommand, ValueEnum};

use super::board;
use super::output::Output;
use crate::domain::{Command, Priority, ResourceId, Task, TaskId, TaskStatus, TaskUpdate};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    ///
    /// Examples:
    ///   taskboard task add "Replace filters" --due 2026-03-01T09:00:00Z
    ///   taskboard task add "Calibrate sensors" --depends-on filters --requires kit=1
    Add {
        /// Task title
        title: String,

        /// Task ID (generated from the title when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Priority (high, medium, low)
        #[arg(long, short)]
        priority: Option<Priority>,

        /// Due time: RFC 3339, "YYYY-MM-DD HH:MM", "YYYY-MM-DD" or relative like +2h
        #[arg(long)]
        due: Option<String>,

        /// Estimated duration in minutes
        #[arg(long)]
        duration: Option<u32>,

        /// Tasks that must be completed first
        #[arg(long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Resources held while running, as ID or ID=QTY
        #[arg(long, value_delimiter = ',')]
        requires: Vec<String>,

        /// Free-text description
        #[arg(long, short)]
        description: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        /// Facility zone
        #[arg(long)]
        zone: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List tasks, most urgent first
    List {
        /// Only show tasks with this status
        #[arg(long)]
        status: Option<StatusFilter>,
    },

    /// Show task details
    Show {
        /// Task ID
        id: String,
    },

    /// Edit a task
    Edit {
        /// Task ID
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        description: Option<String>,

        #[arg(long, short)]
        priority: Option<Priority>,

        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        duration: Option<u32>,

        /// Replace the dependency set
        #[arg(long = "depends-on", value_delimiter = ',', conflicts_with = "clear_deps")]
        depends_on: Vec<String>,

        /// Remove all dependencies
        #[arg(long)]
        clear_deps: bool,

        /// Replace the resource requirements
        #[arg(long, value_delimiter = ',', conflicts_with = "clear_resources")]
        requires: Vec<String>,

        /// Remove all resource requirements
        #[arg(long)]
        clear_resources: bool,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long)]
        zone: Option<String>,

        /// Replace the tag set
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Add a dependency between tasks
    Dep {
        /// Task that will wait
        task: String,

        /// Task that must be completed first
        depends_on: String,
    },

    /// Remove a dependency
    Undep {
        /// Task to unblock
        task: String,

        /// Dependency to remove
        depends_on: String,
    },

    /// Mark task as in progress and reserve its resources
    Start {
        /// Task ID
        id: String,
    },

    /// Record progress on a running task
    Progress {
        /// Task ID
        id: String,

        /// Percent complete (0-100, never lower than before)
        percent: u8,
    },

    /// Mark task as done and release its resources
    Done {
        /// Task ID
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task ID
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl From<StatusFilter> for TaskStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => TaskStatus::Pending,
            StatusFilter::InProgress => TaskStatus::InProgress,
            StatusFilter::Completed => TaskStatus::Completed,
            StatusFilter::Blocked => TaskStatus::Blocked,
        }
    }
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            title,
            id,
            priority,
            due,
            duration,
            depends_on,
            requires,
            description,
            assignee,
            zone,
            tags,
        } => {
            let (project, mut scheduler) = board::open()?;
            let defaults = &project.config().project;
            let now = Utc::now();

            let id = match id {
                Some(raw) => raw.parse::<TaskId>()?,
                None => TaskId::generate(&title, now),
            };
            let duration = duration.unwrap_or(defaults.default_duration_minutes);
            let due_at = match due {
                Some(raw) => parse_due(&raw, now)?,
                None => now + Duration::minutes(i64::from(duration)),
            };

            let mut task = Task::new(id.clone(), title, due_at)
                .with_priority(priority.unwrap_or(defaults.default_priority))
                .with_duration(duration)
                .with_description(description.unwrap_or_default());
            task.dependencies = parse_ids(&depends_on)?;
            task.required_resources = parse_requirements(&requires)?;
            task.assignee = assignee;
            task.zone = zone;
            task.tags = tags.into_iter().collect();

            let outcome =
                board::commit(output, &project, &mut scheduler, Command::CreateTask(task))?;
            let title = outcome
                .view
                .task(&id)
                .map(|v| v.task.title.clone())
                .unwrap_or_default();
            board::report(output, &outcome, &id, &format!("Created task: {} - {}", id, title));
            Ok(())
        }
        TaskCommands::List { status } => list_tasks(output, status.map(TaskStatus::from)),
        TaskCommands::Show { id } => show_task(output, &id),
        TaskCommands::Edit {
            id,
            title,
            description,
            priority,
            due,
            duration,
            depends_on,
            clear_deps,
            requires,
            clear_resources,
            assignee,
            zone,
            tags,
        } => {
            let dependencies = if clear_deps {
                Some(BTreeSet::new())
            } else if depends_on.is_empty() {
                None
            } else {
                Some(parse_ids(&depends_on)?)
            };
            let required_resources = if clear_resources {
                Some(BTreeMap::new())
            } else if requires.is_empty() {
                None
            } else {
                Some(parse_requirements(&requires)?)
            };

            let update = TaskUpdate {
                title,
                description,
                priority,
                due_at: due.map(|raw| parse_due(&raw, Utc::now())).transpose()?,
                estimated_duration_minutes: duration,
                dependencies,
                required_resources,
                assignee,
                zone,
                tags: (!tags.is_empty()).then(|| tags.into_iter().collect()),
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to change. Pass at least one field to edit.");
            }

            let id: TaskId = id.parse()?;
            let outcome = board::apply(output, Command::UpdateTask { id: id.clone(), update })?;
            board::report(output, &outcome, &id, &format!("Updated task: {}", id));
            Ok(())
        }
        TaskCommands::Dep { task, depends_on } => {
            change_dependency(output, &task, &depends_on, true)
        }
        TaskCommands::Undep { task, depends_on } => {
            change_dependency(output, &task, &depends_on, false)
        }
        TaskCommands::Start { id } => {
            let id: TaskId = id.parse()?;
            let outcome = board::apply(output, Command::StartTask(id.clone()))?;
            board::report(output, &outcome, &id, &format!("Started task: {}", id));
            Ok(())
        }
        TaskCommands::Progress { id, percent } => {
            let id: TaskId = id.parse()?;
            let outcome = board::apply(
                output,
                Command::UpdateProgress {
                    id: id.clone(),
                    percent,
                },
            )?;
            board::report(output, &outcome, &id, &format!("Progress on {}: {}%", id, percent));
            Ok(())
        }
        TaskCommands::Done { id } => {
            let id: TaskId = id.parse()?;
            let outcome = board::apply(output, Command::CompleteTask(id.clone()))?;
            board::report(output, &outcome, &id, &format!("Completed task: {}", id));
            Ok(())
        }
        TaskCommands::Rm { id } => {
            let id: TaskId = id.parse()?;
            let outcome = board::apply(output, Command::DeleteTask(id.clone()))?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "deleted": id,
                    "new_conflicts": outcome.new_conflicts,
                }));
            } else {
                output.success(&format!("Deleted task: {}", id));
                output.alerts(&outcome.new_conflicts);
            }
            Ok(())
        }
    }
}

fn list_tasks(output: &Output, status: Option<TaskStatus>) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let tasks: Vec<_> = scheduler
        .view()
        .tasks
        .into_iter()
        .filter(|v| status.map_or(true, |s| v.status == s))
        .collect();

    if output.is_json() {
        output.data(&tasks);
    } else if tasks.is_empty() {
        println!("No tasks");
    } else {
        println!(
            "{:<16} {:<12} {:<8} {:<17} {:>5} TITLE",
            "ID", "STATUS", "PRIORITY", "DUE", "DONE"
        );
        println!("{}", "-".repeat(80));
        for view in tasks {
            println!(
                "{:<16} {:<12} {:<8} {:<17} {:>4}% {}",
                view.task.id,
                view.status.as_str(),
                view.task.priority.as_str(),
                view.task.due_at.format("%Y-%m-%d %H:%M"),
                view.task.progress,
                view.task.title
            );
        }
    }

    Ok(())
}

fn show_task(output: &Output, id_str: &str) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let id: TaskId = id_str.parse()?;

    let view = scheduler.view();
    let task_view = view
        .task(&id)
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
    let task = &task_view.task;
    let conflicts: Vec<_> = view.conflicts.for_task(&id).collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task_view,
            "conflicts": conflicts,
            "dependents": scheduler.graph().dependents(&id),
            "prerequisites": scheduler.graph().transitive_dependencies(&id),
        }));
        return Ok(());
    }

    println!("Task: {}", task.id);
    println!("Title: {}", task.title);
    println!("Status: {}", task_view.status.as_str());
    println!("Priority: {}", task.priority.as_str());
    println!("Due: {}", task.due_at.format("%Y-%m-%d %H:%M"));
    println!("Estimated: {} min", task.estimated_duration_minutes);
    println!("Progress: {}%", task.progress);
    if let Some(assignee) = &task.assignee {
        println!("Assignee: {}", assignee);
    }
    if let Some(zone) = &task.zone {
        println!("Zone: {}", zone);
    }
    if !task.tags.is_empty() {
        let tags: Vec<_> = task.tags.iter().map(String::as_str).collect();
        println!("Tags: {}", tags.join(", "));
    }
    println!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(started) = task.started_at {
        println!("Started: {}", started.format("%Y-%m-%d %H:%M"));
    }
    if let Some(completed) = task.completed_at {
        println!("Completed: {}", completed.format("%Y-%m-%d %H:%M"));
    }

    if !task.dependencies.is_empty() {
        println!("\nDepends on:");
        for dep in &task.dependencies {
            let dep_status = view
                .status_of(dep)
                .map(|s| s.as_str())
                .unwrap_or("deleted");
            println!("  {} ({})", dep, dep_status);
        }

        let prerequisites = scheduler.graph().transitive_dependencies(&id);
        if prerequisites.len() > task.dependencies.len() {
            let all: Vec<_> = prerequisites.iter().map(TaskId::as_str).collect();
            println!("All prerequisites: {}", all.join(", "));
        }
    }

    if !task.required_resources.is_empty() {
        println!("\nRequires:");
        for (resource, quantity) in &task.required_resources {
            println!("  {} x{}", resource, quantity);
        }
    }

    if !task.description.is_empty() {
        println!("\nDescription:");
        println!("{}", task.description);
    }

    if !conflicts.is_empty() {
        println!("\nConflicts:");
        for conflict in conflicts {
            println!("  {}", conflict);
        }
    }

    Ok(())
}

fn change_dependency(
    output: &Output,
    task_str: &str,
    depends_on_str: &str,
    add: bool,
) -> Result<()> {
    let (project, mut scheduler) = board::open()?;
    let task_id: TaskId = task_str.parse()?;
    let depends_on: TaskId = depends_on_str.parse()?;

    let mut dependencies = scheduler
        .task(&task_id)
        .map(|t| t.dependencies.clone())
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", task_id))?;

    let changed = if add {
        dependencies.insert(depends_on.clone())
    } else {
        dependencies.remove(&depends_on)
    };
    if !changed {
        output.success(&format!("No change: {} dependency already in that state", task_id));
        return Ok(());
    }

    let update = TaskUpdate {
        dependencies: Some(dependencies),
        ..TaskUpdate::default()
    };
    let outcome = board::commit(
        output,
        &project,
        &mut scheduler,
        Command::UpdateTask {
            id: task_id.clone(),
            update,
        },
    )?;

    let message = if add {
        format!("{} now depends on {}", task_id, depends_on)
    } else {
        format!("Removed dependency: {} no longer depends on {}", task_id, depends_on)
    };
    board::report(output, &outcome, &task_id, &message);
    Ok(())
}

fn parse_ids(raw: &[String]) -> Result<BTreeSet<TaskId>> {
    raw.iter()
        .map(|s| s.parse::<TaskId>().map_err(anyhow::Error::from))
        .collect()
}

/// Parses `ID` or `ID=QTY` resource requirements
fn parse_requirements(raw: &[String]) -> Result<BTreeMap<ResourceId, u32>> {
    raw.iter()
        .map(|entry| -> Result<(ResourceId, u32)> {
            let (id, quantity) = match entry.split_once('=') {
                Some((id, qty)) => {
                    let qty: u32 = qty
                        .trim()
                        .parse()
                        .with_context(|| format!("Invalid quantity in '{}'", entry))?;
                    (id, qty)
                }
                None => (entry.as_str(), 1),
            };
            Ok((id.parse::<ResourceId>()?, quantity.max(1)))
        })
        .collect()
}

/// Parses an absolute or relative (`+30m`, `+2h`, `+1d`) due time
///
/// Times without an offset are taken as UTC.
fn parse_due(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Some(relative) = raw.strip_prefix('+') {
        let split = relative
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(relative.len());
        let (amount, unit) = relative.split_at(split);
        let amount: i64 = amount
            .parse()
            .with_context(|| format!("Invalid relative due time: {}", raw))?;
        let offset = match unit {
            "m" | "min" => Duration::minutes(amount),
            "h" => Duration::hours(amount),
            "d" => Duration::days(amount),
            _ => anyhow::bail!("Invalid due time unit in {} (expected m, h or d)", raw),
        };
        return Ok(now + offset);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    anyhow::bail!(
        "Invalid due time: {} (expected RFC 3339, \"YYYY-MM-DD HH:MM\", \"YYYY-MM-DD\" or +N[m|h|d])",
        raw
    )
}
