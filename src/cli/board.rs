//! Load / apply / save cycle shared by mutating commands

use anyhow::Result;

use super::output::Output;
use crate::domain::{Command, Outcome, TaskId, TaskScheduler};
use crate::storage::Project;

/// Opens the current project and restores its board
pub fn open() -> Result<(Project, TaskScheduler)> {
    let project = Project::open_current()?;
    let scheduler = project.load_scheduler()?;
    Ok((project, scheduler))
}

/// Applies one command to the stored board and saves the result
pub fn apply(output: &Output, command: Command) -> Result<Outcome> {
    let (project, mut scheduler) = open()?;
    commit(output, &project, &mut scheduler, command)
}

/// Applies one command to an already opened board and saves the result
///
/// Nothing is written when the command is rejected.
pub fn commit(
    output: &Output,
    project: &Project,
    scheduler: &mut TaskScheduler,
    command: Command,
) -> Result<Outcome> {
    output.verbose_ctx(
        "board",
        &format!("Applying {:?} in {}", command, project.root().display()),
    );

    let outcome = scheduler.apply(command)?;
    project.save(&scheduler.snapshot())?;

    output.verbose_ctx(
        "board",
        &format!(
            "Saved board: {} conflicts, {} new",
            outcome.view.conflicts.len(),
            outcome.new_conflicts.len()
        ),
    );
    Ok(outcome)
}

/// Prints the result of a task mutation
pub fn report(output: &Output, outcome: &Outcome, id: &TaskId, message: &str) {
    if output.is_json() {
        output.data(&serde_json::json!({
            "task": outcome.view.task(id),
            "new_conflicts": outcome.new_conflicts,
        }));
    } else {
        output.success(message);
        output.alerts(&outcome.new_conflicts);
    }
}
