//! Query commands (view, conflicts, schedule, ready, blocked, status)
//!
//! These never write to the board.

use anyhow::Result;

use super::board;
use super::output::Output;
use crate::domain::{ConflictKind, TaskId, TaskScheduler, TaskStatus};

/// Show the whole board: tasks with derived status plus conflicts
pub fn view(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let view = scheduler.view();

    if output.is_json() {
        output.data(&view);
        return Ok(());
    }

    if view.tasks.is_empty() {
        println!("No tasks");
    } else {
        println!("{:<16} {:<12} {:<8} {:>5} TITLE", "ID", "STATUS", "PRIORITY", "DONE");
        println!("{}", "-".repeat(70));
        for task_view in &view.tasks {
            println!(
                "{:<16} {:<12} {:<8} {:>4}% {}",
                task_view.task.id,
                task_view.status.as_str(),
                task_view.task.priority.as_str(),
                task_view.task.progress,
                task_view.task.title
            );
        }
    }

    if !view.conflicts.is_empty() {
        println!();
        println!("Conflicts ({}):", view.conflicts.len());
        for conflict in &view.conflicts {
            println!("  {}", conflict);
        }
    }

    Ok(())
}

/// Show the current conflict report
pub fn conflicts(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let report = scheduler.conflicts();
    output.verbose_ctx("conflicts", &format!("Found {} conflicts", report.len()));

    if output.is_json() {
        output.data(report);
    } else if report.is_empty() {
        println!("No conflicts.");
    } else {
        println!("{:<16} {:<20} DETAIL", "TASK", "KIND");
        println!("{}", "-".repeat(70));
        for conflict in report {
            println!(
                "{:<16} {:<20} {}",
                conflict.task_id,
                conflict.kind.as_str(),
                conflict
            );
        }
    }

    Ok(())
}

/// Show tasks in timeline order (dependencies first, then by due time)
pub fn schedule(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let order = scheduler.schedule();

    if output.is_json() {
        let items: Vec<_> = order
            .iter()
            .filter_map(|id| scheduler.task(id).map(|t| (id, t)))
            .map(|(id, task)| {
                serde_json::json!({
                    "id": id,
                    "title": task.title,
                    "status": scheduler.status_of(id),
                    "due_at": task.due_at,
                    "priority": task.priority,
                    "estimated_duration_minutes": task.estimated_duration_minutes,
                })
            })
            .collect();
        output.data(&items);
    } else if order.is_empty() {
        println!("No tasks");
    } else {
        println!("{:>3} {:<16} {:<12} {:<17} TITLE", "#", "ID", "STATUS", "DUE");
        println!("{}", "-".repeat(70));
        for (position, id) in order.iter().enumerate() {
            let Some(task) = scheduler.task(id) else {
                continue;
            };
            println!(
                "{:>3} {:<16} {:<12} {:<17} {}",
                position + 1,
                id,
                scheduler.status_of(id).map(|s| s.as_str()).unwrap_or(""),
                task.due_at.format("%Y-%m-%d %H:%M"),
                task.title
            );
        }
    }

    Ok(())
}

/// Show tasks ready to start
pub fn ready(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let ready = scheduler.ready();
    output.verbose_ctx("ready", &format!("Found {} ready tasks", ready.len()));

    if output.is_json() {
        let items: Vec<_> = ready
            .iter()
            .filter_map(|id| scheduler.task(id))
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "title": t.title,
                    "priority": t.priority,
                    "due_at": t.due_at,
                })
            })
            .collect();
        output.data(&items);
    } else if ready.is_empty() {
        println!("No tasks ready to start.");
    } else {
        println!("Ready tasks ({}):", ready.len());
        println!("{:<16} TITLE", "ID");
        println!("{}", "-".repeat(60));
        for id in &ready {
            let title = scheduler.task(id).map(|t| t.title.as_str()).unwrap_or("");
            println!("{:<16} {}", id, title);
        }
    }

    Ok(())
}

/// Show blocked tasks and what blocks them
pub fn blocked(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let blocked = scheduler.blocked();
    output.verbose_ctx("blocked", &format!("Found {} blocked tasks", blocked.len()));

    if output.is_json() {
        let items: Vec<_> = blocked
            .iter()
            .filter_map(|id| scheduler.task(id))
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "title": t.title,
                    "blocked_by": blocking_reasons(&scheduler, &t.id),
                })
            })
            .collect();
        output.data(&items);
    } else if blocked.is_empty() {
        println!("No blocked tasks.");
    } else {
        println!("Blocked tasks ({}):", blocked.len());
        println!("{:<16} {:<30} BLOCKED BY", "ID", "TITLE");
        println!("{}", "-".repeat(80));
        for id in &blocked {
            let title = scheduler.task(id).map(|t| t.title.as_str()).unwrap_or("");
            println!(
                "{:<16} {:<30} {}",
                id,
                title,
                blocking_reasons(&scheduler, id).join("; ")
            );
        }
    }

    Ok(())
}

fn blocking_reasons(scheduler: &TaskScheduler, id: &TaskId) -> Vec<String> {
    scheduler
        .conflicts()
        .for_task(id)
        .filter(|c| c.kind.is_blocking())
        .map(|c| c.to_string())
        .collect()
}

/// Show board status overview
pub fn status(output: &Output) -> Result<()> {
    let (project, scheduler) = board::open()?;
    let view = scheduler.view();

    let count = |status: TaskStatus| view.tasks.iter().filter(|t| t.status == status).count();
    let pending = count(TaskStatus::Pending);
    let in_progress = count(TaskStatus::InProgress);
    let completed = count(TaskStatus::Completed);
    let blocked = count(TaskStatus::Blocked);
    let contention = view
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::ResourceContention)
        .count();
    let has_cycle = view.conflicts.iter().any(|c| c.kind == ConflictKind::Cycle);

    if output.is_json() {
        output.data(&serde_json::json!({
            "tasks": {
                "total": view.tasks.len(),
                "pending": pending,
                "in_progress": in_progress,
                "completed": completed,
                "blocked": blocked,
            },
            "resources": view.resources.len(),
            "conflicts": {
                "total": view.conflicts.len(),
                "resource_contention": contention,
                "cycle": has_cycle,
            },
            "contention_policy": project.config().project.contention_policy,
        }));
    } else {
        println!("Board Status");
        println!("{}", "=".repeat(40));
        println!();
        println!("Tasks: {} total", view.tasks.len());
        println!("  [ ] Pending:     {}", pending);
        println!("  [~] In Progress: {}", in_progress);
        println!("  [x] Completed:   {}", completed);
        println!("  [!] Blocked:     {}", blocked);
        println!();
        println!("Resources: {}", view.resources.len());
        println!("Conflicts: {}", view.conflicts.len());
        if contention > 0 {
            println!("  Over-capacity reservations: {}", contention);
        }
        if has_cycle {
            println!("  Dependency cycle present");
        }
    }

    Ok(())
}
