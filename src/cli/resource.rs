//! Resource CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::board;
use super::output::Output;
use crate::domain::{Command, Resource, ResourceId, ResourceKind};

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// Declare a resource or change its capacity
    ///
    /// Examples:
    ///   taskboard resource add calibration-kit 2 --name "Calibration Kit"
    ///   taskboard resource add tablet 5 --kind device
    Add {
        /// Resource ID
        id: String,

        /// Units available at the same time (at least 1)
        capacity: u32,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// equipment, device, consumable or other
        #[arg(long, default_value = "equipment")]
        kind: ResourceKind,
    },

    /// List resources with their reservations
    List,

    /// Show who holds or wants a resource, most urgent first
    Contenders {
        /// Resource ID
        id: String,
    },
}

pub fn run(cmd: ResourceCommands, output: &Output) -> Result<()> {
    match cmd {
        ResourceCommands::Add {
            id,
            capacity,
            name,
            kind,
        } => {
            let id: ResourceId = id.parse()?;
            let resource = Resource::new(id.clone(), capacity)
                .with_name(name.unwrap_or_default())
                .with_kind(kind);

            let outcome = board::apply(output, Command::DeclareResource(resource))?;
            if output.is_json() {
                let view = outcome.view.resources.iter().find(|r| r.resource.id == id);
                output.data(&serde_json::json!({
                    "resource": view,
                    "new_conflicts": outcome.new_conflicts,
                }));
            } else {
                output.success(&format!("Declared resource: {} (capacity {})", id, capacity));
                output.alerts(&outcome.new_conflicts);
            }
            Ok(())
        }
        ResourceCommands::List => list_resources(output),
        ResourceCommands::Contenders { id } => contenders(output, &id),
    }
}

fn list_resources(output: &Output) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let resources = scheduler.view().resources;

    if output.is_json() {
        output.data(&resources);
    } else if resources.is_empty() {
        println!("No resources");
    } else {
        println!(
            "{:<20} {:<11} {:>8} {:>8} HOLDERS",
            "ID", "KIND", "RESERVED", "CAPACITY"
        );
        println!("{}", "-".repeat(70));
        for view in resources {
            let holders: Vec<_> = view.holders.iter().map(|h| h.as_str()).collect();
            println!(
                "{:<20} {:<11} {:>8} {:>8} {}",
                view.resource.id,
                view.resource.kind.as_str(),
                view.reserved,
                view.resource.total_capacity,
                holders.join(", ")
            );
        }
    }

    Ok(())
}

fn contenders(output: &Output, id_str: &str) -> Result<()> {
    let (_, scheduler) = board::open()?;
    let id: ResourceId = id_str.parse()?;
    let contenders = scheduler.contenders_for(&id)?;

    if output.is_json() {
        let items: Vec<_> = contenders
            .iter()
            .filter_map(|task_id| scheduler.task(task_id))
            .map(|task| {
                serde_json::json!({
                    "id": task.id,
                    "title": task.title,
                    "priority": task.priority,
                    "due_at": task.due_at,
                    "holding": scheduler.pool().holders(&id).iter().any(|(h, _)| h == &task.id),
                })
            })
            .collect();
        output.data(&items);
    } else if contenders.is_empty() {
        println!("Nobody holds or needs {}", id);
    } else {
        let holders = scheduler.pool().holders(&id);
        println!("Contenders for {} ({}):", id, contenders.len());
        for task_id in &contenders {
            let marker = if holders.iter().any(|(h, _)| h == task_id) {
                "holding"
            } else {
                "waiting"
            };
            let title = scheduler.task(task_id).map(|t| t.title.as_str()).unwrap_or("");
            println!("  {:<16} {:<8} {}", task_id, marker, title);
        }
    }

    Ok(())
}
