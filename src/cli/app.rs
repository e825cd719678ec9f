//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{query, resource, task};
use crate::logging;
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(author, version, about = "Dependency-aware task scheduling with shared resources")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true, env = "TASKBOARD_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new task board
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Manage shared resources
    #[command(subcommand)]
    Resource(resource::ResourceCommands),

    /// Show tasks with derived status and conflicts
    View,

    /// Show current conflicts
    Conflicts,

    /// Show tasks in timeline order
    Schedule,

    /// Show tasks ready to start
    Ready,

    /// Show blocked tasks
    Blocked,

    /// Show board status overview
    Status,
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing board at: {}", path));
            let project = Project::init(&path)?;
            output.success(&format!(
                "Initialized taskboard at {}",
                project.root().display()
            ));
        }

        Commands::Task(cmd) => task::run(cmd, &output)?,
        Commands::Resource(cmd) => resource::run(cmd, &output)?,

        Commands::View => query::view(&output)?,
        Commands::Conflicts => query::conflicts(&output)?,
        Commands::Schedule => query::schedule(&output)?,
        Commands::Ready => query::ready(&output)?,
        Commands::Blocked => query::blocked(&output)?,
        Commands::Status => query::status(&output)?,
    }

    Ok(())
}
