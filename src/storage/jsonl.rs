//! JSONL storage for the board
//!
//! Tasks live in `.taskboard/tasks.jsonl` and resources in
//! `.taskboard/resources.jsonl`, one JSON object per line, sorted by id.
//! Uses file locking for concurrent access safety. Reservations are not
//! stored; they are rebuilt from in-progress tasks on load.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::config::BOARD_DIR;
use crate::domain::Snapshot;

/// Store for board data in JSONL format
pub struct BoardStore {
    dir: PathBuf,
}

impl BoardStore {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(BOARD_DIR))
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join("tasks.jsonl")
    }

    pub fn resources_path(&self) -> PathBuf {
        self.dir.join("resources.jsonl")
    }

    /// Reads the whole board; missing files are empty
    pub fn load(&self) -> Result<Snapshot> {
        let tasks = read_lines(&self.tasks_path(), "task")?;
        let resources = read_lines(&self.resources_path(), "resource")?;
        debug!(
            tasks = tasks.len(),
            resources = resources.len(),
            "loaded board from {}",
            self.dir.display()
        );
        Ok(Snapshot { tasks, resources })
    }

    /// Writes the whole board (full rewrite of both files)
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut tasks: Vec<_> = snapshot.tasks.iter().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        let mut resources: Vec<_> = snapshot.resources.iter().collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));

        write_lines(&self.resources_path(), &resources, "resource")?;
        write_lines(&self.tasks_path(), &tasks, "task")?;
        debug!(
            tasks = tasks.len(),
            resources = resources.len(),
            "saved board to {}",
            self.dir.display()
        );
        Ok(())
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open {} store: {}", what, path.display()))?;

    // Acquire shared lock for reading
    file.lock_shared()
        .with_context(|| format!("Failed to acquire read lock on {} store", what))?;

    let reader = BufReader::new(&file);
    let mut items = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

        if line.trim().is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(&line).with_context(|| {
            format!(
                "Failed to parse {} at {}:{}",
                what,
                path.display(),
                line_num + 1
            )
        })?;
        items.push(item);
    }

    // Lock is released when file is dropped
    Ok(items)
}

fn write_lines<T: Serialize>(path: &Path, items: &[T], what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Write to temp file first
    let temp_path = path.with_extension("jsonl.tmp");

    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire write lock on {} store", what))?;

        let mut writer = BufWriter::new(&file);
        for item in items {
            let line = serde_json::to_string(item)
                .with_context(|| format!("Failed to serialize {}", what))?;
            writeln!(writer, "{}", line).with_context(|| format!("Failed to write {}", what))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush {} store", what))?;
    }

    // Atomic rename
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
