//! Conflict detection
//!
//! A [`ConflictReport`] is derived state: the blocking reasons for every task,
//! recomputed from scratch after each mutation and sorted so that the same
//! board always yields the same report.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::graph::DependencyGraph;
use super::id::{ResourceId, TaskId};
use super::resource::ResourcePool;
use super::task::Task;

/// Why a task is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    UnmetDependency,
    ResourceContention,
    Cycle,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::UnmetDependency => "unmet_dependency",
            ConflictKind::ResourceContention => "resource_contention",
            ConflictKind::Cycle => "cycle",
        }
    }

    /// Kinds that make a non-completed task `blocked`
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ConflictKind::UnmetDependency | ConflictKind::ResourceContention
        )
    }
}

/// Structured detail for a conflict entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConflictDetail {
    /// Direct dependencies that are not completed (or no longer exist)
    WaitingOn { waiting_on: Vec<TaskId> },

    /// Reserved quantity exceeds capacity
    Contention {
        resource: ResourceId,
        demand: u64,
        capacity: u32,
    },

    /// Tasks on a dependency cycle, each depending on the next
    Cycle { path: Vec<TaskId> },
}

/// One blocking reason for one task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Conflict {
    pub task_id: TaskId,
    pub kind: ConflictKind,
    pub detail: ConflictDetail,
}

impl Conflict {
    pub fn unmet_dependency(task_id: TaskId, waiting_on: Vec<TaskId>) -> Self {
        Self {
            task_id,
            kind: ConflictKind::UnmetDependency,
            detail: ConflictDetail::WaitingOn { waiting_on },
        }
    }

    pub fn resource_contention(
        task_id: TaskId,
        resource: ResourceId,
        demand: u64,
        capacity: u32,
    ) -> Self {
        Self {
            task_id,
            kind: ConflictKind::ResourceContention,
            detail: ConflictDetail::Contention {
                resource,
                demand,
                capacity,
            },
        }
    }

    pub fn cycle(task_id: TaskId, path: Vec<TaskId>) -> Self {
        Self {
            task_id,
            kind: ConflictKind::Cycle,
            detail: ConflictDetail::Cycle { path },
        }
    }
}

fn join(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            ConflictDetail::WaitingOn { waiting_on } => {
                write!(f, "{} is waiting for: {}", self.task_id, join(waiting_on))
            }
            ConflictDetail::Contention {
                resource,
                demand,
                capacity,
            } => write!(
                f,
                "{} contends for {}: {} reserved, capacity {}",
                self.task_id, resource, demand, capacity
            ),
            ConflictDetail::Cycle { path } => {
                write!(f, "dependency cycle: {} -> {}", join(path), self.task_id)
            }
        }
    }
}

/// Sorted list of conflicts, valid as of the moment it was produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictReport(Vec<Conflict>);

impl ConflictReport {
    /// Builds a report, sorting by task id, then kind, then detail
    pub fn new(mut conflicts: Vec<Conflict>) -> Self {
        conflicts.sort();
        conflicts.dedup();
        Self(conflicts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[Conflict] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries reported for one task
    pub fn for_task<'a>(&'a self, task_id: &TaskId) -> impl Iterator<Item = &'a Conflict> + 'a {
        let task_id = task_id.clone();
        self.0.iter().filter(move |c| c.task_id == task_id)
    }

    /// Returns true if the task has an unmet dependency or contention entry
    pub fn blocks(&self, task_id: &TaskId) -> bool {
        self.for_task(task_id).any(|c| c.kind.is_blocking())
    }

    /// Entries present in this report but not in `previous`
    pub fn new_since(&self, previous: &ConflictReport) -> Vec<Conflict> {
        let before: BTreeSet<&Conflict> = previous.0.iter().collect();
        self.0
            .iter()
            .filter(|c| !before.contains(c))
            .cloned()
            .collect()
    }
}

impl<'a> IntoIterator for &'a ConflictReport {
    type Item = &'a Conflict;
    type IntoIter = std::slice::Iter<'a, Conflict>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Pure function from board state to [`ConflictReport`]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn detect(
        tasks: &BTreeMap<TaskId, Task>,
        graph: &DependencyGraph,
        pool: &ResourcePool,
    ) -> ConflictReport {
        let mut conflicts = Vec::new();
        let state_of = |id: &TaskId| tasks.get(id).map(|t| t.state);

        for task in tasks.values().filter(|t| !t.state.is_complete()) {
            let unmet = graph.unmet_dependencies(&task.id, state_of);
            if !unmet.is_empty() {
                conflicts.push(Conflict::unmet_dependency(task.id.clone(), unmet));
            }
        }

        for resource in pool.resources() {
            let demand = pool.reserved(&resource.id);
            if demand <= u64::from(resource.total_capacity) {
                continue;
            }
            for (holder, _) in pool.holders(&resource.id) {
                let active = tasks
                    .get(&holder)
                    .map(|t| !t.state.is_complete())
                    .unwrap_or(false);
                if active {
                    conflicts.push(Conflict::resource_contention(
                        holder,
                        resource.id.clone(),
                        demand,
                        resource.total_capacity,
                    ));
                }
            }
        }

        if graph.has_cycle() {
            if let Some(path) = graph.find_cycle() {
                if let Some(first) = path.first().cloned() {
                    conflicts.push(Conflict::cycle(first, path));
                }
            }
        }

        let report = ConflictReport::new(conflicts);
        debug!(conflicts = report.len(), "recomputed conflict report");
        report
    }
}
