//! Task scheduler
//!
//! The single owner of tasks, the dependency graph and the resource pool.
//! Every mutation validates its input, applies the change all-or-nothing,
//! then recomputes the [`ConflictReport`] so callers never see stale derived
//! status.
//!
//! Lifecycle: `pending -> in_progress -> completed`. `blocked` is an overlay
//! computed from the report, never set directly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::conflict::{Conflict, ConflictDetector, ConflictKind, ConflictReport};
use super::graph::{DependencyGraph, GraphError};
use super::id::{ResourceId, TaskId};
use super::resource::{PoolError, Resource, ResourcePool};
use super::task::{Task, TaskStatus, TaskUpdate};

fn join(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Dependency cycle: {}", join(.path))]
    Cycle { path: Vec<TaskId> },

    #[error("Task {task} is not ready: {reason}")]
    NotReady { task: TaskId, reason: String },

    #[error("Resource not declared: {0}")]
    UnknownResource(ResourceId),

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Task id already in use: {0}")]
    DuplicateTask(TaskId),

    #[error("Progress for {task} must be between {current} and 100, got {requested}")]
    InvalidProgress {
        task: TaskId,
        current: u8,
        requested: u8,
    },

    #[error("Resource {0} must have a capacity of at least 1")]
    InvalidCapacity(ResourceId),
}

impl From<GraphError> for SchedulerError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected { path, .. } => SchedulerError::Cycle { path },
            GraphError::SelfDependency(id) => SchedulerError::Cycle { path: vec![id] },
            GraphError::TaskNotFound(id) => SchedulerError::UnknownTask(id),
        }
    }
}

impl From<PoolError> for SchedulerError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::UnknownResource(id) => SchedulerError::UnknownResource(id),
            PoolError::InvalidCapacity(id) => SchedulerError::InvalidCapacity(id),
        }
    }
}

/// What `start` does when the reservation would exceed capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentionPolicy {
    /// Start anyway and report contention
    #[default]
    Advisory,
    /// Refuse the start with `NotReady`
    Strict,
}

impl std::str::FromStr for ContentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "advisory" => Ok(ContentionPolicy::Advisory),
            "strict" => Ok(ContentionPolicy::Strict),
            other => Err(format!(
                "invalid contention_policy: {other} (expected \"advisory\" or \"strict\")"
            )),
        }
    }
}

/// Persisted form of a board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// A task with its derived status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub status: TaskStatus,
}

/// A resource with its current reservations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: Resource,
    pub reserved: u64,
    pub holders: Vec<TaskId>,
}

/// Everything a caller needs to render the board
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardView {
    /// Tasks ordered by priority, then due time, then id
    pub tasks: Vec<TaskView>,
    pub resources: Vec<ResourceView>,
    pub conflicts: ConflictReport,
}

impl BoardView {
    pub fn task(&self, id: &TaskId) -> Option<&TaskView> {
        self.tasks.iter().find(|v| &v.task.id == id)
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.task(id).map(|v| v.status)
    }
}

/// Result of a successful mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub view: BoardView,
    /// Conflicts that were not in the report before this mutation
    pub new_conflicts: Vec<Conflict>,
}

/// Inbound commands from a UI / CLI layer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTask(Task),
    UpdateTask { id: TaskId, update: TaskUpdate },
    StartTask(TaskId),
    UpdateProgress { id: TaskId, percent: u8 },
    CompleteTask(TaskId),
    DeleteTask(TaskId),
    DeclareResource(Resource),
}

/// Owns the board and applies the task state machine
#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    tasks: BTreeMap<TaskId, Task>,
    graph: DependencyGraph,
    pool: ResourcePool,
    policy: ContentionPolicy,
    report: ConflictReport,
}

impl TaskScheduler {
    pub fn new(policy: ContentionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuilds a scheduler from persisted state
    ///
    /// Dependencies on missing tasks are kept as dangling (permanently
    /// unmet). A snapshot whose dependencies form a cycle is rejected.
    pub fn restore(snapshot: Snapshot, policy: ContentionPolicy) -> Result<Self, SchedulerError> {
        let mut scheduler = Self::new(policy);

        for resource in snapshot.resources {
            scheduler.pool.declare(resource)?;
        }

        for mut task in snapshot.tasks {
            if scheduler.tasks.contains_key(&task.id) {
                return Err(SchedulerError::DuplicateTask(task.id));
            }
            let progress = if task.state.is_complete() {
                100
            } else {
                task.progress.min(100)
            };
            if progress != task.progress {
                warn!(
                    task = %task.id,
                    stored = task.progress,
                    progress,
                    "corrected restored progress"
                );
                task.progress = progress;
            }
            scheduler.ensure_resources_declared(&task.required_resources)?;
            scheduler.graph.add_node(task.id.clone());
            scheduler.tasks.insert(task.id.clone(), task);
        }

        for task in scheduler.tasks.values() {
            for dep in &task.dependencies {
                if dep == &task.id {
                    return Err(SchedulerError::Cycle {
                        path: vec![task.id.clone()],
                    });
                }
                if scheduler.tasks.contains_key(dep) {
                    scheduler.graph.add_edge_unchecked(&task.id, dep)?;
                } else {
                    warn!(task = %task.id, dependency = %dep, "restored dangling dependency");
                    scheduler.graph.add_dangling(&task.id, dep.clone());
                }
            }
        }

        if scheduler.graph.has_cycle() {
            let path = scheduler.graph.find_cycle().unwrap_or_default();
            return Err(SchedulerError::Cycle { path });
        }

        let active: Vec<(TaskId, BTreeMap<ResourceId, u32>)> = scheduler
            .tasks
            .values()
            .filter(|t| t.state.is_active())
            .map(|t| (t.id.clone(), t.required_resources.clone()))
            .collect();
        for (task_id, resources) in active {
            scheduler.reserve_all(&task_id, &resources)?;
        }

        scheduler.report = scheduler.detect();
        info!(
            tasks = scheduler.tasks.len(),
            resources = scheduler.pool.len(),
            conflicts = scheduler.report.len(),
            "restored task board"
        );
        Ok(scheduler)
    }

    /// Applies one inbound command
    pub fn apply(&mut self, command: Command) -> Result<Outcome, SchedulerError> {
        match command {
            Command::CreateTask(task) => self.create(task),
            Command::UpdateTask { id, update } => self.update(&id, update),
            Command::StartTask(id) => self.start(&id),
            Command::UpdateProgress { id, percent } => self.update_progress(&id, percent),
            Command::CompleteTask(id) => self.complete(&id),
            Command::DeleteTask(id) => self.delete(&id),
            Command::DeclareResource(resource) => self.declare_resource(resource),
        }
    }

    /// Adds a new pending task
    ///
    /// Lifecycle fields of `task` are reset: new tasks always start pending
    /// with zero progress.
    pub fn create(&mut self, mut task: Task) -> Result<Outcome, SchedulerError> {
        if self.tasks.contains_key(&task.id) || self.graph.is_dangling_target(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }
        self.validate_dependencies(&task.id, &task.dependencies, &BTreeSet::new())?;
        self.ensure_resources_declared(&task.required_resources)?;

        self.graph.add_node(task.id.clone());
        if let Err(err) = self.graph.set_dependencies(&task.id, &task.dependencies) {
            self.graph.remove_node(&task.id);
            return Err(err.into());
        }

        task.reset_lifecycle();
        for quantity in task.required_resources.values_mut() {
            *quantity = (*quantity).max(1);
        }

        info!(task = %task.id, title = %task.title, "created task");
        self.tasks.insert(task.id.clone(), task);
        Ok(self.commit())
    }

    /// Edits a task
    ///
    /// Dependency and resource changes are validated like `create`. An
    /// in-progress task's reservations follow its new requirements.
    pub fn update(&mut self, id: &TaskId, update: TaskUpdate) -> Result<Outcome, SchedulerError> {
        let state = self.require(id)?.state;

        if let Some(deps) = &update.dependencies {
            let dangling: BTreeSet<TaskId> = self.graph.dangling(id).into_iter().collect();
            self.validate_dependencies(id, deps, &dangling)?;
        }
        if let Some(resources) = &update.required_resources {
            self.ensure_resources_declared(resources)?;
        }
        if let Some(deps) = &update.dependencies {
            self.graph.set_dependencies(id, deps)?;
        }

        let resources = update.required_resources.as_ref().map(|r| {
            r.iter()
                .map(|(res, qty)| (res.clone(), (*qty).max(1)))
                .collect::<BTreeMap<_, _>>()
        });
        if let Some(resources) = &resources {
            if state.is_active() {
                self.pool.release(id);
                self.reserve_all(id, resources)?;
            }
        }

        let task = self.require_mut(id)?;
        update.apply_descriptive(task);
        if let Some(deps) = update.dependencies {
            task.dependencies = deps;
        }
        if let Some(resources) = resources {
            task.required_resources = resources;
        }

        info!(task = %id, "updated task");
        Ok(self.commit())
    }

    /// Moves a pending, unblocked task to in_progress and reserves its resources
    pub fn start(&mut self, id: &TaskId) -> Result<Outcome, SchedulerError> {
        let task = self.require(id)?;
        let status = self.status_for(task);

        if status != TaskStatus::Pending {
            return Err(SchedulerError::NotReady {
                task: id.clone(),
                reason: self.not_ready_reason(task, status),
            });
        }

        let resources = task.required_resources.clone();

        if self.policy == ContentionPolicy::Strict {
            for (resource, quantity) in &resources {
                if self.pool.would_exceed(resource, *quantity)? {
                    return Err(SchedulerError::NotReady {
                        task: id.clone(),
                        reason: format!(
                            "{} has {} of {} available, {} needed",
                            resource,
                            self.pool.available(resource),
                            self.pool
                                .get(resource)
                                .map(|r| r.total_capacity)
                                .unwrap_or(0),
                            quantity
                        ),
                    });
                }
            }
        } else {
            // Surface unknown resources before reserving anything
            self.ensure_resources_declared(&resources)?;
        }

        self.reserve_all(id, &resources)?;
        self.require_mut(id)?.start();

        info!(task = %id, "started task");
        Ok(self.commit())
    }

    /// Records progress on an in-progress task; never decreases
    pub fn update_progress(&mut self, id: &TaskId, percent: u8) -> Result<Outcome, SchedulerError> {
        let task = self.require(id)?;
        if !task.state.is_active() {
            return Err(SchedulerError::NotReady {
                task: id.clone(),
                reason: format!(
                    "progress can only be updated while in progress (state: {:?})",
                    task.state
                ),
            });
        }
        if percent < task.progress || percent > 100 {
            return Err(SchedulerError::InvalidProgress {
                task: id.clone(),
                current: task.progress,
                requested: percent,
            });
        }

        self.require_mut(id)?.set_progress(percent);
        debug!(task = %id, percent, "progress updated");
        Ok(self.commit())
    }

    /// Completes an in-progress task and releases its resources
    pub fn complete(&mut self, id: &TaskId) -> Result<Outcome, SchedulerError> {
        let task = self.require(id)?;
        if !task.state.is_active() {
            return Err(SchedulerError::NotReady {
                task: id.clone(),
                reason: format!(
                    "only in-progress tasks can be completed (state: {:?})",
                    task.state
                ),
            });
        }

        self.require_mut(id)?.complete();
        let freed = self.pool.release(id);

        info!(
            task = %id,
            released = freed.len(),
            dependents = self.graph.dependents(id).len(),
            "completed task"
        );
        Ok(self.commit())
    }

    /// Removes a task, its edges and its reservations
    ///
    /// Tasks that depended on it keep the id as a permanently unmet dependency.
    pub fn delete(&mut self, id: &TaskId) -> Result<Outcome, SchedulerError> {
        if self.tasks.remove(id).is_none() {
            return Err(SchedulerError::UnknownTask(id.clone()));
        }

        let orphaned = self.graph.dependents(id);
        self.graph.remove_node(id);
        self.pool.release(id);

        if !orphaned.is_empty() {
            warn!(task = %id, dependents = ?orphaned, "deleted task is still a dependency");
        }
        info!(task = %id, "deleted task");
        Ok(self.commit())
    }

    /// Registers a resource or changes its capacity
    pub fn declare_resource(&mut self, resource: Resource) -> Result<Outcome, SchedulerError> {
        let id = resource.id.clone();
        self.pool.declare(resource)?;
        info!(resource = %id, "declared resource");
        Ok(self.commit())
    }

    /// Current tasks with derived status plus the conflict report
    pub fn view(&self) -> BoardView {
        let mut tasks: Vec<TaskView> = self
            .tasks
            .values()
            .map(|task| TaskView {
                task: task.clone(),
                status: self.status_for(task),
            })
            .collect();
        tasks.sort_by(|a, b| {
            a.task
                .priority
                .cmp(&b.task.priority)
                .then(a.task.due_at.cmp(&b.task.due_at))
                .then(a.task.id.cmp(&b.task.id))
        });

        let resources = self
            .pool
            .resources()
            .map(|resource| ResourceView {
                resource: resource.clone(),
                reserved: self.pool.reserved(&resource.id),
                holders: self
                    .pool
                    .holders(&resource.id)
                    .into_iter()
                    .map(|(task, _)| task)
                    .collect(),
            })
            .collect();

        BoardView {
            tasks,
            resources,
            conflicts: self.report.clone(),
        }
    }

    pub fn conflicts(&self) -> &ConflictReport {
        &self.report
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(id).map(|task| self.status_for(task))
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Tasks in id order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.pool.resources()
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn policy(&self) -> ContentionPolicy {
        self.policy
    }

    /// Dependency-respecting order of all tasks
    ///
    /// A task never precedes one of its dependencies; otherwise earlier due
    /// times come first, then higher priority.
    pub fn schedule(&self) -> Vec<TaskId> {
        self.graph.ordered_by(|id| {
            self.tasks
                .get(id)
                .map(|task| (task.due_at, task.priority))
        })
    }

    /// Tasks that could be started right now, most urgent first
    pub fn ready(&self) -> Vec<TaskId> {
        self.with_status(TaskStatus::Pending)
    }

    /// Tasks currently blocked, most urgent first
    pub fn blocked(&self) -> Vec<TaskId> {
        self.with_status(TaskStatus::Blocked)
    }

    /// Holders and requesters of a resource, most urgent first
    pub fn contenders_for(&self, resource: &ResourceId) -> Result<Vec<TaskId>, SchedulerError> {
        if !self.pool.contains(resource) {
            return Err(SchedulerError::UnknownResource(resource.clone()));
        }
        Ok(self.pool.contenders_for(resource, self.tasks.values()))
    }

    /// Persistable state, sorted by id
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tasks: self.tasks.values().cloned().collect(),
            resources: self.pool.resources().cloned().collect(),
        }
    }

    fn with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.view()
            .tasks
            .into_iter()
            .filter(|v| v.status == status)
            .map(|v| v.task.id)
            .collect()
    }

    fn detect(&self) -> ConflictReport {
        ConflictDetector::detect(&self.tasks, &self.graph, &self.pool)
    }

    /// Recomputes derived state and packages the result of a mutation
    fn commit(&mut self) -> Outcome {
        let fresh = self.detect();
        let previous = std::mem::replace(&mut self.report, fresh);
        let new_conflicts = self.report.new_since(&previous);
        if !new_conflicts.is_empty() {
            debug!(count = new_conflicts.len(), "new conflicts since last mutation");
        }
        Outcome {
            view: self.view(),
            new_conflicts,
        }
    }

    fn status_for(&self, task: &Task) -> TaskStatus {
        TaskStatus::derive(task.state, self.report.blocks(&task.id))
    }

    fn not_ready_reason(&self, task: &Task, status: TaskStatus) -> String {
        match status {
            TaskStatus::InProgress => "already in progress".to_string(),
            TaskStatus::Completed => "already completed".to_string(),
            _ => {
                let reasons: Vec<String> = self
                    .report
                    .for_task(&task.id)
                    .filter(|c| c.kind != ConflictKind::Cycle)
                    .map(|c| c.to_string())
                    .collect();
                format!("blocked ({})", reasons.join("; "))
            }
        }
    }

    fn require(&self, id: &TaskId) -> Result<&Task, SchedulerError> {
        self.tasks
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))
    }

    fn require_mut(&mut self, id: &TaskId) -> Result<&mut Task, SchedulerError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))
    }

    /// Self-references are cycles; other ids must exist (or be `allowed_missing`)
    fn validate_dependencies(
        &self,
        id: &TaskId,
        deps: &BTreeSet<TaskId>,
        allowed_missing: &BTreeSet<TaskId>,
    ) -> Result<(), SchedulerError> {
        for dep in deps {
            if dep == id {
                return Err(SchedulerError::Cycle {
                    path: vec![id.clone()],
                });
            }
            if !self.tasks.contains_key(dep) && !allowed_missing.contains(dep) {
                return Err(SchedulerError::UnknownDependency {
                    task: id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    fn ensure_resources_declared(
        &self,
        resources: &BTreeMap<ResourceId, u32>,
    ) -> Result<(), SchedulerError> {
        match resources.keys().find(|r| !self.pool.contains(r)) {
            Some(missing) => Err(SchedulerError::UnknownResource(missing.clone())),
            None => Ok(()),
        }
    }

    fn reserve_all(
        &mut self,
        task: &TaskId,
        resources: &BTreeMap<ResourceId, u32>,
    ) -> Result<(), SchedulerError> {
        for (resource, quantity) in resources {
            if self.pool.reserve(task, resource, *quantity)? {
                warn!(
                    task = %task,
                    resource = %resource,
                    reserved = self.pool.reserved(resource),
                    "resource over capacity"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::domain::task::{Priority, TaskState};

    fn tid(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn rid(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn task(id: &str) -> Task {
        Task::new(tid(id), format!("Task {}", id), Utc::now())
    }

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(ContentionPolicy::Advisory)
    }

    #[test]
    fn create_start_complete() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.start(&tid("a")).unwrap();
        let outcome = s.complete(&tid("a")).unwrap();

        let view = outcome.view.task(&tid("a")).unwrap();
        assert_eq!(view.status, TaskStatus::Completed);
        assert_eq!(view.task.progress, 100);
        assert!(outcome.view.conflicts.is_empty());
    }

    #[test]
    fn dependent_cannot_start_until_dependency_completes() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();

        assert_eq!(s.status_of(&tid("b")), Some(TaskStatus::Blocked));
        let err = s.start(&tid("b")).unwrap_err();
        assert!(matches!(err, SchedulerError::NotReady { .. }));

        s.start(&tid("a")).unwrap();
        s.complete(&tid("a")).unwrap();

        assert_eq!(s.status_of(&tid("b")), Some(TaskStatus::Pending));
        s.start(&tid("b")).unwrap();
        assert_eq!(s.status_of(&tid("b")), Some(TaskStatus::InProgress));
    }

    #[test]
    fn self_dependency_is_a_cycle_and_nothing_is_created() {
        let mut s = scheduler();
        let err = s.create(task("e").depends_on(tid("e"))).unwrap_err();

        assert_eq!(err, SchedulerError::Cycle { path: vec![tid("e")] });
        assert!(s.task(&tid("e")).is_none());
        assert!(s.graph().is_empty());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut s = scheduler();
        let err = s.create(task("b").depends_on(tid("ghost"))).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::UnknownDependency {
                task: tid("b"),
                dependency: tid("ghost"),
            }
        );
        assert!(s.graph().is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        assert_eq!(
            s.create(task("a")).unwrap_err(),
            SchedulerError::DuplicateTask(tid("a"))
        );
    }

    #[test]
    fn undeclared_resource_is_rejected() {
        let mut s = scheduler();
        let err = s.create(task("c").requires(rid("kit"), 1)).unwrap_err();
        assert_eq!(err, SchedulerError::UnknownResource(rid("kit")));
        assert!(s.task(&tid("c")).is_none());
    }

    #[test]
    fn create_resets_lifecycle_fields() {
        let mut s = scheduler();
        let mut t = task("a");
        t.start();
        t.set_progress(50);
        s.create(t).unwrap();

        let created = s.task(&tid("a")).unwrap();
        assert_eq!(created.state, TaskState::Pending);
        assert_eq!(created.progress, 0);
    }

    #[test]
    fn advisory_start_over_capacity_flags_both_holders() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.create(task("d").requires(rid("kit"), 1)).unwrap();

        s.start(&tid("c")).unwrap();
        let outcome = s.start(&tid("d")).unwrap();

        let contention: Vec<_> = outcome
            .view
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::ResourceContention)
            .map(|c| c.task_id.clone())
            .collect();
        assert_eq!(contention, vec![tid("c"), tid("d")]);
        assert_eq!(outcome.new_conflicts.len(), 2);
        assert_eq!(s.status_of(&tid("c")), Some(TaskStatus::Blocked));
    }

    #[test]
    fn strict_policy_refuses_over_capacity_start() {
        let mut s = TaskScheduler::new(ContentionPolicy::Strict);
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.create(task("d").requires(rid("kit"), 1)).unwrap();

        s.start(&tid("c")).unwrap();
        let err = s.start(&tid("d")).unwrap_err();

        assert!(matches!(err, SchedulerError::NotReady { .. }));
        assert_eq!(s.task(&tid("d")).map(|t| t.state), Some(TaskState::Pending));
        assert!(s.conflicts().is_empty());
    }

    #[test]
    fn contended_tasks_can_still_progress_and_complete() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.create(task("d").requires(rid("kit"), 1)).unwrap();
        s.start(&tid("c")).unwrap();
        s.start(&tid("d")).unwrap();

        s.update_progress(&tid("c"), 50).unwrap();
        let outcome = s.complete(&tid("c")).unwrap();

        assert!(outcome.view.conflicts.is_empty());
        assert_eq!(s.status_of(&tid("d")), Some(TaskStatus::InProgress));
        assert!(!s.contenders_for(&rid("kit")).unwrap().contains(&tid("c")));
    }

    #[test]
    fn progress_is_monotonic() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();

        assert!(matches!(
            s.update_progress(&tid("a"), 10),
            Err(SchedulerError::NotReady { .. })
        ));

        s.start(&tid("a")).unwrap();
        s.update_progress(&tid("a"), 30).unwrap();
        s.update_progress(&tid("a"), 30).unwrap();

        assert_eq!(
            s.update_progress(&tid("a"), 20).unwrap_err(),
            SchedulerError::InvalidProgress {
                task: tid("a"),
                current: 30,
                requested: 20,
            }
        );
        assert!(matches!(
            s.update_progress(&tid("a"), 101),
            Err(SchedulerError::InvalidProgress { .. })
        ));
        assert_eq!(s.task(&tid("a")).map(|t| t.progress), Some(30));
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        assert!(matches!(
            s.complete(&tid("a")),
            Err(SchedulerError::NotReady { .. })
        ));
    }

    #[test]
    fn unknown_task_operations_fail() {
        let mut s = scheduler();
        let ghost = tid("ghost");
        assert_eq!(
            s.start(&ghost).unwrap_err(),
            SchedulerError::UnknownTask(ghost.clone())
        );
        assert_eq!(
            s.complete(&ghost).unwrap_err(),
            SchedulerError::UnknownTask(ghost.clone())
        );
        assert_eq!(s.delete(&ghost).unwrap_err(), SchedulerError::UnknownTask(ghost.clone()));
        assert_eq!(
            s.update(&ghost, TaskUpdate::default()).unwrap_err(),
            SchedulerError::UnknownTask(ghost)
        );
    }

    #[test]
    fn delete_leaves_dependents_permanently_blocked() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();

        let outcome = s.delete(&tid("a")).unwrap();

        assert_eq!(outcome.view.status_of(&tid("b")), Some(TaskStatus::Blocked));
        let conflict = outcome.view.conflicts.for_task(&tid("b")).next().unwrap();
        assert_eq!(conflict.kind, ConflictKind::UnmetDependency);
        assert!(s.task(&tid("b")).unwrap().dependencies.contains(&tid("a")));

        // The id stays reserved while it is referenced
        assert_eq!(
            s.create(task("a")).unwrap_err(),
            SchedulerError::DuplicateTask(tid("a"))
        );
    }

    #[test]
    fn delete_releases_reservations() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.start(&tid("c")).unwrap();

        s.delete(&tid("c")).unwrap();
        assert_eq!(s.pool().reserved(&rid("kit")), 0);
    }

    #[test]
    fn update_dependencies_rejects_cycles_atomically() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();

        let update = TaskUpdate {
            title: Some("renamed".to_string()),
            dependencies: Some([tid("b")].into_iter().collect()),
            ..TaskUpdate::default()
        };
        let err = s.update(&tid("a"), update).unwrap_err();

        assert!(matches!(err, SchedulerError::Cycle { .. }));
        let a = s.task(&tid("a")).unwrap();
        assert_eq!(a.title, "Task a");
        assert!(a.dependencies.is_empty());
        assert!(!s.graph().has_cycle());
    }

    #[test]
    fn update_can_repair_dangling_dependency() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();
        s.delete(&tid("a")).unwrap();

        let update = TaskUpdate {
            dependencies: Some(BTreeSet::new()),
            ..TaskUpdate::default()
        };
        let outcome = s.update(&tid("b"), update).unwrap();

        assert_eq!(outcome.view.status_of(&tid("b")), Some(TaskStatus::Pending));
        // Once nothing references it, the id can be reused
        s.create(task("a")).unwrap();
    }

    #[test]
    fn update_moves_reservations_of_running_task() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.declare_resource(Resource::new(rid("tablet"), 3)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.start(&tid("c")).unwrap();

        let update = TaskUpdate {
            required_resources: Some([(rid("tablet"), 2)].into_iter().collect()),
            ..TaskUpdate::default()
        };
        s.update(&tid("c"), update).unwrap();

        assert_eq!(s.pool().reserved(&rid("kit")), 0);
        assert_eq!(s.pool().reserved(&rid("tablet")), 2);
    }

    #[test]
    fn lowering_capacity_creates_contention() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 2)).unwrap();
        s.create(task("c").requires(rid("kit"), 1)).unwrap();
        s.create(task("d").requires(rid("kit"), 1)).unwrap();
        s.start(&tid("c")).unwrap();
        s.start(&tid("d")).unwrap();
        assert!(s.conflicts().is_empty());

        let outcome = s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        assert_eq!(outcome.new_conflicts.len(), 2);
    }

    #[test]
    fn view_is_ordered_by_priority_then_due() {
        let mut s = scheduler();
        let now = Utc::now();
        s.create(Task::new(tid("low"), "Low", now).with_priority(Priority::Low))
            .unwrap();
        s.create(
            Task::new(tid("late"), "Late", now + Duration::hours(1)).with_priority(Priority::High),
        )
        .unwrap();
        s.create(Task::new(tid("soon"), "Soon", now).with_priority(Priority::High))
            .unwrap();

        let order: Vec<_> = s.view().tasks.into_iter().map(|v| v.task.id).collect();
        assert_eq!(order, vec![tid("soon"), tid("late"), tid("low")]);
    }

    #[test]
    fn schedule_respects_dependencies_over_due_dates() {
        let mut s = scheduler();
        let now = Utc::now();
        s.create(Task::new(tid("filters"), "Filters", now + Duration::hours(4)))
            .unwrap();
        s.create(
            Task::new(tid("nutrients"), "Nutrients", now + Duration::hours(1))
                .depends_on(tid("filters")),
        )
        .unwrap();
        s.create(Task::new(tid("sensors"), "Sensors", now + Duration::hours(2)))
            .unwrap();

        assert_eq!(
            s.schedule(),
            vec![tid("sensors"), tid("filters"), tid("nutrients")]
        );
    }

    #[test]
    fn ready_and_blocked_lists() {
        let mut s = scheduler();
        s.create(task("a")).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();

        assert_eq!(s.ready(), vec![tid("a")]);
        assert_eq!(s.blocked(), vec![tid("b")]);
    }

    #[test]
    fn restore_round_trips_snapshot() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("a").requires(rid("kit"), 1)).unwrap();
        s.create(task("b").depends_on(tid("a"))).unwrap();
        s.start(&tid("a")).unwrap();

        let restored = TaskScheduler::restore(s.snapshot(), ContentionPolicy::Advisory).unwrap();

        assert_eq!(restored.view(), s.view());
        assert_eq!(restored.pool().reserved(&rid("kit")), 1);
    }

    #[test]
    fn restore_keeps_dangling_dependencies() {
        let snapshot = Snapshot {
            tasks: vec![task("b").depends_on(tid("gone"))],
            resources: vec![],
        };
        let s = TaskScheduler::restore(snapshot, ContentionPolicy::Advisory).unwrap();

        assert_eq!(s.status_of(&tid("b")), Some(TaskStatus::Blocked));
        assert_eq!(s.graph().dangling(&tid("b")), vec![tid("gone")]);
    }

    #[test]
    fn restore_rejects_cycles() {
        let snapshot = Snapshot {
            tasks: vec![
                task("a").depends_on(tid("b")),
                task("b").depends_on(tid("a")),
            ],
            resources: vec![],
        };
        let err = TaskScheduler::restore(snapshot, ContentionPolicy::Advisory).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Cycle {
                path: vec![tid("a"), tid("b")],
            }
        );
    }

    #[test]
    fn restore_corrects_out_of_range_progress() {
        let mut running = task("a");
        running.state = TaskState::InProgress;
        running.progress = 200;
        let mut finished = task("b");
        finished.state = TaskState::Completed;
        finished.progress = 40;
        let snapshot = Snapshot {
            tasks: vec![running, finished],
            resources: vec![],
        };

        let s = TaskScheduler::restore(snapshot, ContentionPolicy::Advisory).unwrap();

        assert_eq!(s.task(&tid("a")).map(|t| t.progress), Some(100));
        assert_eq!(s.task(&tid("b")).map(|t| t.progress), Some(100));
    }

    #[test]
    fn huge_requirements_still_report_contention() {
        let mut s = scheduler();
        s.declare_resource(Resource::new(rid("kit"), 1)).unwrap();
        s.create(task("c").requires(rid("kit"), 1 << 31)).unwrap();
        s.create(task("d").requires(rid("kit"), 1 << 31)).unwrap();

        s.start(&tid("c")).unwrap();
        let outcome = s.start(&tid("d")).unwrap();

        assert_eq!(s.pool().reserved(&rid("kit")), 1u64 << 32);
        assert_eq!(outcome.view.conflicts.len(), 2);
        assert_eq!(outcome.view.status_of(&tid("c")), Some(TaskStatus::Blocked));
        assert_eq!(outcome.view.status_of(&tid("d")), Some(TaskStatus::Blocked));
    }

    #[test]
    fn strict_policy_refuses_requirement_above_capacity() {
        let mut s = TaskScheduler::new(ContentionPolicy::Strict);
        s.declare_resource(Resource::new(rid("kit"), 2)).unwrap();
        s.create(task("c").requires(rid("kit"), 3)).unwrap();

        assert!(matches!(
            s.start(&tid("c")),
            Err(SchedulerError::NotReady { .. })
        ));
        assert_eq!(s.pool().reserved(&rid("kit")), 0);
    }

    #[test]
    fn apply_dispatches_commands() {
        let mut s = scheduler();
        s.apply(Command::CreateTask(task("a"))).unwrap();
        s.apply(Command::StartTask(tid("a"))).unwrap();
        s.apply(Command::UpdateProgress {
            id: tid("a"),
            percent: 60,
        })
        .unwrap();
        let outcome = s.apply(Command::CompleteTask(tid("a"))).unwrap();

        assert_eq!(outcome.view.status_of(&tid("a")), Some(TaskStatus::Completed));
    }
}
