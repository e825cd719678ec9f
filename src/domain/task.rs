//! Task domain model
//!
//! Tasks are the units of work on the board. They have a priority, a due time,
//! an estimated duration, prerequisite tasks and the shared resources they
//! hold while running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::id::{ResourceId, TaskId};

/// Display priority. Never used for preemption.
///
/// Ordering is "most urgent first": `High < Medium < Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!(
                "invalid priority: {other} (expected high, medium or low)"
            )),
        }
    }
}

/// Lifecycle state stored on a task
///
/// `blocked` is not a lifecycle state; see [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskState {
    /// Returns true if this state represents completion
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskState::Completed)
    }

    /// Returns true if this task is not yet started
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    /// Returns true if this task is currently being worked on
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::InProgress)
    }
}

/// Status as shown to callers: the lifecycle state with `Blocked` overlaid
/// whenever the conflict detector reports a blocking reason for the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    /// Overlays `Blocked` on a non-completed lifecycle state
    pub fn derive(state: TaskState, blocked: bool) -> Self {
        match state {
            TaskState::Completed => TaskStatus::Completed,
            _ if blocked => TaskStatus::Blocked,
            TaskState::Pending => TaskStatus::Pending,
            TaskState::InProgress => TaskStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

/// A unit of work on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Human-readable title
    pub title: String,

    /// Free-text description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    /// Lifecycle state
    #[serde(default)]
    pub state: TaskState,

    /// When the task is due (orders the schedule view)
    pub due_at: DateTime<Utc>,

    #[serde(default)]
    pub estimated_duration_minutes: u32,

    /// Tasks that must be completed before this one may leave pending
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<TaskId>,

    /// Resources held while running, with the quantity needed of each
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub required_resources: BTreeMap<ResourceId, u32>,

    /// Percent complete, 0-100
    #[serde(default)]
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Facility zone the work happens in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new pending task with the given ID, title and due time
    pub fn new(id: TaskId, title: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            state: TaskState::Pending,
            due_at,
            estimated_duration_minutes: 0,
            dependencies: BTreeSet::new(),
            required_resources: BTreeMap::new(),
            progress: 0,
            assignee: None,
            zone: None,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration_minutes = minutes;
        self
    }

    /// Adds a prerequisite task
    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        self.dependencies.insert(task_id);
        self
    }

    /// Adds a resource requirement (a zero quantity is treated as 1)
    pub fn requires(mut self, resource: ResourceId, quantity: u32) -> Self {
        self.required_resources.insert(resource, quantity.max(1));
        self
    }

    /// Transitions to in_progress
    pub fn start(&mut self) {
        if self.state == TaskState::Pending {
            let now = Utc::now();
            self.state = TaskState::InProgress;
            self.started_at = Some(now);
            self.updated_at = now;
        }
    }

    /// Records progress (callers enforce monotonicity)
    pub fn set_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
        self.updated_at = Utc::now();
    }

    /// Transitions to completed with full progress
    pub fn complete(&mut self) {
        if !self.state.is_complete() {
            let now = Utc::now();
            self.state = TaskState::Completed;
            self.progress = 100;
            self.completed_at = Some(now);
            self.updated_at = now;
        }
    }

    /// Puts the task back to a fresh pending state (used when loading data
    /// for creation: callers cannot create already-running tasks)
    pub(crate) fn reset_lifecycle(&mut self) {
        self.state = TaskState::Pending;
        self.progress = 0;
        self.started_at = None;
        self.completed_at = None;
    }
}

/// A partial edit of a task; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: Option<u32>,
    pub dependencies: Option<BTreeSet<TaskId>>,
    pub required_resources: Option<BTreeMap<ResourceId, u32>>,
    pub assignee: Option<String>,
    pub zone: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

impl TaskUpdate {
    /// Returns true if the update changes nothing
    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }

    /// Applies the fields that carry no scheduling invariants
    ///
    /// Dependencies and resource requirements are applied by the scheduler,
    /// which validates them first.
    pub(crate) fn apply_descriptive(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(minutes) = self.estimated_duration_minutes {
            task.estimated_duration_minutes = minutes;
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = Some(assignee.clone());
        }
        if let Some(zone) = &self.zone {
            task.zone = Some(zone.clone());
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        task.updated_at = Utc::now();
    }
}
