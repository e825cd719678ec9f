//! Domain models for the task board
//!
//! Contains the core scheduling logic without any I/O concerns.

mod conflict;
mod graph;
mod id;
mod resource;
mod scheduler;
mod shared;
mod task;

pub use conflict::{Conflict, ConflictDetail, ConflictDetector, ConflictKind, ConflictReport};
pub use graph::{DependencyGraph, GraphError};
pub use id::{IdError, ResourceId, TaskId};
pub use resource::{PoolError, Resource, ResourceKind, ResourcePool};
pub use scheduler::{
    BoardView, Command, ContentionPolicy, Outcome, ResourceView, SchedulerError, Snapshot,
    TaskScheduler, TaskView,
};
pub use shared::SharedScheduler;
pub use task::{Priority, Task, TaskState, TaskStatus, TaskUpdate};
