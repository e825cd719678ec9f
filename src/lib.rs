//! Taskboard - dependency-aware task scheduling for facility operations
//!
//! Tasks depend on other tasks and hold shared resources (equipment, devices)
//! while they run. The scheduler keeps the dependency graph acyclic, tracks
//! capacity, and derives a conflict report after every change.

pub mod cli;
pub mod domain;
pub mod logging;
pub mod storage;

pub use domain::{
    BoardView, Command, ConflictReport, Resource, ResourceId, Task, TaskId, TaskScheduler,
    TaskStatus,
};
