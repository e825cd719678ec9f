//! Shared resources and their capacity bookkeeping
//!
//! A [`Resource`] is a named capacity such as "2 calibration kits". The
//! [`ResourcePool`] records which task holds how much of each resource.
//! Reservations are advisory: the pool reports when cumulative demand exceeds
//! capacity but never refuses to record it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use super::id::{ResourceId, TaskId};
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("Resource not declared: {0}")]
    UnknownResource(ResourceId),

    #[error("Resource {0} must have a capacity of at least 1")]
    InvalidCapacity(ResourceId),
}

/// Informational resource classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Equipment,
    Device,
    Consumable,
    Other,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Equipment => "equipment",
            ResourceKind::Device => "device",
            ResourceKind::Consumable => "consumable",
            ResourceKind::Other => "other",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equipment" => Ok(ResourceKind::Equipment),
            "device" => Ok(ResourceKind::Device),
            "consumable" => Ok(ResourceKind::Consumable),
            "other" => Ok(ResourceKind::Other),
            other => Err(format!(
                "invalid resource kind: {other} (expected equipment, device, consumable or other)"
            )),
        }
    }
}

/// A named, shared capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,

    /// Display name; defaults to the id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub kind: ResourceKind,

    pub total_capacity: u32,
}

impl Resource {
    pub fn new(id: ResourceId, total_capacity: u32) -> Self {
        Self {
            id,
            name: String::new(),
            kind: ResourceKind::default(),
            total_capacity,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    resource: Resource,
    /// Quantity held per task
    reserved_by: BTreeMap<TaskId, u32>,
}

impl Slot {
    /// Summed as `u64` so many large reservations cannot wrap
    fn reserved(&self) -> u64 {
        self.reserved_by.values().map(|q| u64::from(*q)).sum()
    }

    fn capacity(&self) -> u64 {
        u64::from(self.resource.total_capacity)
    }
}

/// Capacity bookkeeping for all declared resources
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    slots: BTreeMap<ResourceId, Slot>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource or updates its capacity and metadata
    ///
    /// Lowering capacity below what is currently reserved is allowed; existing
    /// holders keep their reservations and the excess shows up as contention.
    pub fn declare(&mut self, resource: Resource) -> Result<(), PoolError> {
        if resource.total_capacity == 0 {
            return Err(PoolError::InvalidCapacity(resource.id));
        }

        debug!(
            resource = %resource.id,
            capacity = resource.total_capacity,
            "declaring resource"
        );

        match self.slots.get_mut(&resource.id) {
            Some(slot) => slot.resource = resource,
            None => {
                self.slots.insert(
                    resource.id.clone(),
                    Slot {
                        resource,
                        reserved_by: BTreeMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Records that `task_id` holds `quantity` of `resource_id`
    ///
    /// Returns `true` if the cumulative reservation (including this one) now
    /// exceeds the resource's capacity. Re-reserving replaces the task's
    /// previous quantity for that resource.
    pub fn reserve(
        &mut self,
        task_id: &TaskId,
        resource_id: &ResourceId,
        quantity: u32,
    ) -> Result<bool, PoolError> {
        let slot = self
            .slots
            .get_mut(resource_id)
            .ok_or_else(|| PoolError::UnknownResource(resource_id.clone()))?;

        slot.reserved_by.insert(task_id.clone(), quantity.max(1));
        Ok(slot.reserved() > slot.capacity())
    }

    /// Returns true if reserving `quantity` more would exceed capacity
    pub fn would_exceed(&self, resource_id: &ResourceId, quantity: u32) -> Result<bool, PoolError> {
        let slot = self
            .slots
            .get(resource_id)
            .ok_or_else(|| PoolError::UnknownResource(resource_id.clone()))?;
        Ok(slot.reserved() + u64::from(quantity.max(1)) > slot.capacity())
    }

    /// Removes every reservation held by a task, returning the resources freed
    pub fn release(&mut self, task_id: &TaskId) -> Vec<ResourceId> {
        self.slots
            .iter_mut()
            .filter_map(|(id, slot)| slot.reserved_by.remove(task_id).map(|_| id.clone()))
            .collect()
    }

    /// Task ids holding or requesting the resource, most urgent first
    ///
    /// Requesters are the non-completed `tasks` that list the resource.
    /// Ordering: priority (high first), then due time, then id.
    pub fn contenders_for<'a>(
        &self,
        resource_id: &ResourceId,
        tasks: impl IntoIterator<Item = &'a Task>,
    ) -> Vec<TaskId> {
        let holders: BTreeSet<&TaskId> = self
            .slots
            .get(resource_id)
            .map(|slot| slot.reserved_by.keys().collect())
            .unwrap_or_default();

        let mut contenders: Vec<&Task> = tasks
            .into_iter()
            .filter(|task| {
                holders.contains(&task.id)
                    || (!task.state.is_complete()
                        && task.required_resources.contains_key(resource_id))
            })
            .collect();

        contenders.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.due_at.cmp(&b.due_at))
                .then(a.id.cmp(&b.id))
        });
        contenders.into_iter().map(|task| task.id.clone()).collect()
    }

    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.slots.contains_key(resource_id)
    }

    pub fn get(&self, resource_id: &ResourceId) -> Option<&Resource> {
        self.slots.get(resource_id).map(|slot| &slot.resource)
    }

    /// Total quantity currently reserved
    pub fn reserved(&self, resource_id: &ResourceId) -> u64 {
        self.slots.get(resource_id).map(Slot::reserved).unwrap_or(0)
    }

    /// Capacity not yet reserved (zero when over-allocated)
    pub fn available(&self, resource_id: &ResourceId) -> u32 {
        self.slots
            .get(resource_id)
            .and_then(|slot| u32::try_from(slot.capacity().saturating_sub(slot.reserved())).ok())
            .unwrap_or(0)
    }

    /// Tasks currently holding the resource with their quantities
    pub fn holders(&self, resource_id: &ResourceId) -> Vec<(TaskId, u32)> {
        self.slots
            .get(resource_id)
            .map(|slot| {
                slot.reserved_by
                    .iter()
                    .map(|(task, qty)| (task.clone(), *qty))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Declared resources in id order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.slots.values().map(|slot| &slot.resource)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::domain::task::Priority;

    fn rid(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn tid(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn pool_with(resource: &str, capacity: u32) -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.declare(Resource::new(rid(resource), capacity)).unwrap();
        pool
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut pool = ResourcePool::new();
        let result = pool.declare(Resource::new(rid("kit"), 0));
        assert_eq!(result, Err(PoolError::InvalidCapacity(rid("kit"))));
        assert!(pool.is_empty());
    }

    #[test]
    fn reserve_reports_over_capacity_without_refusing() {
        let mut pool = pool_with("kit", 1);

        assert_eq!(pool.reserve(&tid("c"), &rid("kit"), 1), Ok(false));
        assert_eq!(pool.reserve(&tid("d"), &rid("kit"), 1), Ok(true));
        assert_eq!(pool.reserved(&rid("kit")), 2);
        assert_eq!(pool.available(&rid("kit")), 0);
    }

    #[test]
    fn reserve_unknown_resource_fails() {
        let mut pool = ResourcePool::new();
        let result = pool.reserve(&tid("c"), &rid("kit"), 1);
        assert_eq!(result, Err(PoolError::UnknownResource(rid("kit"))));
    }

    #[test]
    fn release_frees_all_reservations_of_a_task() {
        let mut pool = pool_with("kit", 2);
        pool.declare(Resource::new(rid("tablet"), 3)).unwrap();

        pool.reserve(&tid("c"), &rid("kit"), 2).unwrap();
        pool.reserve(&tid("c"), &rid("tablet"), 1).unwrap();
        pool.reserve(&tid("d"), &rid("tablet"), 1).unwrap();

        let freed = pool.release(&tid("c"));
        assert_eq!(freed, vec![rid("kit"), rid("tablet")]);
        assert_eq!(pool.reserved(&rid("kit")), 0);
        assert_eq!(pool.holders(&rid("tablet")), vec![(tid("d"), 1)]);
    }

    #[test]
    fn large_reservations_do_not_wrap() {
        let mut pool = pool_with("kit", 1);
        let half = 1u32 << 31;

        assert_eq!(pool.reserve(&tid("c"), &rid("kit"), half), Ok(true));
        assert_eq!(pool.reserve(&tid("d"), &rid("kit"), half), Ok(true));
        assert_eq!(pool.reserved(&rid("kit")), 1u64 << 32);
        assert_eq!(pool.available(&rid("kit")), 0);
        assert_eq!(pool.would_exceed(&rid("kit"), u32::MAX), Ok(true));
    }

    #[test]
    fn single_request_above_capacity_is_over() {
        let mut pool = pool_with("kit", 2);

        assert_eq!(pool.would_exceed(&rid("kit"), 3), Ok(true));
        assert_eq!(pool.reserve(&tid("c"), &rid("kit"), 3), Ok(true));
        assert_eq!(pool.available(&rid("kit")), 0);
    }

    #[test]
    fn maximum_capacity_fits_maximum_request() {
        let mut pool = pool_with("kit", u32::MAX);

        assert_eq!(pool.reserve(&tid("c"), &rid("kit"), u32::MAX), Ok(false));
        assert_eq!(pool.available(&rid("kit")), 0);
        assert_eq!(pool.would_exceed(&rid("kit"), 1), Ok(true));
    }

    #[test]
    fn lowering_capacity_keeps_holders() {
        let mut pool = pool_with("kit", 2);
        pool.reserve(&tid("c"), &rid("kit"), 2).unwrap();

        pool.declare(Resource::new(rid("kit"), 1)).unwrap();

        assert_eq!(pool.reserved(&rid("kit")), 2);
        assert_eq!(pool.get(&rid("kit")).map(|r| r.total_capacity), Some(1));
    }

    #[test]
    fn would_exceed_checks_remaining_capacity() {
        let mut pool = pool_with("kit", 2);
        pool.reserve(&tid("c"), &rid("kit"), 1).unwrap();

        assert_eq!(pool.would_exceed(&rid("kit"), 1), Ok(false));
        assert_eq!(pool.would_exceed(&rid("kit"), 2), Ok(true));
    }

    #[test]
    fn contenders_are_ordered_by_priority_then_due() {
        let pool = pool_with("kit", 1);
        let now = Utc::now();

        let low = Task::new(tid("low"), "Low", now).with_priority(Priority::Low);
        let late = Task::new(tid("late"), "Late", now + Duration::hours(2))
            .with_priority(Priority::High);
        let early = Task::new(tid("early"), "Early", now + Duration::hours(1))
            .with_priority(Priority::High);
        let unrelated = Task::new(tid("other"), "Other", now);

        let tasks = [
            low.requires(rid("kit"), 1),
            late.requires(rid("kit"), 1),
            early.requires(rid("kit"), 1),
            unrelated,
        ];

        let contenders = pool.contenders_for(&rid("kit"), tasks.iter());
        assert_eq!(contenders, vec![tid("early"), tid("late"), tid("low")]);
    }

    #[test]
    fn completed_requesters_are_not_contenders() {
        let pool = pool_with("kit", 1);
        let mut done = Task::new(tid("done"), "Done", Utc::now()).requires(rid("kit"), 1);
        done.start();
        done.complete();

        assert!(pool.contenders_for(&rid("kit"), [&done]).is_empty());
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let plain = Resource::new(rid("kit"), 1);
        assert_eq!(plain.display_name(), "kit");

        let named = plain.with_name("Calibration Kit").with_kind(ResourceKind::Device);
        assert_eq!(named.display_name(), "Calibration Kit");
        assert_eq!("consumable".parse::<ResourceKind>(), Ok(ResourceKind::Consumable));
    }
}
