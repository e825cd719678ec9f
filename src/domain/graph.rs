//! Dependency graph for tasks
//!
//! Records which task depends on which, rejects edges that would close a
//! cycle, and remembers references to deleted tasks so that their dependents
//! stay blocked. Uses petgraph for graph storage.
//!
//! Edge direction is `dependency -> dependent`: "dependency must be completed
//! before dependent".

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::id::TaskId;
use super::task::TaskState;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// `path` lists the cycle so that each task depends on the next and the
    /// last depends on the first.
    #[error("Adding dependency would create a cycle: {task} -> {depends_on}")]
    CycleDetected {
        task: TaskId,
        depends_on: TaskId,
        path: Vec<TaskId>,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(TaskId),
}

/// A dependency graph for tasks
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: StableDiGraph<TaskId, ()>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,

    /// Dependencies naming tasks that no longer exist, per dependent
    dangling: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the graph
    pub fn add_node(&mut self, task_id: TaskId) {
        if !self.node_map.contains_key(&task_id) {
            let idx = self.graph.add_node(task_id.clone());
            self.node_map.insert(task_id, idx);
        }
    }

    /// Removes a task and every edge touching it
    ///
    /// Dependents keep a dangling reference to the removed id.
    pub fn remove_node(&mut self, task_id: &TaskId) -> bool {
        let Some(idx) = self.node_map.remove(task_id) else {
            return false;
        };

        for dependent in self.neighbors(idx, Direction::Outgoing) {
            self.dangling
                .entry(dependent)
                .or_default()
                .insert(task_id.clone());
        }
        self.dangling.remove(task_id);
        self.graph.remove_node(idx);
        true
    }

    /// Records that `task` depends on `depends_on`
    ///
    /// Fails without modifying the graph if the edge would create a cycle.
    pub fn add_edge(&mut self, task: &TaskId, depends_on: &TaskId) -> Result<(), GraphError> {
        if task == depends_on {
            return Err(GraphError::SelfDependency(task.clone()));
        }

        let task_idx = self.index_of(task)?;
        let dep_idx = self.index_of(depends_on)?;

        if self.graph.contains_edge(dep_idx, task_idx) {
            return Ok(());
        }

        // A cycle closes iff `depends_on` already (transitively) depends on `task`.
        if let Some(chain) = self.dependency_path(dep_idx, task_idx) {
            let mut path = vec![task.clone()];
            path.extend(chain.into_iter().take_while(|id| id != task));
            return Err(GraphError::CycleDetected {
                task: task.clone(),
                depends_on: depends_on.clone(),
                path,
            });
        }

        self.graph.add_edge(dep_idx, task_idx, ());
        Ok(())
    }

    /// Inserts an edge without the cycle check (bulk loading)
    ///
    /// Callers must run [`DependencyGraph::has_cycle`] afterwards.
    pub(crate) fn add_edge_unchecked(
        &mut self,
        task: &TaskId,
        depends_on: &TaskId,
    ) -> Result<(), GraphError> {
        let task_idx = self.index_of(task)?;
        let dep_idx = self.index_of(depends_on)?;
        if !self.graph.contains_edge(dep_idx, task_idx) {
            self.graph.add_edge(dep_idx, task_idx, ());
        }
        Ok(())
    }

    /// Records a dependency on a task id that does not exist
    pub(crate) fn add_dangling(&mut self, task: &TaskId, missing: TaskId) {
        self.dangling.entry(task.clone()).or_default().insert(missing);
    }

    /// Replaces all dependencies of `task`, all-or-nothing
    ///
    /// Ids already recorded as dangling for this task may be kept; every
    /// other id must be a node in the graph.
    pub fn set_dependencies(
        &mut self,
        task: &TaskId,
        deps: &BTreeSet<TaskId>,
    ) -> Result<(), GraphError> {
        let task_idx = self.index_of(task)?;
        let previous = self.dependencies(task);

        self.clear_incoming(task_idx);

        let kept_dangling: BTreeSet<TaskId> = self
            .dangling
            .get(task)
            .map(|d| d.intersection(deps).cloned().collect())
            .unwrap_or_default();

        for dep in deps.iter().filter(|d| !kept_dangling.contains(*d)) {
            if let Err(err) = self.add_edge(task, dep) {
                self.clear_incoming(task_idx);
                for prev in &previous {
                    if let Some(&prev_idx) = self.node_map.get(prev) {
                        self.graph.add_edge(prev_idx, task_idx, ());
                    }
                }
                return Err(err);
            }
        }

        if kept_dangling.is_empty() {
            self.dangling.remove(task);
        } else {
            self.dangling.insert(task.clone(), kept_dangling);
        }
        Ok(())
    }

    /// Direct dependencies of `task` that are not yet completed
    ///
    /// Dependencies on deleted tasks are always unmet. Only direct edges are
    /// considered.
    pub fn unmet_dependencies<F>(&self, task: &TaskId, status_of: F) -> Vec<TaskId>
    where
        F: Fn(&TaskId) -> Option<TaskState>,
    {
        let mut unmet: BTreeSet<TaskId> = self
            .dependencies(task)
            .into_iter()
            .filter(|dep| !status_of(dep).map(|s| s.is_complete()).unwrap_or(false))
            .collect();

        if let Some(missing) = self.dangling.get(task) {
            unmet.extend(missing.iter().cloned());
        }
        unmet.into_iter().collect()
    }

    /// Full-graph cycle check
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Returns one cycle, ordered so each task depends on the next
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .collect();

        // Deterministic choice: the component holding the smallest id
        components.sort_by_key(|scc| scc.iter().map(|idx| self.graph[*idx].clone()).min());
        let component = components.into_iter().next()?;
        let members: HashSet<NodeIndex> = component.iter().copied().collect();

        let start = component
            .iter()
            .copied()
            .min_by_key(|idx| self.graph[*idx].clone())?;

        // Step to a dependency inside the component, then walk back to start.
        let next = self
            .sorted_neighbors(start, Direction::Incoming)
            .into_iter()
            .find(|idx| members.contains(idx))?;

        let chain = self.dependency_path(next, start)?;
        let start_id = &self.graph[start];
        let mut cycle = vec![start_id.clone()];
        cycle.extend(chain.into_iter().take_while(|id| id != start_id));
        Some(cycle)
    }

    /// Returns the direct dependencies of a task, sorted
    pub fn dependencies(&self, task_id: &TaskId) -> Vec<TaskId> {
        match self.node_map.get(task_id) {
            Some(idx) => self.neighbors(*idx, Direction::Incoming),
            None => vec![],
        }
    }

    /// Returns the direct dependents of a task (tasks that depend on it), sorted
    pub fn dependents(&self, task_id: &TaskId) -> Vec<TaskId> {
        match self.node_map.get(task_id) {
            Some(idx) => self.neighbors(*idx, Direction::Outgoing),
            None => vec![],
        }
    }

    /// Every task `task_id` depends on, directly or through other tasks, sorted
    pub fn transitive_dependencies(&self, task_id: &TaskId) -> Vec<TaskId> {
        let Some(&start) = self.node_map.get(task_id) else {
            return vec![];
        };

        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut closure = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            for dep in self.graph.neighbors_directed(current, Direction::Incoming) {
                if seen.insert(dep) {
                    closure.insert(self.graph[dep].clone());
                    queue.push_back(dep);
                }
            }
        }
        closure.into_iter().collect()
    }

    /// Dependencies of `task_id` that name deleted tasks
    pub fn dangling(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.dangling
            .get(task_id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if some task still depends on the deleted `task_id`
    pub fn is_dangling_target(&self, task_id: &TaskId) -> bool {
        self.dangling.values().any(|missing| missing.contains(task_id))
    }

    /// All tasks in a dependency-respecting order
    ///
    /// Among the tasks whose dependencies are already placed, the one with the
    /// smallest `key` goes next.
    pub fn ordered_by<K, F>(&self, key: F) -> Vec<TaskId>
    where
        K: Ord,
        F: Fn(&TaskId) -> K,
    {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let deg = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, deg)
            })
            .collect();

        let mut frontier: BTreeSet<(K, TaskId, NodeIndex)> = BTreeSet::new();
        for (idx, deg) in &in_degree {
            if *deg == 0 {
                let id = self.graph[*idx].clone();
                frontier.insert((key(&id), id, *idx));
            }
        }

        let mut order = Vec::with_capacity(self.len());
        while let Some((_, id, idx)) = frontier.pop_first() {
            order.push(id);
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        let dep_id = self.graph[dependent].clone();
                        frontier.insert((key(&dep_id), dep_id, dependent));
                    }
                }
            }
        }

        order
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.node_map.contains_key(task_id)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    fn index_of(&self, task_id: &TaskId) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(task_id)
            .copied()
            .ok_or_else(|| GraphError::TaskNotFound(task_id.clone()))
    }

    fn clear_incoming(&mut self, idx: NodeIndex) {
        let edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in edges {
            self.graph.remove_edge(edge);
        }
    }

    fn sorted_neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        nodes.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        nodes.dedup();
        nodes
    }

    fn neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<TaskId> {
        self.sorted_neighbors(idx, dir)
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Shortest chain `from, .., to` in which each task depends on the next
    fn dependency_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<TaskId>> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut chain = vec![self.graph[current].clone()];
                let mut cursor = current;
                while let Some(prev) = parent.get(&cursor) {
                    chain.push(self.graph[*prev].clone());
                    cursor = *prev;
                }
                chain.reverse();
                return Some(chain);
            }
            for next in self.sorted_neighbors(current, Direction::Incoming) {
                if seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn graph_with(ids: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for s in ids {
            graph.add_node(id(s));
        }
        graph
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn add_edge() {
        let mut graph = graph_with(&["a", "b"]);

        // b depends on a
        graph.add_edge(&id("b"), &id("a")).unwrap();

        assert_eq!(graph.dependencies(&id("b")), vec![id("a")]);
        assert_eq!(graph.dependents(&id("a")), vec![id("b")]);
    }

    #[test]
    fn cycle_detection() {
        let mut graph = graph_with(&["a", "b", "c"]);

        graph.add_edge(&id("b"), &id("a")).unwrap();
        graph.add_edge(&id("c"), &id("b")).unwrap();
        let result = graph.add_edge(&id("a"), &id("c"));

        assert_eq!(
            result,
            Err(GraphError::CycleDetected {
                task: id("a"),
                depends_on: id("c"),
                path: vec![id("a"), id("c"), id("b")],
            })
        );
        assert!(!graph.has_cycle());
        assert!(graph.dependencies(&id("a")).is_empty());
    }

    #[test]
    fn self_dependency_rejected() {
        let mut graph = graph_with(&["a"]);
        let result = graph.add_edge(&id("a"), &id("a"));
        assert!(matches!(result, Err(GraphError::SelfDependency(_))));
    }

    #[test]
    fn unknown_task_returns_error() {
        let mut graph = graph_with(&["a"]);
        let result = graph.add_edge(&id("a"), &id("b"));
        assert_eq!(result, Err(GraphError::TaskNotFound(id("b"))));
    }

    #[test]
    fn unmet_dependencies_are_direct_only() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();
        graph.add_edge(&id("c"), &id("b")).unwrap();

        let mut states = HashMap::new();
        states.insert(id("a"), TaskState::Pending);
        states.insert(id("b"), TaskState::Completed);

        let lookup = |t: &TaskId| states.get(t).copied();
        assert!(graph.unmet_dependencies(&id("c"), lookup).is_empty());
        assert_eq!(graph.unmet_dependencies(&id("b"), lookup), vec![id("a")]);

        states.insert(id("b"), TaskState::InProgress);
        let lookup = |t: &TaskId| states.get(t).copied();
        assert_eq!(graph.unmet_dependencies(&id("c"), lookup), vec![id("b")]);
    }

    #[test]
    fn remove_node_leaves_dangling_reference() {
        let mut graph = graph_with(&["a", "b"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();

        assert!(graph.remove_node(&id("a")));
        assert!(!graph.contains(&id("a")));
        assert!(graph.dependencies(&id("b")).is_empty());
        assert_eq!(graph.dangling(&id("b")), vec![id("a")]);
        assert!(graph.is_dangling_target(&id("a")));

        let unmet = graph.unmet_dependencies(&id("b"), |_| Some(TaskState::Completed));
        assert_eq!(unmet, vec![id("a")]);
    }

    #[test]
    fn set_dependencies_is_atomic() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();
        graph.add_edge(&id("c"), &id("b")).unwrap();

        // a -> {c} would close a cycle; previous deps of a must survive
        let deps: BTreeSet<TaskId> = [id("c")].into_iter().collect();
        assert!(graph.set_dependencies(&id("a"), &deps).is_err());
        assert!(graph.dependencies(&id("a")).is_empty());

        let deps: BTreeSet<TaskId> = [id("a")].into_iter().collect();
        graph.set_dependencies(&id("c"), &deps).unwrap();
        assert_eq!(graph.dependencies(&id("c")), vec![id("a")]);
        assert!(graph.dependents(&id("b")).is_empty());
    }

    #[test]
    fn set_dependencies_restores_previous_edges_on_failure() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.add_edge(&id("c"), &id("a")).unwrap();
        graph.add_edge(&id("b"), &id("c")).unwrap();

        let deps: BTreeSet<TaskId> = [id("b")].into_iter().collect();
        assert!(graph.set_dependencies(&id("c"), &deps).is_err());
        assert_eq!(graph.dependencies(&id("c")), vec![id("a")]);
    }

    #[test]
    fn set_dependencies_can_drop_dangling_reference() {
        let mut graph = graph_with(&["a", "b"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();
        graph.remove_node(&id("a"));

        let keep: BTreeSet<TaskId> = [id("a")].into_iter().collect();
        graph.set_dependencies(&id("b"), &keep).unwrap();
        assert_eq!(graph.dangling(&id("b")), vec![id("a")]);

        graph.set_dependencies(&id("b"), &BTreeSet::new()).unwrap();
        assert!(graph.dangling(&id("b")).is_empty());
        assert!(!graph.is_dangling_target(&id("a")));
    }

    #[test]
    fn bulk_loaded_cycle_is_found() {
        let mut graph = graph_with(&["a", "b", "c", "d"]);
        graph.add_edge_unchecked(&id("a"), &id("b")).unwrap();
        graph.add_edge_unchecked(&id("b"), &id("c")).unwrap();
        graph.add_edge_unchecked(&id("c"), &id("a")).unwrap();
        graph.add_edge_unchecked(&id("d"), &id("a")).unwrap();

        assert!(graph.has_cycle());
        assert_eq!(graph.find_cycle(), Some(vec![id("a"), id("b"), id("c")]));
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let mut graph = graph_with(&["a", "b"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();
        assert_eq!(graph.find_cycle(), None);
    }

    #[test]
    fn ordered_by_respects_dependencies_then_key() {
        let mut graph = graph_with(&["a", "b", "c", "d"]);
        // c depends on d; d sorts last by key but must still precede c
        graph.add_edge(&id("c"), &id("d")).unwrap();

        let rank = |t: &TaskId| match t.as_str() {
            "a" => 2,
            "b" => 1,
            "c" => 0,
            _ => 9,
        };
        let order = graph.ordered_by(rank);

        assert_eq!(order, vec![id("b"), id("a"), id("d"), id("c")]);
    }

    #[test]
    fn transitive_dependencies_follow_chains() {
        let mut graph = graph_with(&["a", "b", "c", "d"]);
        graph.add_edge(&id("b"), &id("a")).unwrap();
        graph.add_edge(&id("c"), &id("b")).unwrap();
        graph.add_edge(&id("c"), &id("d")).unwrap();

        assert_eq!(
            graph.transitive_dependencies(&id("c")),
            vec![id("a"), id("b"), id("d")]
        );
        assert!(graph.transitive_dependencies(&id("a")).is_empty());
        assert!(graph.transitive_dependencies(&id("ghost")).is_empty());
    }

    #[test]
    fn performance_500_tasks() {
        use std::time::Instant;

        let mut graph = DependencyGraph::new();
        let ids: Vec<_> = (1..=500).map(|i| id(&format!("task-{i:03}"))).collect();
        for task in &ids {
            graph.add_node(task.clone());
        }
        for i in 1..500 {
            graph.add_edge(&ids[i], &ids[i - 1]).unwrap();
        }

        let start = Instant::now();
        let order = graph.ordered_by(|t| t.clone());
        let duration = start.elapsed();

        assert_eq!(order.len(), 500);
        assert!(duration.as_millis() < 50, "Ordering took {:?}", duration);
    }
}
