//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! Nodes are tasks and an edge `a -> b` means `b` depends on `a`. Every
//! edge insertion is cycle-checked, so a constructed `TaskDAG` is always
//! acyclic and every dependency refers to a task in the same graph.
//! Node insertion order is the task submission order.

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why one task depends on another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DependencyType {
    /// Chained non-parallel agents, in selection order.
    Sequential,
    /// Declared by a planner step.
    Planned,
}

impl Default for DependencyType {
    fn default() -> Self {
        Self::Sequential
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Sequential => write!(f, "sequential"),
            DependencyType::Planned => write!(f, "planned"),
        }
    }
}

/// The task dependency graph for one orchestration run.
pub struct TaskDAG {
    graph: DiGraph<Task, DependencyType>,
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Build a DAG from tasks whose `dependencies` sets are already filled.
    ///
    /// All tasks are inserted first so dependencies may point forward in
    /// the list. Fails on duplicate ids, unknown dependencies or cycles.
    pub fn from_tasks(tasks: Vec<Task>, dep_type: DependencyType) -> Result<Self> {
        let mut dag = Self::new();
        let mut edges = Vec::new();
        for task in tasks {
            for dep in &task.dependencies {
                edges.push((dep.clone(), task.id.clone()));
            }
            dag.add_task(task)?;
        }
        for (from, to) in edges {
            dag.add_dependency(&from, &to, dep_type.clone())?;
        }
        Ok(dag)
    }

    /// Add a task to the DAG.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateTask`] if a task with the same id exists.
    pub fn add_task(&mut self, task: Task) -> Result<NodeIndex> {
        if self.task_index.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id.to_string()));
        }
        let id = task.id.clone();
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        Ok(index)
    }

    /// Record that `to` depends on `from`.
    ///
    /// The edge is inserted tentatively and removed again if it closes a
    /// cycle. The dependent's `dependencies` set is kept in sync.
    ///
    /// # Errors
    /// - [`Error::UnknownDependency`] if either task is missing
    /// - [`Error::GraphCycle`] if the edge would create a cycle
    pub fn add_dependency(
        &mut self,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<()> {
        let to_index = *self.task_index.get(to).ok_or_else(|| Error::UnknownDependency {
            task: to.to_string(),
            dependency: to.to_string(),
        })?;
        let from_index = *self.task_index.get(from).ok_or_else(|| Error::UnknownDependency {
            task: to.to_string(),
            dependency: from.to_string(),
        })?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(());
        }

        let edge = self.graph.add_edge(from_index, to_index, dep_type);
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::GraphCycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if let Some(task) = self.graph.node_weight_mut(to_index) {
            task.dependencies.insert(from.clone());
        }
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let index = *self.task_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    /// Mutable access that reports a missing task as an error.
    pub fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        self.get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        match (self.task_index.get(from), self.task_index.get(to)) {
            (Some(&from_idx), Some(&to_idx)) => self.graph.find_edge(from_idx, to_idx).is_some(),
            _ => false,
        }
    }

    pub fn get_dependency(&self, from: &TaskId, to: &TaskId) -> Option<&DependencyType> {
        let from_idx = self.task_index.get(from)?;
        let to_idx = self.task_index.get(to)?;
        let edge = self.graph.find_edge(*from_idx, *to_idx)?;
        self.graph.edge_weight(edge)
    }

    /// Tasks the given task depends on (predecessors).
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that depend on the given task (successors).
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&Task> {
        match self.task_index.get(id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, direction)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All tasks in submission order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// All task ids in submission order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.graph.node_weights().map(|t| t.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    pub fn graph(&self) -> &DiGraph<Task, DependencyType> {
        &self.graph
    }

    // ========== Scheduling Operations ==========

    /// The next batch: pending tasks whose dependencies all completed.
    ///
    /// Returned in submission order.
    pub fn ready_batch(&self) -> Vec<TaskId> {
        self.graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;
                if !task.can_start() {
                    return None;
                }
                let deps_completed = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .all(|dep| {
                        self.graph
                            .node_weight(dep)
                            .map(|d| d.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    });
                deps_completed.then(|| task.id.clone())
            })
            .collect()
    }

    /// The first dependency of `id` that ended without completing.
    pub fn blocking_dependency(&self, id: &TaskId) -> Option<&Task> {
        let mut deps = self.get_dependencies(id);
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        deps.into_iter().find(|d| d.status.blocks_dependents())
    }

    /// Skip every pending task that has a failed, cancelled or skipped
    /// prerequisite. Walks in topological order so skips cascade in one
    /// pass. Returns the skipped ids with their reasons.
    pub fn propagate_skips(&mut self) -> Result<Vec<(TaskId, String)>> {
        let mut skipped = Vec::new();
        for id in self.topological_ids()? {
            let pending = self.get_task(&id).map(Task::can_start).unwrap_or(false);
            if !pending {
                continue;
            }
            let reason = match self.blocking_dependency(&id) {
                Some(dep) => format!("dependency {} {}", dep.id, dep.status.name()),
                None => continue,
            };
            self.task_mut(&id)?.skip(&reason)?;
            skipped.push((id, reason));
        }
        Ok(skipped)
    }

    /// Cancel every task that is still pending.
    pub fn cancel_pending(&mut self, reason: &str) -> Vec<TaskId> {
        let mut cancelled = Vec::new();
        for task in self.graph.node_weights_mut() {
            if task.can_start() && task.cancel(reason).is_ok() {
                cancelled.push(task.id.clone());
            }
        }
        cancelled
    }

    /// Whether any task is still pending or running.
    pub fn has_unfinished(&self) -> bool {
        self.graph.node_weights().any(|t| !t.is_terminal())
    }

    /// Tasks in an order where each comes after all of its dependencies.
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle (cannot happen
    /// through `add_dependency`).
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        let sorted = self.sorted_indices()?;
        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }

    fn topological_ids(&self) -> Result<Vec<TaskId>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|t| t.id.clone())
            .collect())
    }

    fn sorted_indices(&self) -> Result<Vec<NodeIndex>> {
        toposort(&self.graph, None).map_err(|cycle| {
            let id = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.id.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Error::GraphCycle {
                from: id.clone(),
                to: id,
            }
        })
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
