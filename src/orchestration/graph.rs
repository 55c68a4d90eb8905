//! Task graph construction.
//!
//! Turns the selected candidates, and optionally a plan, into a
//! [`TaskDAG`]. All validation happens here: a graph that builds is
//! acyclic and closed over its dependency ids, so nothing is dispatched
//! for a command whose graph is invalid.

use crate::agent::{AgentCandidate, AgentType};
use crate::core::{DependencyType, Task, TaskDAG, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::planner::Plan;
use tracing::debug;

pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    /// Build a graph without a plan.
    ///
    /// Parallel candidates get no dependencies. Non-parallel candidates
    /// are chained in selection order, each depending on the previous
    /// non-parallel task.
    pub fn heuristic(command: &str, candidates: &[AgentCandidate]) -> Result<TaskDAG> {
        let mut tasks = Vec::with_capacity(candidates.len());
        let mut previous_sequential: Option<TaskId> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let task = if candidate.can_parallel {
                task_for(format!("task-parallel-{}", index), candidate, command)
            } else {
                let mut task = task_for(format!("task-sequential-{}", index), candidate, command);
                if let Some(prev) = previous_sequential.replace(task.id.clone()) {
                    task.dependencies.insert(prev);
                }
                task
            };
            tasks.push(task);
        }

        let dag = TaskDAG::from_tasks(tasks, DependencyType::Sequential)?;
        debug!(
            tasks = dag.task_count(),
            dependencies = dag.dependency_count(),
            "Built heuristic task graph"
        );
        Ok(dag)
    }

    /// Build a graph from planner steps. Step dependencies replace the
    /// heuristic chaining entirely.
    ///
    /// # Errors
    /// - [`Error::UnassignedStep`] when a step names no agent and has no
    ///   candidate at its position
    /// - [`Error::UnknownDependency`] / [`Error::GraphCycle`] /
    ///   [`Error::DuplicateTask`] for invalid step references
    pub fn from_plan(command: &str, plan: &Plan, candidates: &[AgentCandidate]) -> Result<TaskDAG> {
        let mut tasks = Vec::with_capacity(plan.steps.len());

        for (index, step) in plan.steps.iter().enumerate() {
            let agent_type = step
                .agent
                .or_else(|| candidates.get(index).map(|c| c.agent_type))
                .ok_or_else(|| Error::UnassignedStep(step.id.clone()))?;

            let fragment = match step.fragment().trim() {
                "" => command,
                text => text,
            };
            let mut task = match find_candidate(candidates, agent_type) {
                Some(candidate) => task_for(step.id.clone(), candidate, fragment),
                None => Task::new(step.id.clone(), agent_type, fragment),
            };
            task.dependencies
                .extend(step.dependencies.iter().map(|d| TaskId::new(d.clone())));
            tasks.push(task);
        }

        let dag = TaskDAG::from_tasks(tasks, DependencyType::Planned)?;
        debug!(
            tasks = dag.task_count(),
            dependencies = dag.dependency_count(),
            "Built planned task graph"
        );
        Ok(dag)
    }
}

fn find_candidate(candidates: &[AgentCandidate], agent_type: AgentType) -> Option<&AgentCandidate> {
    candidates.iter().find(|c| c.agent_type == agent_type)
}

fn task_for(id: String, candidate: &AgentCandidate, fragment: &str) -> Task {
    Task::new(id, candidate.agent_type, fragment)
        .with_role(&candidate.role)
        .with_confidence(candidate.confidence)
}
