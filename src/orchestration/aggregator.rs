//! Result aggregation.
//!
//! Folds the finished task graph into one immutable
//! [`OrchestrationResult`]. Outcomes are listed in task submission order
//! regardless of completion order, so identical runs serialize
//! identically apart from ids and timestamps.

use crate::agent::{AgentCandidate, AgentType};
use crate::core::{Task, TaskDAG, TaskId, TaskStatus};
use crate::orchestration::planner::Plan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Per-status task counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl AgentCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            counts.total += 1;
            match task.status {
                TaskStatus::Completed => counts.successful += 1,
                TaskStatus::Failed { .. } => counts.failed += 1,
                TaskStatus::Skipped { .. } => counts.skipped += 1,
                TaskStatus::Cancelled { .. } => counts.cancelled += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
        counts
    }
}

/// Decides whether a finished run counts as a success.
#[derive(Clone)]
pub struct SuccessPolicy(Arc<dyn Fn(&AgentCounts) -> bool + Send + Sync>);

impl SuccessPolicy {
    pub fn new(predicate: impl Fn(&AgentCounts) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// No task failed and none was skipped.
    pub fn all_succeeded() -> Self {
        Self::new(|c| c.failed == 0 && c.skipped == 0)
    }

    /// At least one task completed.
    pub fn any_succeeded() -> Self {
        Self::new(|c| c.successful > 0)
    }

    pub fn evaluate(&self, counts: &AgentCounts) -> bool {
        (self.0)(counts)
    }
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        Self::all_succeeded()
    }
}

impl std::fmt::Debug for SuccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SuccessPolicy(..)")
    }
}

/// Why a run is not a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum FailureReason {
    /// Neither the classifier nor the fallback produced an agent.
    NoAgentsSelected,
    /// The task graph could not be built; nothing was dispatched.
    InvalidGraph { message: String },
    /// The cancellation token fired before the run finished.
    Cancelled,
    /// The success policy rejected the task outcomes.
    TaskFailures,
    /// The scheduler hit an inconsistent graph state.
    Internal { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoAgentsSelected => write!(f, "no agents selected"),
            FailureReason::InvalidGraph { message } => write!(f, "invalid task graph: {}", message),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::TaskFailures => write!(f, "task failures"),
            FailureReason::Internal { message } => write!(f, "internal error: {}", message),
        }
    }
}

/// One task's final state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub agent_type: AgentType,
    pub command_fragment: String,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub retry_count: u32,
    pub dependencies: Vec<TaskId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskOutcome {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            command_fragment: task.command_fragment.clone(),
            status: task.status.clone(),
            result: task.result.clone(),
            retry_count: task.retry_count,
            dependencies: task.dependencies.iter().cloned().collect(),
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAgent {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub confidence: f64,
    pub reason: String,
}

impl From<&AgentCandidate> for SelectedAgent {
    fn from(candidate: &AgentCandidate) -> Self {
        Self {
            agent_type: candidate.agent_type,
            confidence: candidate.confidence,
            reason: candidate.reason.clone(),
        }
    }
}

/// The single outcome of one `orchestrate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub command: String,
    pub success: bool,
    pub total_agents: usize,
    pub successful_agents: usize,
    pub failed_agents: usize,
    pub skipped_agents: usize,
    pub cancelled_agents: usize,
    /// Per-task outcomes in submission order.
    pub results: Vec<TaskOutcome>,
    pub selected_agents: Vec<SelectedAgent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Result of the only successful task when exactly one succeeded, or
    /// the synthesized result when several did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
    pub summary: String,
    /// Set when `summary` and `final_result` came from a synthesizer.
    #[serde(default)]
    pub synthesized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub orchestrated_at: DateTime<Utc>,
}

impl OrchestrationResult {
    pub fn counts(&self) -> AgentCounts {
        AgentCounts {
            total: self.total_agents,
            successful: self.successful_agents,
            failed: self.failed_agents,
            skipped: self.skipped_agents,
            cancelled: self.cancelled_agents,
        }
    }

    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.results.iter().find(|o| o.task_id.as_str() == task_id)
    }
}

/// Identity of the run being aggregated.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub command: String,
    pub selected: Vec<AgentCandidate>,
    pub plan: Option<Plan>,
}

impl RunInfo {
    pub fn new(command: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.to_string(),
            selected: Vec::new(),
            plan: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    policy: SuccessPolicy,
}

impl ResultAggregator {
    pub fn new(policy: SuccessPolicy) -> Self {
        Self { policy }
    }

    /// Aggregate a run whose graph was executed.
    ///
    /// A cancelled run is never a success, whatever the policy says.
    pub fn aggregate(&self, run: RunInfo, dag: &TaskDAG, cancelled: bool) -> OrchestrationResult {
        let tasks = dag.tasks();
        let counts = AgentCounts::from_tasks(tasks.iter().copied());
        let results: Vec<TaskOutcome> = tasks.iter().map(|t| TaskOutcome::from(*t)).collect();

        let failure = if cancelled {
            Some(FailureReason::Cancelled)
        } else if self.policy.evaluate(&counts) {
            None
        } else {
            Some(FailureReason::TaskFailures)
        };

        let mut completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed);
        let final_result = match (completed.next(), completed.next()) {
            (Some(only), None) => only.result.clone(),
            _ => None,
        };

        let summary = summarize(&counts, &results, failure.as_ref());
        build(run, counts, results, final_result, summary, failure)
    }

    /// Result for a run that never reached the scheduler.
    pub fn failed(&self, run: RunInfo, reason: FailureReason) -> OrchestrationResult {
        let summary = format!("Orchestration failed: {}", reason);
        build(
            run,
            AgentCounts::default(),
            Vec::new(),
            None,
            summary,
            Some(reason),
        )
    }
}

fn build(
    run: RunInfo,
    counts: AgentCounts,
    results: Vec<TaskOutcome>,
    final_result: Option<Value>,
    summary: String,
    failure: Option<FailureReason>,
) -> OrchestrationResult {
    OrchestrationResult {
        run_id: run.run_id,
        command: run.command,
        success: failure.is_none(),
        total_agents: counts.total,
        successful_agents: counts.successful,
        failed_agents: counts.failed,
        skipped_agents: counts.skipped,
        cancelled_agents: counts.cancelled,
        results,
        selected_agents: run.selected.iter().map(SelectedAgent::from).collect(),
        plan: run.plan,
        final_result,
        summary,
        synthesized: false,
        failure,
        orchestrated_at: Utc::now(),
    }
}

fn summarize(counts: &AgentCounts, results: &[TaskOutcome], failure: Option<&FailureReason>) -> String {
    if counts.successful == 1 && counts.total == 1 {
        if let Some(only) = results.first() {
            return format!("Agent {} completed successfully", only.agent_type);
        }
    }

    let mut summary = format!(
        "{}/{} agents completed",
        counts.successful, counts.total
    );
    for (count, label) in [
        (counts.failed, "failed"),
        (counts.skipped, "skipped"),
        (counts.cancelled, "cancelled"),
    ] {
        if count > 0 {
            summary.push_str(&format!(", {} {}", count, label));
        }
    }
    if matches!(failure, Some(FailureReason::Cancelled)) {
        summary.push_str(" (cancelled)");
    }
    summary
}
