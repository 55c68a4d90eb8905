//! Task data model for the execution DAG.
//!
//! A task binds one selected agent to the command it must act on. It
//! tracks its status, dependencies, retries and outcome. Every status
//! change goes through a guarded transition method so a task can never
//! re-enter `running` once it reached a terminal state.

use crate::agent::AgentType;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier for a task, unique within its graph.
///
/// Heuristic graphs use `task-parallel-N` / `task-sequential-N`; planned
/// graphs reuse the planner's step ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Task status in its lifecycle.
///
/// `pending → running → {completed | failed}`, `pending → skipped`,
/// `{pending | running} → cancelled`. The last four are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Waiting for its dependencies or a free slot.
    Pending,
    /// Dispatched to its agent endpoint.
    Running,
    /// Agent reported success.
    Completed,
    /// Every attempt failed.
    Failed {
        /// Error from the last attempt.
        error: String,
    },
    /// Never dispatched because a prerequisite did not complete.
    Skipped {
        /// Which dependency caused the skip.
        reason: String,
    },
    /// Aborted by the orchestration-wide cancellation signal.
    Cancelled {
        /// Why the task was cancelled.
        reason: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Short state name without payload.
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Skipped { .. } => "skipped",
            TaskStatus::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Terminal states that block dependents from running.
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            TaskStatus::Failed { .. } | TaskStatus::Skipped { .. } | TaskStatus::Cancelled { .. }
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
            TaskStatus::Cancelled { reason } => write!(f, "cancelled: {}", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
}

impl TaskPriority {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            TaskPriority::High
        } else {
            TaskPriority::Medium
        }
    }
}

/// A single task in the execution DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub agent_type: AgentType,
    /// What the agent is expected to do for this command.
    pub role: String,
    /// The part of the command this task acts on.
    pub command_fragment: String,
    pub confidence: f64,
    pub priority: TaskPriority,
    /// Tasks that must complete before this one may run.
    pub dependencies: BTreeSet<TaskId>,
    pub status: TaskStatus,
    /// Payload returned by the agent on success.
    pub result: Option<serde_json::Value>,
    /// Number of retries after the first attempt.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(id: impl Into<TaskId>, agent_type: AgentType, command_fragment: &str) -> Self {
        Self {
            id: id.into(),
            agent_type,
            role: agent_type.info().description.to_string(),
            command_fragment: command_fragment.to_string(),
            confidence: 1.0,
            priority: TaskPriority::High,
            dependencies: BTreeSet::new(),
            status: TaskStatus::Pending,
            result: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self.priority = TaskPriority::from_confidence(confidence);
        self
    }

    fn transition_error(&self, to: &str) -> Error {
        Error::InvalidTransition {
            task: self.id.to_string(),
            from: self.status.name().to_string(),
            to: to.to_string(),
        }
    }

    /// `pending → running`. Fails for any other starting state, which is
    /// what keeps a task from being dispatched twice.
    pub fn start(&mut self) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error("running"));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running → completed`.
    pub fn complete(&mut self, result: Option<serde_json::Value>) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.transition_error("completed"));
        }
        self.status = TaskStatus::Completed;
        self.result = result;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `running → failed`.
    pub fn fail(&mut self, error: &str) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.transition_error("failed"));
        }
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `pending → skipped`.
    pub fn skip(&mut self, reason: &str) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error("skipped"));
        }
        self.status = TaskStatus::Skipped {
            reason: reason.to_string(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `{pending | running} → cancelled`.
    pub fn cancel(&mut self, reason: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(self.transition_error("cancelled"));
        }
        self.status = TaskStatus::Cancelled {
            reason: reason.to_string(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Count one more retry of a running task.
    pub fn record_retry(&mut self) -> Result<u32> {
        if self.status != TaskStatus::Running {
            return Err(self.transition_error("running"));
        }
        self.retry_count += 1;
        Ok(self.retry_count)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_start(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Error or skip/cancel reason, if the task did not complete.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { error } => Some(error),
            TaskStatus::Skipped { reason } | TaskStatus::Cancelled { reason } => Some(reason),
            _ => None,
        }
    }
}
