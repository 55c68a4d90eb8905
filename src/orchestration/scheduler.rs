//! Scheduler for batched task execution.
//!
//! The Scheduler drives a [`TaskDAG`] to completion by repeated
//! topological batching: compute the pending tasks whose dependencies all
//! completed, run them concurrently (bounded by `max_concurrency`), wait
//! for the whole batch, and repeat. Each task gets its own timeout and
//! retry budget. Tasks behind a failed, skipped or cancelled dependency are
//! skipped without being dispatched.
//!
//! Status transitions happen under the DAG write lock and go through the
//! guarded [`Task`](crate::core::Task) methods, so a task is dispatched at
//! most once and its terminal state is written exactly once.

use crate::agent::AgentType;
use crate::config::OrchestratorSettings;
use crate::core::{TaskDAG, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::executor::{AgentContext, AgentExecutor, AgentRequest};
use crate::util::{backoff_delay, with_timeout};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reason recorded on tasks aborted by the cancellation token.
pub const CANCELLED_REASON: &str = "orchestration cancelled";

/// Events emitted by the scheduler for task lifecycle changes.
///
/// These let callers report progress without threading callbacks through
/// the call chain. Sends await channel capacity, so receivers must keep
/// draining while the scheduler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A batch of ready tasks is about to run.
    BatchStarted {
        /// 1-based batch number.
        batch: usize,
        tasks: Vec<TaskId>,
    },
    /// A task was dispatched to its agent.
    TaskStarted {
        task_id: TaskId,
        agent_type: AgentType,
    },
    /// An attempt failed and the task will be retried.
    TaskRetrying {
        task_id: TaskId,
        /// Retry number, starting at 1.
        retry: u32,
        error: String,
    },
    TaskCompleted {
        task_id: TaskId,
    },
    /// Every attempt failed.
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    /// Never dispatched because a dependency did not complete.
    TaskSkipped {
        task_id: TaskId,
        reason: String,
    },
    TaskCancelled {
        task_id: TaskId,
    },
    /// No task is left to run.
    AllTasksComplete,
}

/// Execution limits for one scheduler run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound on tasks in flight within a batch. `None` is unbounded.
    pub max_concurrency: Option<usize>,
    pub task_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_backoff: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency,
            task_timeout: settings.task_timeout(),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay(),
            max_backoff: settings.max_backoff(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&OrchestratorSettings::default())
    }
}

/// Request fields shared by every task in a run.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub semantic_summary: Option<String>,
    pub business: Option<Value>,
}

/// Summary of a finished run. Task outcomes stay in the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerReport {
    pub batches: usize,
    /// Tasks handed to the executor at least once.
    pub dispatched: usize,
    /// Whether the cancellation token cut the run short.
    pub cancelled: bool,
}

enum Outcome {
    Completed(Option<Value>),
    Failed(String),
    Cancelled,
}

/// Batch scheduler over a shared task graph.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tokio::sync::RwLock;
/// use conductor::orchestration::{HttpAgentExecutor, Scheduler, SchedulerConfig};
///
/// let dag = Arc::new(RwLock::new(dag));
/// let executor = Arc::new(HttpAgentExecutor::new("http://localhost:3001"));
/// let report = Scheduler::new(dag.clone(), executor, SchedulerConfig::default())
///     .run()
///     .await?;
/// ```
pub struct Scheduler {
    dag: Arc<RwLock<TaskDAG>>,
    executor: Arc<dyn AgentExecutor>,
    config: SchedulerConfig,
    dispatch: DispatchContext,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new(
        dag: Arc<RwLock<TaskDAG>>,
        executor: Arc<dyn AgentExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            dag,
            executor,
            config,
            dispatch: DispatchContext::default(),
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    pub fn with_dispatch_context(mut self, dispatch: DispatchContext) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn dag(&self) -> Arc<RwLock<TaskDAG>> {
        Arc::clone(&self.dag)
    }

    /// Run batches until no task can make progress.
    ///
    /// Per-task failures never make this fail; they end up in the task's
    /// status. An `Err` means the graph itself was inconsistent.
    pub async fn run(&self) -> Result<SchedulerReport> {
        let semaphore = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut report = SchedulerReport::default();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let skipped = self.dag.write().await.propagate_skips()?;
            for (task_id, reason) in skipped {
                info!(task_id = %task_id, reason = %reason, "Task skipped");
                self.emit(SchedulerEvent::TaskSkipped { task_id, reason }).await;
            }

            let batch = self.dag.read().await.ready_batch();
            if batch.is_empty() {
                break;
            }

            report.batches += 1;
            debug!(batch = report.batches, size = batch.len(), "Starting batch");
            self.emit(SchedulerEvent::BatchStarted {
                batch: report.batches,
                tasks: batch.clone(),
            })
            .await;

            let results = join_all(
                batch
                    .into_iter()
                    .map(|task_id| self.run_task(task_id, semaphore.clone())),
            )
            .await;
            for dispatched in results {
                if dispatched? {
                    report.dispatched += 1;
                }
            }
        }

        if self.cancel.is_cancelled() {
            let cancelled = self.dag.write().await.cancel_pending(CANCELLED_REASON);
            for task_id in cancelled {
                self.emit(SchedulerEvent::TaskCancelled { task_id }).await;
            }
            report.cancelled = self.dag.read().await.tasks().iter().any(|t| {
                matches!(t.status, TaskStatus::Cancelled { .. })
            });
        }

        if report.cancelled {
            warn!(batches = report.batches, "Run cancelled");
        } else {
            info!(batches = report.batches, dispatched = report.dispatched, "All tasks complete");
            self.emit(SchedulerEvent::AllTasksComplete).await;
        }
        Ok(report)
    }

    /// Run one task of the current batch. Returns whether it was
    /// dispatched; a task still waiting for a slot when cancellation fires
    /// stays pending and is cancelled after the barrier.
    async fn run_task(&self, task_id: TaskId, semaphore: Option<Arc<Semaphore>>) -> Result<bool> {
        let _permit: Option<OwnedSemaphorePermit> = match semaphore {
            Some(semaphore) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(false),
                permit = semaphore.acquire_owned() => {
                    Some(permit.map_err(|_| Error::Cancelled)?)
                }
            },
            None => None,
        };

        let request = {
            let mut dag = self.dag.write().await;
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            dag.task_mut(&task_id)?.start()?;
            self.build_request(&dag, &task_id)?
        };

        info!(task_id = %task_id, agent = %request.agent_type, "Task started");
        self.emit(SchedulerEvent::TaskStarted {
            task_id: task_id.clone(),
            agent_type: request.agent_type,
        })
        .await;

        let outcome = self.execute_with_retries(&request).await?;

        let mut dag = self.dag.write().await;
        let task = dag.task_mut(&task_id)?;
        let event = match outcome {
            Outcome::Completed(result) => {
                task.complete(result)?;
                info!(task_id = %task_id, retries = task.retry_count, "Task completed");
                SchedulerEvent::TaskCompleted {
                    task_id: task_id.clone(),
                }
            }
            Outcome::Failed(error) => {
                task.fail(&error)?;
                warn!(task_id = %task_id, error = %error, "Task failed");
                SchedulerEvent::TaskFailed {
                    task_id: task_id.clone(),
                    error,
                }
            }
            Outcome::Cancelled => {
                task.cancel(CANCELLED_REASON)?;
                info!(task_id = %task_id, "Task cancelled");
                SchedulerEvent::TaskCancelled {
                    task_id: task_id.clone(),
                }
            }
        };
        drop(dag);
        self.emit(event).await;
        Ok(true)
    }

    async fn execute_with_retries(&self, request: &AgentRequest) -> Result<Outcome> {
        let mut retries = 0u32;
        loop {
            let attempt = with_timeout(self.config.task_timeout, async {
                self.executor.execute(request).await?.into_result()
            });
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
                result = attempt => result,
            };

            let error = match result {
                Ok(value) => return Ok(Outcome::Completed(value)),
                Err(e) => e.to_string(),
            };
            if retries >= self.config.max_retries {
                return Ok(Outcome::Failed(error));
            }

            retries = self
                .dag
                .write()
                .await
                .task_mut(&request.task_id)?
                .record_retry()?;
            warn!(
                task_id = %request.task_id,
                retry = retries,
                error = %error,
                "Task attempt failed, retrying"
            );
            self.emit(SchedulerEvent::TaskRetrying {
                task_id: request.task_id.clone(),
                retry: retries,
                error,
            })
            .await;

            let delay = backoff_delay(self.config.retry_base_delay, retries, self.config.max_backoff);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn build_request(&self, dag: &TaskDAG, task_id: &TaskId) -> Result<AgentRequest> {
        let task = dag
            .get_task(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let mut context = AgentContext {
            semantic_summary: self.dispatch.semantic_summary.clone(),
            business: self.dispatch.business.clone(),
            ..Default::default()
        };
        for dep in dag.get_dependencies(task_id) {
            if dep.status == TaskStatus::Completed {
                context
                    .dependency_results
                    .entry(dep.agent_type.to_string())
                    .or_default()
                    .insert(dep.id.to_string(), dep.result.clone().unwrap_or(Value::Null));
            }
        }

        Ok(AgentRequest {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            command: task.command_fragment.clone(),
            role: task.role.clone(),
            context,
            user_id: self.dispatch.user_id.clone(),
            project_id: self.dispatch.project_id.clone(),
        })
    }

    async fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
