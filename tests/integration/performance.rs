//! Performance tests for conductor.
//!
//! These tests verify that scheduling overhead stays small for graphs far
//! larger than a single command normally produces:
//! - Graph construction with per-edge cycle checks
//! - Batch computation and dispatch for wide fan-out
//!
//! Use `cargo test --test integration performance -- --nocapture` to see metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use conductor::agent::AgentType;
use conductor::core::{DependencyType, Task, TaskDAG, TaskStatus};
use conductor::orchestration::{Scheduler, SchedulerConfig};

use crate::fixtures::ScriptedExecutor;

const MAX_BUILD_MS: u128 = 2_000;
const MAX_RUN_MS: u128 = 2_000;

fn fast_config(max_concurrency: Option<usize>) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency,
        task_timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    }
}

/// Test: Long chain construction
/// Given 300 tasks chained one after another
/// When the DAG is built with a cycle check per edge
/// Then construction finishes within the threshold
#[test]
fn test_chain_construction_time() {
    let tasks: Vec<Task> = (0..300)
        .map(|i| {
            let mut task = Task::new(format!("t{}", i), AgentType::DataAnalyst, "step");
            if i > 0 {
                task.dependencies.insert(format!("t{}", i - 1).into());
            }
            task
        })
        .collect();

    let start = Instant::now();
    let dag = TaskDAG::from_tasks(tasks, DependencyType::Planned).unwrap();
    let elapsed = start.elapsed().as_millis();
    println!("Built 300-task chain in {}ms", elapsed);

    assert_eq!(dag.dependency_count(), 299);
    assert!(elapsed < MAX_BUILD_MS, "construction took {}ms", elapsed);
}

/// Test: Wide fan-out
/// Given one root and 200 dependents
/// When the scheduler runs with a concurrency bound of 16
/// Then all tasks complete in two batches within the threshold
#[tokio::test]
async fn test_wide_fan_out_run_time() {
    let mut tasks = vec![Task::new("root", AgentType::ResearchAgent, "root")];
    for i in 0..200 {
        let mut task = Task::new(format!("leaf-{}", i), AgentType::ContentCreator, "leaf");
        task.dependencies.insert("root".into());
        tasks.push(task);
    }
    let dag = Arc::new(RwLock::new(
        TaskDAG::from_tasks(tasks, DependencyType::Planned).unwrap(),
    ));
    let executor = Arc::new(ScriptedExecutor::new());

    let start = Instant::now();
    let report = Scheduler::new(dag.clone(), executor.clone(), fast_config(Some(16)))
        .run()
        .await
        .unwrap();
    let elapsed = start.elapsed().as_millis();
    println!("Ran 201 tasks in {} batches in {}ms", report.batches, elapsed);

    assert_eq!(report.batches, 2);
    assert_eq!(report.dispatched, 201);
    assert_eq!(executor.calls().len(), 201);
    assert!(dag
        .read()
        .await
        .tasks()
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
    assert!(elapsed < MAX_RUN_MS, "run took {}ms", elapsed);
}
