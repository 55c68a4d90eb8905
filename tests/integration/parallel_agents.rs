//! Parallel execution correctness tests.
//!
//! These tests verify batching, result ordering and the concurrency
//! bound when several agents run for one command.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use conductor::agent::AgentType;
use conductor::orchestration::{OrchestrateOptions, SchedulerEvent};

use crate::fixtures::{candidate, orchestrator, ScriptedClassifier, ScriptedExecutor};

fn drain(rx: &mut mpsc::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Test: Results follow submission order
/// Given tasks submitted as [X, Y]
/// When Y finishes before X
/// Then results are still listed [X, Y]
#[tokio::test(start_paused = true)]
async fn test_results_keep_submission_order() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .delay("task-parallel-0", Duration::from_millis(500))
            .delay("task-parallel-1", Duration::from_millis(50)),
    );
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.8, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .orchestrate("post + seo", OrchestrateOptions::default().with_planning(false))
        .await;

    assert_eq!(executor.completion_order(), vec!["task-parallel-1", "task-parallel-0"]);
    let ids: Vec<&str> = result.results.iter().map(|o| o.task_id.as_str()).collect();
    assert_eq!(ids, vec!["task-parallel-0", "task-parallel-1"]);
    assert!(result.success);
}

/// Test: Independent agents share one batch
/// Given three parallel candidates
/// When the command is orchestrated
/// Then exactly one batch containing all three starts
#[tokio::test]
async fn test_parallel_candidates_run_in_one_batch() {
    let executor = Arc::new(ScriptedExecutor::new());
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
        candidate(AgentType::ResearchAgent, 0.9, true),
    ]);
    let (tx, mut rx) = mpsc::channel(64);

    let result = orchestrator(classifier, &executor)
        .orchestrate(
            "research, write and optimize",
            OrchestrateOptions::default().with_planning(false).with_events(tx),
        )
        .await;

    assert!(result.success);
    let events = drain(&mut rx);
    let batches: Vec<&Vec<_>> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::BatchStarted { tasks, .. } => Some(tasks),
            _ => None,
        })
        .collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert_eq!(events.last(), Some(&SchedulerEvent::AllTasksComplete));
}

/// Test: Sequential candidates form separate batches
/// Given two non-parallel candidates and one parallel candidate
/// When the command is orchestrated
/// Then the second sequential task waits for the first
#[tokio::test]
async fn test_sequential_candidates_are_chained() {
    let executor = Arc::new(ScriptedExecutor::new());
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::WorkflowAutomation, 0.95, false),
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::DataAnalyst, 0.85, false),
    ]);
    let (tx, mut rx) = mpsc::channel(64);

    let result = orchestrator(classifier, &executor)
        .orchestrate(
            "deploy, write, report",
            OrchestrateOptions::default().with_planning(false).with_events(tx),
        )
        .await;

    assert!(result.success);
    let batches: Vec<Vec<String>> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::BatchStarted { tasks, .. } => {
                Some(tasks.into_iter().map(|t| t.to_string()).collect())
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        batches,
        vec![
            vec!["task-sequential-0".to_string(), "task-parallel-1".to_string()],
            vec!["task-sequential-2".to_string()],
        ]
    );
}

/// Test: Concurrency bound
/// Given four parallel tasks that each take 100ms
/// When max concurrency is 2
/// Then the batch takes two rounds
#[tokio::test(start_paused = true)]
async fn test_max_concurrency_limits_batch() {
    let mut executor = ScriptedExecutor::new();
    for i in 0..4 {
        executor = executor.delay(&format!("task-parallel-{}", i), Duration::from_millis(100));
    }
    let executor = Arc::new(executor);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
        candidate(AgentType::ResearchAgent, 0.9, true),
        candidate(AgentType::DataAnalyst, 0.9, true),
    ]);

    let start = tokio::time::Instant::now();
    let result = orchestrator(classifier, &executor)
        .orchestrate(
            "everything",
            OrchestrateOptions::default()
                .with_planning(false)
                .with_max_concurrency(2),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.successful_agents, 4);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(start.elapsed() < Duration::from_millis(300));
}

/// Test: Unbounded concurrency
/// Given four parallel tasks that each take 100ms
/// When no concurrency limit is set
/// Then they all overlap
#[tokio::test(start_paused = true)]
async fn test_unbounded_batch_overlaps() {
    let mut executor = ScriptedExecutor::new();
    for i in 0..4 {
        executor = executor.delay(&format!("task-parallel-{}", i), Duration::from_millis(100));
    }
    let executor = Arc::new(executor);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
        candidate(AgentType::ResearchAgent, 0.9, true),
        candidate(AgentType::DataAnalyst, 0.9, true),
    ]);

    let start = tokio::time::Instant::now();
    let result = orchestrator(classifier, &executor)
        .orchestrate("everything", OrchestrateOptions::default().with_planning(false))
        .await;

    assert!(result.success);
    assert!(start.elapsed() < Duration::from_millis(200));
}
