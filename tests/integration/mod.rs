//! Integration test suite for conductor.
//!
//! These tests drive `Orchestrator::orchestrate` end to end with
//! in-process collaborators, and the HTTP collaborators against local
//! mock servers.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Full command-to-result runs, planning and graph errors
//! - `parallel_agents`: Batching, ordering and concurrency bounds
//! - `recovery`: Retries, timeouts, skip propagation and cancellation
//! - `http_collaborators`: Classifier, planner, context and agent endpoints over HTTP
//! - `performance`: Large fan-out graphs
//!
//! # CI Compatibility
//!
//! No test reaches a real LLM or agent endpoint, making them safe to run
//! in CI environments.


mod workflow_e2e;
mod parallel_agents;
mod performance;
