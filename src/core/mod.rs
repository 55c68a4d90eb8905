//! Core domain models for orchestration runs.
//!
//! Tasks and the dependency DAG that the scheduler executes.

pub mod dag;
pub mod task;

pub use dag::{DependencyType, TaskDAG};
pub use task::{Task, TaskId, TaskPriority, TaskStatus};
