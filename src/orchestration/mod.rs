//! Orchestration layer for conductor.
//!
//! Routes a command through agent selection, task graph construction,
//! batched execution, result aggregation and optional synthesis.
//! Collaborators that talk to the outside world (classifier, planner,
//! context provider, agent endpoints, synthesizer) sit behind traits so
//! the core can be driven in-process.

mod aggregator;
mod context;
mod executor;
mod graph;
mod llm;
mod orchestrator;
mod planner;
mod scheduler;
mod selector;
mod synthesizer;

pub use aggregator::{
    AgentCounts, FailureReason, OrchestrationResult, ResultAggregator, RunInfo, SelectedAgent,
    SuccessPolicy, TaskOutcome,
};
pub use context::{ContextBundle, ContextProvider, ContextQuery, HttpContextProvider, SemanticContext};
pub use executor::{AgentContext, AgentExecutor, AgentRequest, AgentResponse, HttpAgentExecutor};
pub use graph::TaskGraphBuilder;
pub use llm::{strip_code_fence, ChatClient};
pub use orchestrator::{Command, OrchestrateOptions, Orchestrator};
pub use planner::{ChatPlanner, Plan, PlanStep, Planner};
pub use scheduler::{
    DispatchContext, Scheduler, SchedulerConfig, SchedulerEvent, SchedulerReport, CANCELLED_REASON,
};
pub use selector::{
    AgentSelector, Classification, Classifier, KeywordRule, KeywordTable, LlmClassifier,
    SelectionContext,
};
pub use synthesizer::{ChatSynthesizer, Synthesis, Synthesizer};
