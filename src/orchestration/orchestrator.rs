//! The orchestration entrypoint.
//!
//! `command → context → selection → graph → scheduler → aggregation →
//! synthesis`. The [`Orchestrator`] is built explicitly by the application
//! and owns its collaborators; nothing here is global. The cancellation
//! token is watched at every stage, not only while tasks run.

use crate::agent::{AgentCandidate, AgentType};
use crate::config::{Config, OrchestratorSettings};
use crate::core::{TaskDAG, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::aggregator::{
    FailureReason, OrchestrationResult, ResultAggregator, RunInfo, SuccessPolicy, TaskOutcome,
};
use crate::orchestration::context::{ContextBundle, ContextProvider, ContextQuery, HttpContextProvider};
use crate::orchestration::executor::{AgentExecutor, HttpAgentExecutor};
use crate::orchestration::graph::TaskGraphBuilder;
use crate::orchestration::llm::ChatClient;
use crate::orchestration::planner::{ChatPlanner, Plan, Planner};
use crate::orchestration::scheduler::{DispatchContext, Scheduler, SchedulerConfig, SchedulerEvent};
use crate::orchestration::selector::{AgentSelector, LlmClassifier, SelectionContext};
use crate::orchestration::synthesizer::{ChatSynthesizer, Synthesizer};
use crate::util::{until_cancelled, with_timeout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A submitted command. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

impl Command {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            user_id: None,
            project_id: None,
        }
    }
}

/// Per-call overrides. Unset fields fall back to the orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestrateOptions {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub use_planning: Option<bool>,
    pub max_concurrency: Option<usize>,
    /// Per-task timeout.
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub cancellation_token: Option<CancellationToken>,
    /// Restrict selection to these agent types.
    pub available_agents: Option<Vec<AgentType>>,
    /// Receives scheduler progress events.
    pub events: Option<mpsc::Sender<SchedulerEvent>>,
}

impl OrchestrateOptions {
    pub fn with_user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_project_id(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn with_planning(mut self, use_planning: bool) -> Self {
        self.use_planning = Some(use_planning);
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn with_available_agents(mut self, agents: Vec<AgentType>) -> Self {
        self.available_agents = Some(agents);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<SchedulerEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Synthesis asks for a looser answer than classification or planning.
const SYNTHESIS_TEMPERATURE: f32 = 0.5;

pub struct Orchestrator {
    selector: AgentSelector,
    executor: Arc<dyn AgentExecutor>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    planner: Option<Arc<dyn Planner>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    aggregator: ResultAggregator,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(selector: AgentSelector, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            selector,
            executor,
            context_provider: None,
            planner: None,
            synthesizer: None,
            aggregator: ResultAggregator::default(),
            settings: OrchestratorSettings::default(),
        }
    }

    /// Wire the HTTP collaborators described by `config`.
    ///
    /// Without an LLM API key the selector runs on the keyword table only
    /// and neither a planner nor a synthesizer is installed.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let settings = config.orchestrator.clone();

        let (selector, planner, synthesizer) = if config.llm.api_key().is_some() {
            let client = ChatClient::from_settings(&config.llm);
            let selector = AgentSelector::new(Arc::new(LlmClassifier::new(client.clone())));
            let planner: Arc<dyn Planner> = Arc::new(ChatPlanner::new(client.clone()));
            let synthesizer: Arc<dyn Synthesizer> =
                Arc::new(ChatSynthesizer::new(client.with_temperature(SYNTHESIS_TEMPERATURE)));
            (selector, Some(planner), Some(synthesizer))
        } else {
            warn!(
                env = %config.llm.api_key_env,
                "LLM API key not set, using keyword selection only"
            );
            (AgentSelector::keyword_only(), None, None)
        };
        let selector = selector
            .with_confidence_floor(settings.confidence_floor)
            .with_timeout(settings.classifier_timeout());

        let mut orchestrator = Self::new(
            selector,
            Arc::new(HttpAgentExecutor::new(&config.agents.base_url)),
        )
        .with_settings(settings);
        orchestrator.planner = planner;
        orchestrator.synthesizer = synthesizer;
        if let Some(base_url) = &config.context.base_url {
            orchestrator = orchestrator.with_context_provider(Arc::new(HttpContextProvider::new(base_url)));
        }
        Ok(orchestrator)
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_success_policy(mut self, policy: SuccessPolicy) -> Self {
        self.aggregator = ResultAggregator::new(policy);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one command end to end.
    ///
    /// Never fails: per-task failures, empty selections, invalid graphs
    /// and cancellation are all reported inside the returned result.
    pub async fn orchestrate(&self, command: &str, options: OrchestrateOptions) -> OrchestrationResult {
        let run = RunInfo::new(command);
        let span = info_span!("orchestrate", run_id = %run.run_id);
        self.run(run, options).instrument(span).await
    }

    async fn run(&self, mut run: RunInfo, options: OrchestrateOptions) -> OrchestrationResult {
        let cancel = options.cancellation_token.clone().unwrap_or_default();
        let command = Command {
            text: run.command.clone(),
            user_id: options.user_id.clone(),
            project_id: options.project_id.clone(),
        };
        info!(command = %crate::util::preview(&command.text, 80), "Orchestrating command");

        let Some(context) = until_cancelled(&cancel, self.retrieve_context(&command)).await else {
            return self.cancelled_before_dispatch(run, "context retrieval");
        };

        let selection = SelectionContext {
            project_id: command.project_id.clone(),
            available_agents: options.available_agents.clone(),
            business: context.as_ref().and_then(|c| c.business().cloned()),
        };
        let selecting = self.selector.select(&command.text, &selection);
        let Some(candidates) = until_cancelled(&cancel, selecting).await else {
            return self.cancelled_before_dispatch(run, "agent selection");
        };
        if candidates.is_empty() {
            warn!("{}", Error::AgentSelection);
            return self.aggregator.failed(run, FailureReason::NoAgentsSelected);
        }
        run.selected = candidates.clone();

        let use_planning = options.use_planning.unwrap_or(self.settings.use_planning);
        let plan = if use_planning && candidates.len() > 1 {
            let planning = self.create_plan(&command.text, &candidates, context.as_ref());
            match until_cancelled(&cancel, planning).await {
                Some(plan) => plan,
                None => return self.cancelled_before_dispatch(run, "planning"),
            }
        } else {
            None
        };

        let built = match &plan {
            Some(plan) => TaskGraphBuilder::from_plan(&command.text, plan, &candidates),
            None => TaskGraphBuilder::heuristic(&command.text, &candidates),
        };
        run.plan = plan;
        let dag = match built {
            Ok(dag) => dag,
            Err(e) => {
                error!(error = %e, "Task graph construction failed");
                let message = e.to_string();
                let reason = if e.is_construction_error() {
                    FailureReason::InvalidGraph { message }
                } else {
                    FailureReason::Internal { message }
                };
                return self.aggregator.failed(run, reason);
            }
        };

        let dispatch = DispatchContext {
            user_id: command.user_id.clone(),
            project_id: command.project_id.clone(),
            semantic_summary: context.as_ref().and_then(|c| c.summary().map(str::to_string)),
            business: context.as_ref().and_then(|c| c.business().cloned()),
        };
        let result = self.execute(run, dag, dispatch, cancel.clone(), options).await;
        self.synthesize(result, &cancel).await
    }

    fn cancelled_before_dispatch(&self, run: RunInfo, stage: &str) -> OrchestrationResult {
        warn!(stage, "Cancelled before any task was dispatched");
        self.aggregator.failed(run, FailureReason::Cancelled)
    }

    async fn execute(
        &self,
        run: RunInfo,
        dag: TaskDAG,
        dispatch: DispatchContext,
        cancel: CancellationToken,
        options: OrchestrateOptions,
    ) -> OrchestrationResult {
        let mut config = SchedulerConfig::from_settings(&self.settings);
        if options.max_concurrency.is_some() {
            config.max_concurrency = options.max_concurrency;
        }
        if let Some(timeout) = options.timeout {
            config.task_timeout = timeout;
        }
        if let Some(retries) = options.max_retries {
            config.max_retries = retries;
        }

        let dag = Arc::new(RwLock::new(dag));
        let mut scheduler = Scheduler::new(Arc::clone(&dag), Arc::clone(&self.executor), config)
            .with_dispatch_context(dispatch)
            .with_cancellation(cancel);
        if let Some(events) = options.events {
            scheduler = scheduler.with_events(events);
        }

        let outcome = scheduler.run().await;
        let dag = dag.read().await;
        match outcome {
            Ok(report) => {
                debug!(batches = report.batches, dispatched = report.dispatched, "Scheduler finished");
                self.aggregator.aggregate(run, &dag, report.cancelled)
            }
            Err(e) => {
                error!(error = %e, "Scheduler stopped on an inconsistent graph");
                let mut result = self.aggregator.aggregate(run, &dag, false);
                result.success = false;
                result.failure = Some(FailureReason::Internal {
                    message: e.to_string(),
                });
                result
            }
        }
    }

    async fn retrieve_context(&self, command: &Command) -> Option<ContextBundle> {
        let provider = self.context_provider.as_ref()?;
        let query = ContextQuery {
            project_id: command.project_id.clone(),
            max_results: self.settings.context_max_results,
        };
        let retrieval = provider.retrieve_enhanced_context(&command.text, &query);
        match with_timeout(self.settings.context_timeout(), retrieval).await {
            Ok(bundle) => {
                debug!(results = bundle.semantic.results.len(), "Context retrieved");
                Some(bundle)
            }
            Err(e) => {
                warn!(error = %e, "Context retrieval failed, continuing without context");
                None
            }
        }
    }

    async fn create_plan(
        &self,
        command: &str,
        candidates: &[AgentCandidate],
        context: Option<&ContextBundle>,
    ) -> Option<Plan> {
        let planner = self.planner.as_ref()?;
        let planning = planner.create_plan(command, candidates, context);
        let plan = match with_timeout(self.settings.classifier_timeout(), planning).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Planner failed, using heuristic graph");
                return None;
            }
        };
        if let Err(e) = plan.validate() {
            warn!(error = %e, "Planner returned an invalid plan, using heuristic graph");
            return None;
        }
        info!(steps = plan.steps.len(), "Using planner steps");
        Some(plan)
    }

    /// Replace summary and final result with a synthesized view when more
    /// than one agent completed. Failures keep the plain aggregate.
    async fn synthesize(
        &self,
        mut result: OrchestrationResult,
        cancel: &CancellationToken,
    ) -> OrchestrationResult {
        let Some(synthesizer) = &self.synthesizer else {
            return result;
        };
        if result.successful_agents < 2 || result.failure == Some(FailureReason::Cancelled) {
            return result;
        }

        let completed: Vec<TaskOutcome> = result
            .results
            .iter()
            .filter(|o| o.status == TaskStatus::Completed)
            .cloned()
            .collect();
        let synthesis = with_timeout(
            self.settings.classifier_timeout(),
            synthesizer.synthesize(&result.command, &completed),
        );
        let outcome = until_cancelled(cancel, synthesis).await;
        match outcome {
            Some(Ok(synthesis)) => {
                debug!(agents = completed.len(), "Using synthesized result");
                result.summary = synthesis.summary;
                result.final_result = Some(synthesis.final_result);
                result.synthesized = true;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Result synthesis failed, keeping aggregate summary");
            }
            None => {
                warn!("Cancelled during result synthesis");
                result.success = false;
                result.failure = Some(FailureReason::Cancelled);
            }
        }
        result
    }
}
