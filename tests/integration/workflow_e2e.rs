//! End-to-end orchestration tests.
//!
//! These tests verify the full path from command text to aggregated
//! result: selection, optional planning, graph construction, execution
//! and aggregation.

use std::sync::Arc;

use serde_json::json;

use conductor::agent::AgentType;
use conductor::core::TaskStatus;
use conductor::orchestration::{
    AgentSelector, ContextBundle, FailureReason, OrchestrateOptions, Orchestrator, Plan, PlanStep,
    SemanticContext, SuccessPolicy,
};

use crate::fixtures::{
    candidate, chain_plan, fast_settings, orchestrator, Reply, ScriptedClassifier,
    ScriptedExecutor, StaticContext, StaticPlanner, StaticSynthesizer,
};

/// Test: Vietnamese content + SEO command
/// Given a classifier selecting two parallel agents
/// When both agents succeed
/// Then one batch of two tasks runs and the result is fully successful
#[tokio::test]
async fn test_content_and_seo_command_succeeds() {
    let executor = Arc::new(ScriptedExecutor::new());
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.85, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .orchestrate(
            "Tạo bài post và optimize SEO",
            OrchestrateOptions::default().with_planning(false),
        )
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.failure);
    assert_eq!(result.total_agents, 2);
    assert_eq!(result.successful_agents, 2);
    assert_eq!(result.failed_agents, 0);
    assert_eq!(result.skipped_agents, 0);
    assert_eq!(result.results[0].task_id.as_str(), "task-parallel-0");
    assert_eq!(result.results[1].task_id.as_str(), "task-parallel-1");
    assert!(result.results.iter().all(|o| o.dependencies.is_empty()));
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(result.selected_agents.len(), 2);
    assert_eq!(result.command, "Tạo bài post và optimize SEO");
}

/// Test: Same command through the keyword fallback
/// Given a classifier that errors
/// When the command is orchestrated
/// Then the keyword table selects content_creator and seo_specialist
#[tokio::test]
async fn test_keyword_fallback_end_to_end() {
    let executor = Arc::new(ScriptedExecutor::new());
    let result = orchestrator(ScriptedClassifier::failing("model unavailable"), &executor)
        .orchestrate("Tạo bài post và optimize SEO", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    let selected: Vec<AgentType> = result.selected_agents.iter().map(|a| a.agent_type).collect();
    assert_eq!(selected, vec![AgentType::SeoSpecialist, AgentType::ContentCreator]);
    assert_eq!(result.successful_agents, 2);
}

/// Test: Nothing selected
/// Given a malformed classifier answer and a command without keywords
/// When the command is orchestrated
/// Then the result reports no agents selected and nothing is dispatched
#[tokio::test]
async fn test_no_agents_selected() {
    let executor = Arc::new(ScriptedExecutor::new());
    let result = orchestrator(ScriptedClassifier::answering("I think you want a poem"), &executor)
        .orchestrate("hello there", OrchestrateOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureReason::NoAgentsSelected));
    assert_eq!(result.total_agents, 0);
    assert!(executor.calls().is_empty());
}

/// Test: Planner steps drive the graph
/// Given two selected agents and a plan chaining them
/// When the command is orchestrated
/// Then the planned order is respected and the plan is attached
#[tokio::test]
async fn test_planner_dependencies_are_used() {
    let executor = Arc::new(ScriptedExecutor::new().reply(
        "step-1",
        Reply::Succeed(json!({"post": "draft"})),
    ));
    let planner = Arc::new(StaticPlanner::new(chain_plan(&[
        ("step-1", AgentType::ContentCreator),
        ("step-2", AgentType::SeoSpecialist),
    ])));
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(planner.clone())
        .orchestrate("Write a post and optimize it", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(planner.calls(), 1);
    assert_eq!(executor.calls(), vec!["step-1", "step-2"]);
    assert_eq!(result.plan.as_ref().map(|p| p.steps.len()), Some(2));

    let request = executor.request_for("step-2").unwrap();
    assert_eq!(request.context.dependency_results["content_creator"]["step-1"]["post"], "draft");
}

/// Test: Planning gate
/// Given a single selected agent
/// When planning is enabled
/// Then the planner is never consulted
#[tokio::test]
async fn test_planner_skipped_for_single_agent() {
    let executor = Arc::new(ScriptedExecutor::new());
    let planner = Arc::new(StaticPlanner::failing());
    let classifier = ScriptedClassifier::selecting(&[candidate(AgentType::ResearchAgent, 0.9, true)]);

    let result = orchestrator(classifier, &executor)
        .with_planner(planner.clone())
        .orchestrate("research AI trends", OrchestrateOptions::default().with_planning(true))
        .await;

    assert!(result.success);
    assert_eq!(planner.calls(), 0);
    assert_eq!(result.summary, "Agent research_agent completed successfully");
    assert_eq!(result.final_result, Some(json!({"task": "task-parallel-0"})));
}

/// Test: Planner failure is not fatal
/// Given a planner that errors
/// When the command is orchestrated
/// Then the heuristic graph is used
#[tokio::test]
async fn test_planner_failure_falls_back_to_heuristic() {
    let executor = Arc::new(ScriptedExecutor::new());
    let planner = Arc::new(StaticPlanner::failing());
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::WorkflowAutomation, 0.9, false),
        candidate(AgentType::DataAnalyst, 0.8, false),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(planner.clone())
        .orchestrate("deploy workflow then report", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(planner.calls(), 1);
    assert!(result.plan.is_none());
    assert_eq!(executor.calls(), vec!["task-sequential-0", "task-sequential-1"]);
    assert_eq!(
        result.outcome("task-sequential-1").unwrap().dependencies[0].as_str(),
        "task-sequential-0"
    );
}

/// Test: Empty plan
/// Given a planner answering with zero steps for two selected agents
/// When the command is orchestrated
/// Then the heuristic graph runs both agents instead of an empty run
#[tokio::test]
async fn test_empty_plan_falls_back_to_heuristic() {
    let executor = Arc::new(ScriptedExecutor::new());
    let planner = Arc::new(StaticPlanner::new(Plan::new(vec![])));
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.85, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(planner.clone())
        .orchestrate("Tạo bài post và optimize SEO", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(planner.calls(), 1);
    assert!(result.plan.is_none());
    assert_eq!(result.total_agents, 2);
    assert_eq!(result.successful_agents, 2);
    let mut calls = executor.calls();
    calls.sort();
    assert_eq!(calls, vec!["task-parallel-0", "task-parallel-1"]);
}

/// Test: Duplicate plan step ids
/// Given a planner answering with two steps sharing an id
/// When the command is orchestrated
/// Then the plan is discarded and the heuristic graph runs
#[tokio::test]
async fn test_duplicate_step_ids_fall_back_to_heuristic() {
    let executor = Arc::new(ScriptedExecutor::new());
    let plan = Plan::new(vec![
        PlanStep::new("step-1", "write").with_agent(AgentType::ContentCreator),
        PlanStep::new("step-1", "optimize").with_agent(AgentType::SeoSpecialist),
    ]);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, false),
        candidate(AgentType::SeoSpecialist, 0.85, false),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(Arc::new(StaticPlanner::new(plan)))
        .orchestrate("write then optimize", OrchestrateOptions::default())
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.failure);
    assert!(result.plan.is_none());
    assert_eq!(executor.calls(), vec!["task-sequential-0", "task-sequential-1"]);
}

/// Test: Cyclic plan fails fast
/// Given a plan A -> B -> C -> A
/// When the command is orchestrated
/// Then the result is an invalid-graph failure with zero dispatched tasks
#[tokio::test]
async fn test_cyclic_plan_fails_before_dispatch() {
    let executor = Arc::new(ScriptedExecutor::new());
    let plan = Plan::new(vec![
        PlanStep::new("A", "a").with_agent(AgentType::ContentCreator).depends_on("C"),
        PlanStep::new("B", "b").with_agent(AgentType::SeoSpecialist).depends_on("A"),
        PlanStep::new("C", "c").with_agent(AgentType::DataAnalyst).depends_on("B"),
    ]);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
        candidate(AgentType::DataAnalyst, 0.9, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(Arc::new(StaticPlanner::new(plan)))
        .orchestrate("cyclic", OrchestrateOptions::default())
        .await;

    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(FailureReason::InvalidGraph { ref message }) if message.contains("cycle")
    ));
    assert!(result.results.is_empty());
    assert!(executor.calls().is_empty());
}

/// Test: Acyclic diamond plan is accepted
/// Given a plan where D depends on B and C, which both depend on A
/// When the command is orchestrated
/// Then all four tasks complete with B and C in the same batch
#[tokio::test]
async fn test_diamond_plan_is_accepted() {
    let executor = Arc::new(ScriptedExecutor::new());
    let plan = Plan::new(vec![
        PlanStep::new("A", "research").with_agent(AgentType::ResearchAgent),
        PlanStep::new("B", "write").with_agent(AgentType::ContentCreator).depends_on("A"),
        PlanStep::new("C", "keywords").with_agent(AgentType::SeoSpecialist).depends_on("A"),
        PlanStep::new("D", "publish")
            .with_agent(AgentType::WorkflowAutomation)
            .depends_on("B")
            .depends_on("C"),
    ]);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ResearchAgent, 0.9, true),
        candidate(AgentType::ContentCreator, 0.9, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(Arc::new(StaticPlanner::new(plan)))
        .orchestrate("research, write, optimize, publish", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.total_agents, 4);
    let calls = executor.calls();
    assert_eq!(calls[0], "A");
    assert_eq!(calls[3], "D");
    let request = executor.request_for("D").unwrap();
    assert!(request.context.dependency_results.contains_key("content_creator"));
    assert!(request.context.dependency_results.contains_key("seo_specialist"));
}

/// Test: Step without agent
/// Given a plan with more steps than candidates and no explicit agent
/// When the command is orchestrated
/// Then the graph is rejected without dispatching anything
#[tokio::test]
async fn test_unassigned_plan_step_is_rejected() {
    let executor = Arc::new(ScriptedExecutor::new());
    let plan = Plan::new(vec![
        PlanStep::new("step-1", "write"),
        PlanStep::new("step-2", "optimize"),
        PlanStep::new("step-3", "celebrate"),
    ]);
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.9, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_planner(Arc::new(StaticPlanner::new(plan)))
        .orchestrate("write and optimize", OrchestrateOptions::default())
        .await;

    assert!(matches!(result.failure, Some(FailureReason::InvalidGraph { .. })));
    assert!(executor.calls().is_empty());
}

/// Test: Context and caller ids reach agents
/// Given a context provider with a summary and business data
/// When the command is orchestrated with user and project ids
/// Then every agent request carries them
#[tokio::test]
async fn test_context_and_ids_are_forwarded() {
    let executor = Arc::new(ScriptedExecutor::new());
    let context = ContextBundle {
        semantic: SemanticContext {
            results: vec![json!({"title": "Last week's post"})],
            summary: "Audience prefers short posts".to_string(),
        },
        business: json!({"brand": "Acme"}),
    };
    let orchestrator = Orchestrator::new(AgentSelector::keyword_only(), executor.clone())
        .with_settings(fast_settings())
        .with_context_provider(Arc::new(StaticContext(context)));

    let options = OrchestrateOptions::default()
        .with_user_id("user-42")
        .with_project_id("project-7");
    let result = orchestrator.orchestrate("write a blog article", options).await;

    assert!(result.success);
    let request = executor.request_for("task-parallel-0").unwrap();
    assert_eq!(request.user_id.as_deref(), Some("user-42"));
    assert_eq!(request.project_id.as_deref(), Some("project-7"));
    assert_eq!(
        request.context.semantic_summary.as_deref(),
        Some("Audience prefers short posts")
    );
    assert_eq!(request.context.business, Some(json!({"brand": "Acme"})));
}

/// Test: Custom success policy
/// Given one failing and one succeeding agent
/// When the policy only needs one success
/// Then the run succeeds while still counting the failure
#[tokio::test]
async fn test_custom_success_policy() {
    let executor = Arc::new(ScriptedExecutor::new().always_fail("task-parallel-1", 4));
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.8, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_success_policy(SuccessPolicy::any_succeeded())
        .orchestrate("post + seo", OrchestrateOptions::default().with_planning(false))
        .await;

    assert!(result.success);
    assert_eq!(result.failed_agents, 1);
    assert!(matches!(
        result.outcome("task-parallel-1").unwrap().status,
        TaskStatus::Failed { .. }
    ));
}

/// Test: Result serializes with the documented field names
#[tokio::test]
async fn test_result_wire_format() {
    let executor = Arc::new(ScriptedExecutor::new());
    let result = orchestrator(ScriptedClassifier::failing("offline"), &executor)
        .orchestrate("seo audit", OrchestrateOptions::default())
        .await;

    let json = serde_json::to_value(&result).unwrap();
    for field in [
        "runId",
        "success",
        "totalAgents",
        "successfulAgents",
        "failedAgents",
        "skippedAgents",
        "results",
        "selectedAgents",
        "summary",
        "orchestratedAt",
    ] {
        assert!(json.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(json["results"][0]["status"]["state"], "completed");
    assert_eq!(json["results"][0]["agentType"], "seo_specialist");
}

/// Test: Result synthesis
/// Given a synthesizer and two agents that both complete
/// When the command is orchestrated
/// Then summary and finalResult come from the synthesizer
#[tokio::test]
async fn test_multiple_successes_are_synthesized() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .reply("task-parallel-0", Reply::Succeed(json!({"post": "draft"})))
            .reply("task-parallel-1", Reply::Succeed(json!({"score": 91}))),
    );
    let synthesizer = Arc::new(StaticSynthesizer::new(
        "Post written and optimized",
        json!({"post": "draft", "score": 91}),
    ));
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.85, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_synthesizer(synthesizer.clone())
        .orchestrate("Tạo bài post và optimize SEO", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert!(result.synthesized);
    assert_eq!(result.summary, "Post written and optimized");
    assert_eq!(result.final_result, Some(json!({"post": "draft", "score": 91})));
    assert_eq!(
        synthesizer.seen(),
        vec![vec!["task-parallel-0".to_string(), "task-parallel-1".to_string()]]
    );
}

/// Test: Synthesis failure is not fatal
/// Given a synthesizer that errors
/// When two agents complete
/// Then the plain aggregate summary is kept and the run still succeeds
#[tokio::test]
async fn test_synthesis_failure_keeps_aggregate() {
    let executor = Arc::new(ScriptedExecutor::new());
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.85, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_synthesizer(Arc::new(StaticSynthesizer::failing()))
        .orchestrate("Tạo bài post và optimize SEO", OrchestrateOptions::default())
        .await;

    assert!(result.success);
    assert!(!result.synthesized);
    assert_eq!(result.summary, "2/2 agents completed");
    assert_eq!(result.final_result, None);
}

/// Test: Single success skips synthesis
/// Given a synthesizer and only one completed agent
/// When the command is orchestrated
/// Then the synthesizer is not called and the lone result is final
#[tokio::test]
async fn test_single_success_is_not_synthesized() {
    let executor = Arc::new(ScriptedExecutor::new().always_fail("task-parallel-1", 4));
    let synthesizer = Arc::new(StaticSynthesizer::new("unused", json!(null)));
    let classifier = ScriptedClassifier::selecting(&[
        candidate(AgentType::ContentCreator, 0.9, true),
        candidate(AgentType::SeoSpecialist, 0.85, true),
    ]);

    let result = orchestrator(classifier, &executor)
        .with_synthesizer(synthesizer.clone())
        .orchestrate(
            "Tạo bài post và optimize SEO",
            OrchestrateOptions::default().with_max_retries(0),
        )
        .await;

    assert!(!result.synthesized);
    assert!(synthesizer.seen().is_empty());
    assert_eq!(result.final_result, Some(json!({"task": "task-parallel-0"})));
}
