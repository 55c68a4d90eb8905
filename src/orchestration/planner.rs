//! Command planning.
//!
//! A [`Planner`] decomposes a command into ordered steps with explicit
//! dependencies. Planning is optional: the orchestrator only asks when
//! more than one agent was selected, and any planner error falls back to
//! the heuristic graph.

use crate::agent::{AgentCandidate, AgentType};
use crate::error::{Error, Result};
use crate::orchestration::context::ContextBundle;
use crate::orchestration::llm::{strip_code_fence, ChatClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Agent to run this step. When absent, the candidate at the same
    /// position in the selection is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentType>,
    /// Ids of steps that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
}

impl PlanStep {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            agent: None,
            dependencies: Vec::new(),
            estimated_time: None,
        }
    }

    pub fn with_agent(mut self, agent: AgentType) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }

    /// Text handed to the agent for this step.
    pub fn fragment(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_total_time: Option<String>,
    #[serde(default)]
    pub can_parallel: bool,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            estimated_total_time: None,
            can_parallel: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reject plans with no steps, blank ids or repeated ids.
    ///
    /// Dependency references and cycles are checked later, when the plan
    /// is turned into a graph.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Planner("plan has no steps".to_string()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(Error::Planner("plan step without id".to_string()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(Error::Planner(format!("duplicate plan step id: {}", step.id)));
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(
        &self,
        command: &str,
        candidates: &[AgentCandidate],
        context: Option<&ContextBundle>,
    ) -> Result<Plan>;
}

/// Planner that asks the chat endpoint for a step list.
pub struct ChatPlanner {
    client: ChatClient,
}

impl ChatPlanner {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn system_prompt(candidates: &[AgentCandidate], context: Option<&ContextBundle>) -> String {
        let mut prompt = String::from(
            "Break the user's command into ordered steps, one per agent.\n\
             Agents selected for this command:\n",
        );
        for candidate in candidates {
            prompt.push_str(&format!("- {}: {}\n", candidate.agent_type, candidate.role));
        }
        prompt.push_str(
            "\nRespond with a JSON object {\"steps\": [{\"id\", \"name\", \"description\", \
             \"agent\", \"dependencies\", \"estimatedTime\"}], \"estimatedTotalTime\", \
             \"canParallel\"}. dependencies lists ids of earlier steps.",
        );
        if let Some(summary) = context.and_then(ContextBundle::summary) {
            prompt.push_str(&format!("\n\nRelevant context: {}", summary));
        }
        prompt
    }

    /// Parse a model answer into a validated plan.
    pub fn parse_plan(raw: &str) -> Result<Plan> {
        let plan: Plan = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| Error::Planner(format!("malformed plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }
}

#[async_trait]
impl Planner for ChatPlanner {
    async fn create_plan(
        &self,
        command: &str,
        candidates: &[AgentCandidate],
        context: Option<&ContextBundle>,
    ) -> Result<Plan> {
        let system = Self::system_prompt(candidates, context);
        let raw = self.client.complete(&system, command).await?;
        let plan = Self::parse_plan(&raw)?;
        debug!(steps = plan.steps.len(), "Plan created");
        Ok(plan)
    }
}
