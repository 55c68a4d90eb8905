//! Agent catalog and selection candidates.
//!
//! An agent is a specialized executor bound to one capability domain.
//! The catalog is fixed; candidates are produced by the selector once
//! per command and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::Error;

/// The capability domains an agent can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ContentCreator,
    DataAnalyst,
    SeoSpecialist,
    WorkflowAutomation,
    ResearchAgent,
}

/// Static description of an agent type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::ContentCreator,
        AgentType::DataAnalyst,
        AgentType::SeoSpecialist,
        AgentType::WorkflowAutomation,
        AgentType::ResearchAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ContentCreator => "content_creator",
            AgentType::DataAnalyst => "data_analyst",
            AgentType::SeoSpecialist => "seo_specialist",
            AgentType::WorkflowAutomation => "workflow_automation",
            AgentType::ResearchAgent => "research_agent",
        }
    }

    pub fn info(&self) -> AgentInfo {
        match self {
            AgentType::ContentCreator => AgentInfo {
                name: "Content Creator",
                description: "Writes posts, articles and social media content",
                capabilities: &[
                    "generate_content",
                    "create_post",
                    "write_article",
                    "create_social_post",
                ],
            },
            AgentType::DataAnalyst => AgentInfo {
                name: "Data Analyst",
                description: "Analyzes data, statistics and keyword performance",
                capabilities: &[
                    "analyze_data",
                    "generate_stats",
                    "analyze_keywords",
                    "performance_analysis",
                ],
            },
            AgentType::SeoSpecialist => AgentInfo {
                name: "SEO Specialist",
                description: "Optimizes content for search and researches keywords",
                capabilities: &[
                    "optimize_seo",
                    "keyword_research",
                    "seo_analysis",
                    "content_optimization",
                ],
            },
            AgentType::WorkflowAutomation => AgentInfo {
                name: "Workflow Automation",
                description: "Creates, deploys and optimizes automation workflows",
                capabilities: &["create_workflow", "optimize_workflow", "automate_task"],
            },
            AgentType::ResearchAgent => AgentInfo {
                name: "Research Agent",
                description: "Researches topics, gathers information and tracks trends",
                capabilities: &["research_topic", "gather_information", "analyze_trends"],
            },
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("Unknown agent type: {s}")))
    }
}

/// A ranked suggestion to involve one agent in a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCandidate {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    pub role: String,
    pub can_parallel: bool,
}

impl AgentCandidate {
    pub fn new(agent_type: AgentType, confidence: f64) -> Self {
        let info = agent_type.info();
        Self {
            agent_type,
            confidence: clamp_confidence(confidence),
            reason: format!("Command requires {}", info.name),
            role: info.description.to_string(),
            can_parallel: true,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn sequential(mut self) -> Self {
        self.can_parallel = false;
        self
    }
}

/// Clamp a model-reported confidence into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
