//! Agent selection.
//!
//! Maps a free-form command to a ranked list of [`AgentCandidate`]s. The
//! primary path asks a [`Classifier`] (normally an LLM) and parses its
//! answer into a typed [`Classification`]. Transport errors, timeouts,
//! malformed answers and empty answers all fall through to the
//! deterministic [`KeywordTable`]. Selection itself never fails.

use crate::agent::{clamp_confidence, AgentCandidate, AgentType};
use crate::config::{DEFAULT_CLASSIFIER_TIMEOUT_MS, DEFAULT_CONFIDENCE_FLOOR};
use crate::error::Result;
use crate::orchestration::llm::{strip_code_fence, ChatClient};
use crate::util::{preview, with_timeout};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the selector knows about the caller besides the command text.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub project_id: Option<String>,
    /// Restricts selection to these agent types when set.
    pub available_agents: Option<Vec<AgentType>>,
    /// Business context from the context provider, passed to the model.
    pub business: Option<Value>,
}

impl SelectionContext {
    fn allows(&self, agent_type: AgentType) -> bool {
        self.available_agents
            .as_ref()
            .map(|agents| agents.contains(&agent_type))
            .unwrap_or(true)
    }
}

/// Source of raw classification answers.
///
/// Implementations return the model's text unparsed; the selector owns
/// parsing so every implementation gets the same fallback behavior.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, command: &str, context: &SelectionContext) -> Result<String>;
}

/// Classifier backed by an OpenAI-compatible chat endpoint.
pub struct LlmClassifier {
    client: ChatClient,
}

impl LlmClassifier {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn system_prompt(context: &SelectionContext) -> String {
        let mut prompt = String::from(
            "You route user commands to specialized agents.\n\
             Available agents:\n",
        );
        for agent_type in AgentType::ALL {
            if !context.allows(agent_type) {
                continue;
            }
            let info = agent_type.info();
            prompt.push_str(&format!(
                "- {} ({}): {}. Capabilities: {}\n",
                agent_type,
                info.name,
                info.description,
                info.capabilities.join(", ")
            ));
        }
        prompt.push_str(
            "\nRespond with a JSON object {\"agents\": [{\"type\", \"confidence\", \
             \"reason\", \"role\", \"canParallel\"}]} listing only the agents the \
             command needs. confidence is a number between 0 and 1.",
        );
        if let Some(business) = &context.business {
            prompt.push_str(&format!("\n\nBusiness context: {}", business));
        }
        prompt
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, command: &str, context: &SelectionContext) -> Result<String> {
        let system = Self::system_prompt(context);
        self.client.complete(&system, command).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(rename = "type", alias = "agentType", alias = "agent")]
    agent_type: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    can_parallel: Option<bool>,
}

impl RawCandidate {
    fn into_candidate(self) -> Option<AgentCandidate> {
        let agent_type = match self.agent_type.parse::<AgentType>() {
            Ok(t) => t,
            Err(_) => {
                debug!(agent = %self.agent_type, "Dropping unknown agent type");
                return None;
            }
        };
        let mut candidate = AgentCandidate::new(agent_type, self.confidence.unwrap_or(0.0));
        if let Some(reason) = self.reason.filter(|r| !r.trim().is_empty()) {
            candidate = candidate.with_reason(&reason);
        }
        if let Some(role) = self.role.filter(|r| !r.trim().is_empty()) {
            candidate = candidate.with_role(&role);
        }
        if self.can_parallel == Some(false) {
            candidate = candidate.sequential();
        }
        Some(candidate)
    }
}

/// A classifier answer parsed into a typed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Well-formed answer. Unknown agent types are already dropped.
    Candidates(Vec<AgentCandidate>),
    /// The answer could not be interpreted; triggers the keyword fallback.
    ParseFailure { reason: String },
}

impl Classification {
    /// Parse a raw answer. Accepts a bare array, an object with an
    /// `agents` array, or either inside a Markdown code fence.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);

        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                return Classification::ParseFailure {
                    reason: format!("invalid JSON: {}", e),
                }
            }
        };

        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("agents") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Classification::ParseFailure {
                        reason: "object without an agents array".to_string(),
                    }
                }
            },
            other => {
                return Classification::ParseFailure {
                    reason: format!("unexpected JSON value: {}", preview(&other.to_string(), 40)),
                }
            }
        };

        let candidates = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawCandidate>(item).ok())
            .filter_map(RawCandidate::into_candidate)
            .collect();
        Classification::Candidates(candidates)
    }
}

/// One row of the fallback table.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub agent_type: AgentType,
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub can_parallel: bool,
}

/// Deterministic keyword fallback.
///
/// A rule matches when any of its keywords occurs in the lowercased
/// command. Matching rules yield candidates in table order.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

impl KeywordTable {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn match_command(&self, command: &str) -> Vec<AgentCandidate> {
        let lowered = command.to_lowercase();
        self.rules
            .iter()
            .filter_map(|rule| {
                let keyword = rule.keywords.iter().find(|k| lowered.contains(k.as_str()))?;
                let mut candidate = AgentCandidate::new(rule.agent_type, rule.confidence)
                    .with_reason(&format!("Keyword match: {}", keyword));
                if !rule.can_parallel {
                    candidate = candidate.sequential();
                }
                Some(candidate)
            })
            .collect()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        fn rule(agent_type: AgentType, keywords: &[&str], confidence: f64, can_parallel: bool) -> KeywordRule {
            KeywordRule {
                agent_type,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                confidence,
                can_parallel,
            }
        }

        Self::new(vec![
            rule(
                AgentType::ContentCreator,
                &["content", "bài", "post", "article", "blog", "viết"],
                0.80,
                true,
            ),
            rule(AgentType::SeoSpecialist, &["seo", "keyword", "từ khóa"], 0.90, true),
            rule(
                AgentType::DataAnalyst,
                &["thống kê", "analytics", "stats", "phân tích", "report"],
                0.85,
                true,
            ),
            rule(
                AgentType::WorkflowAutomation,
                &["workflow", "automation", "tự động", "deploy"],
                0.90,
                false,
            ),
            rule(
                AgentType::ResearchAgent,
                &["research", "nghiên cứu", "trend"],
                0.75,
                true,
            ),
        ])
    }
}

/// Produces the ranked candidate list for a command.
pub struct AgentSelector {
    classifier: Option<Arc<dyn Classifier>>,
    keywords: KeywordTable,
    confidence_floor: f64,
    timeout: Duration,
}

impl AgentSelector {
    /// Selector with no classifier; only the keyword table is used.
    pub fn keyword_only() -> Self {
        Self {
            classifier: None,
            keywords: KeywordTable::default(),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            timeout: Duration::from_millis(DEFAULT_CLASSIFIER_TIMEOUT_MS),
        }
    }

    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
            ..Self::keyword_only()
        }
    }

    pub fn with_keywords(mut self, keywords: KeywordTable) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = clamp_confidence(floor);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn confidence_floor(&self) -> f64 {
        self.confidence_floor
    }

    /// Select agents for `command`. Never fails; may return an empty list.
    pub async fn select(&self, command: &str, context: &SelectionContext) -> Vec<AgentCandidate> {
        if let Some(classifier) = &self.classifier {
            match self.classify(classifier.as_ref(), command, context).await {
                Classification::Candidates(candidates) => {
                    let verified = self.verify(candidates, context);
                    if !verified.is_empty() {
                        info!(count = verified.len(), "Agents selected by classifier");
                        return verified;
                    }
                    debug!("Classifier selected no usable agents, using keyword fallback");
                }
                Classification::ParseFailure { reason } => {
                    warn!(reason = %reason, "Classifier answer unusable, using keyword fallback");
                }
            }
        }

        let fallback = self.verify(self.keywords.match_command(command), context);
        info!(count = fallback.len(), "Agents selected by keyword fallback");
        fallback
    }

    async fn classify(
        &self,
        classifier: &dyn Classifier,
        command: &str,
        context: &SelectionContext,
    ) -> Classification {
        match with_timeout(self.timeout, classifier.classify(command, context)).await {
            Ok(raw) => {
                debug!(answer = %preview(&raw, 200), "Classifier answered");
                Classification::parse(&raw)
            }
            Err(e) => Classification::ParseFailure {
                reason: e.to_string(),
            },
        }
    }

    /// Apply the availability filter, keep the best confidence per agent
    /// type, drop candidates under the floor and sort by confidence
    /// descending. Ties keep their original order.
    fn verify(&self, candidates: Vec<AgentCandidate>, context: &SelectionContext) -> Vec<AgentCandidate> {
        let mut best: Vec<AgentCandidate> = Vec::new();
        let mut positions: HashMap<AgentType, usize> = HashMap::new();

        for mut candidate in candidates {
            if !context.allows(candidate.agent_type) {
                continue;
            }
            candidate.confidence = clamp_confidence(candidate.confidence);
            match positions.get(&candidate.agent_type) {
                Some(&pos) => {
                    if candidate.confidence > best[pos].confidence {
                        best[pos] = candidate;
                    }
                }
                None => {
                    positions.insert(candidate.agent_type, best.len());
                    best.push(candidate);
                }
            }
        }

        best.retain(|c| c.confidence >= self.confidence_floor);
        best.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        best
    }
}
