//! Result synthesis.
//!
//! When more than one agent completed, a [`Synthesizer`] merges their
//! results into a single summary and final result. Synthesis is
//! best-effort: the orchestrator keeps the plain aggregate when it fails.

use crate::core::TaskStatus;
use crate::error::{Error, Result};
use crate::orchestration::aggregator::TaskOutcome;
use crate::orchestration::llm::{strip_code_fence, ChatClient};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const DEFAULT_SUMMARY: &str = "Results synthesized";

/// Merged view over several agent results.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub summary: String,
    pub final_result: Value,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// `outcomes` holds the completed tasks only, in submission order.
    async fn synthesize(&self, command: &str, outcomes: &[TaskOutcome]) -> Result<Synthesis>;
}

/// Synthesizer backed by the chat endpoint.
pub struct ChatSynthesizer {
    client: ChatClient,
}

impl ChatSynthesizer {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn user_prompt(command: &str, outcomes: &[TaskOutcome]) -> String {
        let sections: Vec<String> = outcomes
            .iter()
            .filter(|o| o.status == TaskStatus::Completed)
            .map(|o| {
                let result = o.result.clone().unwrap_or(Value::Null);
                let body = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                format!("{} ({}):\n{}", o.agent_type, o.task_id, body)
            })
            .collect();
        format!(
            "Command: {}\n\nAgent results:\n\n{}\n\nRespond with a JSON object {{\"summary\", \"finalResult\"}}.",
            command,
            sections.join("\n\n")
        )
    }

    /// Parse a model answer. A missing `summary` gets a stock sentence and
    /// a missing `finalResult` falls back to the whole answer object.
    pub fn parse_synthesis(raw: &str) -> Result<Synthesis> {
        let value: Value = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| Error::Synthesis(format!("malformed answer: {}", e)))?;
        let Value::Object(map) = &value else {
            return Err(Error::Synthesis("answer is not a JSON object".to_string()));
        };

        let summary = map
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string();
        let final_result = match map.get("finalResult") {
            Some(result) if !result.is_null() => result.clone(),
            _ => value.clone(),
        };
        Ok(Synthesis { summary, final_result })
    }
}

#[async_trait]
impl Synthesizer for ChatSynthesizer {
    async fn synthesize(&self, command: &str, outcomes: &[TaskOutcome]) -> Result<Synthesis> {
        let system = "Combine the results of several agents into one coherent, useful answer. \
                      Respond in JSON.";
        let raw = self
            .client
            .complete(system, &Self::user_prompt(command, outcomes))
            .await?;
        let synthesis = Self::parse_synthesis(&raw)?;
        debug!(summary = %crate::util::preview(&synthesis.summary, 80), "Results synthesized");
        Ok(synthesis)
    }
}
