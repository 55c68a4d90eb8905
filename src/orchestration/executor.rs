//! Agent execution endpoint.
//!
//! The scheduler hands each task to an [`AgentExecutor`] and applies the
//! timeout and retry policy around the call; executors make exactly one
//! attempt per call.

use crate::agent::AgentType;
use crate::core::TaskId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Extra input for an agent beyond its command fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    /// Results of completed dependencies, keyed by agent type and then
    /// by task id. Two dependencies of the same agent type both appear.
    pub dependency_results: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<Value>,
}

/// One dispatch of a task to its agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub task_id: TaskId,
    pub agent_type: AgentType,
    pub command: String,
    pub role: String,
    pub context: AgentContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Interpret an endpoint body. Bodies without a `success` flag are
    /// taken as a successful raw result.
    pub fn from_body(body: Value) -> Self {
        match body.get("success").and_then(Value::as_bool) {
            Some(success) => Self {
                success,
                result: body.get("result").cloned().filter(|v| !v.is_null()),
                error: body
                    .get("error")
                    .and_then(|e| match e {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    }),
            },
            None => Self::ok(body),
        }
    }

    /// Convert into the task outcome: the result payload or an error.
    pub fn into_result(self) -> Result<Option<Value>> {
        if self.success {
            Ok(self.result)
        } else {
            Err(Error::TaskExecution(
                self.error
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            ))
        }
    }
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse>;
}

/// Executor backed by `POST {base_url}/api/agents/{agent_type}/execute`.
#[derive(Debug, Clone)]
pub struct HttpAgentExecutor {
    client: Client,
    base_url: String,
}

impl HttpAgentExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, agent_type: AgentType) -> String {
        format!("{}/api/agents/{}/execute", self.base_url, agent_type)
    }
}

#[async_trait]
impl AgentExecutor for HttpAgentExecutor {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let url = self.endpoint(request.agent_type);
        debug!(task_id = %request.task_id, url = %url, "Dispatching agent request");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::AgentEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        Ok(AgentResponse::from_body(body))
    }
}
