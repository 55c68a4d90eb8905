//! Context retrieval for commands.
//!
//! The provider is unreliable by contract: the orchestrator applies a
//! timeout and proceeds without context when retrieval fails.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Query parameters for one retrieval.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    pub project_id: Option<String>,
    pub max_results: usize,
}

/// Semantic search hits plus a prose summary of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticContext {
    pub results: Vec<Value>,
    pub summary: String,
}

/// Everything the provider knows about a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBundle {
    pub semantic: SemanticContext,
    pub business: Value,
}

impl ContextBundle {
    /// The semantic summary, if it carries any text.
    pub fn summary(&self) -> Option<&str> {
        let summary = self.semantic.summary.trim();
        (!summary.is_empty()).then_some(summary)
    }

    /// Business context, if the provider returned any.
    pub fn business(&self) -> Option<&Value> {
        match &self.business {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other),
        }
    }
}

#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn retrieve_enhanced_context(
        &self,
        command: &str,
        query: &ContextQuery,
    ) -> Result<ContextBundle>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest<'a> {
    command: &'a str,
    #[serde(flatten)]
    query: &'a ContextQuery,
}

/// Provider backed by `POST {base_url}/api/context/retrieve`.
#[derive(Debug, Clone)]
pub struct HttpContextProvider {
    client: Client,
    base_url: String,
}

impl HttpContextProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContextProvider for HttpContextProvider {
    async fn retrieve_enhanced_context(
        &self,
        command: &str,
        query: &ContextQuery,
    ) -> Result<ContextBundle> {
        let url = format!("{}/api/context/retrieve", self.base_url);
        debug!(url = %url, "Retrieving context");

        let response = self
            .client
            .post(&url)
            .json(&RetrieveRequest { command, query })
            .send()
            .await
            .map_err(|e| Error::ContextRetrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ContextRetrieval(format!("endpoint returned {}", status)));
        }

        response
            .json::<ContextBundle>()
            .await
            .map_err(|e| Error::ContextRetrieval(e.to_string()))
    }
}
