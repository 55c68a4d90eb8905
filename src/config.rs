use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.5;
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_CONTEXT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CLASSIFIER_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_CONTEXT_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub agents: AgentEndpointSettings,
    #[serde(default)]
    pub context: ContextSettings,
}

/// Defaults applied to every run unless overridden per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub confidence_floor: f64,
    /// `None` runs every task of a batch at once.
    pub max_concurrency: Option<usize>,
    pub task_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_backoff_ms: u64,
    pub context_timeout_ms: u64,
    pub classifier_timeout_ms: u64,
    pub context_max_results: usize,
    pub use_planning: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            max_concurrency: None,
            task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            context_timeout_ms: DEFAULT_CONTEXT_TIMEOUT_MS,
            classifier_timeout_ms: DEFAULT_CLASSIFIER_TIMEOUT_MS,
            context_max_results: DEFAULT_CONTEXT_MAX_RESULTS,
            use_planning: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
        }
    }
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEndpointSettings {
    pub base_url: String,
}

impl Default for AgentEndpointSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextSettings {
    pub base_url: Option<String>,
}

impl Config {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::conductor_dir()?.join("conductor.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            floor = config.orchestrator.confidence_floor,
            max_concurrency = ?config.orchestrator.max_concurrency,
            model = %config.llm.model,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(dir = %parent.display(), "Creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let floor = self.orchestrator.confidence_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(Error::Validation(format!(
                "confidence_floor must be within [0, 1], got {floor}"
            )));
        }
        if self.orchestrator.max_concurrency == Some(0) {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
