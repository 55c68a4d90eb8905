use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid status transition for task {task} from {from} to {to}")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Dependency from {from} to {to} would create a cycle")]
    GraphCycle { from: String, to: String },

    #[error("Plan step {0} has no agent assigned")]
    UnassignedStep(String),

    #[error("Context retrieval failed: {0}")]
    ContextRetrieval(String),

    #[error("No agents selected")]
    AgentSelection,

    #[error("LLM endpoint returned {status}: {message}")]
    Llm { status: u16, message: String },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Agent endpoint returned {status}: {message}")]
    AgentEndpoint { status: u16, message: String },

    #[error("Task execution failed: {0}")]
    TaskExecution(String),

    #[error("Orchestration cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is raised while building the task graph.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask(_)
                | Error::UnknownDependency { .. }
                | Error::GraphCycle { .. }
                | Error::UnassignedStep(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
