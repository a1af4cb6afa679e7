use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

/// The pipeline step a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Planning,
    WebSearch,
    Tools,
    Reasoning,
    CrossCheck,
    Generation,
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Planning failed: {0}")]
    PlanningFailed(#[source] Box<TriageError>),

    #[error("All {attempts} candidates failed during {stage}: {source}")]
    FallbackExhausted {
        stage: Stage,
        attempts: usize,
        #[source]
        source: Box<TriageError>,
    },

    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid model registry: {0}")]
    InvalidRegistry(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TriageError {
    pub fn provider(err: anyhow::Error) -> Self {
        TriageError::Provider(format!("{:#}", err))
    }

    pub fn service(err: anyhow::Error) -> Self {
        TriageError::Service(format!("{:#}", err))
    }

    /// The stage tag of a fallback failure, looking through a planning failure
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TriageError::FallbackExhausted { stage, .. } => Some(*stage),
            TriageError::PlanningFailed(_) => Some(Stage::Planning),
            _ => None,
        }
    }

    /// The innermost error, skipping planning and fallback wrappers
    pub fn root_cause(&self) -> &TriageError {
        match self {
            TriageError::PlanningFailed(inner) => inner.root_cause(),
            TriageError::FallbackExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type TriageResult<T> = Result<T, TriageError>;

/// Errors reported back to a model inside a tool exchange. These travel inside
/// messages, so unlike [`TriageError`] they are cloneable and serializable.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
