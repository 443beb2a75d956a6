// Cadence Core - Error types
//
// One error enum for the whole workspace. Configuration problems are
// recoverable (the engine fails closed); data and store problems are
// reported per instance without aborting a batch.

use thiserror::Error;

/// Result alias used throughout Cadence
pub type CadenceResult<T> = Result<T, CadenceError>;

/// Errors produced by the Cadence workflow engine
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Malformed template, condition spec, delay string, or missing SLA metadata
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow template problems at runtime (missing template, bad step pointer)
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Governed business entity could not be resolved
    #[error("Entity error: {0}")]
    Entity(String),

    /// Persistence failure on the instance store
    #[error("Store error: {0}")]
    Store(String),

    /// Optimistic-concurrency conflict: another run mutated the instance first
    #[error("Version conflict on instance {0}")]
    Conflict(uuid::Uuid),

    /// Notification sink failure (logged and counted, never retried here)
    #[error("Notification error: {0}")]
    Notification(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    pub fn entity(msg: impl Into<String>) -> Self {
        Self::Entity(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }
}

impl From<serde_yaml::Error> for CadenceError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
