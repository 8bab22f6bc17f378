use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error for '{filter}': {reason}")]
    Configuration { filter: String, reason: String },

    #[error("Invalid {kind} \"{value}\"")]
    InvalidEnum { kind: &'static str, value: String },

    #[error("Cannot {operation}: {required} must be set first")]
    StateOrdering {
        operation: &'static str,
        required: &'static str,
    },

    #[error("Simulation environment error: {0}")]
    Environment(String),

    #[error("Interrupted")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScenarioError {
    pub fn configuration(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_enum(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnum {
            kind,
            value: value.into(),
        }
    }

    /// Whether this error is a fatal startup condition that must stop the run
    /// before any actor exists.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::InvalidEnum { .. })
    }
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;
