//! Metering error types

use thiserror::Error;

/// Errors from the AI metering pipeline
#[derive(Debug, Error)]
pub enum MeteringError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No credentials configured for provider: {0}")]
    MissingCredentials(String),

    /// Both the remote and local self-hosted endpoints failed their health
    /// check. Distinct from a generic provider failure so callers can render
    /// a specific "GPU offline" condition.
    #[error("Self-hosted inference service is offline")]
    ServiceOffline,

    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Company not found: {0}")]
    CompanyNotFound(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for MeteringError {
    fn from(err: sqlx::Error) -> Self {
        MeteringError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for MeteringError {
    fn from(err: reqwest::Error) -> Self {
        MeteringError::Provider(err.to_string())
    }
}

pub type MeteringResult<T> = Result<T, MeteringError>;
