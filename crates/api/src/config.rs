//! API server configuration

use jarvishq_metering::FailMode;

use crate::error::{ApiError, ApiResult};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Postgres connection string (pooler-compatible)
    pub database_url: String,
    /// Direct (non-pooled) connection string for migrations
    pub database_direct_url: Option<String>,
    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
    /// Behavior when a budget lookup fails
    pub budget_fail_mode: FailMode,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        let budget_fail_mode = match std::env::var("BUDGET_FAIL_MODE") {
            Ok(raw) => raw
                .parse::<FailMode>()
                .map_err(ApiError::Config)?,
            Err(_) => FailMode::default(),
        };

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| ApiError::Config("DATABASE_URL not set".to_string()))?,
            database_direct_url: std::env::var("DATABASE_DIRECT_URL").ok(),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            budget_fail_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_mode_default_is_open() {
        assert_eq!(FailMode::default(), FailMode::Open);
    }

    #[test]
    fn test_origins_split_and_trimmed() {
        let origins: Vec<String> = "http://a.example, http://b.example ,"
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        assert_eq!(origins, vec!["http://a.example", "http://b.example"]);
    }
}
