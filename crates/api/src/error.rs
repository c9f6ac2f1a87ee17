//! API error types and HTTP response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use jarvishq_billing::BillingError;
use jarvishq_metering::MeteringError;

/// API errors with their HTTP mappings
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Budget exceeded: spend {current_spend} + estimate {estimated_cost} over limit {budget_limit}")]
    BudgetExceeded {
        current_spend: f64,
        budget_limit: f64,
        estimated_cost: f64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Both self-hosted inference endpoints failed their health checks
    #[error("Self-hosted inference offline")]
    GpuOffline,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": {"code": "BAD_REQUEST", "message": message}}),
            ),
            ApiError::BudgetExceeded {
                current_spend,
                budget_limit,
                estimated_cost,
            } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "BUDGET_EXCEEDED",
                        "message": format!(
                            "Monthly budget exceeded: current spend ${:.2} + estimated ${:.4} over limit ${:.2}",
                            current_spend, estimated_cost, budget_limit
                        ),
                    },
                    "current_spend": current_spend,
                    "budget_limit": budget_limit,
                    "estimated_cost": estimated_cost,
                }),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({"error": {"code": "NOT_FOUND", "message": message}}),
            ),
            // Distinct body shape consumed by clients polling GPU status
            ApiError::GpuOffline => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "OLLAMA_UNAVAILABLE", "status": "gpu_offline"}),
            ),
            ApiError::Provider(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": {"code": "PROVIDER_ERROR", "message": message}}),
            ),
            ApiError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": {"code": "SERVICE_UNAVAILABLE", "message": message}}),
            ),
            ApiError::Config(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": {"code": "CONFIGURATION_ERROR", "message": message}}),
            ),
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": {"code": "DATABASE_ERROR", "message": "A database error occurred"}}),
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": {"code": "INTERNAL_ERROR", "message": "An internal error occurred"}}),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::ServiceOffline => ApiError::GpuOffline,
            MeteringError::MissingCredentials(provider) => ApiError::BadRequest(format!(
                "No credentials configured for provider '{}'",
                provider
            )),
            MeteringError::Config(message) => ApiError::Config(message),
            MeteringError::CompanyNotFound(id) => {
                ApiError::NotFound(format!("Company {} not found", id))
            }
            MeteringError::Provider(message) => ApiError::Provider(message),
            MeteringError::Database(message) => ApiError::Database(message),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::WebhookMalformed(message) => ApiError::BadRequest(message),
            BillingError::InvoiceNotFound(id) => {
                ApiError::NotFound(format!("Invoice {} not found", id))
            }
            BillingError::InvoiceOwnershipMismatch { invoice_id, .. } => {
                // Hidden from the caller whether the invoice exists at all
                ApiError::NotFound(format!("Invoice {} not found", invoice_id))
            }
            BillingError::InvoiceAlreadyPaid(id) => {
                ApiError::BadRequest(format!("Invoice {} is already paid", id))
            }
            BillingError::InvalidInput(message) => ApiError::BadRequest(message),
            BillingError::Config(message) => ApiError::Config(message),
            BillingError::StripeApi(message) => ApiError::Internal(message),
            BillingError::Database(message) => ApiError::Database(message),
            BillingError::Internal(message) => ApiError::Internal(message),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_service_offline_maps_to_gpu_offline() {
        let err: ApiError = MeteringError::ServiceOffline.into();
        assert!(matches!(err, ApiError::GpuOffline));
    }

    #[test]
    fn test_ownership_mismatch_is_not_found() {
        let invoice_id = Uuid::new_v4();
        let err: ApiError = BillingError::InvoiceOwnershipMismatch {
            invoice_id,
            company_id: Uuid::new_v4(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
