//! Billing error types

use thiserror::Error;
use uuid::Uuid;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Malformed webhook payload: {0}")]
    WebhookMalformed(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    /// The event named a company that does not own the invoice. Surfaced as
    /// a 404-class rejection, never a silent no-op.
    #[error("Invoice {invoice_id} does not belong to company {company_id}")]
    InvoiceOwnershipMismatch {
        invoice_id: Uuid,
        company_id: Uuid,
    },

    #[error("Invoice {0} is already paid")]
    InvoiceAlreadyPaid(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
