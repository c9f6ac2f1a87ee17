#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Jarvis HQ Billing Module
//!
//! Stripe integration: checkout session creation for unpaid invoices, raw
//! webhook signature verification, and idempotent invoice settlement.

pub mod checkout;
pub mod client;
pub mod error;
pub mod settlement;
pub mod webhook;

pub use checkout::{CheckoutResponse, CheckoutService, InvoiceCheckoutRequest};
pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use settlement::{InvoiceSettler, SettlementOutcome};
pub use webhook::{verify_signature, SettlementEvent};

use sqlx::PgPool;
use std::time::Duration;

/// Combined billing service
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub settler: InvoiceSettler,
    stripe: StripeClient,
}

impl BillingService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            settler: InvoiceSettler::new(pool),
            stripe,
        }
    }

    /// Create from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new(stripe, pool))
    }

    /// Verify a raw webhook payload against its `Stripe-Signature` header
    pub fn verify_webhook(&self, payload: &str, signature_header: &str) -> BillingResult<()> {
        let config = self.stripe.config();
        let tolerance = config.webhook_tolerance_secs.map(Duration::from_secs);
        webhook::verify_signature(payload, signature_header, &config.webhook_secret, tolerance)
    }

    pub fn config(&self) -> &StripeConfig {
        self.stripe.config()
    }
}
