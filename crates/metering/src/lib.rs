#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Jarvis HQ Metering Module
//!
//! The AI-call pipeline: resolve credentials, estimate cost, enforce the
//! tenant's monthly budget, invoke the provider, and record actual usage.
//!
//! Within one request the order is fixed: budget check happens before the
//! provider call, which happens before usage recording.

pub mod budget;
pub mod credentials;
pub mod error;
pub mod invoker;
pub mod pricing;
pub mod recorder;

pub use budget::{evaluate, BudgetDecision, BudgetGuard, FailMode};
pub use credentials::{CredentialResolver, ProviderDefaults, ResolvedCredential};
pub use error::{MeteringError, MeteringResult};
pub use invoker::{Generation, GenerationRequest, ProviderInvoker};
pub use pricing::{approx_tokens, cost, default_model, estimate, rates_for, CostEstimate, ModelRates};
pub use recorder::{UsageEntry, UsageRecorder};

use sqlx::PgPool;

/// Combined metering service wiring all pipeline stages together
#[derive(Clone)]
pub struct MeteringService {
    pub credentials: CredentialResolver,
    pub budget: BudgetGuard,
    pub invoker: ProviderInvoker,
    pub recorder: UsageRecorder,
}

impl MeteringService {
    pub fn new(
        pool: PgPool,
        http: reqwest::Client,
        defaults: ProviderDefaults,
        fail_mode: FailMode,
    ) -> Self {
        Self {
            credentials: CredentialResolver::new(pool.clone(), defaults),
            budget: BudgetGuard::new(pool.clone(), fail_mode),
            invoker: ProviderInvoker::new(http),
            recorder: UsageRecorder::new(pool),
        }
    }
}
