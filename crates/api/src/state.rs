//! Application state

use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

use jarvishq_billing::BillingService;
use jarvishq_metering::{MeteringService, ProviderDefaults};

use crate::config::Config;
use crate::notify::Notifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub http_client: Client,
    pub metering: MeteringService,
    /// Billing service, absent when Stripe env vars are not configured
    pub billing: Option<Arc<BillingService>>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let http_client = Client::new();

        let defaults = ProviderDefaults::from_env();
        let metering = MeteringService::new(
            pool.clone(),
            http_client.clone(),
            defaults,
            config.budget_fail_mode,
        );

        // Billing is optional so self-hosted deployments can run without
        // Stripe keys; checkout/webhook routes then answer 503.
        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        let notifier = Notifier::new(pool.clone(), http_client.clone());

        Self {
            pool,
            config: Arc::new(config),
            http_client,
            metering,
            billing,
            notifier,
        }
    }
}
