#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Jarvis HQ Background Worker
//!
//! Runs the scheduled maintenance jobs: monthly spend reset, the daily
//! overdue-invoice sweep, and delivery-log cleanup.

mod jobs;

use jarvishq_api::Notifier;
use jarvishq_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DELIVERY_RETENTION_DAYS: i32 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jarvishq_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Jarvis HQ Worker v{}", env!("CARGO_PKG_VERSION"));

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
    let retention_days = std::env::var("WEBHOOK_DELIVERY_RETENTION_DAYS")
        .ok()
        .and_then(|raw| raw.parse::<i32>().ok())
        .unwrap_or(DEFAULT_DELIVERY_RETENTION_DAYS);

    tracing::info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;
    tracing::info!("Database connection established");

    let notifier = Notifier::new(pool.clone(), reqwest::Client::new());

    let scheduler = JobScheduler::new().await?;

    // Monthly spend reset: midnight UTC on the 1st
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 0 0 1 * *", move |_uuid, _lock| {
                let pool = pool.clone();
                Box::pin(async move {
                    tracing::info!("Running monthly spend reset");
                    jobs::reset_monthly_spend(&pool).await;
                })
            })?)
            .await?;
    }

    // Daily overdue sweep: 02:00 UTC
    {
        let pool = pool.clone();
        let notifier = notifier.clone();
        scheduler
            .add(Job::new_async("0 0 2 * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                let notifier = notifier.clone();
                Box::pin(async move {
                    tracing::info!("Running overdue invoice sweep");
                    jobs::sweep_overdue_invoices(&pool, &notifier).await;
                })
            })?)
            .await?;
    }

    // Daily delivery-log cleanup: 03:00 UTC
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                Box::pin(async move {
                    tracing::info!("Running webhook delivery cleanup");
                    jobs::cleanup_old_deliveries(&pool, retention_days).await;
                })
            })?)
            .await?;
    }

    scheduler.start().await?;
    tracing::info!(
        retention_days = retention_days,
        "Scheduler started with 3 jobs"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping worker");

    Ok(())
}
