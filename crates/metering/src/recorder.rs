//! Usage recording
//!
//! After a metered call completes, the recorder appends an immutable usage
//! record and bumps the tenant's running spend. Both effects happen in one
//! database transaction with an atomic SQL increment: no usage record may
//! exist without its spend update, and no lost updates under concurrent
//! requests from the same tenant.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{MeteringError, MeteringResult};

/// One usage entry to append to the ledger
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub company_id: Uuid,
    /// Service/provider name, e.g. "openai" or "webhook"
    pub service: String,
    pub agent_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub description: String,
    pub cost: f64,
    pub tokens_used: i32,
    pub metadata: serde_json::Value,
}

impl UsageEntry {
    pub fn new(company_id: Uuid, service: impl Into<String>, cost: f64, tokens_used: i32) -> Self {
        Self {
            company_id,
            service: service.into(),
            agent_id: None,
            agent_name: None,
            description: String::new(),
            cost,
            tokens_used,
            metadata: serde_json::json!({}),
        }
    }

    pub fn agent(mut self, agent_id: Option<Uuid>, agent_name: Option<String>) -> Self {
        self.agent_id = agent_id;
        self.agent_name = agent_name;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Usage recorder service
#[derive(Clone)]
pub struct UsageRecorder {
    pool: PgPool,
}

impl UsageRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a usage record and increment the company's current spend
    ///
    /// Single transaction; the spend bump is an atomic SQL increment, never
    /// a read-modify-write from application code.
    pub async fn record(&self, entry: UsageEntry) -> MeteringResult<Uuid> {
        let mut tx = self.pool.begin().await?;

        let record_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO usage_records (
                id, company_id, service, agent_id, agent_name,
                description, cost, tokens_used, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.company_id)
        .bind(&entry.service)
        .bind(entry.agent_id)
        .bind(&entry.agent_name)
        .bind(&entry.description)
        .bind(entry.cost)
        .bind(entry.tokens_used)
        .bind(&entry.metadata)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE companies SET current_spend = current_spend + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(entry.cost)
        .bind(entry.company_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Rolls back the usage insert too; the ledger and the spend
            // counter always move together.
            return Err(MeteringError::CompanyNotFound(entry.company_id));
        }

        tx.commit().await?;

        tracing::debug!(
            company_id = %entry.company_id,
            record_id = %record_id.0,
            service = %entry.service,
            cost = entry.cost,
            tokens_used = entry.tokens_used,
            "Usage recorded"
        );

        Ok(record_id.0)
    }

    /// Read the company's current spend and budget limit for display
    pub async fn budget_status(&self, company_id: Uuid) -> MeteringResult<(f64, f64)> {
        let row: Option<(f64, f64)> =
            sqlx::query_as("SELECT current_spend, monthly_budget FROM companies WHERE id = $1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(MeteringError::CompanyNotFound(company_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let company_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let entry = UsageEntry::new(company_id, "openai", 0.012, 480)
            .agent(Some(agent_id), Some("drafting-agent".to_string()))
            .description("AI generation (gpt-4o-mini)")
            .metadata(serde_json::json!({"model": "gpt-4o-mini"}));

        assert_eq!(entry.company_id, company_id);
        assert_eq!(entry.service, "openai");
        assert_eq!(entry.agent_id, Some(agent_id));
        assert_eq!(entry.tokens_used, 480);
        assert_eq!(entry.metadata["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_record_updates_spend_atomically() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = jarvishq_shared::create_pool(&url).await.expect("pool");
        let recorder = UsageRecorder::new(pool.clone());

        let company_id: (Uuid,) = sqlx::query_as(
            "INSERT INTO companies (id, name, monthly_budget, current_spend) \
             VALUES (gen_random_uuid(), 'recorder-test', 100, 0) RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .expect("insert company");

        for _ in 0..3 {
            recorder
                .record(UsageEntry::new(company_id.0, "openai", 2.5, 100))
                .await
                .expect("record");
        }

        let (spend, _) = recorder.budget_status(company_id.0).await.expect("status");
        assert!((spend - 7.5).abs() < 1e-9);

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM usage_records WHERE company_id = $1")
                .bind(company_id.0)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count, 3);
    }
}
