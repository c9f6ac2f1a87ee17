//! Invoice settlement
//!
//! Turns a verified `checkout.session.completed` event into a paid invoice
//! plus exactly one ledger transaction. The paid-claim and the transaction
//! insert share one database transaction, and the claim itself is a guarded
//! UPDATE, so duplicate webhook deliveries settle at most once no matter
//! how they interleave.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::webhook::SettlementEvent;

/// Outcome of processing one settlement event
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    /// Present when this delivery performed the settlement; `None` when the
    /// invoice was already paid and the event was a duplicate.
    pub transaction_id: Option<Uuid>,
    pub amount: f64,
}

impl SettlementOutcome {
    pub fn settled(&self) -> bool {
        self.transaction_id.is_some()
    }
}

/// Settles invoices from verified Stripe checkout events
#[derive(Clone)]
pub struct InvoiceSettler {
    pool: PgPool,
}

impl InvoiceSettler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Settle the invoice named by a verified webhook event
    ///
    /// Idempotent: the first delivery marks the invoice paid and records a
    /// transaction; later deliveries of the same event find the invoice
    /// already paid and return without writing anything.
    pub async fn settle(&self, event: &SettlementEvent) -> BillingResult<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        let invoice: Option<(Uuid, f64, String)> =
            sqlx::query_as("SELECT company_id, amount, status FROM invoices WHERE id = $1")
                .bind(event.invoice_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((owner_id, invoice_amount, _status)) = invoice else {
            tracing::warn!(
                event_id = %event.event_id,
                invoice_id = %event.invoice_id,
                "Settlement event references unknown invoice"
            );
            return Err(BillingError::InvoiceNotFound(event.invoice_id));
        };

        if let Some(claimed_company) = event.company_id {
            if claimed_company != owner_id {
                tracing::warn!(
                    event_id = %event.event_id,
                    invoice_id = %event.invoice_id,
                    claimed_company = %claimed_company,
                    owner_company = %owner_id,
                    "Settlement event company does not own the invoice"
                );
                return Err(BillingError::InvoiceOwnershipMismatch {
                    invoice_id: event.invoice_id,
                    company_id: claimed_company,
                });
            }
        }

        // The status guard makes this the single point of idempotency:
        // whichever delivery's UPDATE lands first claims the row.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE invoices
            SET status = 'paid', paid_date = CURRENT_DATE, updated_at = NOW()
            WHERE id = $1 AND status <> 'paid'
            RETURNING id
            "#,
        )
        .bind(event.invoice_id)
        .fetch_optional(&mut *tx)
        .await?;

        let amount = event.amount_paid.unwrap_or(invoice_amount);

        if claimed.is_none() {
            tx.commit().await?;
            tracing::info!(
                event_id = %event.event_id,
                invoice_id = %event.invoice_id,
                "Invoice already paid, duplicate delivery acknowledged"
            );
            return Ok(SettlementOutcome {
                invoice_id: event.invoice_id,
                company_id: owner_id,
                transaction_id: None,
                amount,
            });
        }

        let transaction_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO transactions (
                id, company_id, invoice_id, amount, payment_method, stripe_session_id
            ) VALUES ($1, $2, $3, $4, 'stripe', $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(event.invoice_id)
        .bind(amount)
        .bind(&event.session_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            event_id = %event.event_id,
            invoice_id = %event.invoice_id,
            company_id = %owner_id,
            transaction_id = %transaction_id.0,
            amount = amount,
            "Invoice settled"
        );

        Ok(SettlementOutcome {
            invoice_id: event.invoice_id,
            company_id: owner_id,
            transaction_id: Some(transaction_id.0),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_for(invoice_id: Uuid, company_id: Option<Uuid>) -> SettlementEvent {
        SettlementEvent {
            event_id: "evt_test".to_string(),
            session_id: "cs_test".to_string(),
            invoice_id,
            company_id,
            amount_paid: Some(42.0),
        }
    }

    async fn seed_invoice(pool: &PgPool, status: &str) -> (Uuid, Uuid) {
        let company_id: (Uuid,) = sqlx::query_as(
            "INSERT INTO companies (id, name, monthly_budget, current_spend) \
             VALUES (gen_random_uuid(), 'settlement-test', 0, 0) RETURNING id",
        )
        .fetch_one(pool)
        .await
        .expect("insert company");

        let invoice_id: (Uuid,) = sqlx::query_as(
            "INSERT INTO invoices (id, company_id, amount, status, due_date) \
             VALUES (gen_random_uuid(), $1, 42.0, $2, CURRENT_DATE + 30) RETURNING id",
        )
        .bind(company_id.0)
        .bind(status)
        .fetch_one(pool)
        .await
        .expect("insert invoice");

        (company_id.0, invoice_id.0)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_settle_marks_paid_and_records_transaction() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = jarvishq_shared::create_pool(&url).await.expect("pool");
        let settler = InvoiceSettler::new(pool.clone());

        let (company_id, invoice_id) = seed_invoice(&pool, "open").await;
        let outcome = settler
            .settle(&event_for(invoice_id, Some(company_id)))
            .await
            .expect("settle");

        assert!(outcome.settled());
        assert_eq!(outcome.company_id, company_id);

        let (status, paid_date): (String, Option<time::Date>) =
            sqlx::query_as("SELECT status, paid_date FROM invoices WHERE id = $1")
                .bind(invoice_id)
                .fetch_one(&pool)
                .await
                .expect("invoice");
        assert_eq!(status, "paid");
        assert!(paid_date.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_duplicate_delivery_is_noop() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = jarvishq_shared::create_pool(&url).await.expect("pool");
        let settler = InvoiceSettler::new(pool.clone());

        let (company_id, invoice_id) = seed_invoice(&pool, "open").await;
        let event = event_for(invoice_id, Some(company_id));

        let first = settler.settle(&event).await.expect("first");
        let second = settler.settle(&event).await.expect("second");

        assert!(first.settled());
        assert!(!second.settled());

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_ownership_mismatch_rejected() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = jarvishq_shared::create_pool(&url).await.expect("pool");
        let settler = InvoiceSettler::new(pool.clone());

        let (_owner, invoice_id) = seed_invoice(&pool, "open").await;
        let intruder = Uuid::new_v4();

        let err = settler
            .settle(&event_for(invoice_id, Some(intruder)))
            .await
            .expect_err("must reject");
        assert!(matches!(err, BillingError::InvoiceOwnershipMismatch { .. }));

        let (status,): (String,) = sqlx::query_as("SELECT status FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_one(&pool)
            .await
            .expect("status");
        assert_eq!(status, "open");
    }
}
