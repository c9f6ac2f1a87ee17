//! Scheduled maintenance jobs
//!
//! Every job is best-effort: it logs what it did (or why it could not) and
//! never aborts the scheduler.

use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use jarvishq_api::{EventKind, Notifier};

/// Zero out every company's running spend for the new billing period
pub async fn reset_monthly_spend(pool: &PgPool) {
    match sqlx::query(
        "UPDATE companies SET current_spend = 0, updated_at = NOW() WHERE current_spend <> 0",
    )
    .execute(pool)
    .await
    {
        Ok(result) => {
            info!(
                companies = result.rows_affected(),
                "Monthly spend reset complete"
            );
        }
        Err(e) => {
            error!(error = %e, "Monthly spend reset failed");
        }
    }
}

/// Flip open invoices past their due date to overdue, notifying per invoice
pub async fn sweep_overdue_invoices(pool: &PgPool, notifier: &Notifier) {
    let candidates: Vec<(Uuid, Uuid, f64)> = match sqlx::query_as(
        r#"
        SELECT id, company_id, amount
        FROM invoices
        WHERE status = 'open' AND due_date < CURRENT_DATE
        "#,
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "Overdue sweep query failed");
            return;
        }
    };

    if candidates.is_empty() {
        return;
    }

    info!(count = candidates.len(), "Sweeping overdue invoices");

    for (invoice_id, company_id, amount) in candidates {
        // Guarded so an invoice paid between the select and this update is
        // left alone.
        let updated = match sqlx::query(
            "UPDATE invoices SET status = 'overdue', updated_at = NOW() \
             WHERE id = $1 AND status = 'open'",
        )
        .bind(invoice_id)
        .execute(pool)
        .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                error!(invoice_id = %invoice_id, error = %e, "Failed to mark invoice overdue");
                continue;
            }
        };

        if updated {
            info!(
                invoice_id = %invoice_id,
                company_id = %company_id,
                "Invoice marked overdue"
            );
            notifier
                .dispatch(
                    company_id,
                    EventKind::InvoiceOverdue,
                    serde_json::json!({
                        "invoice_id": invoice_id,
                        "amount": amount,
                    }),
                )
                .await;
        }
    }
}

/// Delete webhook delivery log rows older than the retention window
pub async fn cleanup_old_deliveries(pool: &PgPool, retention_days: i32) {
    match sqlx::query(
        "DELETE FROM webhook_deliveries WHERE created_at < NOW() - ($1 || ' days')::INTERVAL",
    )
    .bind(retention_days)
    .execute(pool)
    .await
    {
        Ok(result) => {
            if result.rows_affected() > 0 {
                info!(
                    deleted = result.rows_affected(),
                    retention_days = retention_days,
                    "Cleaned up old webhook deliveries"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Webhook delivery cleanup failed");
        }
    }
}
