//! Outbound event notifier
//!
//! Fans business events out to each tenant's configured integrations
//! (Zapier, Tasker). Delivery is strictly best-effort: every target gets its
//! own spawned task, failures land in the delivery log and the server log,
//! and nothing ever propagates back to the operation that fired the event.

use serde_json::json;
use sqlx::PgPool;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use jarvishq_metering::{UsageEntry, UsageRecorder};

/// The fixed set of outbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ClientCreated,
    InvoiceCreated,
    InvoicePaid,
    InvoiceOverdue,
    JobCreated,
    JobCompleted,
    DocumentUploaded,
    MediaGenerated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCreated => "client.created",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoiceOverdue => "invoice.overdue",
            Self::JobCreated => "job.created",
            Self::JobCompleted => "job.completed",
            Self::DocumentUploaded => "document.uploaded",
            Self::MediaGenerated => "media.generated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One integration target loaded for delivery
#[derive(Debug, Clone, sqlx::FromRow)]
struct IntegrationTarget {
    id: Uuid,
    integration: String,
    target_url: String,
    auth_token: Option<String>,
    subscribed_events: Vec<String>,
}

/// Whether an integration's subscription list covers an event
fn is_subscribed(subscribed_events: &[String], event: &str) -> bool {
    subscribed_events.iter().any(|e| e == event)
}

/// Event notifier service
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    http: reqwest::Client,
    recorder: UsageRecorder,
}

impl Notifier {
    pub fn new(pool: PgPool, http: reqwest::Client) -> Self {
        let recorder = UsageRecorder::new(pool.clone());
        Self {
            pool,
            http,
            recorder,
        }
    }

    /// Dispatch an event to every subscribed, enabled integration
    ///
    /// Fire-and-forget: each target gets its own task, and this function
    /// never returns an error to the caller.
    pub async fn dispatch(&self, company_id: Uuid, event: EventKind, payload: serde_json::Value) {
        let targets: Vec<IntegrationTarget> = match sqlx::query_as(
            r#"
            SELECT id, integration, target_url, auth_token, subscribed_events
            FROM webhook_integrations
            WHERE company_id = $1 AND enabled = TRUE
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    company_id = %company_id,
                    event = %event,
                    error = %e,
                    "Failed to load webhook integrations, event dropped"
                );
                return;
            }
        };

        let event_name = event.as_str();
        let subscribed: Vec<IntegrationTarget> = targets
            .into_iter()
            .filter(|t| is_subscribed(&t.subscribed_events, event_name))
            .collect();

        if subscribed.is_empty() {
            tracing::debug!(
                company_id = %company_id,
                event = %event,
                "No integrations subscribed to event"
            );
            return;
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let body = json!({
            "event_type": event_name,
            "timestamp": timestamp,
            "source": "jarvis-hq",
            "payload": payload,
        });

        for target in subscribed {
            let notifier = self.clone();
            let body = body.clone();
            tokio::spawn(async move {
                notifier.deliver(company_id, event, target, body).await;
            });
        }
    }

    async fn deliver(
        &self,
        company_id: Uuid,
        event: EventKind,
        target: IntegrationTarget,
        body: serde_json::Value,
    ) {
        let mut request = self.http.post(&target.target_url).json(&body);
        if let Some(token) = &target.auth_token {
            request = request.bearer_auth(token);
        }

        let (status_code, success, error) = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    (Some(i32::from(status.as_u16())), true, None)
                } else {
                    let detail = response.text().await.unwrap_or_default();
                    (
                        Some(i32::from(status.as_u16())),
                        false,
                        Some(format!("target returned {}: {}", status, detail)),
                    )
                }
            }
            Err(e) => (None, false, Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, integration_id, company_id, event_type, status_code, success, error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(target.id)
        .bind(company_id)
        .bind(event.as_str())
        .bind(status_code)
        .bind(success)
        .bind(&error)
        .execute(&self.pool)
        .await
        {
            tracing::error!(
                company_id = %company_id,
                integration = %target.integration,
                error = %e,
                "Failed to log webhook delivery"
            );
        }

        if success {
            tracing::info!(
                company_id = %company_id,
                integration = %target.integration,
                event = %event,
                "Webhook delivered"
            );
            // Zero-cost usage entry so delivery activity shows up in the
            // tenant's usage history
            let entry = UsageEntry::new(company_id, "webhook", 0.0, 0)
                .description(format!("Webhook delivery ({})", event))
                .metadata(json!({
                    "integration": target.integration,
                    "event_type": event.as_str(),
                }));
            if let Err(e) = self.recorder.record(entry).await {
                tracing::warn!(
                    company_id = %company_id,
                    error = %e,
                    "Failed to meter webhook delivery"
                );
            }
        } else {
            tracing::warn!(
                company_id = %company_id,
                integration = %target.integration,
                event = %event,
                status_code = ?status_code,
                error = ?error,
                "Webhook delivery failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::InvoicePaid.as_str(), "invoice.paid");
        assert_eq!(EventKind::MediaGenerated.as_str(), "media.generated");
        assert_eq!(EventKind::ClientCreated.to_string(), "client.created");
    }

    #[test]
    fn test_subscription_filtering() {
        let subscribed = vec!["invoice.paid".to_string(), "job.completed".to_string()];
        assert!(is_subscribed(&subscribed, "invoice.paid"));
        assert!(!is_subscribed(&subscribed, "invoice.created"));
        assert!(!is_subscribed(&[], "invoice.paid"));
    }
}
