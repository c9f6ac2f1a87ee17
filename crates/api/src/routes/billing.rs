//! Billing endpoints: invoice checkout and the Stripe webhook

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use jarvishq_billing::{BillingService, InvoiceCheckoutRequest, SettlementEvent};

use crate::error::{ApiError, ApiResult};
use crate::notify::EventKind;
use crate::state::AppState;

fn billing_service(state: &AppState) -> ApiResult<&Arc<BillingService>> {
    state
        .billing
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing is not configured".to_string()))
}

/// POST /api/v1/billing/checkout
pub async fn checkout(
    State(state): State<AppState>,
    payload: Result<Json<InvoiceCheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    // Missing/malformed fields are a 400, not axum's default 422
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let billing = billing_service(&state)?;

    let response = billing.checkout.create_invoice_checkout(&request).await?;

    Ok(Json(json!({
        "session_id": response.session_id,
        "url": response.url,
    })))
}

/// POST /api/v1/billing/webhook
///
/// Takes the raw body so the signature is verified over exactly the bytes
/// Stripe signed, before any JSON parsing.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let billing = billing_service(&state)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    billing.verify_webhook(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Stripe webhook signature verification failed");
        ApiError::from(e)
    })?;

    let Some(event) = SettlementEvent::from_payload(&body)? else {
        // Verified but not a settlement event; acknowledge so Stripe does
        // not keep retrying.
        return Ok(Json(json!({"received": true})));
    };

    tracing::info!(
        event_id = %event.event_id,
        invoice_id = %event.invoice_id,
        "Settlement event verified"
    );

    let outcome = billing.settler.settle(&event).await?;

    if outcome.settled() {
        state
            .notifier
            .dispatch(
                outcome.company_id,
                EventKind::InvoicePaid,
                json!({
                    "invoice_id": outcome.invoice_id,
                    "transaction_id": outcome.transaction_id,
                    "amount": outcome.amount,
                }),
            )
            .await;
    }

    Ok(Json(json!({
        "success": true,
        "invoice_id": outcome.invoice_id,
        "transaction_id": outcome.transaction_id,
        "company_id": outcome.company_id,
    })))
}
