//! Stripe Checkout sessions for invoice payment

use serde::Deserialize;
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CustomerId,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Request to create a checkout session for an invoice
///
/// Accepts both snake_case and the portal's camelCase keys.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceCheckoutRequest {
    #[serde(alias = "companyId")]
    pub company_id: Uuid,
    #[serde(alias = "invoiceId")]
    pub invoice_id: Uuid,
    /// Stripe customer to attach; falls back to the company's stored
    /// customer when absent
    #[serde(alias = "customerId")]
    pub customer_id: Option<String>,
    /// Caller's expected amount in dollars, cross-checked against the
    /// invoice. The invoice row stays authoritative.
    pub amount: Option<f64>,
    pub description: Option<String>,
    #[serde(alias = "successUrl")]
    pub success_url: Option<String>,
    #[serde(alias = "cancelUrl")]
    pub cancel_url: Option<String>,
}

/// Checkout service for creating one-off invoice payment sessions
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a payment-mode checkout session for an unpaid invoice
    ///
    /// The session metadata carries `invoice_id` and `company_id`, which is
    /// how the completed-checkout webhook finds its way back to the invoice.
    pub async fn create_invoice_checkout(
        &self,
        request: &InvoiceCheckoutRequest,
    ) -> BillingResult<CheckoutResponse> {
        let invoice: Option<(Uuid, f64, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT i.company_id, i.amount, i.status, c.stripe_customer_id
            FROM invoices i
            JOIN companies c ON c.id = i.company_id
            WHERE i.id = $1
            "#,
        )
        .bind(request.invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((owner_id, amount, status, stored_customer_id)) = invoice else {
            return Err(BillingError::InvoiceNotFound(request.invoice_id));
        };

        if owner_id != request.company_id {
            tracing::warn!(
                company_id = %request.company_id,
                invoice_id = %request.invoice_id,
                owner_company = %owner_id,
                "Checkout requested for an invoice the company does not own"
            );
            return Err(BillingError::InvoiceOwnershipMismatch {
                invoice_id: request.invoice_id,
                company_id: request.company_id,
            });
        }

        if status == "paid" {
            return Err(BillingError::InvoiceAlreadyPaid(request.invoice_id));
        }

        if amount <= 0.0 {
            return Err(BillingError::InvalidInput(format!(
                "invoice {} has non-positive amount {}",
                request.invoice_id, amount
            )));
        }

        if let Some(claimed) = request.amount {
            if (claimed - amount).abs() > 0.005 {
                return Err(BillingError::InvalidInput(format!(
                    "requested amount {} does not match invoice amount {}",
                    claimed, amount
                )));
            }
        }

        let customer = match request.customer_id.as_deref().or(stored_customer_id.as_deref()) {
            Some(raw) => Some(raw.parse::<CustomerId>().map_err(|e| {
                BillingError::StripeApi(format!("Invalid customer ID: {}", e))
            })?),
            None => None,
        };

        let base_url = &self.stripe.config().app_base_url;
        let success_url = request.success_url.clone().unwrap_or_else(|| {
            format!(
                "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
                base_url
            )
        });
        let cancel_url = request
            .cancel_url
            .clone()
            .unwrap_or_else(|| format!("{}/billing/invoices/{}", base_url, request.invoice_id));

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("invoice_id".to_string(), request.invoice_id.to_string());
        metadata.insert("company_id".to_string(), request.company_id.to_string());

        let product_name = request
            .description
            .clone()
            .unwrap_or_else(|| format!("Invoice {}", request.invoice_id));

        let amount_cents = (amount * 100.0).round() as i64;
        let line_item = CreateCheckoutSessionLineItems {
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: stripe::Currency::USD,
                unit_amount: Some(amount_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: product_name,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        };

        let params = CreateCheckoutSession {
            customer,
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![line_item]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            company_id = %request.company_id,
            invoice_id = %request.invoice_id,
            session_id = %session.id,
            amount_cents = amount_cents,
            "Created invoice checkout session"
        );

        Ok(session.into())
    }
}

/// Response for creating a checkout session
#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_portal_camelcase_keys() {
        let company_id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "customerId": "cus_abc123",
            "invoiceId": invoice_id,
            "companyId": company_id,
            "amount": 125.50,
            "description": "September retainer",
            "successUrl": "https://portal.example/billing/success",
            "cancelUrl": "https://portal.example/billing/cancel",
        });
        let request: InvoiceCheckoutRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.company_id, company_id);
        assert_eq!(request.invoice_id, invoice_id);
        assert_eq!(request.customer_id.as_deref(), Some("cus_abc123"));
        assert_eq!(request.amount, Some(125.50));
        assert_eq!(
            request.success_url.as_deref(),
            Some("https://portal.example/billing/success")
        );
    }

    #[test]
    fn test_request_accepts_snake_case_keys() {
        let raw = serde_json::json!({
            "company_id": Uuid::new_v4(),
            "invoice_id": Uuid::new_v4(),
        });
        let request: InvoiceCheckoutRequest = serde_json::from_value(raw).unwrap();
        assert!(request.customer_id.is_none());
        assert!(request.amount.is_none());
    }
}
