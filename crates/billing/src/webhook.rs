//! Stripe webhook signature verification and event extraction
//!
//! Verification is done against the raw request body, before any JSON
//! parsing. The `Stripe-Signature` header carries a unix timestamp and one
//! or more HMAC-SHA256 signatures; the signed message is `"{t}.{body}"`.
//! Comparison is constant-time so signature checking leaks no timing
//! information about the expected value.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Parsed `Stripe-Signature` header
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    /// All `v1` signatures present; Stripe sends more than one during
    /// secret rotation and any single match is sufficient.
    signatures: Vec<String>,
}

impl SignatureHeader {
    fn parse(header: &str) -> BillingResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for pair in header.split(',') {
            let mut parts = pair.trim().splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some("t"), Some(value)) => {
                    timestamp = value.parse::<i64>().ok();
                }
                (Some("v1"), Some(value)) => {
                    signatures.push(value.to_string());
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
        if signatures.is_empty() {
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verify a webhook payload against its `Stripe-Signature` header
///
/// `tolerance` bounds the age of the signed timestamp; `None` skips the
/// freshness check entirely. Any failure mode (missing parts, bad hex,
/// stale timestamp, signature mismatch) collapses into the same invalid
/// signature error so callers reject with one uniform 400.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    webhook_secret: &str,
    tolerance: Option<Duration>,
) -> BillingResult<()> {
    let header = SignatureHeader::parse(signature_header)?;

    if let Some(tolerance) = tolerance {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BillingError::Internal(e.to_string()))?
            .as_secs() as i64;
        let age = now - header.timestamp;
        if age < 0 || age > tolerance.as_secs() as i64 {
            tracing::warn!(
                signed_timestamp = header.timestamp,
                age_secs = age,
                "Webhook timestamp outside tolerance window"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }
    }

    let signed_payload = format!("{}.{}", header.timestamp, payload);
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| BillingError::Internal(e.to_string()))?;
    mac.update(signed_payload.as_bytes());
    let expected = mac.finalize().into_bytes();

    for candidate in &header.signatures {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        if candidate_bytes.ct_eq(expected.as_slice()).into() {
            return Ok(());
        }
    }

    Err(BillingError::WebhookSignatureInvalid)
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    invoice_id: Option<String>,
    company_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
    #[serde(default)]
    amount_total: Option<i64>,
}

/// A `checkout.session.completed` event reduced to the fields settlement
/// needs
#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub event_id: String,
    pub session_id: String,
    pub invoice_id: Uuid,
    /// Company the checkout session was created for, when the metadata
    /// carried it. Used as an ownership cross-check, not as the source of
    /// truth.
    pub company_id: Option<Uuid>,
    /// Amount paid in dollars, from the session's `amount_total` (cents)
    pub amount_paid: Option<f64>,
}

impl SettlementEvent {
    /// Extract a settlement event from a verified webhook body
    ///
    /// Returns `Ok(None)` for event types this pipeline does not settle;
    /// those are acknowledged upstream without further work. A
    /// `checkout.session.completed` event missing its `invoice_id` metadata
    /// is malformed, not ignorable.
    pub fn from_payload(payload: &str) -> BillingResult<Option<Self>> {
        let envelope: WebhookEnvelope = serde_json::from_str(payload)
            .map_err(|e| BillingError::WebhookMalformed(e.to_string()))?;

        if envelope.event_type != "checkout.session.completed" {
            tracing::debug!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                "Ignoring non-settlement webhook event"
            );
            return Ok(None);
        }

        let session: CheckoutSessionObject = serde_json::from_value(envelope.data.object)
            .map_err(|e| BillingError::WebhookMalformed(e.to_string()))?;

        let metadata = session.metadata.unwrap_or_default();
        let invoice_id = metadata
            .invoice_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| {
                BillingError::WebhookMalformed(
                    "checkout.session.completed missing invoice_id metadata".to_string(),
                )
            })?;
        let company_id = metadata
            .company_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok());

        Ok(Some(Self {
            event_id: envelope.id,
            session_id: session.id,
            invoice_id,
            company_id,
            amount_paid: session.amount_total.map(|cents| cents as f64 / 100.0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"id":"evt_1","type":"ping"}"#;
        let ts = now_secs();
        let header = format!("t={},v1={}", ts, sign(payload, ts, SECRET));
        assert!(verify_signature(payload, &header, SECRET, None).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = r#"{"id":"evt_1","type":"ping"}"#;
        let ts = now_secs();
        let header = format!("t={},v1={}", ts, sign(payload, ts, "whsec_other"));
        assert!(matches!(
            verify_signature(payload, &header, SECRET, None),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let payload = r#"{"id":"evt_1","type":"ping"}"#;
        let ts = now_secs();
        let header = format!("t={},v1={}", ts, sign(payload, ts, SECRET));
        let tampered = r#"{"id":"evt_1","type":"pong"}"#;
        assert!(verify_signature(tampered, &header, SECRET, None).is_err());
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let payload = "{}";
        let header = format!("v1={}", sign(payload, 0, SECRET));
        assert!(verify_signature(payload, &header, SECRET, None).is_err());
    }

    #[test]
    fn test_any_matching_v1_suffices() {
        let payload = "{}";
        let ts = now_secs();
        let header = format!("t={},v1={},v1={}", ts, "00".repeat(32), sign(payload, ts, SECRET));
        assert!(verify_signature(payload, &header, SECRET, None).is_ok());
    }

    #[test]
    fn test_stale_timestamp_rejected_with_tolerance() {
        let payload = "{}";
        let ts = now_secs() - 3600;
        let header = format!("t={},v1={}", ts, sign(payload, ts, SECRET));
        assert!(verify_signature(payload, &header, SECRET, Some(Duration::from_secs(300))).is_err());
        // Without a tolerance the same signature is fine
        assert!(verify_signature(payload, &header, SECRET, None).is_ok());
    }

    #[test]
    fn test_settlement_event_extraction() {
        let invoice_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "amount_total": 12550,
                    "metadata": {
                        "invoice_id": invoice_id.to_string(),
                        "company_id": company_id.to_string(),
                    }
                }
            }
        })
        .to_string();

        let event = SettlementEvent::from_payload(&payload).unwrap().unwrap();
        assert_eq!(event.event_id, "evt_123");
        assert_eq!(event.session_id, "cs_test_abc");
        assert_eq!(event.invoice_id, invoice_id);
        assert_eq!(event.company_id, Some(company_id));
        assert!((event.amount_paid.unwrap() - 125.50).abs() < 1e-9);
    }

    #[test]
    fn test_other_event_types_ignored() {
        let payload = r#"{"id":"evt_9","type":"invoice.payment_failed","data":{"object":{}}}"#;
        assert!(SettlementEvent::from_payload(payload).unwrap().is_none());
    }

    #[test]
    fn test_settlement_event_without_invoice_metadata_is_malformed() {
        let payload = r#"{
            "id": "evt_10",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_no_meta"}}
        }"#;
        assert!(matches!(
            SettlementEvent::from_payload(payload),
            Err(BillingError::WebhookMalformed(_))
        ));
    }
}
