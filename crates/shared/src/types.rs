//! Core domain types shared across the Jarvis HQ platform

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// LLM provider identifier
///
/// Ollama is the self-hosted provider: generation through it is always
/// zero-cost, but availability depends on the remote/local endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    /// Whether this provider reports costs (Ollama is always free)
    pub fn is_metered(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant organization ("company" in the portal UI)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    /// Monthly AI budget in dollars; 0 (or negative) means unlimited
    pub monthly_budget: f64,
    /// Current-month spend in dollars, mutated only by the usage recorder
    /// and the worker's monthly reset
    pub current_spend: f64,
    pub stripe_customer_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Invoice status lifecycle
///
/// This subsystem only ever performs the `open`/`overdue` -> `paid`
/// transition; every other transition is owned by the invoicing UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Void => "void",
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "open" => Ok(Self::Open),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "void" => Ok(Self::Void),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

/// An invoice issued to a company
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: f64,
    pub status: String,
    /// Date granularity, set exactly once by the settler
    pub paid_date: Option<Date>,
    pub due_date: Option<Date>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Immutable settlement record linking an invoice to a payment
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub created_at: OffsetDateTime,
}

/// Append-only usage ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub service: String,
    pub agent_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub description: String,
    pub cost: f64,
    pub tokens_used: i32,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}

/// Per-tenant outbound webhook configuration for one named integration
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookIntegration {
    pub id: Uuid,
    pub company_id: Uuid,
    /// Integration name, e.g. "zapier" or "tasker"
    pub integration: String,
    pub enabled: bool,
    pub target_url: String,
    /// Optional bearer credential sent as `Authorization: Bearer ...`
    pub auth_token: Option<String>,
    pub subscribed_events: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
