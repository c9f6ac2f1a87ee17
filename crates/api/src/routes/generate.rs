//! AI generation endpoint
//!
//! The full metered pipeline for one request, in fixed order: resolve
//! credentials, estimate cost, budget check, provider call, usage recording.
//! Recording failure after a successful generation is logged but does not
//! fail the response; the content was already produced and paid for.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jarvishq_metering::{
    approx_tokens, cost, default_model, estimate, rates_for, BudgetDecision, GenerationRequest,
    UsageEntry,
};
use jarvishq_shared::Provider;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body, accepting both snake_case and the portal's camelCase keys
/// (`tenantId`, `systemPrompt`, ...)
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(alias = "tenantId", alias = "companyId")]
    pub company_id: Uuid,
    pub input: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(alias = "agentId")]
    pub agent_id: Option<Uuid>,
    #[serde(alias = "agentName")]
    pub agent_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub content: String,
    pub usage: UsageBody,
    pub budget_status: BudgetStatusBody,
}

#[derive(Debug, Serialize)]
pub struct UsageBody {
    pub tokens_used: u32,
    pub cost: f64,
    pub provider: String,
    pub model: String,
    /// False when token counts came from the char/4 approximation
    pub usage_reported: bool,
}

#[derive(Debug, Serialize)]
pub struct BudgetStatusBody {
    pub current_spend: f64,
    pub budget_limit: f64,
    pub percentage_used: f64,
}

fn percentage_used(current_spend: f64, budget_limit: f64) -> f64 {
    if budget_limit > 0.0 {
        (current_spend / budget_limit) * 100.0
    } else {
        0.0
    }
}

/// POST /api/v1/ai/generate
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<GenerateResponse>> {
    // Missing/malformed fields are a 400, not axum's default 422
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if request.input.trim().is_empty() {
        return Err(ApiError::BadRequest("input must not be empty".to_string()));
    }

    let provider: Provider = match &request.provider {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("unknown provider '{}'", raw)))?,
        None => Provider::OpenAi,
    };
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| default_model(provider).to_string());

    let credential = state
        .metering
        .credentials
        .resolve(request.company_id, provider)
        .await?;

    // Pre-flight estimate: approximate the input and assume a response of
    // similar size. Final billing uses provider-reported usage.
    let input_tokens = approx_tokens(&request.input)
        + request
            .system_prompt
            .as_deref()
            .map(approx_tokens)
            .unwrap_or(0);
    let pre_flight = estimate(provider, &model, input_tokens, input_tokens);

    let decision = state
        .metering
        .budget
        .check(request.company_id, pre_flight.cost)
        .await?;

    let (spend_before, budget_limit) = match decision {
        BudgetDecision::Allowed {
            current_spend,
            budget_limit,
            ..
        } => (current_spend, budget_limit),
        BudgetDecision::Denied {
            current_spend,
            budget_limit,
            estimated_cost,
        } => {
            return Err(ApiError::BudgetExceeded {
                current_spend,
                budget_limit,
                estimated_cost,
            });
        }
    };

    let generation = state
        .metering
        .invoker
        .generate(
            &credential,
            &GenerationRequest {
                model: model.clone(),
                input: request.input.clone(),
                system_prompt: request.system_prompt.clone(),
            },
        )
        .await?;

    let actual_cost = cost(
        rates_for(provider, &model),
        generation.input_tokens,
        generation.output_tokens,
    );
    let tokens_used = generation.total_tokens();

    let entry = UsageEntry::new(
        request.company_id,
        provider.as_str(),
        actual_cost,
        i32::try_from(tokens_used).unwrap_or(i32::MAX),
    )
    .agent(request.agent_id, request.agent_name.clone())
    .description(format!("AI generation ({})", model))
    .metadata(serde_json::json!({
        "model": model,
        "input_tokens": generation.input_tokens,
        "output_tokens": generation.output_tokens,
        "usage_reported": generation.usage_reported,
    }));

    // The content already exists and the provider already charged for it, so
    // a recording failure must not turn into a failed response.
    let recorded_spend = match state.metering.recorder.record(entry).await {
        Ok(_) => Some(spend_before + actual_cost),
        Err(e) => {
            tracing::error!(
                company_id = %request.company_id,
                cost = actual_cost,
                error = %e,
                "Usage recording failed after successful generation"
            );
            None
        }
    };

    let current_spend = recorded_spend.unwrap_or(spend_before);

    Ok(Json(GenerateResponse {
        success: true,
        content: generation.content,
        usage: UsageBody {
            tokens_used,
            cost: actual_cost,
            provider: provider.as_str().to_string(),
            model,
            usage_reported: generation.usage_reported,
        },
        budget_status: BudgetStatusBody {
            current_spend,
            budget_limit,
            percentage_used: percentage_used(current_spend, budget_limit),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_used() {
        assert_eq!(percentage_used(50.0, 100.0), 50.0);
        assert_eq!(percentage_used(0.0, 100.0), 0.0);
        // Unlimited budgets report zero utilization
        assert_eq!(percentage_used(500.0, 0.0), 0.0);
    }

    #[test]
    fn test_request_deserializes_with_optional_fields() {
        let raw = serde_json::json!({
            "company_id": Uuid::new_v4(),
            "input": "draft a follow-up email",
        });
        let request: GenerateRequest = serde_json::from_value(raw).unwrap();
        assert!(request.provider.is_none());
        assert!(request.model.is_none());
        assert!(request.agent_id.is_none());
    }

    #[test]
    fn test_request_accepts_portal_camelcase_keys() {
        let tenant_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "tenantId": tenant_id,
            "agentId": agent_id,
            "agentName": "drafting-agent",
            "input": "draft a follow-up email",
            "provider": "anthropic",
            "model": "claude-3-5-sonnet-20241022",
            "systemPrompt": "be concise",
        });
        let request: GenerateRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.company_id, tenant_id);
        assert_eq!(request.agent_id, Some(agent_id));
        assert_eq!(request.agent_name.as_deref(), Some("drafting-agent"));
        assert_eq!(request.system_prompt.as_deref(), Some("be concise"));
    }
}
