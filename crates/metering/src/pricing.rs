//! Per-provider model pricing and cost estimation
//!
//! Pricing is a fixed linear formula per (provider, model) pair:
//! `cost = input_rate * input_tokens/1000 + output_rate * output_tokens/1000`.
//! The self-hosted provider is always free.

use jarvishq_shared::Provider;

/// Per-1000-token rates in dollars for one model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRates {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelRates {
    const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub const ZERO: ModelRates = ModelRates::new(0.0, 0.0);
}

/// Cost estimate for a generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    pub total_tokens: u32,
}

/// OpenAI pricing table (per 1K tokens, USD)
const OPENAI_RATES: &[(&str, ModelRates)] = &[
    ("gpt-4o", ModelRates::new(0.0025, 0.01)),
    ("gpt-4o-mini", ModelRates::new(0.000_15, 0.0006)),
    ("gpt-4-turbo", ModelRates::new(0.01, 0.03)),
    ("gpt-3.5-turbo", ModelRates::new(0.0005, 0.0015)),
];

/// Anthropic pricing table (per 1K tokens, USD)
const ANTHROPIC_RATES: &[(&str, ModelRates)] = &[
    ("claude-3-5-sonnet-20241022", ModelRates::new(0.003, 0.015)),
    ("claude-3-5-haiku-20241022", ModelRates::new(0.0008, 0.004)),
    ("claude-3-opus-20240229", ModelRates::new(0.015, 0.075)),
];

/// Default model used when a request omits one
pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "gpt-4o-mini",
        Provider::Anthropic => "claude-3-5-sonnet-20241022",
        Provider::Ollama => "llama3.1",
    }
}

/// Look up the rates for a (provider, model) pair
///
/// Unknown models fall back to the provider's most expensive listed model so
/// pre-flight estimates err on the safe side of the budget check.
pub fn rates_for(provider: Provider, model: &str) -> ModelRates {
    let table = match provider {
        Provider::OpenAi => OPENAI_RATES,
        Provider::Anthropic => ANTHROPIC_RATES,
        Provider::Ollama => return ModelRates::ZERO,
    };

    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, rates)| *rates)
        .unwrap_or_else(|| {
            let fallback = table
                .iter()
                .map(|(_, r)| *r)
                .fold(ModelRates::ZERO, |a, b| {
                    if b.input_per_1k + b.output_per_1k > a.input_per_1k + a.output_per_1k {
                        b
                    } else {
                        a
                    }
                });
            tracing::debug!(
                provider = %provider,
                model = %model,
                "Unknown model, using provider's highest listed rates for estimation"
            );
            fallback
        })
}

/// Compute the cost of a call given rates and token counts
pub fn cost(rates: ModelRates, input_tokens: u32, output_tokens: u32) -> f64 {
    rates.input_per_1k * f64::from(input_tokens) / 1000.0
        + rates.output_per_1k * f64::from(output_tokens) / 1000.0
}

/// Estimate cost and total tokens for a (provider, model, tokens) triple
pub fn estimate(
    provider: Provider,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> CostEstimate {
    let rates = rates_for(provider, model);
    CostEstimate {
        cost: cost(rates, input_tokens, output_tokens),
        total_tokens: input_tokens + output_tokens,
    }
}

/// Rough pre-flight token approximation: ceil(chars / 4)
///
/// Only used for the budget guard's estimate before the true count is known;
/// final billing always uses provider-reported usage when available.
pub fn approx_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_cost_formula() {
        let rates = ModelRates::new(0.003, 0.015);
        // 2000 input + 1000 output
        let c = cost(rates, 2000, 1000);
        assert!((c - (0.006 + 0.015)).abs() < 1e-12);
    }

    #[test]
    fn test_ollama_is_always_free() {
        let est = estimate(Provider::Ollama, "llama3.1", 50_000, 50_000);
        assert_eq!(est.cost, 0.0);
        assert_eq!(est.total_tokens, 100_000);
    }

    #[test]
    fn test_known_model_rates() {
        let rates = rates_for(Provider::OpenAi, "gpt-4o");
        assert_eq!(rates.input_per_1k, 0.0025);
        assert_eq!(rates.output_per_1k, 0.01);
    }

    #[test]
    fn test_unknown_model_uses_most_expensive_fallback() {
        let rates = rates_for(Provider::Anthropic, "claude-next");
        // claude-3-opus is the priciest listed Anthropic model
        assert_eq!(rates.input_per_1k, 0.015);
        assert_eq!(rates.output_per_1k, 0.075);
    }

    #[test]
    fn test_approx_tokens_rounds_up() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abc"), 1);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
        assert_eq!(approx_tokens(&"x".repeat(4000)), 1000);
    }
}
