//! Provider invocation
//!
//! Performs the actual metered generation call against a resolved credential
//! and returns the content plus provider-reported token usage. The
//! self-hosted provider gets a remote-then-local health-checked fallback; a
//! failed call is reported upward, never silently retried.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::credentials::ResolvedCredential;
use crate::error::{MeteringError, MeteringResult};
use crate::pricing::approx_tokens;

/// Bounded liveness probe for self-hosted endpoints
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A generation request after credential/model resolution
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub input: String,
    pub system_prompt: Option<String>,
}

/// Result of a provider call with actual usage
#[derive(Debug, Clone)]
pub struct Generation {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// False when the provider omitted usage and the char/4 approximation
    /// was used instead
    pub usage_reported: bool,
}

impl Generation {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Invokes generation calls against LLM providers
#[derive(Clone)]
pub struct ProviderInvoker {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

impl ProviderInvoker {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Perform the generation call for a resolved credential
    pub async fn generate(
        &self,
        credential: &ResolvedCredential,
        request: &GenerationRequest,
    ) -> MeteringResult<Generation> {
        match credential {
            ResolvedCredential::OpenAi { api_key } => self.generate_openai(api_key, request).await,
            ResolvedCredential::Anthropic { api_key } => {
                self.generate_anthropic(api_key, request).await
            }
            ResolvedCredential::Ollama {
                remote_url,
                local_url,
            } => {
                self.generate_ollama(remote_url.as_deref(), local_url, request)
                    .await
            }
        }
    }

    async fn generate_openai(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> MeteringResult<Generation> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.input}));

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&json!({
                "model": request.model,
                "messages": messages,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MeteringError::Provider(format!(
                "openai returned {}: {}",
                status, body
            )));
        }

        let parsed: OpenAiResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| MeteringError::Provider("openai response had no choices".to_string()))?;

        Ok(match parsed.usage {
            Some(usage) => Generation {
                content,
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                usage_reported: true,
            },
            None => approximate_generation(&request.input, content),
        })
    }

    async fn generate_anthropic(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> MeteringResult<Generation> {
        let mut body = json!({
            "model": request.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": [{"role": "user", "content": request.input}],
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MeteringError::Provider(format!(
                "anthropic returned {}: {}",
                status, body
            )));
        }

        let parsed: AnthropicResponse = response.json().await?;
        let content = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(match parsed.usage {
            Some(usage) => Generation {
                content,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                usage_reported: true,
            },
            None => approximate_generation(&request.input, content),
        })
    }

    /// Self-hosted generation with remote-then-local fallback
    ///
    /// The generation call only ever goes to the first endpoint that passes
    /// its health check; both failing is the distinct offline condition, not
    /// a generic provider error.
    async fn generate_ollama(
        &self,
        remote_url: Option<&str>,
        local_url: &str,
        request: &GenerationRequest,
    ) -> MeteringResult<Generation> {
        let base = match self.pick_live_endpoint(remote_url, local_url).await {
            Some(url) => url,
            None => {
                tracing::warn!(
                    remote_url = ?remote_url,
                    local_url = %local_url,
                    "No self-hosted endpoint passed its health check"
                );
                return Err(MeteringError::ServiceOffline);
            }
        };

        let prompt = match &request.system_prompt {
            Some(system) => format!("{}\n\n{}", system, request.input),
            None => request.input.clone(),
        };

        let response = self
            .http
            .post(format!("{}/api/generate", base))
            .json(&json!({
                "model": request.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MeteringError::Provider(format!(
                "ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: OllamaResponse = response.json().await?;
        Ok(match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(input_tokens), Some(output_tokens)) => Generation {
                content: parsed.response,
                input_tokens,
                output_tokens,
                usage_reported: true,
            },
            _ => approximate_generation(&request.input, parsed.response),
        })
    }

    /// Pick the first endpoint that answers its liveness probe, remote first
    async fn pick_live_endpoint(
        &self,
        remote_url: Option<&str>,
        local_url: &str,
    ) -> Option<String> {
        if let Some(remote) = remote_url {
            if self.endpoint_is_live(remote).await {
                return Some(remote.trim_end_matches('/').to_string());
            }
            tracing::info!(remote_url = %remote, "Remote self-hosted endpoint unreachable, trying local");
        }

        if self.endpoint_is_live(local_url).await {
            return Some(local_url.trim_end_matches('/').to_string());
        }

        None
    }

    async fn endpoint_is_live(&self, base_url: &str) -> bool {
        let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
        match self
            .http
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Build a generation result from the char/4 approximation when the
/// provider reports no usage
fn approximate_generation(input: &str, content: String) -> Generation {
    let input_tokens = approx_tokens(input);
    let output_tokens = approx_tokens(&content);
    Generation {
        content,
        input_tokens,
        output_tokens,
        usage_reported: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_response_parses_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi");
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
    }

    #[test]
    fn test_anthropic_response_joins_blocks() {
        let raw = r#"{
            "content": [{"type": "text", "text": "hel"}, {"type": "text", "text": "lo"}],
            "usage": {"input_tokens": 8, "output_tokens": 2}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let joined: String = parsed.content.into_iter().map(|b| b.text).collect();
        assert_eq!(joined, "hello");
    }

    #[test]
    fn test_ollama_response_without_counts() {
        let raw = r#"{"response": "output text"}"#;
        let parsed: OllamaResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.prompt_eval_count.is_none());
        assert!(parsed.eval_count.is_none());
    }

    #[test]
    fn test_approximation_marks_usage_unreported() {
        let generation = approximate_generation("abcdefgh", "response".to_string());
        assert_eq!(generation.input_tokens, 2);
        assert_eq!(generation.output_tokens, 2);
        assert!(!generation.usage_reported);
    }

    fn ollama_request() -> GenerationRequest {
        GenerationRequest {
            model: "llama3.1".to_string(),
            input: "hello".to_string(),
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_ollama_falls_back_to_local_when_remote_unhealthy() {
        let mut remote = mockito::Server::new_async().await;
        let remote_health = remote
            .mock("GET", "/api/tags")
            .with_status(500)
            .create_async()
            .await;
        // The generation call must never reach the unhealthy remote
        let remote_generate = remote
            .mock("POST", "/api/generate")
            .expect(0)
            .create_async()
            .await;

        let mut local = mockito::Server::new_async().await;
        let local_health = local
            .mock("GET", "/api/tags")
            .with_status(200)
            .create_async()
            .await;
        let local_generate = local
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response":"hi there","prompt_eval_count":4,"eval_count":7}"#)
            .create_async()
            .await;

        let invoker = ProviderInvoker::new(reqwest::Client::new());
        let credential = ResolvedCredential::Ollama {
            remote_url: Some(remote.url()),
            local_url: local.url(),
        };

        let generation = invoker
            .generate(&credential, &ollama_request())
            .await
            .unwrap();

        assert_eq!(generation.content, "hi there");
        assert_eq!(generation.input_tokens, 4);
        assert_eq!(generation.output_tokens, 7);
        assert!(generation.usage_reported);

        remote_health.assert_async().await;
        remote_generate.assert_async().await;
        local_health.assert_async().await;
        local_generate.assert_async().await;
    }

    #[tokio::test]
    async fn test_ollama_both_endpoints_down_is_distinct_offline_error() {
        let mut remote = mockito::Server::new_async().await;
        remote
            .mock("GET", "/api/tags")
            .with_status(503)
            .create_async()
            .await;
        let remote_generate = remote
            .mock("POST", "/api/generate")
            .expect(0)
            .create_async()
            .await;

        let mut local = mockito::Server::new_async().await;
        local
            .mock("GET", "/api/tags")
            .with_status(503)
            .create_async()
            .await;
        let local_generate = local
            .mock("POST", "/api/generate")
            .expect(0)
            .create_async()
            .await;

        let invoker = ProviderInvoker::new(reqwest::Client::new());
        let credential = ResolvedCredential::Ollama {
            remote_url: Some(remote.url()),
            local_url: local.url(),
        };

        let err = invoker
            .generate(&credential, &ollama_request())
            .await
            .unwrap_err();

        assert!(matches!(err, MeteringError::ServiceOffline));
        remote_generate.assert_async().await;
        local_generate.assert_async().await;
    }
}
