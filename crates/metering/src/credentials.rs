//! Provider credential resolution
//!
//! Per-tenant stored credentials take precedence over process-wide defaults
//! from the environment. Stored config blobs are validated against a typed
//! per-provider schema at read time; a malformed blob is a configuration
//! error, never a silent fallback.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use jarvishq_shared::Provider;

use crate::error::{MeteringError, MeteringResult};

/// A credential resolved and validated for one provider
#[derive(Debug, Clone)]
pub enum ResolvedCredential {
    OpenAi {
        api_key: String,
    },
    Anthropic {
        api_key: String,
    },
    /// Self-hosted endpoints: remote preferred, local fallback
    Ollama {
        remote_url: Option<String>,
        local_url: String,
    },
}

impl ResolvedCredential {
    pub fn provider(&self) -> Provider {
        match self {
            Self::OpenAi { .. } => Provider::OpenAi,
            Self::Anthropic { .. } => Provider::Anthropic,
            Self::Ollama { .. } => Provider::Ollama,
        }
    }
}

/// Typed schema for a stored SaaS-provider credential blob
#[derive(Debug, Deserialize)]
struct ApiKeyConfig {
    api_key: String,
}

/// Typed schema for a stored self-hosted credential blob
#[derive(Debug, Deserialize)]
struct OllamaConfig {
    base_url: String,
}

/// Process-wide default credentials from the environment
#[derive(Debug, Clone, Default)]
pub struct ProviderDefaults {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub ollama_remote_url: Option<String>,
    pub ollama_local_url: String,
}

impl ProviderDefaults {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            ollama_remote_url: std::env::var("OLLAMA_REMOTE_URL").ok(),
            ollama_local_url: std::env::var("OLLAMA_LOCAL_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }
}

/// Resolves a tenant's credential for a provider
#[derive(Clone)]
pub struct CredentialResolver {
    pool: PgPool,
    defaults: ProviderDefaults,
}

impl CredentialResolver {
    pub fn new(pool: PgPool, defaults: ProviderDefaults) -> Self {
        Self { pool, defaults }
    }

    /// Resolve the credential to use for (company, provider)
    ///
    /// Stored tenant config wins; otherwise the environment default.
    /// Missing both is a `MissingCredentials` error.
    pub async fn resolve(
        &self,
        company_id: Uuid,
        provider: Provider,
    ) -> MeteringResult<ResolvedCredential> {
        let stored: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT config FROM company_credentials WHERE company_id = $1 AND provider = $2",
        )
        .bind(company_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((config,)) = stored {
            return parse_stored_config(provider, config, &self.defaults);
        }

        self.default_credential(provider)
    }

    fn default_credential(&self, provider: Provider) -> MeteringResult<ResolvedCredential> {
        match provider {
            Provider::OpenAi => self
                .defaults
                .openai_api_key
                .clone()
                .map(|api_key| ResolvedCredential::OpenAi { api_key })
                .ok_or_else(|| MeteringError::MissingCredentials("openai".to_string())),
            Provider::Anthropic => self
                .defaults
                .anthropic_api_key
                .clone()
                .map(|api_key| ResolvedCredential::Anthropic { api_key })
                .ok_or_else(|| MeteringError::MissingCredentials("anthropic".to_string())),
            Provider::Ollama => Ok(ResolvedCredential::Ollama {
                remote_url: self.defaults.ollama_remote_url.clone(),
                local_url: self.defaults.ollama_local_url.clone(),
            }),
        }
    }
}

/// Validate a stored config blob against the provider's typed schema
fn parse_stored_config(
    provider: Provider,
    config: serde_json::Value,
    defaults: &ProviderDefaults,
) -> MeteringResult<ResolvedCredential> {
    match provider {
        Provider::OpenAi => {
            let parsed: ApiKeyConfig = serde_json::from_value(config).map_err(|e| {
                MeteringError::Config(format!("invalid stored openai credential: {}", e))
            })?;
            Ok(ResolvedCredential::OpenAi {
                api_key: parsed.api_key,
            })
        }
        Provider::Anthropic => {
            let parsed: ApiKeyConfig = serde_json::from_value(config).map_err(|e| {
                MeteringError::Config(format!("invalid stored anthropic credential: {}", e))
            })?;
            Ok(ResolvedCredential::Anthropic {
                api_key: parsed.api_key,
            })
        }
        Provider::Ollama => {
            let parsed: OllamaConfig = serde_json::from_value(config).map_err(|e| {
                MeteringError::Config(format!("invalid stored ollama credential: {}", e))
            })?;
            // A tenant-configured base URL becomes the remote endpoint; the
            // process-wide local endpoint stays as the fallback.
            Ok(ResolvedCredential::Ollama {
                remote_url: Some(parsed.base_url),
                local_url: defaults.ollama_local_url.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> ProviderDefaults {
        ProviderDefaults {
            openai_api_key: Some("sk-default".to_string()),
            anthropic_api_key: None,
            ollama_remote_url: Some("http://gpu-box:11434".to_string()),
            ollama_local_url: "http://localhost:11434".to_string(),
        }
    }

    #[test]
    fn test_stored_api_key_parses() {
        let cred = parse_stored_config(
            Provider::OpenAi,
            json!({"api_key": "sk-tenant"}),
            &defaults(),
        )
        .unwrap();
        match cred {
            ResolvedCredential::OpenAi { api_key } => assert_eq!(api_key, "sk-tenant"),
            other => panic!("unexpected credential: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_blob_is_config_error() {
        let err = parse_stored_config(
            Provider::Anthropic,
            json!({"key_material": "nope"}),
            &defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, MeteringError::Config(_)));
    }

    #[test]
    fn test_stored_ollama_url_becomes_remote() {
        let cred = parse_stored_config(
            Provider::Ollama,
            json!({"base_url": "http://tenant-gpu:11434"}),
            &defaults(),
        )
        .unwrap();
        match cred {
            ResolvedCredential::Ollama {
                remote_url,
                local_url,
            } => {
                assert_eq!(remote_url.as_deref(), Some("http://tenant-gpu:11434"));
                assert_eq!(local_url, "http://localhost:11434");
            }
            other => panic!("unexpected credential: {:?}", other),
        }
    }
}
