//! Selection of a provider client for a request.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;

use super::anthropic::AnthropicProvider;
use super::cohere::CohereProvider;
use super::gemini::GeminiProvider;
use super::http::{Endpoint, build_client};
use super::openai::OpenAiProvider;
use super::CompletionProvider;
use crate::api::models::process::LlmProvider;
use crate::config::{Config, ProvidersConfig};
use crate::errors::{Error, Result};

/// Builds provider clients from configuration.
///
/// The registry only holds configuration and a pooled HTTP client; a fresh provider client is
/// created for each call to [`ProviderRegistry::get`]. Clients registered with
/// [`ProviderRegistry::with_provider`] take precedence over configured ones.
#[derive(Clone)]
pub struct ProviderRegistry {
    client: Client,
    providers: ProvidersConfig,
    default_provider: LlmProvider,
    overrides: HashMap<LlmProvider, Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = build_client(Some(config.request_timeout))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            providers: config.providers.clone(),
            default_provider: config.default_provider,
            overrides: HashMap::new(),
        }
    }

    /// Register a client for a provider, replacing the configured one.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.overrides.insert(provider.provider(), provider);
        self
    }

    pub fn default_provider(&self) -> LlmProvider {
        self.default_provider
    }

    /// Resolve an optional per-request selector against the default.
    pub fn resolve(&self, requested: Option<LlmProvider>) -> LlmProvider {
        requested.unwrap_or(self.default_provider)
    }

    pub fn get(&self, provider: LlmProvider) -> Result<Arc<dyn CompletionProvider>> {
        if let Some(client) = self.overrides.get(&provider) {
            return Ok(client.clone());
        }

        let settings = self.providers.get(provider);
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingCredentials { provider })?;

        let endpoint = Endpoint {
            client: self.client.clone(),
            base_url: settings.base_url_or_default(provider),
            api_key,
            model: settings.model_or_default(provider),
        };

        let client: Arc<dyn CompletionProvider> = match provider {
            LlmProvider::OpenAI => Arc::new(OpenAiProvider::new(endpoint)),
            LlmProvider::Anthropic => Arc::new(AnthropicProvider::new(endpoint)),
            LlmProvider::Cohere => Arc::new(CohereProvider::new(endpoint)),
            LlmProvider::Gemini => Arc::new(GeminiProvider::new(endpoint)),
        };
        Ok(client)
    }

    /// Model and credential status of each provider, logged at startup.
    pub fn describe(&self) -> Vec<(LlmProvider, String, bool)> {
        LlmProvider::ALL
            .into_iter()
            .map(|p| {
                let settings = self.providers.get(p);
                (p, settings.model_or_default(p), settings.has_api_key() || self.overrides.contains_key(&p))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticProvider;

    #[test]
    fn test_missing_key_is_reported() {
        let registry = ProviderRegistry::new(&Config::default()).unwrap();
        let err = registry.get(LlmProvider::Cohere).err().unwrap();
        assert!(matches!(err, Error::MissingCredentials { provider: LlmProvider::Cohere }));
    }

    #[test]
    fn test_configured_provider_is_built() {
        let mut config = Config::default();
        config.providers.gemini.api_key = Some("g-key".to_string());
        let registry = ProviderRegistry::new(&config).unwrap();

        let client = registry.get(LlmProvider::Gemini).unwrap();
        assert_eq!(client.provider(), LlmProvider::Gemini);
    }

    #[test]
    fn test_override_takes_precedence() {
        let registry =
            ProviderRegistry::new(&Config::default()).unwrap().with_provider(Arc::new(StaticProvider::titled(LlmProvider::OpenAI, "T", "S")));

        assert!(registry.get(LlmProvider::OpenAI).is_ok());
        assert_eq!(registry.resolve(None), LlmProvider::OpenAI);
        assert_eq!(registry.resolve(Some(LlmProvider::Gemini)), LlmProvider::Gemini);
    }
}
