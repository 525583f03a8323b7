//! Test utilities for integration testing (available with `test-utils` feature).

use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};
use crate::llm::analysis::LlmAnalysis;
use crate::llm::http::{Endpoint, build_client};
use crate::llm::{CompletionProvider, CompletionRequest, ProviderRegistry};
use crate::AppState;

/// Endpoint pointed at a mock server, authenticated with the key `sk-test`.
pub fn test_endpoint(base_url: &str, model: &str) -> Endpoint {
    Endpoint {
        client: build_client(Some(Duration::from_secs(5))).expect("Failed to build test HTTP client"),
        base_url: Url::parse(base_url).expect("Invalid test base URL"),
        api_key: "sk-test".to_string(),
        model: model.to_string(),
    }
}

/// A provider that answers every request with a fixed outcome and remembers what it was asked.
#[derive(Clone)]
pub struct StaticProvider {
    provider: LlmProvider,
    outcome: std::result::Result<LlmAnalysis, String>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl StaticProvider {
    pub fn new(provider: LlmProvider, analysis: LlmAnalysis) -> Self {
        Self {
            provider,
            outcome: Ok(analysis),
            requests: Arc::default(),
        }
    }

    /// Answers with only a title and a summary.
    pub fn titled(provider: LlmProvider, title: &str, summary: &str) -> Self {
        Self::new(
            provider,
            LlmAnalysis {
                title: Some(title.to_string()),
                summary: Some(summary.to_string()),
                ..Default::default()
            },
        )
    }

    /// Fails every request with a provider error carrying `message`.
    pub fn failing(provider: LlmProvider, message: &str) -> Self {
        Self {
            provider,
            outcome: Err(message.to_string()),
            requests: Arc::default(),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }
}

#[async_trait]
impl CompletionProvider for StaticProvider {
    fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis> {
        self.requests.lock().expect("requests lock poisoned").push(request.clone());
        self.outcome.clone().map_err(|message| Error::provider(self.provider, message))
    }
}

/// Configuration that never reaches a secret store.
pub fn create_test_config() -> crate::config::Config {
    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secrets: crate::config::SecretsConfig {
            mode: crate::config::SecretsMode::Never,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Application state whose registry serves `providers` instead of real provider clients.
pub fn create_test_state(providers: Vec<StaticProvider>) -> AppState {
    let config = create_test_config();
    let registry = providers.into_iter().fold(
        ProviderRegistry::new(&config).expect("Failed to create provider registry"),
        |registry, provider| registry.with_provider(Arc::new(provider)),
    );
    AppState::builder().config(config).registry(registry).build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}
