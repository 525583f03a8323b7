//! Provider API keys held in AWS Secrets Manager.
//!
//! The secret is a JSON object keyed like the environment, e.g.
//! `{"OPENAI_API_KEY": "sk-...", "GEMINI_API_KEY": "..."}`. It is read once at startup and only
//! fills keys that configuration left unset.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::Config;

/// A source of named secret documents.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret and parse it as a flat JSON object of strings.
    async fn fetch(&self, secret_name: &str) -> anyhow::Result<HashMap<String, String>>;
}

pub struct AwsSecretsManager {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManager {
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: aws_sdk_secretsmanager::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn fetch(&self, secret_name: &str) -> anyhow::Result<HashMap<String, String>> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .with_context(|| format!("failed to read secret {secret_name}"))?;
        let raw = output
            .secret_string()
            .with_context(|| format!("secret {secret_name} has no string value"))?;
        parse_secret(raw).with_context(|| format!("secret {secret_name} is not a JSON object"))
    }
}

/// Keep the string-valued entries of a JSON object.
fn parse_secret(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}

/// Fill API keys missing from `config` using the configured secret store, when enabled.
///
/// Lookup failures are logged and leave the configuration unchanged; requests for a provider
/// without a key then fail individually.
pub async fn resolve_api_keys(config: &mut Config) {
    if !config.secrets.enabled() {
        debug!("Secret store lookup disabled");
        return;
    }
    if config.providers.missing_keys().is_empty() {
        debug!("All provider API keys configured, skipping secret store");
        return;
    }

    let store = AwsSecretsManager::new(&config.secrets.region).await;
    fill_missing_keys(config, &store).await;
}

/// Fill missing API keys from `store`. Returns the number of keys filled.
pub async fn fill_missing_keys(config: &mut Config, store: &dyn SecretStore) -> usize {
    let missing = config.providers.missing_keys();
    if missing.is_empty() {
        return 0;
    }

    let secret_name = config.secrets.secret_name.clone();
    let secrets = match store.fetch(&secret_name).await {
        Ok(secrets) => secrets,
        Err(e) => {
            warn!(secret_name, "Could not load provider API keys from the secret store: {:#}", e);
            return 0;
        }
    };

    let mut filled = 0;
    for provider in missing {
        if let Some(key) = secrets.get(&provider.api_key_name()).filter(|key| !key.is_empty()) {
            config.providers.get_mut(provider).api_key = Some(key.clone());
            filled += 1;
        }
    }

    info!(secret_name, filled, "Loaded provider API keys from the secret store");
    filled
}
