//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `DOCPROC_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, skipped if absent)
//! 2. **Environment variables** - Variables prefixed with `DOCPROC_` override YAML values
//! 3. **Provider variables** - The conventional unprefixed names used by deployment tooling:
//!    `DEFAULT_LLM_PROVIDER`, `<PROVIDER>_API_KEY`, `<PROVIDER>_MODEL`, `AWS_REGION` and
//!    `AWS_SECRET_NAME`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCPROC_PROVIDERS__OPENAI__BASE_URL=http://localhost:8080/v1` sets
//! `providers.openai.base_url`.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! DOCPROC_PORT=8080
//!
//! # Pick the provider used when a request does not name one
//! DEFAULT_LLM_PROVIDER=anthropic
//!
//! # Credentials and model overrides
//! ANTHROPIC_API_KEY=sk-ant-...
//! ANTHROPIC_MODEL=claude-3-5-sonnet-latest
//!
//! # Fetch missing keys from Secrets Manager even outside Lambda
//! DOCPROC_SECRETS__MODE=always
//! AWS_SECRET_NAME=docproc/api-keys
//! ```

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::api::models::process::LlmProvider;
use crate::errors::Error;

/// CLI args - config file location and run mode
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCPROC_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Run mode. Defaults to `lambda` inside the Lambda runtime, `serve` elsewhere.
    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve the HTTP API
    Serve,
    /// Poll the Lambda Runtime API for invocations
    Lambda,
}

impl Args {
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| {
            if std::env::var_os(crate::lambda::runtime::RUNTIME_API_ENV).is_some() {
                Mode::Lambda
            } else {
                Mode::Serve
            }
        })
    }
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation, so an empty
/// configuration is valid (though requests fail until a provider API key is available).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Provider used when a request does not specify `llm_provider`
    pub default_provider: LlmProvider,
    /// Timeout for a single provider call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Per-provider credentials, models and endpoints
    pub providers: ProvidersConfig,
    /// Secret store lookup for missing API keys
    pub secrets: SecretsConfig,
    /// CORS settings for the HTTP API
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_provider: LlmProvider::OpenAI,
            request_timeout: Duration::from_secs(120),
            providers: ProvidersConfig::default(),
            secrets: SecretsConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Settings for each supported provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub cohere: ProviderConfig,
    pub gemini: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, provider: LlmProvider) -> &ProviderConfig {
        match provider {
            LlmProvider::OpenAI => &self.openai,
            LlmProvider::Anthropic => &self.anthropic,
            LlmProvider::Cohere => &self.cohere,
            LlmProvider::Gemini => &self.gemini,
        }
    }

    pub fn get_mut(&mut self, provider: LlmProvider) -> &mut ProviderConfig {
        match provider {
            LlmProvider::OpenAI => &mut self.openai,
            LlmProvider::Anthropic => &mut self.anthropic,
            LlmProvider::Cohere => &mut self.cohere,
            LlmProvider::Gemini => &mut self.gemini,
        }
    }

    /// Providers that have no (non-empty) API key configured yet.
    pub fn missing_keys(&self) -> Vec<LlmProvider> {
        LlmProvider::ALL.into_iter().filter(|p| !self.get(*p).has_api_key()).collect()
    }
}

/// Settings for a single provider. Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key (can also come from `<PROVIDER>_API_KEY` or the secret store)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name (can also come from `<PROVIDER>_MODEL`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base URL of the provider API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
}

impl ProviderConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    pub fn model_or_default(&self, provider: LlmProvider) -> String {
        self.model.clone().unwrap_or_else(|| default_model(provider).to_string())
    }

    pub fn base_url_or_default(&self, provider: LlmProvider) -> Url {
        self.base_url.clone().unwrap_or_else(|| default_base_url(provider))
    }
}

/// Model used for a provider when none is configured
pub fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAI => "gpt-4-turbo",
        LlmProvider::Anthropic => "claude-3-opus-20240229",
        LlmProvider::Cohere => "command-r-plus",
        LlmProvider::Gemini => "gemini-pro",
    }
}

/// Public API endpoint for a provider
pub fn default_base_url(provider: LlmProvider) -> Url {
    let url = match provider {
        LlmProvider::OpenAI => "https://api.openai.com/v1/",
        LlmProvider::Anthropic => "https://api.anthropic.com/v1/",
        LlmProvider::Cohere => "https://api.cohere.com/v2/",
        LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/",
    };
    Url::parse(url).expect("default provider URLs are valid")
}

/// When to consult the secret store for missing API keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretsMode {
    /// Only when running inside AWS Lambda (`AWS_EXECUTION_ENV` is set)
    #[default]
    Auto,
    Always,
    Never,
}

/// Secrets Manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    pub mode: SecretsMode,
    /// AWS region of the secret
    pub region: String,
    /// Name or ARN of a JSON secret holding `<PROVIDER>_API_KEY` entries
    pub secret_name: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            mode: SecretsMode::Auto,
            region: "us-east-1".to_string(),
            secret_name: "docproc/api-keys".to_string(),
        }
    }
}

impl SecretsConfig {
    /// Whether the secret store should be consulted in the current environment.
    pub fn enabled(&self) -> bool {
        match self.mode {
            SecretsMode::Always => true,
            SecretsMode::Never => false,
            SecretsMode::Auto => std::env::var_os("AWS_EXECUTION_ENV").is_some(),
        }
    }
}

/// CORS configuration for the HTTP API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: None,
        }
    }
}

/// An allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "validate configuration: request_timeout must be greater than zero".to_string(),
            });
        }

        for provider in LlmProvider::ALL {
            if let Some(model) = &self.providers.get(provider).model
                && model.trim().is_empty()
            {
                return Err(Error::Internal {
                    operation: format!("validate configuration: providers.{provider}.model cannot be empty"),
                });
            }
        }

        if self.secrets.mode != SecretsMode::Never && self.secrets.secret_name.trim().is_empty() {
            return Err(Error::Internal {
                operation: "validate configuration: secrets.secret_name cannot be empty unless secrets.mode is 'never'".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "validate configuration: cors.allowed_origins cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        let mut figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("DOCPROC_").ignore(&["CONFIG"]).split("__"));

        // Unprefixed variables are taken verbatim as strings, and empty values count as unset
        for (var, key) in Self::raw_env_keys() {
            if let Ok(value) = std::env::var(&var)
                && !value.trim().is_empty()
            {
                figment = figment.merge(Serialized::default(&key, value));
            }
        }

        figment
    }

    /// Unprefixed environment variables and the config keys they set, e.g. `OPENAI_API_KEY`.
    fn raw_env_keys() -> Vec<(String, String)> {
        let mut keys = vec![
            ("DEFAULT_LLM_PROVIDER".to_string(), "default_provider".to_string()),
            ("AWS_REGION".to_string(), "secrets.region".to_string()),
            ("AWS_SECRET_NAME".to_string(), "secrets.secret_name".to_string()),
        ];
        for provider in LlmProvider::ALL {
            for field in ["api_key", "model"] {
                keys.push((
                    format!("{}_{}", provider.env_prefix(), field.to_uppercase()),
                    format!("providers.{provider}.{field}"),
                ));
            }
        }
        keys
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(config: &str) -> Args {
        Args {
            config: config.to_string(),
            validate: false,
            mode: None,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 8000);
            assert_eq!(config.default_provider, LlmProvider::OpenAI);
            assert_eq!(config.request_timeout, Duration::from_secs(120));
            assert_eq!(config.secrets.mode, SecretsMode::Auto);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
default_provider: gemini
request_timeout: 45s
providers:
  gemini:
    api_key: g-key
    model: gemini-1.5-pro
  openai:
    base_url: http://localhost:4000/v1/
secrets:
  mode: never
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9000);
            assert_eq!(config.default_provider, LlmProvider::Gemini);
            assert_eq!(config.request_timeout, Duration::from_secs(45));
            assert_eq!(config.providers.gemini.api_key.as_deref(), Some("g-key"));
            assert_eq!(config.providers.gemini.model_or_default(LlmProvider::Gemini), "gemini-1.5-pro");
            assert_eq!(
                config.providers.openai.base_url_or_default(LlmProvider::OpenAI).as_str(),
                "http://localhost:4000/v1/"
            );
            assert_eq!(config.providers.cohere.model_or_default(LlmProvider::Cohere), "command-r-plus");
            assert!(!config.secrets.enabled());
            Ok(())
        });
    }

    #[test]
    fn test_provider_environment_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("DEFAULT_LLM_PROVIDER", "anthropic");
            jail.set_env("ANTHROPIC_API_KEY", "sk-ant-test");
            jail.set_env("ANTHROPIC_MODEL", "claude-3-haiku-20240307");
            jail.set_env("AWS_SECRET_NAME", "prod/llm-keys");
            jail.set_env("DOCPROC_PORT", "8081");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.default_provider, LlmProvider::Anthropic);
            assert_eq!(config.providers.anthropic.api_key.as_deref(), Some("sk-ant-test"));
            assert_eq!(
                config.providers.anthropic.model_or_default(LlmProvider::Anthropic),
                "claude-3-haiku-20240307"
            );
            assert_eq!(config.secrets.secret_name, "prod/llm-keys");
            assert_eq!(config.port, 8081);
            assert!(!config.providers.missing_keys().contains(&LlmProvider::Anthropic));
            Ok(())
        });
    }

    #[test]
    fn test_empty_provider_variables_are_unset() {
        Jail::expect_with(|jail| {
            jail.set_env("OPENAI_MODEL", "");
            jail.set_env("OPENAI_API_KEY", "");
            let config = Config::load(&args("missing.yaml"))?;
            assert_eq!(config.providers.openai.model_or_default(LlmProvider::OpenAI), "gpt-4-turbo");
            assert!(config.providers.missing_keys().contains(&LlmProvider::OpenAI));
            Ok(())
        });
    }

    #[test]
    fn test_numeric_provider_variables_stay_strings() {
        Jail::expect_with(|jail| {
            jail.set_env("COHERE_API_KEY", "1234567890");
            jail.set_env("GEMINI_MODEL", "2");
            let config = Config::load(&args("missing.yaml"))?;
            assert_eq!(config.providers.cohere.api_key.as_deref(), Some("1234567890"));
            assert_eq!(config.providers.gemini.model_or_default(LlmProvider::Gemini), "2");
            Ok(())
        });
    }

    #[test]
    fn test_nested_prefixed_override() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCPROC_PROVIDERS__COHERE__MODEL", "command-r");
            let config = Config::load(&args("missing.yaml"))?;
            assert_eq!(config.providers.cohere.model_or_default(LlmProvider::Cohere), "command-r");
            Ok(())
        });
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "request_timeout: 0s\n")?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("request_timeout"));
            Ok(())
        });
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let mut config = Config::default();
        config.providers.openai.model = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "database_url: postgres://localhost\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }
}
