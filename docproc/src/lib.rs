//! # docproc: Document Processing Service
//!
//! `docproc` accepts a document (JSON, an image or a PDF, with binary content base64-encoded)
//! together with free-text instructions, asks an external LLM provider for a structured analysis
//! of it, and returns that analysis in a fixed shape: a summary, text annotations and entity
//! annotations.
//!
//! ## Architecture
//!
//! The same binary runs as a long-lived HTTP server built on
//! [Axum](https://github.com/tokio-rs/axum) or as an AWS Lambda function behind API Gateway.
//! Both transports call one pipeline:
//!
//! 1. The **decoder** ([`pipeline::decoder`]) interprets `document_data` according to
//!    `document_type`
//! 2. The **LLM delegate** ([`llm`]) sends the decoded content and the instructions to the
//!    selected provider (OpenAI, Anthropic, Cohere or Gemini), asking for output that matches
//!    the analysis schema
//! 3. The **mapper** ([`pipeline::mapper`]) copies the provider's fields into the response,
//!    defaulting anything missing to empty
//!
//! Every request gets a fresh request id, and every failure is reported in the response body as
//! `success: false` with an error message. Nothing is retried, cached or persisted.
//!
//! Provider API keys come from configuration or the environment; inside Lambda, keys that are
//! still missing are looked up in AWS Secrets Manager at startup (see [`secrets`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use docproc::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = docproc::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     docproc::telemetry::init_telemetry(config.enable_otel_export, true)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
pub mod lambda;
pub mod llm;
mod openapi;
pub mod pipeline;
pub mod secrets;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use axum::http::HeaderValue;
use axum::{
    Json, Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::CorsOrigin;
use crate::lambda::LambdaHandler;
use crate::lambda::runtime::RuntimeClient;
use crate::llm::ProviderRegistry;
use crate::openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// Read-only for the lifetime of the process.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .registry(ProviderRegistry::new(&config)?)
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub registry: ProviderRegistry,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        cors = cors.allow_origin(Any);
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        cors = cors.allow_origin(origins);
    }

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `POST /process` and `POST /lambda-proxy`
/// - `GET /` and `GET /healthz`
/// - OpenAPI document at `/api-docs/openapi.json`, rendered at `/docs`
/// - CORS and request tracing
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/", get(api::handlers::status::root))
        .route("/healthz", get(api::handlers::status::healthz))
        .route("/process", post(api::handlers::process::process_document))
        .route("/lambda-proxy", post(api::handlers::process::lambda_proxy))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application.
///
/// ```text
/// 1. **Create**: [`Application::new`] builds the provider registry and the router
/// 2. **Run**: [`Application::serve`] binds a TCP port, or [`Application::run_lambda`] polls the
///    Lambda Runtime API
/// 3. **Shutdown**: either returns once the shutdown future completes
/// ```
pub struct Application {
    router: Router,
    app_state: AppState,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting document processor with configuration: {:#?}", redacted(&config));

        let registry = ProviderRegistry::new(&config)?;
        for (provider, model, has_key) in registry.describe() {
            info!(%provider, model, has_key, "Provider configured");
        }

        let app_state = AppState::builder().config(config).registry(registry).build();
        let router = build_router(app_state.clone())?;

        Ok(Self { router, app_state })
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.app_state.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Document processor listening on http://{}, available at http://localhost:{}",
            bind_addr, self.app_state.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }

    /// Handle Lambda invocations until shutdown
    pub async fn run_lambda<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler = LambdaHandler::new(self.app_state)?;
        RuntimeClient::from_env()?.run(handler, shutdown).await
    }
}

/// Configuration with API keys masked, for logging.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    for provider in api::models::process::LlmProvider::ALL {
        let settings = config.providers.get_mut(provider);
        if settings.api_key.is_some() {
            settings.api_key = Some("<redacted>".to_string());
        }
    }
    config
}
