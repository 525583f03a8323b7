//! Client for the AWS Lambda Runtime API.
//!
//! The runtime loop asks for the next invocation, hands its event to the [`LambdaHandler`] and
//! posts the result back. Events that are not JSON are reported through the invocation error
//! endpoint; failures of the Runtime API itself end the loop.

use reqwest::Client;
use serde_json::{Value, json};
use std::future::Future;
use tracing::{Instrument, debug, error, info, info_span};
use url::Url;

use super::{GatewayResponse, LambdaHandler};
use crate::llm::http::{build_client, ensure_slash};

/// Host and port of the Runtime API, set by the Lambda execution environment
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";

/// One event delivered by the Runtime API.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request_id: String,
    pub trace_id: Option<String>,
    pub payload: Vec<u8>,
}

pub struct RuntimeClient {
    client: Client,
    base_url: Url,
}

impl RuntimeClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let api = std::env::var(RUNTIME_API_ENV).map_err(|_| anyhow::anyhow!("{RUNTIME_API_ENV} is not set"))?;
        Self::new(&format!("http://{api}"))
    }

    /// `endpoint` is the Runtime API origin, e.g. `http://127.0.0.1:9001`.
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let base_url = ensure_slash(&Url::parse(endpoint)?).join(&format!("{API_VERSION}/runtime/"))?;
        // The next-invocation call blocks until an event arrives, so no request timeout
        let client = build_client(None)?;
        Ok(Self { client, base_url })
    }

    pub async fn next_invocation(&self) -> anyhow::Result<Invocation> {
        let response = self
            .client
            .get(self.base_url.join("invocation/next")?)
            .send()
            .await?
            .error_for_status()?;

        let header = |name: &str| response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        let request_id = header(REQUEST_ID_HEADER).ok_or_else(|| anyhow::anyhow!("invocation is missing {REQUEST_ID_HEADER}"))?;
        let trace_id = header(TRACE_ID_HEADER);
        let payload = response.bytes().await?.to_vec();

        Ok(Invocation {
            request_id,
            trace_id,
            payload,
        })
    }

    pub async fn send_response(&self, request_id: &str, response: &GatewayResponse) -> anyhow::Result<()> {
        self.client
            .post(self.base_url.join(&format!("invocation/{request_id}/response"))?)
            .json(response)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn send_error(&self, request_id: &str, error_type: &str, message: &str) -> anyhow::Result<()> {
        self.client
            .post(self.base_url.join(&format!("invocation/{request_id}/error"))?)
            .header("Lambda-Runtime-Function-Error-Type", error_type)
            .json(&json!({ "errorMessage": message, "errorType": error_type }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Wait for one invocation, handle it, and report the outcome.
    pub async fn process_next(&self, handler: &LambdaHandler) -> anyhow::Result<()> {
        let invocation = self.next_invocation().await?;
        let span = info_span!(
            "lambda_invocation",
            request_id = %invocation.request_id,
            trace_id = invocation.trace_id.as_deref().unwrap_or_default(),
        );

        async {
            let event: Value = match serde_json::from_slice(&invocation.payload) {
                Ok(event) => event,
                Err(e) => {
                    error!("Invocation payload is not JSON: {}", e);
                    return self
                        .send_error(&invocation.request_id, "Runtime.InvalidEvent", &format!("event is not valid JSON: {e}"))
                        .await;
                }
            };

            let response = handler.handle(event).await;
            debug!(status = response.status_code, "Invocation handled");
            self.send_response(&invocation.request_id, &response).await
        }
        .instrument(span)
        .await
    }

    /// Serve invocations until `shutdown` completes or the Runtime API fails.
    pub async fn run<F>(self, handler: LambdaHandler, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(runtime_api = %self.base_url, "Polling Lambda Runtime API for invocations");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Lambda runtime loop shutting down");
                    return Ok(());
                }
                result = self.process_next(&handler) => result?,
            }
        }
    }
}
