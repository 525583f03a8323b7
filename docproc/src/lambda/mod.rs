//! AWS Lambda entry point.
//!
//! One function serves three kinds of invocation, told apart by the shape of the event:
//!
//! - **Direct invocation**: the event itself is a request (`document_data` and `instructions`
//!   at the top level). Answered with `statusCode` and the serialized [`ProcessResponse`].
//! - **API Gateway REST (v1)**: the event has `httpMethod` and `body`. The body is validated
//!   and processed here, and the response carries JSON and CORS headers.
//! - **API Gateway HTTP (v2)**: the event has `requestContext.http`. It is turned into an HTTP
//!   request and answered by the same router the server uses, so every route works.
//!
//! Anything else is answered with a 500 and an `error` message. [`runtime`] polls the Lambda
//! Runtime API and feeds events to [`LambdaHandler`].

pub mod runtime;

use axum::Router;
use axum::body::Body;
use axum::http::{self, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tower::ServiceExt;
use tracing::{debug, instrument, warn};

use crate::AppState;
use crate::api::models::process::{ProcessRequest, ProcessResponse};
use crate::errors::{Error, Result};
use crate::pipeline;

/// Response shape understood by API Gateway and returned to direct invokers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// `Set-Cookie` values, carried separately by HTTP API (v2) responses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_base64_encoded: bool,
}

impl GatewayResponse {
    /// A JSON response without headers, as returned to direct invocations.
    fn plain(status: StatusCode, body: &impl Serialize) -> Self {
        Self {
            status_code: status.as_u16(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            body: serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()),
            is_base64_encoded: false,
        }
    }

    /// A JSON response with the content type and CORS headers API Gateway clients expect.
    fn json(status: StatusCode, body: &impl Serialize) -> Self {
        let mut response = Self::plain(status, body);
        response.headers = BTreeMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ("Access-Control-Allow-Headers".to_string(), "Content-Type".to_string()),
            ("Access-Control-Allow-Methods".to_string(), "OPTIONS,POST".to_string()),
        ]);
        response
    }

    fn error(status: StatusCode, message: impl std::fmt::Display) -> Self {
        Self::json(status, &json!({ "error": message.to_string() }))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// How an incoming event is to be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Direct,
    RestV1,
    HttpV2,
    Unknown,
}

impl EventKind {
    pub fn of(event: &Value) -> Self {
        if event.get("document_data").is_some() && event.get("instructions").is_some() {
            EventKind::Direct
        } else if event.get("httpMethod").is_some() && event.get("body").is_some() {
            EventKind::RestV1
        } else if event.pointer("/requestContext/http").is_some() {
            EventKind::HttpV2
        } else {
            EventKind::Unknown
        }
    }
}

/// Dispatches Lambda events to the processing pipeline or the HTTP router.
#[derive(Clone)]
pub struct LambdaHandler {
    state: AppState,
    router: Router,
}

impl LambdaHandler {
    pub fn new(state: AppState) -> anyhow::Result<Self> {
        let router = crate::build_router(state.clone())?;
        Ok(Self { state, router })
    }

    #[instrument(skip_all, fields(kind))]
    pub async fn handle(&self, event: Value) -> GatewayResponse {
        let kind = EventKind::of(&event);
        tracing::Span::current().record("kind", tracing::field::debug(kind));

        match kind {
            EventKind::Direct => handle_direct_event(&self.state, event).await,
            EventKind::RestV1 => handle_rest_event(&self.state, &event).await,
            EventKind::HttpV2 => match self.route_http_event(&event).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to route HTTP API event: {}", e);
                    GatewayResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e)
                }
            },
            EventKind::Unknown => {
                warn!("Received an event of unknown shape");
                GatewayResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Unsupported event format")
            }
        }
    }

    async fn route_http_event(&self, event: &Value) -> Result<GatewayResponse> {
        let request = http_v2_request(event)?;
        debug!(method = %request.method(), uri = %request.uri(), "Routing HTTP API event");

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };

        let status = response.status();
        let (headers, cookies) = v2_response_headers(response.headers());
        let body: Bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| Error::Internal {
                operation: format!("read routed response body: {e}"),
            })?;

        let (body, is_base64_encoded) = match String::from_utf8(body.to_vec()) {
            Ok(text) => (text, false),
            Err(_) => (STANDARD.encode(&body), true),
        };

        Ok(GatewayResponse {
            status_code: status.as_u16(),
            headers,
            cookies,
            body,
            is_base64_encoded,
        })
    }
}

/// Flatten response headers for an HTTP API (v2) response. Repeated headers are joined with `,`
/// and `Set-Cookie` values move to the separate cookie list.
fn v2_response_headers(headers: &HeaderMap) -> (BTreeMap<String, String>, Vec<String>) {
    let mut flattened: BTreeMap<String, String> = BTreeMap::new();
    let mut cookies = Vec::new();

    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        if name == http::header::SET_COOKIE {
            cookies.push(value.to_string());
            continue;
        }
        flattened
            .entry(name.to_string())
            .and_modify(|joined| {
                joined.push(',');
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    (flattened, cookies)
}

/// A request object passed as the whole event.
pub async fn handle_direct_event(state: &AppState, event: Value) -> GatewayResponse {
    let request: ProcessRequest = match serde_json::from_value(event) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::plain(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "error": format!("Invalid request: {e}") }));
        }
    };

    let response = pipeline::process(&state.registry, &request).await;
    GatewayResponse::plain(status_for(&response), &response)
}

/// An API Gateway REST (v1) proxy event.
pub async fn handle_rest_event(state: &AppState, event: &Value) -> GatewayResponse {
    let body = match rest_body(event) {
        Ok(Some(body)) => body,
        Ok(None) => return GatewayResponse::error(StatusCode::BAD_REQUEST, "Missing request body"),
        Err(e) => return GatewayResponse::error(StatusCode::BAD_REQUEST, e),
    };

    let request: ProcessRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::error(
                StatusCode::BAD_REQUEST,
                Error::BadRequest { message: e.to_string() },
            );
        }
    };

    let response = pipeline::process(&state.registry, &request).await;
    GatewayResponse::json(status_for(&response), &response)
}

fn status_for(response: &ProcessResponse) -> StatusCode {
    if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// The JSON body of a REST event, or `None` when there is no body.
fn rest_body(event: &Value) -> Result<Option<Value>> {
    match event.get("body") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.is_empty() => Ok(None),
        Some(Value::String(raw)) => {
            let raw = if is_base64_encoded(event) {
                decode_base64_body(raw)?
            } else {
                raw.clone().into_bytes()
            };
            serde_json::from_slice(&raw).map(Some).map_err(|e| Error::BadRequest { message: e.to_string() })
        }
        Some(body) => Ok(Some(body.clone())),
    }
}

fn is_base64_encoded(event: &Value) -> bool {
    event.get("isBase64Encoded").and_then(Value::as_bool).unwrap_or(false)
}

fn decode_base64_body(raw: &str) -> Result<Vec<u8>> {
    STANDARD.decode(raw).map_err(|e| Error::BadRequest {
        message: format!("body is not valid base64: {e}"),
    })
}

/// Rebuild the HTTP request carried by an API Gateway HTTP (v2) event.
fn http_v2_request(event: &Value) -> Result<Request<Body>> {
    let bad_event = |message: String| Error::BadRequest { message };

    let method = event
        .pointer("/requestContext/http/method")
        .and_then(Value::as_str)
        .unwrap_or("GET");
    let method = Method::from_bytes(method.as_bytes()).map_err(|e| bad_event(format!("invalid method: {e}")))?;

    let path = event
        .get("rawPath")
        .or_else(|| event.pointer("/requestContext/http/path"))
        .and_then(Value::as_str)
        .unwrap_or("/");
    let uri = match event.get("rawQueryString").and_then(Value::as_str) {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    };

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        if let Some(map) = event.get("headers").and_then(Value::as_object) {
            for (name, value) in map {
                let Some(value) = value.as_str() else { continue };
                if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                    headers.append(name, value);
                }
            }
        }
        if let Some(cookies) = event.get("cookies").and_then(Value::as_array) {
            let joined = cookies.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; ");
            if let Ok(value) = HeaderValue::from_str(&joined)
                && !joined.is_empty()
            {
                headers.insert(http::header::COOKIE, value);
            }
        }
    }

    let body = match event.get("body").and_then(Value::as_str) {
        Some(raw) if is_base64_encoded(event) => Body::from(decode_base64_body(raw)?),
        Some(raw) => Body::from(raw.to_string()),
        None => Body::empty(),
    };

    builder.body(body).map_err(|e| bad_event(format!("invalid HTTP request: {e}")))
}
