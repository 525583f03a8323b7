//! HTTP handlers for document processing.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::process::{ProcessRequest, ProcessResponse},
    errors::Error,
    lambda, pipeline,
};

/// Process a document.
#[utoipa::path(
    post,
    path = "/process",
    tag = "process",
    summary = "Process document",
    description = "Decode the document, send it with the instructions to the selected LLM provider and return
its summary, text annotations and entity annotations.

`document_type` defaults to `json` and `llm_provider` to the configured default provider.",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Document processed", body = ProcessResponse),
        (status = 400, description = "Request body is not a valid processing request", body = ProcessResponse),
        (status = 500, description = "Decoding or the provider call failed", body = ProcessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn process_document(State(state): State<AppState>, payload: Result<Json<ProcessRequest>, JsonRejection>) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let error = Error::BadRequest {
                message: rejection.body_text(),
            };
            tracing::debug!("Rejected processing request: {}", error);
            return (StatusCode::BAD_REQUEST, Json(ProcessResponse::failed(Uuid::new_v4(), error.to_string())));
        }
    };

    let response = pipeline::process(&state.registry, &request).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response))
}

/// Run a request body through the API Gateway event handler.
#[utoipa::path(
    post,
    path = "/lambda-proxy",
    tag = "process",
    summary = "Lambda proxy",
    description = "Wrap the JSON body into an API Gateway REST event for `POST /process`, run it through the
Lambda handler and return the handler's status and body. Useful for testing the Lambda path locally.",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Document processed", body = ProcessResponse),
        (status = 400, description = "Missing or invalid request body"),
        (status = 500, description = "Processing failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn lambda_proxy(State(state): State<AppState>, payload: Result<Json<Value>, JsonRejection>) -> Result<impl IntoResponse, Error> {
    let Json(body) = payload.map_err(|rejection| Error::BadRequest {
        message: rejection.body_text(),
    })?;

    let event = serde_json::json!({
        "httpMethod": "POST",
        "path": "/process",
        "headers": { "content-type": "application/json" },
        "body": body.to_string(),
    });
    let response = lambda::handle_rest_event(&state, &event).await;

    let body: Value = serde_json::from_str(&response.body).map_err(|e| Error::Internal {
        operation: format!("decode Lambda handler response: {e}"),
    })?;
    Ok((response.status(), Json(body)))
}
