//! Liveness endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusMessage {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "status",
    summary = "Service status",
    description = "Report that the document processor is running.",
    responses(
        (status = 200, description = "Service is running", body = StatusMessage),
    )
)]
pub async fn root() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: "Document Processor API is running".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "status",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is healthy", body = String),
    )
)]
pub async fn healthz() -> &'static str {
    "OK"
}
