//! OpenAPI documentation for the HTTP API.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::process::{
    DocumentType, EntityAnnotation, LlmProvider, ProcessRequest, ProcessResponse, ProcessResult, Summary, TextAnnotation,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Document Processor API",
        description = "Turn JSON, image and PDF documents into structured analyses using an LLM provider.",
    ),
    paths(
        api::handlers::process::process_document,
        api::handlers::process::lambda_proxy,
        api::handlers::status::root,
        api::handlers::status::healthz,
    ),
    components(schemas(
        ProcessRequest,
        ProcessResponse,
        ProcessResult,
        Summary,
        TextAnnotation,
        EntityAnnotation,
        DocumentType,
        LlmProvider,
        api::handlers::status::StatusMessage,
    )),
    tags(
        (name = "process", description = "Document processing"),
        (name = "status", description = "Liveness checks"),
    )
)]
pub struct ApiDoc;
