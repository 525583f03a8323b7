//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Processing** (`POST /process`): Analyze a document with the selected provider
//! - **Lambda proxy** (`POST /lambda-proxy`): Run a body through the API Gateway event handler
//! - **Status** (`GET /`, `GET /healthz`): Liveness checks
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`. The document is served
//! at `/api-docs/openapi.json` and rendered at `/docs` when the server is running.

pub mod handlers;
pub mod models;
