use crate::api::models::process::{DocumentType, LlmProvider};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid or incomplete request envelope
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    /// Document content did not match its declared type
    #[error("Failed to decode {document_type} document: {message}")]
    Decode { document_type: DocumentType, message: String },

    /// The LLM provider call failed (transport, status, or malformed output)
    #[error("{provider} request failed: {message}")]
    Provider { provider: LlmProvider, message: String },

    /// No API key could be resolved for the selected provider
    #[error("No API key configured for provider {provider}")]
    MissingCredentials { provider: LlmProvider },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    /// Only a malformed request envelope is the caller's fault. Failures inside the pipeline are
    /// reported as 500, the same status `/process` and the Lambda adapters use.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Decode { .. } | Error::Provider { .. } | Error::MissingCredentials { .. } | Error::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { .. } | Error::Decode { .. } | Error::Provider { .. } | Error::MissingCredentials { .. } => self.to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Shorthand for provider failures built from any displayable error.
    pub fn provider(provider: LlmProvider, err: impl std::fmt::Display) -> Self {
        Error::Provider {
            provider,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::MissingCredentials { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Provider { .. } => {
                tracing::warn!("Upstream provider error: {}", self);
            }
            Error::Decode { .. } => {
                tracing::warn!("Document decoding error: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = serde_json::json!({ "error": self.user_message() });
        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
