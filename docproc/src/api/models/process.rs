//! API request/response models for document processing.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Declared kind of the submitted document.
///
/// `json` documents carry JSON text, `image` and `pdf` documents carry base64 (optionally as a
/// data URL). Any other tag is accepted, kept verbatim and treated as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentType {
    #[default]
    Json,
    Image,
    Pdf,
    Other(String),
}

impl DocumentType {
    pub fn as_str(&self) -> &str {
        match self {
            DocumentType::Json => "json",
            DocumentType::Image => "image",
            DocumentType::Pdf => "pdf",
            DocumentType::Other(tag) => tag,
        }
    }
}

impl From<String> for DocumentType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "json" => DocumentType::Json,
            "image" => DocumentType::Image,
            "pdf" => DocumentType::Pdf,
            _ => DocumentType::Other(tag),
        }
    }
}

impl From<DocumentType> for String {
    fn from(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl utoipa::PartialSchema for DocumentType {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        utoipa::openapi::ObjectBuilder::new()
            .schema_type(utoipa::openapi::schema::Type::String)
            .description(Some(
                "`json`, `image` or `pdf`. Any other value is accepted and the content is treated as plain text.",
            ))
            .examples(["json", "image", "pdf"])
            .into()
    }
}

impl ToSchema for DocumentType {}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    Cohere,
    Gemini,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 4] = [LlmProvider::OpenAI, LlmProvider::Anthropic, LlmProvider::Cohere, LlmProvider::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Cohere => "cohere",
            LlmProvider::Gemini => "gemini",
        }
    }

    /// Prefix used for the provider's environment variables and secret keys, e.g. `OPENAI`
    /// for `OPENAI_API_KEY` and `OPENAI_MODEL`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI",
            LlmProvider::Anthropic => "ANTHROPIC",
            LlmProvider::Cohere => "COHERE",
            LlmProvider::Gemini => "GEMINI",
        }
    }

    /// Name of the API key entry in the environment and in the secret store.
    pub fn api_key_name(&self) -> String {
        format!("{}_API_KEY", self.env_prefix())
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessRequest {
    /// Document content: JSON text, or base64 for images and PDFs
    pub document_data: String,
    /// Declared document type (defaults to `json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    /// Provider to delegate to (defaults to the configured provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<LlmProvider>,
    /// Free-text instructions for the analysis
    pub instructions: String,
}

impl ProcessRequest {
    pub fn document_type(&self) -> DocumentType {
        self.document_type.clone().unwrap_or_default()
    }
}

/// Response envelope for a single processing request.
///
/// `error_message` is present only on failure and `result` only on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    pub request_id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessResult>,
}

impl ProcessResponse {
    pub fn succeeded(request_id: Uuid, result: ProcessResult) -> Self {
        Self {
            request_id,
            success: true,
            error_message: None,
            result: Some(result),
        }
    }

    pub fn failed(request_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            error_message: Some(message.into()),
            result: None,
        }
    }
}

/// Structured analysis of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessResult {
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub text_annotations: Vec<TextAnnotation>,
    #[serde(default)]
    pub entity_annotations: Vec<EntityAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TextAnnotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntityAnnotation {
    pub entity_type: String,
    pub name: String,
    pub value: String,
}
