//! Structured completions from external LLM providers.
//!
//! Every provider receives the same [`CompletionRequest`] (a system prompt, a user prompt and
//! optional inline images) and is asked to answer with JSON matching
//! [`schema::analysis_schema`]. How that constraint is expressed differs per API:
//!
//! - [`openai`]: `response_format` with a strict `json_schema`
//! - [`anthropic`]: a single forced tool whose `input_schema` is the analysis schema
//! - [`cohere`]: `response_format` of type `json_object` with a schema
//! - [`gemini`]: `responseMimeType: application/json` plus `responseSchema`
//!
//! Provider calls are made once. Transport failures, non-success statuses and output that does
//! not parse are all reported as [`Error::Provider`](crate::errors::Error::Provider).

pub mod analysis;
pub mod anthropic;
pub mod cohere;
pub mod gemini;
pub(crate) mod http;
pub mod openai;
pub mod registry;
pub mod schema;

use async_trait::async_trait;

use crate::api::models::process::LlmProvider;
use crate::errors::Result;

pub use analysis::LlmAnalysis;
pub use registry::ProviderRegistry;

/// Name under which the analysis schema/tool is registered with providers
pub const ANALYSIS_NAME: &str = "document_analysis";

/// An image passed to the model alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Base64 (standard alphabet) image bytes
    pub data: String,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Provider-independent input of a structured completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub images: Vec<ImageAttachment>,
}

/// A client able to produce a structured document analysis.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn provider(&self) -> LlmProvider;

    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis>;
}
