//! Gemini `generateContent` with JSON response mode.
//!
//! 1.0 generation models (`gemini-pro`, `gemini-1.0-*`) reject system instructions and response
//! schemas. For those the system prompt and the schema are folded into the user turn instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::http::{Endpoint, send_json};
use super::{CompletionProvider, CompletionRequest, LlmAnalysis, schema};
use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

const PROVIDER: LlmProvider = LlmProvider::Gemini;

pub struct GeminiProvider {
    endpoint: Endpoint,
}

impl GeminiProvider {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        inline_data: None,
    }
}

/// Whether the model accepts `systemInstruction` and `responseSchema`.
fn supports_structured_output(model: &str) -> bool {
    let model = model.strip_prefix("models/").unwrap_or(model);
    !(model == "gemini-pro" || model.starts_with("gemini-pro-") || model.starts_with("gemini-1.0"))
}

fn build_request(model: &str, request: &CompletionRequest) -> GenerateRequest {
    let structured = supports_structured_output(model);

    let prompt = if structured {
        request.prompt.clone()
    } else {
        format!(
            "{}\n\n{}\n\nRespond with only a JSON object matching this JSON schema:\n{}",
            request.system_prompt,
            request.prompt,
            schema::analysis_schema_without_additional_properties()
        )
    };
    let mut parts = vec![text_part(&prompt)];
    parts.extend(request.images.iter().map(|image| Part {
        text: None,
        inline_data: Some(InlineData {
            mime_type: image.mime_type.clone(),
            data: image.data.clone(),
        }),
    }));

    GenerateRequest {
        system_instruction: structured.then(|| Content {
            role: None,
            parts: vec![text_part(&request.system_prompt)],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: structured.then(|| GenerationConfig {
            response_mime_type: "application/json",
            response_schema: schema::analysis_schema_without_additional_properties(),
        }),
    }
}

fn extract_analysis(response: GenerateResponse) -> Result<LlmAnalysis> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::provider(PROVIDER, format!("prompt was blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(Error::provider(PROVIDER, "response contained no candidates"));
    };

    let text: String = candidate.content.parts.into_iter().filter_map(|part| part.text).collect();
    if text.trim().is_empty() {
        return Err(Error::provider(
            PROVIDER,
            format!(
                "candidate contained no text (finish_reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        ));
    }

    LlmAnalysis::from_text(PROVIDER, &text)
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn provider(&self) -> LlmProvider {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %self.endpoint.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis> {
        let url = self.endpoint.url(PROVIDER, &format!("models/{}:generateContent", self.endpoint.model))?;
        let body = build_request(&self.endpoint.model, request);

        let response: GenerateResponse = send_json(
            PROVIDER,
            self.endpoint
                .client
                .post(url)
                .header("x-goog-api-key", &self.endpoint.api_key)
                .json(&body),
        )
        .await?;

        extract_analysis(response)
    }
}
