//! Cohere v2 chat with JSON object output constrained by a schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use super::http::{Endpoint, send_json};
use super::{CompletionProvider, CompletionRequest, LlmAnalysis, schema};
use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

const PROVIDER: LlmProvider = LlmProvider::Cohere;

pub struct CohereProvider {
    endpoint: Endpoint,
}

impl CohereProvider {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: Option<String>,
}

fn build_request(model: &str, request: &CompletionRequest) -> ChatRequest {
    let user_content = if request.images.is_empty() {
        Value::String(request.prompt.clone())
    } else {
        let mut parts = vec![json!({ "type": "text", "text": request.prompt })];
        parts.extend(
            request
                .images
                .iter()
                .map(|image| json!({ "type": "image_url", "image_url": { "url": image.data_url() } })),
        );
        Value::Array(parts)
    };

    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: Value::String(request.system_prompt.clone()),
            },
            ChatMessage {
                role: "user",
                content: user_content,
            },
        ],
        response_format: ResponseFormat {
            kind: "json_object",
            json_schema: schema::analysis_schema(),
        },
    }
}

#[async_trait]
impl CompletionProvider for CohereProvider {
    fn provider(&self) -> LlmProvider {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %self.endpoint.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis> {
        let url = self.endpoint.url(PROVIDER, "chat")?;
        let body = build_request(&self.endpoint.model, request);

        let response: ChatResponse = send_json(
            PROVIDER,
            self.endpoint.client.post(url).bearer_auth(&self.endpoint.api_key).json(&body),
        )
        .await?;

        let text: String = response.message.content.into_iter().filter_map(|item| item.text).collect();
        if text.trim().is_empty() {
            return Err(Error::provider(
                PROVIDER,
                format!(
                    "response contained no text (finish_reason: {})",
                    response.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        LlmAnalysis::from_text(PROVIDER, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_endpoint;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            prompt: "Summarize".to_string(),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_structured_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/chat"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "command-r-plus",
                "response_format": { "type": "json_object" },
                "messages": [{ "role": "system" }, { "role": "user", "content": "Summarize" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c-1",
                "finish_reason": "COMPLETE",
                "message": {
                    "role": "assistant",
                    "content": [{ "type": "text", "text": "{\"title\":\"Memo\",\"annotations\":[{\"type\":\"key_point\",\"content\":\"Budget approved\"}]}" }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CohereProvider::new(test_endpoint(&format!("{}/v2", server.uri()), "command-r-plus"));
        let analysis = provider.complete(&request()).await.unwrap();

        assert_eq!(analysis.title.as_deref(), Some("Memo"));
        assert_eq!(analysis.annotations.unwrap()[0].content.as_deref(), Some("Budget approved"));
    }

    #[tokio::test]
    async fn test_empty_message_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "finish_reason": "MAX_TOKENS",
                "message": { "role": "assistant", "content": [] }
            })))
            .mount(&server)
            .await;

        let provider = CohereProvider::new(test_endpoint(&server.uri(), "command-r-plus"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }
}
