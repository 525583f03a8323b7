//! Anthropic messages API, with the analysis schema exposed as a forced tool call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::http::{Endpoint, send_json};
use super::{ANALYSIS_NAME, CompletionProvider, CompletionRequest, LlmAnalysis, schema};
use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

const PROVIDER: LlmProvider = LlmProvider::Anthropic;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    endpoint: Endpoint,
}

impl AnthropicProvider {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    ToolUse { name: String, input: Value },
    Text { text: String },
    #[serde(other)]
    Other,
}

fn build_request(model: &str, request: &CompletionRequest) -> MessagesRequest {
    let mut content: Vec<RequestBlock> = request
        .images
        .iter()
        .map(|image| RequestBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
        })
        .collect();
    content.push(RequestBlock::Text {
        text: request.prompt.clone(),
    });

    MessagesRequest {
        model: model.to_string(),
        max_tokens: MAX_TOKENS,
        system: request.system_prompt.clone(),
        messages: vec![Message { role: "user", content }],
        tools: vec![Tool {
            name: ANALYSIS_NAME,
            description: "Record the structured analysis of the document.",
            input_schema: schema::analysis_schema(),
        }],
        tool_choice: ToolChoice {
            kind: "tool",
            name: ANALYSIS_NAME,
        },
    }
}

fn extract_analysis(response: MessagesResponse) -> Result<LlmAnalysis> {
    let mut text = String::new();
    for block in response.content {
        match block {
            ResponseBlock::ToolUse { name, input } if name == ANALYSIS_NAME => return LlmAnalysis::from_value(PROVIDER, input),
            ResponseBlock::Text { text: t } => text.push_str(&t),
            _ => {}
        }
    }

    // Without the tool call, the text reply may still carry the JSON
    if !text.trim().is_empty() {
        return LlmAnalysis::from_text(PROVIDER, &text);
    }

    Err(Error::provider(
        PROVIDER,
        format!(
            "response contained no {ANALYSIS_NAME} tool call (stop_reason: {})",
            response.stop_reason.as_deref().unwrap_or("unknown")
        ),
    ))
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn provider(&self) -> LlmProvider {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %self.endpoint.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis> {
        let url = self.endpoint.url(PROVIDER, "messages")?;
        let body = build_request(&self.endpoint.model, request);

        let response: MessagesResponse = send_json(
            PROVIDER,
            self.endpoint
                .client
                .post(url)
                .header("x-api-key", &self.endpoint.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        extract_analysis(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use crate::test_utils::test_endpoint;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            prompt: "user".to_string(),
            images: vec![ImageAttachment {
                mime_type: "image/jpeg".to_string(),
                data: "/9j/".to_string(),
            }],
        }
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(build_request("claude-3-opus-20240229", &request())).unwrap();

        assert_eq!(body["tool_choice"], json!({ "type": "tool", "name": ANALYSIS_NAME }));
        assert_eq!(body["messages"][0]["content"][0]["type"], "image");
        assert_eq!(body["messages"][0]["content"][0]["source"]["media_type"], "image/jpeg");
        assert_eq!(body["messages"][0]["content"][1], json!({ "type": "text", "text": "user" }));
        assert_eq!(body["system"], "system");
    }

    #[tokio::test]
    async fn test_tool_input_is_the_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({ "model": "claude-3-opus-20240229" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-opus-20240229",
                "stop_reason": "tool_use",
                "content": [
                    { "type": "text", "text": "Recording the analysis." },
                    {
                        "type": "tool_use",
                        "id": "toolu_01",
                        "name": ANALYSIS_NAME,
                        "input": {
                            "title": "Lease",
                            "summary": "A one year lease.",
                            "entities": [{ "entity_type": "date", "name": "start", "value": "2024-01-01" }]
                        }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(test_endpoint(&format!("{}/v1", server.uri()), "claude-3-opus-20240229"));
        let analysis = provider.complete(&request()).await.unwrap();

        assert_eq!(analysis.title.as_deref(), Some("Lease"));
        assert_eq!(analysis.entities.unwrap().len(), 1);
        assert!(analysis.annotations.is_none());
    }

    #[test]
    fn test_missing_tool_call_is_a_provider_error() {
        let response = MessagesResponse {
            content: vec![ResponseBlock::Other],
            stop_reason: Some("max_tokens".to_string()),
        };
        let err = extract_analysis(response).unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }
}
