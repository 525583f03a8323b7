//! OpenAI chat completions, with the analysis schema exposed as a forced function call.
//!
//! Function calling works on every tool-capable chat model, including those that predate strict
//! `json_schema` response formats (e.g. the default `gpt-4-turbo`).

use async_openai::types::chat::{ChatCompletionMessageToolCalls, CreateChatCompletionResponse};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::http::{Endpoint, send_json};
use super::{ANALYSIS_NAME, CompletionProvider, CompletionRequest, LlmAnalysis, schema};
use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

const PROVIDER: LlmProvider = LlmProvider::OpenAI;

pub struct OpenAiProvider {
    endpoint: Endpoint,
}

impl OpenAiProvider {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
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
        tools: vec![json!({
            "type": "function",
            "function": {
                "name": ANALYSIS_NAME,
                "description": "Record the structured analysis of the document.",
                "parameters": schema::analysis_schema(),
            }
        })],
        tool_choice: json!({ "type": "function", "function": { "name": ANALYSIS_NAME } }),
    }
}

/// Arguments of the analysis function call, or the plain message content when the model answered
/// without calling it.
fn extract_arguments(response: CreateChatCompletionResponse) -> Result<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(Error::provider(PROVIDER, "response contained no choices"));
    };

    let arguments = choice.message.tool_calls.unwrap_or_default().into_iter().find_map(|call| match call {
        ChatCompletionMessageToolCalls::Function(call) if call.function.name == ANALYSIS_NAME => {
            Some(call.function.arguments)
        }
        _ => None,
    });

    arguments
        .or(choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::provider(PROVIDER, "response contained no function call or message content"))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn provider(&self) -> LlmProvider {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %self.endpoint.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmAnalysis> {
        let url = self.endpoint.url(PROVIDER, "chat/completions")?;
        let body = build_request(&self.endpoint.model, request);

        let response: CreateChatCompletionResponse = send_json(
            PROVIDER,
            self.endpoint.client.post(url).bearer_auth(&self.endpoint.api_key).json(&body),
        )
        .await?;

        let arguments = extract_arguments(response)?;
        LlmAnalysis::from_text(PROVIDER, &arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use crate::test_utils::test_endpoint;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_call_body(arguments: &str) -> Value {
        json!({
            "id": "chatcmpl-456",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-4-turbo",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": ANALYSIS_NAME, "arguments": arguments }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    fn completion_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-4-turbo",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            prompt: "user".to_string(),
            images: vec![],
        }
    }

    #[test]
    fn test_images_become_content_parts() {
        let mut req = request();
        req.images.push(ImageAttachment {
            mime_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        });
        let body = serde_json::to_value(build_request("gpt-4o", &req)).unwrap();

        assert_eq!(body["messages"][1]["content"][0]["text"], "user");
        assert_eq!(body["messages"][1]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["tools"][0]["function"]["name"], ANALYSIS_NAME);
        assert_eq!(body["tool_choice"]["function"]["name"], ANALYSIS_NAME);
    }

    #[tokio::test]
    async fn test_structured_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4-turbo",
                "tool_choice": { "type": "function", "function": { "name": ANALYSIS_NAME } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body(r#"{"title":"T","summary":"S","annotations":[],"entities":[]}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_endpoint(&format!("{}/v1", server.uri()), "gpt-4-turbo"));
        let analysis = provider.complete(&request()).await.unwrap();

        assert_eq!(analysis.title.as_deref(), Some("T"));
        assert_eq!(analysis.summary.as_deref(), Some("S"));
    }

    #[tokio::test]
    async fn test_default_model_request_has_no_strict_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body(r#"{"title":"T"}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let model = crate::config::default_model(LlmProvider::OpenAI);
        let provider = OpenAiProvider::new(test_endpoint(&server.uri(), model));
        provider.complete(&request()).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "gpt-4-turbo");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["parameters"], schema::analysis_schema());
    }

    #[tokio::test]
    async fn test_plain_content_is_accepted_without_a_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(r#"{"title":"Plain"}"#)))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_endpoint(&server.uri(), "gpt-4-turbo"));
        let analysis = provider.complete(&request()).await.unwrap();
        assert_eq!(analysis.title.as_deref(), Some("Plain"));
    }

    #[test_log::test(tokio::test)]
    async fn test_error_status_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_endpoint(&format!("{}/v1", server.uri()), "gpt-4-turbo"));
        let err = provider.complete(&request()).await.unwrap_err();

        assert!(matches!(err, Error::Provider { provider: LlmProvider::OpenAI, .. }));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_malformed_content_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("not json at all")))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_endpoint(&server.uri(), "gpt-4-turbo"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
