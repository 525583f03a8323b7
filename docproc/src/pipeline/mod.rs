//! The document processing pipeline shared by every transport.
//!
//! A request flows through three stages:
//!
//! 1. [`decoder`] interprets `document_data` according to `document_type`
//! 2. [`prompt`] turns the decoded document and the instructions into a
//!    [`CompletionRequest`](crate::llm::CompletionRequest), which the selected provider answers
//! 3. [`mapper`] reshapes the provider's analysis into a [`ProcessResult`]
//!
//! Any failure along the way ends the request with `success: false` and the error's message;
//! nothing is retried.

pub mod decoder;
pub mod mapper;
pub mod prompt;

use tracing::Instrument;
use uuid::Uuid;

use crate::api::models::process::{ProcessRequest, ProcessResponse, ProcessResult};
use crate::errors::Result;
use crate::llm::ProviderRegistry;

/// Run one request through the pipeline. Always produces a response carrying a fresh request id.
pub async fn process(registry: &ProviderRegistry, request: &ProcessRequest) -> ProcessResponse {
    let request_id = Uuid::new_v4();
    let provider = registry.resolve(request.llm_provider);
    let span = tracing::info_span!(
        "process_document",
        %request_id,
        document_type = %request.document_type(),
        %provider,
    );

    async move {
        match run(registry, request).await {
            Ok(result) => {
                tracing::info!(
                    text_annotations = result.text_annotations.len(),
                    entity_annotations = result.entity_annotations.len(),
                    "Document processed"
                );
                ProcessResponse::succeeded(request_id, result)
            }
            Err(e) => {
                tracing::warn!("Document processing failed: {}", e);
                ProcessResponse::failed(request_id, e.to_string())
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(registry: &ProviderRegistry, request: &ProcessRequest) -> Result<ProcessResult> {
    let document = decoder::decode(&request.document_data, &request.document_type())?;
    let completion = prompt::build(&document, &request.instructions).await;
    let client = registry.get(registry.resolve(request.llm_provider))?;
    let analysis = client.complete(&completion).await?;
    Ok(analysis.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::process::{DocumentType, LlmProvider};
    use crate::llm::analysis::LlmAnalysis;
    use crate::test_utils::{StaticProvider, create_test_config};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn registry(provider: StaticProvider) -> ProviderRegistry {
        ProviderRegistry::new(&create_test_config()).unwrap().with_provider(Arc::new(provider))
    }

    fn request(document_data: &str, document_type: DocumentType) -> ProcessRequest {
        ProcessRequest {
            document_data: document_data.to_string(),
            document_type: Some(document_type),
            llm_provider: None,
            instructions: "Extract key information".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stubbed_provider_end_to_end() {
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let response = process(
            &registry(provider.clone()),
            &request(r#"{"name":"John Doe","age":35}"#, DocumentType::Json),
        )
        .await;

        assert!(response.success);
        assert!(response.error_message.is_none());
        assert_eq!(response.request_id.get_version_num(), 4);
        let result = response.result.unwrap();
        assert_eq!(result.summary.title, "T");
        assert_eq!(result.summary.content, "S");
        assert!(result.text_annotations.is_empty());
        assert!(result.entity_annotations.is_empty());

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].prompt.contains("Extract key information"));
        assert!(sent[0].prompt.contains("\"name\": \"John Doe\""));
    }

    #[tokio::test]
    async fn test_malformed_json_fails_without_calling_provider() {
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let response = process(&registry(provider.clone()), &request("{not json", DocumentType::Json)).await;

        assert!(!response.success);
        assert!(response.result.is_none());
        assert!(!response.error_message.unwrap().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_base64_fails() {
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let response = process(&registry(provider), &request("not base64!!", DocumentType::Image)).await;

        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("image"));
    }

    #[tokio::test]
    async fn test_image_bytes_reach_provider_exactly() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let response = process(&registry(provider.clone()), &request(&STANDARD.encode(&bytes), DocumentType::Image)).await;

        assert!(response.success);
        let sent = provider.requests();
        assert_eq!(STANDARD.decode(&sent[0].images[0].data).unwrap(), bytes);
    }

    #[test_log::test(tokio::test)]
    async fn test_provider_failure_is_reported() {
        let provider = StaticProvider::failing(LlmProvider::Anthropic, "API error 500: overloaded");
        let mut req = request("{}", DocumentType::Json);
        req.llm_provider = Some(LlmProvider::Anthropic);
        let response = process(&registry(provider), &req).await;

        assert!(!response.success);
        assert_eq!(response.error_message.as_deref(), Some("anthropic request failed: API error 500: overloaded"));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_reported() {
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let mut req = request("{}", DocumentType::Json);
        req.llm_provider = Some(LlmProvider::Cohere);
        let response = process(&registry(provider), &req).await;

        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("cohere"));
    }

    #[tokio::test]
    async fn test_unknown_document_type_reaches_prompt() {
        let provider = StaticProvider::titled(LlmProvider::OpenAI, "T", "S");
        let response = process(
            &registry(provider.clone()),
            &request("# Heading", DocumentType::Other("markdown".to_string())),
        )
        .await;

        assert!(response.success);
        let sent = provider.requests();
        assert!(sent[0].prompt.contains("## Document Type\nmarkdown\n"));
        assert!(sent[0].prompt.contains("Text content:\n# Heading\n"));
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let registry = registry(StaticProvider::new(LlmProvider::OpenAI, LlmAnalysis::default()));
        let mut ids = HashSet::new();
        for _ in 0..20 {
            ids.insert(process(&registry, &request("[]", DocumentType::Json)).await.request_id);
        }
        assert_eq!(ids.len(), 20);
    }
}
