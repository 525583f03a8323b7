//! Prompt construction for the analysis request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write;

use super::decoder::{BinaryDocument, DecodedDocument};
use crate::llm::{CompletionRequest, ImageAttachment};

pub const SYSTEM_PROMPT: &str = "You are an expert document analyzer. \
Extract the information the instructions ask for from the provided document. \
Answer with structured output containing a summary, text annotations and entity annotations.";

const CLOSING: &str = "Based on the document and instructions provided, \
create a detailed analysis with text annotations, entity annotations, and a summary.";

/// Text of one PDF page.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    pub number: usize,
    pub text: String,
}

/// Build the provider-independent completion request for a decoded document.
pub async fn build(document: &DecodedDocument, instructions: &str) -> CompletionRequest {
    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "# Document Analysis Task\n\n## Instructions\n{instructions}\n\n## Document Type\n{}\n\n## Document Content\n",
        document.document_type()
    );

    let mut images = Vec::new();
    match document {
        DecodedDocument::Json(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            let _ = write!(prompt, "JSON content:\n{pretty}\n\n");
        }
        DecodedDocument::Text { content, .. } => {
            let _ = write!(prompt, "Text content:\n{content}\n\n");
        }
        DecodedDocument::Binary(binary) if binary.is_image() => {
            let mime_type = binary.mime_type();
            let _ = write!(
                prompt,
                "Image of type {mime_type} ({} bytes), attached to this message.\n\n",
                binary.bytes.len()
            );
            images.push(ImageAttachment {
                mime_type,
                data: STANDARD.encode(&binary.bytes),
            });
        }
        DecodedDocument::Binary(binary) => {
            let pages = extract_pdf_pages(binary).await;
            if pages.is_empty() {
                let _ = write!(
                    prompt,
                    "PDF document ({} bytes). No text could be extracted from it.\n\n",
                    binary.bytes.len()
                );
            } else {
                prompt.push_str("PDF content:\n\n");
                for page in &pages {
                    let _ = write!(prompt, "Page {}:\n{}\n\n", page.number, page.text);
                }
            }
        }
    }
    prompt.push_str(CLOSING);

    CompletionRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        prompt,
        images,
    }
}

/// Best-effort text extraction. Returns no pages when the document has no extractable text or
/// cannot be parsed at all.
pub async fn extract_pdf_pages(document: &BinaryDocument) -> Vec<PdfPage> {
    let bytes = document.bytes.clone();
    // The parser is CPU bound and may panic on malformed input
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

    match extracted {
        Ok(Ok(text)) => split_pages(&text),
        Ok(Err(e)) => {
            tracing::warn!(bytes = document.bytes.len(), "PDF text extraction failed: {}", e);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(bytes = document.bytes.len(), "PDF text extraction aborted: {}", e);
            Vec::new()
        }
    }
}

/// Pages are separated by form feeds in the extracted text.
fn split_pages(text: &str) -> Vec<PdfPage> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| PdfPage {
            number: i + 1,
            text: page.trim().to_string(),
        })
        .filter(|page| !page.text.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::process::DocumentType;
    use serde_json::json;

    #[tokio::test]
    async fn test_json_prompt_sections() {
        let document = DecodedDocument::Json(json!({ "name": "John" }));
        let request = build(&document, "Extract the name").await;

        assert_eq!(request.system_prompt, SYSTEM_PROMPT);
        assert!(request.prompt.starts_with("# Document Analysis Task\n\n## Instructions\nExtract the name\n\n"));
        assert!(request.prompt.contains("## Document Type\njson\n"));
        assert!(request.prompt.contains("\"name\": \"John\""));
        assert!(request.prompt.ends_with(CLOSING));
        assert!(request.images.is_empty());
    }

    #[tokio::test]
    async fn test_image_is_attached() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let document = DecodedDocument::Binary(BinaryDocument {
            kind: DocumentType::Image,
            bytes: png.clone(),
            declared_mime_type: None,
        });
        let request = build(&document, "Describe").await;

        assert_eq!(request.images.len(), 1);
        assert_eq!(request.images[0].mime_type, "image/png");
        assert_eq!(STANDARD.decode(&request.images[0].data).unwrap(), png);
        assert!(request.prompt.contains("Image of type image/png (12 bytes)"));
    }

    #[test_log::test(tokio::test)]
    async fn test_unreadable_pdf_falls_back_to_description() {
        let document = DecodedDocument::Binary(BinaryDocument {
            kind: DocumentType::Pdf,
            bytes: b"%PDF-1.4 truncated".to_vec(),
            declared_mime_type: None,
        });
        let request = build(&document, "Summarize").await;

        assert!(request.prompt.contains("## Document Type\npdf\n"));
        assert!(request.prompt.contains("No text could be extracted"));
        assert!(request.images.is_empty());
    }

    #[test]
    fn test_split_pages_skips_blank_pages() {
        let pages = split_pages("first page\n\x0c\n\x0c  third page ");
        assert_eq!(
            pages,
            vec![
                PdfPage {
                    number: 1,
                    text: "first page".to_string()
                },
                PdfPage {
                    number: 3,
                    text: "third page".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_text_passes_through() {
        let document = DecodedDocument::Text {
            tag: "markdown".to_string(),
            content: "plain words".to_string(),
        };
        let request = build(&document, "Summarize").await;
        assert!(request.prompt.contains("## Document Type\nmarkdown\n"));
        assert!(request.prompt.contains("Text content:\nplain words\n"));
    }
}
