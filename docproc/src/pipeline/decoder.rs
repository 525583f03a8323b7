//! Decoding of `document_data` according to the declared document type.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::borrow::Cow;

use crate::api::models::process::DocumentType;
use crate::errors::{Error, Result};

/// Document content after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedDocument {
    /// Parsed JSON value
    Json(Value),
    /// Raw bytes of an image or PDF
    Binary(BinaryDocument),
    /// Content of any other declared type, unchanged, with the declared tag
    Text { tag: String, content: String },
}

impl DecodedDocument {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DecodedDocument::Json(_) => DocumentType::Json,
            DecodedDocument::Binary(binary) => binary.kind.clone(),
            DecodedDocument::Text { tag, .. } => DocumentType::Other(tag.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDocument {
    /// `Image` or `Pdf`
    pub kind: DocumentType,
    pub bytes: Vec<u8>,
    /// MIME type declared by a data URL header, if one was present
    pub declared_mime_type: Option<String>,
}

impl BinaryDocument {
    /// MIME type of the content: the declared one, else sniffed from magic bytes, else a
    /// generic type for the document kind.
    pub fn mime_type(&self) -> String {
        if let Some(declared) = &self.declared_mime_type {
            return declared.clone();
        }
        if let Some(kind) = infer::get(&self.bytes) {
            return kind.mime_type().to_string();
        }
        match self.kind {
            DocumentType::Pdf => "application/pdf".to_string(),
            _ => "application/octet-stream".to_string(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == DocumentType::Image
    }
}

/// Decode `document_data` according to `document_type`.
///
/// JSON text is parsed, images and PDFs are base64-decoded (an optional `data:<mime>;base64,`
/// prefix is accepted), and any other type passes through unchanged. Content is not validated
/// beyond that.
pub fn decode(document_data: &str, document_type: &DocumentType) -> Result<DecodedDocument> {
    match document_type {
        DocumentType::Json => serde_json::from_str(document_data)
            .map(DecodedDocument::Json)
            .map_err(|e| Error::Decode {
                document_type: document_type.clone(),
                message: e.to_string(),
            }),
        DocumentType::Image | DocumentType::Pdf => {
            let (declared_mime_type, payload) = split_data_url(document_data);
            let bytes = decode_base64(payload).map_err(|e| Error::Decode {
                document_type: document_type.clone(),
                message: e.to_string(),
            })?;
            Ok(DecodedDocument::Binary(BinaryDocument {
                kind: document_type.clone(),
                bytes,
                declared_mime_type: declared_mime_type.map(str::to_string),
            }))
        }
        DocumentType::Other(tag) => Ok(DecodedDocument::Text {
            tag: tag.clone(),
            content: document_data.to_string(),
        }),
    }
}

/// Split a `data:<mime>;base64,<payload>` URL into its MIME type and payload. Input without the
/// header is returned as the payload.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            (mime, payload)
        }
        None => (None, data),
    }
}

fn decode_base64(payload: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    // Line-wrapped base64 (MIME style) is common in pasted payloads
    let payload: Cow<'_, str> = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(payload.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(payload)
    };
    STANDARD.decode(payload.as_bytes())
}
