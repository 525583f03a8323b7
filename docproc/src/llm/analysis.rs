//! The structured output requested from providers.
//!
//! Deserialization is deliberately loose: every field is optional, a few common alternative
//! names are accepted, and entity values may be any JSON scalar.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmAnalysis {
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(alias = "text_annotations")]
    pub annotations: Option<Vec<AnalysisAnnotation>>,
    #[serde(alias = "entity_annotations")]
    pub entities: Option<Vec<AnalysisEntity>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisAnnotation {
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(alias = "text")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisEntity {
    pub entity_type: Option<String>,
    pub name: Option<String>,
    pub value: Value,
}

impl LlmAnalysis {
    /// Parse the analysis from a provider's JSON value.
    pub fn from_value(provider: LlmProvider, value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::provider(provider, format!("expected a JSON object, got {value}")));
        };
        resolve_alias(&mut object, "annotations", "text_annotations");
        resolve_alias(&mut object, "entities", "entity_annotations");
        serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::provider(provider, format!("malformed structured output: {e}")))
    }

    /// Parse the analysis from text a model produced, tolerating a surrounding Markdown code
    /// fence.
    pub fn from_text(provider: LlmProvider, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(strip_code_fence(text))
            .map_err(|e| Error::provider(provider, format!("structured output is not valid JSON: {e}")))?;
        Self::from_value(provider, value)
    }
}

/// Keep one of `name` and `alias` so both spellings in one object do not collide. The canonical
/// name wins unless it is null.
fn resolve_alias(object: &mut Map<String, Value>, name: &str, alias: &str) {
    let Some(aliased) = object.remove(alias) else {
        return;
    };
    if object.get(name).is_none_or(Value::is_null) {
        object.insert(name.to_string(), aliased);
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_output_parses() {
        let analysis = LlmAnalysis::from_value(LlmProvider::OpenAI, json!({ "title": "T", "summary": "S" })).unwrap();

        assert_eq!(analysis.title.as_deref(), Some("T"));
        assert_eq!(analysis.summary.as_deref(), Some("S"));
        assert!(analysis.annotations.is_none());
        assert!(analysis.entities.is_none());
    }

    #[test]
    fn test_alternative_field_names() {
        let analysis = LlmAnalysis::from_value(
            LlmProvider::Gemini,
            json!({
                "text_annotations": [{ "kind": "quote", "text": "hello" }],
                "entity_annotations": [{ "entity_type": "age", "name": "age", "value": 35 }]
            }),
        )
        .unwrap();

        let annotations = analysis.annotations.unwrap();
        assert_eq!(annotations[0].kind.as_deref(), Some("quote"));
        assert_eq!(annotations[0].content.as_deref(), Some("hello"));
        assert_eq!(analysis.entities.unwrap()[0].value, json!(35));
    }

    #[test]
    fn test_name_and_alias_together() {
        let analysis = LlmAnalysis::from_value(
            LlmProvider::OpenAI,
            json!({
                "annotations": [{ "type": "key_point", "content": "first" }],
                "text_annotations": [{ "type": "quote", "content": "second" }],
                "entities": null,
                "entity_annotations": [{ "entity_type": "person", "name": "name", "value": "Ada" }]
            }),
        )
        .unwrap();

        let annotations = analysis.annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].content.as_deref(), Some("first"));
        assert_eq!(analysis.entities.unwrap()[0].value, json!("Ada"));
    }

    #[test]
    fn test_fenced_text() {
        let text = "```json\n{\"title\": \"Invoice\"}\n```";
        let analysis = LlmAnalysis::from_text(LlmProvider::Cohere, text).unwrap();
        assert_eq!(analysis.title.as_deref(), Some("Invoice"));
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = LlmAnalysis::from_text(LlmProvider::Anthropic, "[1, 2]").unwrap_err();
        assert!(matches!(err, Error::Provider { provider: LlmProvider::Anthropic, .. }));

        let err = LlmAnalysis::from_text(LlmProvider::Anthropic, "I cannot help with that").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
