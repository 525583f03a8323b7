//! Mapping of provider output into the fixed response schema.

use serde_json::Value;

use crate::api::models::process::{EntityAnnotation, ProcessResult, Summary, TextAnnotation};
use crate::llm::analysis::{AnalysisAnnotation, AnalysisEntity, LlmAnalysis};

impl From<LlmAnalysis> for ProcessResult {
    fn from(analysis: LlmAnalysis) -> Self {
        ProcessResult {
            summary: Summary {
                title: analysis.title.unwrap_or_default(),
                content: analysis.summary.unwrap_or_default(),
            },
            text_annotations: analysis.annotations.unwrap_or_default().into_iter().map(Into::into).collect(),
            entity_annotations: analysis.entities.unwrap_or_default().into_iter().map(Into::into).collect(),
        }
    }
}

impl From<AnalysisAnnotation> for TextAnnotation {
    fn from(annotation: AnalysisAnnotation) -> Self {
        TextAnnotation {
            kind: annotation.kind.unwrap_or_default(),
            content: annotation.content.unwrap_or_default(),
        }
    }
}

impl From<AnalysisEntity> for EntityAnnotation {
    fn from(entity: AnalysisEntity) -> Self {
        EntityAnnotation {
            entity_type: entity.entity_type.unwrap_or_default(),
            name: entity.name.unwrap_or_default(),
            value: value_to_string(entity.value),
        }
    }
}

/// Strings are kept as-is, null becomes empty, anything else is rendered as JSON.
fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
