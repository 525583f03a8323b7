//! JSON schema of the analysis output.

use serde_json::{Value, json};

/// Schema describing [`LlmAnalysis`](super::LlmAnalysis). All properties are required and no
/// additional properties are allowed, which is what OpenAI's strict mode expects.
pub fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "A short title for the document"
            },
            "summary": {
                "type": "string",
                "description": "A concise summary of the document addressing the instructions"
            },
            "annotations": {
                "type": "array",
                "description": "Notable passages or observations, in document order",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "description": "Kind of annotation, e.g. key_point, quote, warning" },
                        "content": { "type": "string" }
                    },
                    "required": ["type", "content"],
                    "additionalProperties": false
                }
            },
            "entities": {
                "type": "array",
                "description": "Named entities found in the document",
                "items": {
                    "type": "object",
                    "properties": {
                        "entity_type": { "type": "string", "description": "e.g. person, organization, date, amount" },
                        "name": { "type": "string", "description": "What the entity refers to" },
                        "value": { "type": "string", "description": "The entity's value as written in the document" }
                    },
                    "required": ["entity_type", "name", "value"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["title", "summary", "annotations", "entities"],
        "additionalProperties": false
    })
}

/// The schema without `additionalProperties`, which Gemini's OpenAPI subset rejects.
pub fn analysis_schema_without_additional_properties() -> Value {
    let mut schema = analysis_schema();
    strip_key(&mut schema, "additionalProperties");
    schema
}

fn strip_key(value: &mut Value, key: &str) {
    match value {
        Value::Object(map) => {
            map.remove(key);
            map.values_mut().for_each(|v| strip_key(v, key));
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strip_key(v, key)),
        _ => {}
    }
}
