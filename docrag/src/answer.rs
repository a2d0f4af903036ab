//! Structured answers parsed from model replies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::entities::Entity;

/// Answer text used when a reply is not a JSON object.
pub const PARSE_ERROR_ANSWER: &str = "Error: Could not parse LLM response as JSON";

/// How many characters of an unparseable reply are echoed back.
const RAW_PREVIEW_CHARS: usize = 100;

/// The answer to a query.
///
/// Models are asked for `answer` and `reasoning`; anything else they return
/// is kept in `extra` and serialized back at the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryResponse {
    /// The payload returned when the query pipeline itself failed.
    pub fn from_error(error: impl std::fmt::Display) -> Self {
        Self {
            answer: Some(format!("Error processing query: {error}")),
            reasoning: Some("An error occurred during query processing.".to_string()),
            entities: Some(Vec::new()),
            extra: Map::new(),
        }
    }

    /// The answer text, or a placeholder when the model gave none.
    pub fn answer_text(&self) -> &str {
        self.answer.as_deref().unwrap_or("No answer generated")
    }

    /// Entities attached to the answer, if any.
    pub fn entities(&self) -> &[Entity] {
        self.entities.as_deref().unwrap_or_default()
    }
}

fn text_field(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Turn a model reply into a [`QueryResponse`].
///
/// A JSON object reply is taken as-is. When it has no `entities` key and
/// `extracted` is non-empty, the extracted entities are attached. Any other
/// reply becomes an error answer that echoes the start of the raw text.
pub fn parse_reply(raw: &str, extracted: Vec<Entity>) -> QueryResponse {
    let mut object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => object,
        _ => {
            warn!(reply_len = raw.len(), "model reply is not a JSON object");
            let preview: String = raw.chars().take(RAW_PREVIEW_CHARS).collect();
            return QueryResponse {
                answer: Some(PARSE_ERROR_ANSWER.to_string()),
                reasoning: Some(format!(
                    "The LLM did not return valid JSON. Original response: {preview}..."
                )),
                entities: Some(extracted),
                extra: Map::new(),
            };
        }
    };

    let answer = object.remove("answer").and_then(text_field);
    let reasoning = object.remove("reasoning").and_then(text_field);

    let entities = match object.remove("entities") {
        Some(value) => match serde_json::from_value::<Vec<Entity>>(value.clone()) {
            Ok(entities) => Some(entities),
            Err(_) => {
                // Keep the model's own shape rather than dropping it.
                object.insert("entities".to_string(), value);
                None
            }
        },
        None if !extracted.is_empty() => Some(extracted),
        None => None,
    };

    QueryResponse { answer, reasoning, entities, extra: object }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn org(text: &str) -> Entity {
        Entity { entity_type: "ORG".into(), text: text.into(), score: 0.9, start: None, end: None }
    }

    #[test]
    fn parses_answer_and_reasoning() {
        let response = parse_reply(r#"{"answer":"42","reasoning":"Doc 1 says so."}"#, vec![]);
        assert_eq!(response.answer.as_deref(), Some("42"));
        assert_eq!(response.reasoning.as_deref(), Some("Doc 1 says so."));
        assert_eq!(response.entities, None);
    }

    #[test]
    fn attaches_extracted_entities_when_model_gave_none() {
        let response = parse_reply(r#"{"answer":"Acme"}"#, vec![org("Acme")]);
        assert_eq!(response.entities(), &[org("Acme")]);
    }

    #[test]
    fn keeps_model_entities_over_extracted_ones() {
        let response = parse_reply(
            r#"{"answer":"x","entities":[{"type":"PER","text":"Ada","score":0.5}]}"#,
            vec![org("Acme")],
        );
        assert_eq!(response.entities().len(), 1);
        assert_eq!(response.entities()[0].text, "Ada");
    }

    #[test]
    fn preserves_extra_keys() {
        let response = parse_reply(r#"{"answer":"x","confidence":"high"}"#, vec![]);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"answer": "x", "confidence": "high"}));
    }

    #[test]
    fn malformed_reply_echoes_prefix() {
        let raw = "Sure! ".repeat(40);
        let response = parse_reply(&raw, vec![org("Acme")]);
        assert_eq!(response.answer.as_deref(), Some(PARSE_ERROR_ANSWER));
        let reasoning = response.reasoning.unwrap();
        let expected: String = raw.chars().take(100).collect();
        assert_eq!(
            reasoning,
            format!("The LLM did not return valid JSON. Original response: {expected}...")
        );
        assert_eq!(response.entities.unwrap(), vec![org("Acme")]);
    }

    #[test]
    fn json_array_is_not_an_answer() {
        let response = parse_reply("[1,2,3]", vec![]);
        assert_eq!(response.answer_text(), PARSE_ERROR_ANSWER);
        assert_eq!(response.entities, Some(vec![]));
    }

    #[test]
    fn error_payload_shape() {
        let value = serde_json::to_value(QueryResponse::from_error("boom")).unwrap();
        assert_eq!(
            value,
            json!({
                "answer": "Error processing query: boom",
                "reasoning": "An error occurred during query processing.",
                "entities": []
            })
        );
    }
}
