//! Message payloads stored by both stores.
//!
//! A [`Part`] is one of a closed set of payload shapes. A [`Content`] is a
//! role-tagged message made of parts; its text (see [`Content::text`]) is what
//! the memory index searches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single payload fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        mime_type: String,
        data: Vec<u8>,
    },
    FunctionCall {
        name: String,
        args: Map<String, Value>,
    },
    FunctionResponse {
        name: String,
        response: Map<String, Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn function_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Part::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn function_response(name: impl Into<String>, response: Map<String, Value>) -> Self {
        Part::FunctionResponse {
            name: name.into(),
            response,
        }
    }

    /// The text of a `Text` part, `None` for every other shape.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Part::Text { .. } => "text",
            Part::InlineData { .. } => "inline_data",
            Part::FunctionCall { .. } => "function_call",
            Part::FunctionResponse { .. } => "function_response",
        }
    }
}

/// Author role of a [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// A role-tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Single text part message.
    pub fn from_text(text: impl Into<String>, role: Role) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    /// All text parts joined by a single space. Non-text parts contribute nothing.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when the message carries at least one non-blank text part.
    pub fn has_text(&self) -> bool {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .any(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_joins_only_text_parts() {
        let mut args = Map::new();
        args.insert("path".into(), json!("/tmp"));
        let content = Content::new(
            Role::Model,
            vec![
                Part::text("first"),
                Part::function_call("list_dir", args),
                Part::text("second"),
            ],
        );
        assert_eq!(content.text(), "first second");
        assert!(content.has_text());
    }

    #[test]
    fn blank_text_is_not_text() {
        let content = Content::new(
            Role::User,
            vec![Part::text("   "), Part::inline_data("image/png", vec![1, 2])],
        );
        assert!(!content.has_text());
    }

    #[test]
    fn parts_serialize_with_type_tag() {
        let value = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hi"}));

        let value = serde_json::to_value(Part::inline_data("text/plain", b"ab".to_vec())).unwrap();
        assert_eq!(value["type"], "inline_data");
        assert_eq!(value["mime_type"], "text/plain");
    }

    #[test]
    fn function_response_deserializes_from_tagged_json() {
        let part: Part = serde_json::from_value(json!({
            "type": "function_response",
            "name": "load_artifacts",
            "response": {"artifact_names": ["doc1.txt"]}
        }))
        .unwrap();
        match part {
            Part::FunctionResponse { name, response } => {
                assert_eq!(name, "load_artifacts");
                assert_eq!(response["artifact_names"], json!(["doc1.txt"]));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }
}
