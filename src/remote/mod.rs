//! The boundary to the remote generative model.
//!
//! Everything vendor specific (endpoints, model identifiers, schema dialects)
//! lives behind [`GenerativeModel`]. Swapping vendors means writing another
//! implementation of that trait.

pub mod chatgpt;
pub mod gemini;

use async_trait::async_trait;
use serde_json::Value;

/// What kind of payload the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Text,
    Image,
}

/// A single request to the remote model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationRequest {
    pub model: String,
    pub contents: String,
    pub system_instruction: Option<String>,
    pub response_mime_type: Option<String>,
    pub response_schema: Option<Value>,
    pub output: OutputKind,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: contents.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Asks for `application/json` output, optionally constrained by a schema.
    pub fn expecting_json(mut self, schema: Option<Value>) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self.response_schema = schema;
        self
    }

    pub fn expecting_image(mut self) -> Self {
        self.output = OutputKind::Image;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: String },
}

/// The parts returned for the first candidate of a generation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationResponse {
    pub parts: Vec<ContentPart>,
}

impl GenerationResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// Concatenated text parts, or `None` when there is no text at all.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineData { .. } => None,
            })
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Base64 payload of the first inline binary part.
    pub fn first_inline_data(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            ContentPart::InlineData { data, .. } => Some(data.as_str()),
            ContentPart::Text(_) => None,
        })
    }
}

/// An opaque failure from the remote boundary.
///
/// Only the message is meaningful; the error classifier works on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteFailure {
    message: String,
}

impl RemoteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Runs one generation, authenticated with `credential`.
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, RemoteFailure>;
}
