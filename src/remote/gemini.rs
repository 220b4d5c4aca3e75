use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ContentPart, GenerationRequest, GenerationResponse, GenerativeModel, OutputKind,
    RemoteFailure,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` over REST.
pub struct GeminiModel {
    http: reqwest::Client,
    api_base: String,
}

impl GeminiModel {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, RemoteFailure> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteFailure::new(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, RemoteFailure> {
        debug!("Calling Gemini model {}", request.model);

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", credential)
            .json(&GenerateContentBody::from(request))
            .send()
            .await
            .map_err(|e| RemoteFailure::new(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteFailure::new(e.to_string()))?;

        if !status.is_success() {
            // Keep the numeric status and the raw JSON body together, the
            // classifier looks for both.
            return Err(RemoteFailure::new(format!("{status}: {body}")));
        }

        parse_response(&body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

impl From<&GenerationRequest> for GenerateContentBody {
    fn from(request: &GenerationRequest) -> Self {
        let response_modalities = match request.output {
            OutputKind::Text => None,
            OutputKind::Image => Some(vec!["IMAGE", "TEXT"]),
        };

        let generation_config = if request.response_mime_type.is_some()
            || request.response_schema.is_some()
            || response_modalities.is_some()
        {
            Some(GenerationConfig {
                response_mime_type: request.response_mime_type.clone(),
                response_schema: request.response_schema.clone(),
                response_modalities,
            })
        } else {
            None
        };

        Self {
            contents: vec![Content::text(&request.contents)],
            system_instruction: request.system_instruction.as_deref().map(Content::text),
            generation_config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

fn parse_response(body: &str) -> Result<GenerationResponse, RemoteFailure> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| RemoteFailure::new(format!("Unreadable response from Gemini: {e}")))?;

    let parts = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .unwrap_or_default()
        .parts
        .into_iter()
        .filter_map(|part| match (part.inline_data, part.text) {
            (Some(inline), _) => Some(ContentPart::InlineData {
                mime_type: inline.mime_type,
                data: inline.data,
            }),
            (None, Some(text)) => Some(ContentPart::Text(text)),
            (None, None) => None,
        })
        .collect();

    Ok(GenerationResponse { parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_carries_system_instruction_and_json_config() {
        let request = GenerationRequest::new("gemini-flash-lite-latest", "Notes to map:\ncells")
            .with_system_instruction("You are a tutor")
            .expecting_json(Some(json!({"type": "OBJECT"})));

        let body = serde_json::to_value(GenerateContentBody::from(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"parts": [{"text": "Notes to map:\ncells"}]}],
                "systemInstruction": {"parts": [{"text": "You are a tutor"}]},
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": {"type": "OBJECT"}
                }
            })
        );
    }

    #[test]
    fn plain_text_body_has_no_generation_config() {
        let request = GenerationRequest::new("m", "hello");
        let body = serde_json::to_value(GenerateContentBody::from(&request)).unwrap();
        assert_eq!(body, json!({"contents": [{"parts": [{"text": "hello"}]}]}));
    }

    #[test]
    fn image_body_requests_image_modality() {
        let request = GenerationRequest::new("gemini-2.5-flash-image", "a cell").expecting_image();
        let body = serde_json::to_value(GenerateContentBody::from(&request)).unwrap();
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn parses_text_and_inline_parts_of_first_candidate() {
        let body = json!({
            "candidates": [
                {"content": {"parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        assert_eq!(response.text().as_deref(), Some("Here is your image"));
        assert_eq!(response.first_inline_data(), Some("iVBORw0KGgo="));
    }

    #[test]
    fn missing_candidates_yield_empty_response() {
        let response = parse_response(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(response.parts.is_empty());
    }

    #[test]
    fn garbage_body_is_a_remote_failure() {
        assert!(parse_response("<html>502</html>").is_err());
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let model = GeminiModel::new("https://example.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            model.endpoint("gemini-flash-lite-latest"),
            "https://example.test/v1beta/models/gemini-flash-lite-latest:generateContent"
        );
    }

    mod http {
        use super::*;
        use crate::error::{classify, StudyError};
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const MODEL: &str = "gemini-test";
        const KEY: &str = "test-key";

        async fn server_answering(status: u16, body: Value) -> MockServer {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
                .and(header("x-goog-api-key", KEY))
                .respond_with(ResponseTemplate::new(status).set_body_json(body))
                .expect(1)
                .mount(&server)
                .await;
            server
        }

        async fn call(server: &MockServer) -> Result<GenerationResponse, RemoteFailure> {
            let model = GeminiModel::new(server.uri(), Duration::from_secs(5)).unwrap();
            model
                .generate(KEY, &GenerationRequest::new(MODEL, "Notes to map:\nmitosis"))
                .await
        }

        fn google_error(code: u16, message: &str, status: &str) -> Value {
            json!({"error": {"code": code, "message": message, "status": status}})
        }

        #[tokio::test]
        async fn rate_limited_status_classifies_as_quota() {
            let server = server_answering(
                429,
                google_error(429, "Resource has been exhausted (e.g. check quota).", "RESOURCE_EXHAUSTED"),
            )
            .await;

            let failure = call(&server).await.unwrap_err();
            assert!(failure.message().starts_with("429 Too Many Requests: "), "{failure}");
            assert_eq!(classify(&failure), StudyError::QuotaExceeded);
        }

        #[tokio::test]
        async fn rejected_key_classifies_as_invalid_credential() {
            let server = server_answering(
                400,
                google_error(400, "API key not valid. Please pass a valid API key.", "INVALID_ARGUMENT"),
            )
            .await;

            let failure = call(&server).await.unwrap_err();
            assert!(failure.message().starts_with("400 Bad Request: "), "{failure}");
            assert_eq!(classify(&failure), StudyError::InvalidCredential);
        }

        #[tokio::test]
        async fn server_error_surfaces_the_embedded_message() {
            let server = server_answering(
                503,
                google_error(503, "The model is overloaded. Please try again later.", "UNAVAILABLE"),
            )
            .await;

            let failure = call(&server).await.unwrap_err();
            assert_eq!(
                classify(&failure),
                StudyError::RemoteError("The model is overloaded. Please try again later.".to_string())
            );
        }

        #[tokio::test]
        async fn success_sends_key_header_and_parses_candidates() {
            let server = server_answering(
                200,
                json!({"candidates": [{"content": {"parts": [{"text": "Mitosis has four phases."}]}}]}),
            )
            .await;

            let response = call(&server).await.unwrap();
            assert_eq!(response.text().as_deref(), Some("Mitosis has four phases."));

            let requests = server.received_requests().await.unwrap();
            let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
            assert_eq!(body["contents"][0]["parts"][0]["text"], "Notes to map:\nmitosis");
        }
    }
}
