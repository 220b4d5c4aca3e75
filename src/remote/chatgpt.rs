use std::time::Duration;

use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::ChatGPTEngine;
use chatgpt::types::CompletionResponse;
use log::debug;

use super::{GenerationRequest, GenerationResponse, GenerativeModel, OutputKind, RemoteFailure};

/// Model used for text requests when the ChatGPT backend is selected.
pub const DEFAULT_CHATGPT_MODEL: &str = "gpt-3.5-turbo";

/// Model names accepted by [`engine_for`], for error messages.
pub const SUPPORTED_CHATGPT_MODELS: &str =
    "gpt-3.5-turbo, gpt-3.5-turbo-0301, gpt-4, gpt-4-32k, gpt-4-0314, gpt-4-32k-0314";

const ENGINES: [ChatGPTEngine; 6] = [
    ChatGPTEngine::Gpt35Turbo,
    ChatGPTEngine::Gpt35Turbo_0301,
    ChatGPTEngine::Gpt4,
    ChatGPTEngine::Gpt4_32k,
    ChatGPTEngine::Gpt4_0314,
    ChatGPTEngine::Gpt4_32k_0314,
];

/// The engine behind a model name such as `gpt-4`.
pub fn engine_for(model: &str) -> Option<ChatGPTEngine> {
    let model = model.trim();
    ENGINES.into_iter().find(|engine| engine.as_ref() == model)
}

/// Text-only backend on top of the ChatGPT completion API.
///
/// The engine comes from each request's model name. There is no image
/// generation: image requests fail, which the diagram path turns into
/// "no diagram".
pub struct ChatGptModel {
    timeout: Duration,
}

impl ChatGptModel {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self, credential: &str, model: &str) -> Result<ChatGPT, RemoteFailure> {
        let engine = engine_for(model).ok_or_else(|| {
            RemoteFailure::new(format!(
                "Unknown ChatGPT model '{model}', expected one of {SUPPORTED_CHATGPT_MODELS}"
            ))
        })?;
        let mut gpt = ChatGPT::new(credential).map_err(|e| RemoteFailure::new(e.to_string()))?;

        gpt.config.engine = engine;
        gpt.config.timeout = self.timeout;

        Ok(gpt)
    }
}

impl Default for ChatGptModel {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

/// Folds the system instruction and output hints into one prompt, since the
/// completion endpoint is driven by a single message here.
fn compose_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();

    if let Some(instruction) = &request.system_instruction {
        prompt.push_str(instruction);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&request.contents);

    if request.response_mime_type.as_deref() == Some("application/json") {
        prompt.push_str("\n\nRespond with a single valid JSON value and nothing else.");
        if let Some(schema) = &request.response_schema {
            prompt.push_str(&format!(" It must match this schema: {schema}"));
        }
    }

    prompt
}

#[async_trait]
impl GenerativeModel for ChatGptModel {
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, RemoteFailure> {
        if request.output == OutputKind::Image {
            return Err(RemoteFailure::new(
                "Image generation is not supported by the ChatGPT backend",
            ));
        }

        let gpt = self.client(credential, &request.model)?;
        let prompt = compose_prompt(request);
        debug!("Prompt: {:?}", prompt);

        let response: CompletionResponse = gpt
            .send_message(prompt)
            .await
            .map_err(|e| RemoteFailure::new(e.to_string()))?;
        let content = response.message().clone().content;

        debug!("Completion: {:?}", content);

        Ok(GenerationResponse::from_text(content))
    }
}
