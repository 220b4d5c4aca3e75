//! The generation client: quizzes, mind maps, diagrams and explanations.
//!
//! Every operation reads the credential first and fails with
//! [`StudyError::MissingCredential`] before touching the network. Remote calls
//! go through the configured [`RetryPolicy`], and whatever failure survives
//! the retries is classified into a [`StudyError`].
//!
//! Recovery differs per operation:
//!
//! * quizzes propagate every failure;
//! * mind maps propagate only failures the user must act on (credential,
//!   quota) and otherwise return the [`MindMapNode::error`] node, so the study
//!   view stays usable;
//! * diagrams are best effort and resolve to `None`;
//! * explanations return the failure as text.
//!
//! The mind map / quiz asymmetry is intentional and kept as is.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::backoff::RetryPolicy;
use crate::config::GeneratorConfig;
use crate::credentials::CredentialStore;
use crate::error::{classify, Result, StudyError};
use crate::mindmap::MindMapNode;
use crate::quiz::{self, Difficulty, Question};
use crate::remote::{GenerationRequest, GenerationResponse, GenerativeModel};

const MIND_MAP_INSTRUCTION: &str = r#"You are an expert biology tutor. Analyze the provided notes and create a detailed, hierarchical mind map structure.

The Output must be a valid JSON object representing the root node.
Structure:
{
  "id": "root",
  "label": "Main Topic",
  "details": "Brief summary",
  "children": [
    { "id": "1", "label": "Subtopic", "details": "definition", "children": [...] }
  ]
}

Rules:
1. Break down complex topics into sub-nodes.
2. Keep labels concise (2-5 words).
3. Use 'details' for definitions or key facts (1-2 sentences).
4. Ensure the depth is at least 3 levels (Root -> Concept -> Details -> Examples).
5. Cover ALL major points in the text."#;

const EXPLANATION_INSTRUCTION: &str =
    "You are a helpful study tutor. Summarize and explain the provided notes clearly.";

const EXPLANATION_FALLBACK: &str = "Failed to generate explanation.";

fn quiz_instruction(difficulty: Difficulty, count: usize) -> String {
    format!(
        "You are an expert biology professor. Create a multiple choice test based EXACTLY and ONLY on the provided reference notes.
Do not introduce outside information unless it is general common knowledge required to understand the context.
Create {count} questions. Difficulty level: {difficulty}.
Return the response in a structured JSON object with a 'questions' array."
    )
}

fn diagram_prompt(topic: &str) -> String {
    format!(
        "A clean, professional medical illustration of {topic}. White background, educational textbook style, high detail. \
IMPORTANT: Do not include any text, labels, arrows, or writing on the image. Purely visual anatomical representation."
    )
}

/// Talks to the remote model on behalf of the study views.
#[derive(Clone)]
pub struct StudyGenerator {
    model: Arc<dyn GenerativeModel>,
    credentials: Arc<CredentialStore>,
    config: GeneratorConfig,
}

impl StudyGenerator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        credentials: Arc<CredentialStore>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            model,
            credentials,
            config,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Runs `request` under `policy` and classifies the final failure.
    async fn call(
        &self,
        credential: &str,
        request: &GenerationRequest,
        policy: RetryPolicy,
    ) -> Result<GenerationResponse> {
        policy
            .execute(|| self.model.generate(credential, request))
            .await
            .map_err(|failure| {
                debug!("Remote failure: {}", failure);
                classify(&failure)
            })
    }

    pub async fn generate_quiz(
        &self,
        reference_text: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Question>> {
        let credential = self.credentials.require()?;
        if count == 0 {
            return Err(StudyError::InvalidInput(
                "the number of questions must be at least 1".to_string(),
            ));
        }

        info!("Generating {} {} questions", count, difficulty);
        let request = GenerationRequest::new(
            &self.config.text_model,
            format!(
                "Reference Content:\n{reference_text}\n\nTask: Generate {count} {difficulty} level MCQs."
            ),
        )
        .with_system_instruction(quiz_instruction(difficulty, count))
        .expecting_json(Some(quiz::response_schema()));

        let result = async {
            let response = self
                .call(&credential, &request, self.config.text_retry)
                .await?;
            let payload = response.text().ok_or(StudyError::EmptyResponse)?;
            quiz::parse_questions(&payload)
        }
        .await;

        if let Err(e) = &result {
            error!("MCQ Generation Error: {}", e);
        }
        result
    }

    pub async fn generate_mind_map(&self, reference_text: &str) -> Result<MindMapNode> {
        let credential = self.credentials.require()?;

        info!("Generating mind map");
        let request = GenerationRequest::new(
            &self.config.text_model,
            format!("Notes to map:\n{reference_text}"),
        )
        .with_system_instruction(MIND_MAP_INSTRUCTION)
        .expecting_json(None);

        let result = async {
            let response = self
                .call(&credential, &request, self.config.text_retry)
                .await?;
            let payload = response.text().ok_or(StudyError::EmptyResponse)?;
            MindMapNode::parse(&payload)
        }
        .await;

        match result {
            Ok(root) => Ok(root),
            Err(e) if e.needs_user_action() => {
                error!("MindMap Generation Error: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("MindMap Generation Error: {}", e);
                Ok(MindMapNode::error(e.to_string()))
            }
        }
    }

    /// An illustration of `topic` as a `data:image/png;base64,...` URI.
    ///
    /// Never fails: any problem, including a missing credential, yields `None`.
    pub async fn generate_diagram(&self, topic: &str) -> Option<String> {
        let credential = match self.credentials.require() {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Skipping diagram: {}", e);
                return None;
            }
        };

        info!("Generating diagram for {:?}", topic);
        let request =
            GenerationRequest::new(&self.config.image_model, diagram_prompt(topic)).expecting_image();

        match self
            .call(&credential, &request, self.config.image_retry)
            .await
        {
            Ok(response) => {
                let uri = response
                    .first_inline_data()
                    .map(|data| format!("data:image/png;base64,{data}"));
                if uri.is_none() {
                    warn!("Image response for {:?} had no inline image", topic);
                }
                uri
            }
            Err(e) => {
                error!("Image Gen Error: {}", e);
                None
            }
        }
    }

    /// A Markdown study guide for the notes.
    ///
    /// Only a missing credential is an error; other failures come back as an
    /// `Error: ...` line.
    pub async fn generate_explanation(&self, reference_text: &str) -> Result<String> {
        let credential = self.credentials.require()?;

        let request = GenerationRequest::new(
            &self.config.text_model,
            format!(
                "Explain the following biology notes in a structured, easy-to-read study guide format. \
Use Markdown. Highlight key terms.\n\nNotes:\n{reference_text}"
            ),
        )
        .with_system_instruction(EXPLANATION_INSTRUCTION);

        match self
            .call(&credential, &request, self.config.text_retry)
            .await
        {
            Ok(response) => Ok(response
                .text()
                .unwrap_or_else(|| EXPLANATION_FALLBACK.to_string())),
            Err(e) => {
                error!("Explanation Error: {}", e);
                Ok(format!("Error: {e}"))
            }
        }
    }
}
