use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StudyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        })
    }
}

impl FromStr for Difficulty {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(StudyError::InvalidInput(format!(
                "unknown difficulty '{other}', expected easy, medium or hard"
            ))),
        }
    }
}

/// A multiple choice question as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    pub fn correct_answer(&self) -> Option<&str> {
        self.options
            .get(self.correct_answer_index)
            .map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.options.len() < 2 {
            return Err(StudyError::MalformedResponse(format!(
                "question {} has {} option(s), at least 2 are required",
                self.id,
                self.options.len()
            )));
        }
        if self.correct_answer_index >= self.options.len() {
            return Err(StudyError::MalformedResponse(format!(
                "question {} points at option {} but only has {}",
                self.id,
                self.correct_answer_index,
                self.options.len()
            )));
        }
        Ok(())
    }
}

/// JSON Schema (Gemini dialect) describing `{"questions": [Question]}`.
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "questions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "INTEGER" },
                        "text": { "type": "STRING" },
                        "options": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" }
                        },
                        "correctAnswerIndex": { "type": "INTEGER" },
                        "explanation": { "type": "STRING" }
                    },
                    "required": ["id", "text", "options", "correctAnswerIndex"]
                }
            }
        },
        "required": ["questions"]
    })
}

/// Parses a quiz payload and checks every question's answer index.
///
/// A single bad question rejects the whole quiz.
pub fn parse_questions(payload: &str) -> Result<Vec<Question>> {
    let parsed: Value = serde_json::from_str(payload)
        .map_err(|e| StudyError::MalformedResponse(format!("quiz is not valid JSON: {e}")))?;

    let questions = match parsed.get("questions") {
        Some(questions @ Value::Array(_)) => questions.clone(),
        _ => {
            return Err(StudyError::MalformedResponse(
                "quiz has no 'questions' array".to_string(),
            ))
        }
    };

    let questions: Vec<Question> = serde_json::from_value(questions)
        .map_err(|e| StudyError::MalformedResponse(format!("unexpected question shape: {e}")))?;

    for question in &questions {
        question.validate()?;
    }
    Ok(questions)
}

/// Result of answering the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub correct_index: usize,
    pub explanation: Option<String>,
}

/// A quiz being worked through one question at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<Question>,
    pub current_question: usize,
    pub score: u32,
}

impl Quiz {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            current_question: 0,
            score: 0,
        }
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.current_question)
    }

    pub fn is_finished(&self) -> bool {
        self.current_question >= self.questions.len()
    }

    /// Records `choice` for the current question and moves on.
    pub fn answer(&mut self, choice: usize) -> Result<AnswerOutcome> {
        let question = self
            .current()
            .ok_or_else(|| StudyError::InvalidInput("the quiz is already finished".to_string()))?;

        if choice >= question.options.len() {
            return Err(StudyError::InvalidInput(format!(
                "choose an option between 1 and {}",
                question.options.len()
            )));
        }

        let outcome = AnswerOutcome {
            correct: choice == question.correct_answer_index,
            correct_index: question.correct_answer_index,
            explanation: question.explanation.clone(),
        };

        if outcome.correct {
            self.score += 1;
        }
        self.current_question += 1;
        Ok(outcome)
    }
}
