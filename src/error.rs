//! Error taxonomy for study generation and the classifier that maps raw
//! remote failures onto it.
//!
//! The remote service has no typed error contract: failures reach us as
//! human readable text, sometimes with a serialized JSON error body embedded
//! in it. Classification is therefore a best-effort scan over that text,
//! expressed as an ordered rule table where the first matching rule wins.

use crate::remote::RemoteFailure;

/// A specialized `Result` type for study generation.
pub type Result<T> = std::result::Result<T, StudyError>;

/// Messages longer than this are collapsed into [`StudyError::ConnectionError`].
pub const MAX_SURFACED_MESSAGE_LEN: usize = 200;

const QUOTA_MARKERS: [&str; 3] = ["429", "RESOURCE_EXHAUSTED", "Quota"];
const AUTH_MARKERS: [&str; 2] = ["API key not valid", "400"];

/// User-facing errors produced by the credential store and generation client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StudyError {
    #[error("API Key is missing. Please enter your API Key in Settings.")]
    MissingCredential,

    #[error("Invalid API Key. Please reset your key in settings.")]
    InvalidCredential,

    #[error("⚠️ High Traffic: Retrying failed. Please wait 1 minute.")]
    QuotaExceeded,

    #[error("No text returned from API")]
    EmptyResponse,

    #[error("Invalid format returned: {0}")]
    MalformedResponse(String),

    #[error("API Error: {0}")]
    RemoteError(String),

    #[error("A connection error occurred. Please check your internet or API key.")]
    ConnectionError,

    #[error("{0}")]
    GenericError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StudyError {
    /// Failures the user has to act on (fix the key, wait out the quota)
    /// rather than simply trying again.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            StudyError::MissingCredential | StudyError::InvalidCredential | StudyError::QuotaExceeded
        )
    }
}

/// True when the message carries a rate-limit or quota marker.
///
/// This is the transient signal the backoff executor retries on.
pub fn is_quota_message(message: &str) -> bool {
    QUOTA_MARKERS.iter().any(|marker| message.contains(marker))
}

fn is_auth_message(message: &str) -> bool {
    AUTH_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Pulls `error.message` out of a JSON object embedded in free text.
///
/// The object is taken greedily from the first `{` to the last `}`.
fn embedded_error_message(message: &str) -> Option<String> {
    let start = message.find('{')?;
    let end = message.rfind('}')?;
    if end < start {
        return None;
    }

    let body: serde_json::Value = serde_json::from_str(&message[start..=end]).ok()?;
    body.get("error")?
        .get("message")?
        .as_str()
        .filter(|inner| !inner.is_empty())
        .map(str::to_string)
}

fn quota_rule(message: &str) -> Option<StudyError> {
    is_quota_message(message).then_some(StudyError::QuotaExceeded)
}

fn auth_rule(message: &str) -> Option<StudyError> {
    is_auth_message(message).then_some(StudyError::InvalidCredential)
}

fn embedded_json_rule(message: &str) -> Option<StudyError> {
    embedded_error_message(message).map(StudyError::RemoteError)
}

fn verbose_rule(message: &str) -> Option<StudyError> {
    (message.chars().count() > MAX_SURFACED_MESSAGE_LEN).then_some(StudyError::ConnectionError)
}

fn passthrough_rule(message: &str) -> Option<StudyError> {
    Some(StudyError::GenericError(message.to_string()))
}

type Rule = fn(&str) -> Option<StudyError>;

/// Classification rules in priority order.
const RULES: [Rule; 5] = [
    quota_rule,
    auth_rule,
    embedded_json_rule,
    verbose_rule,
    passthrough_rule,
];

/// Maps a raw failure message to a [`StudyError`].
pub fn classify_message(message: &str) -> StudyError {
    let message = if message.is_empty() {
        "An unexpected error occurred"
    } else {
        message
    };

    RULES
        .iter()
        .find_map(|rule| rule(message))
        .unwrap_or_else(|| StudyError::GenericError(message.to_string()))
}

/// Maps a failure surfaced by the remote model boundary to a [`StudyError`].
pub fn classify(failure: &RemoteFailure) -> StudyError {
    classify_message(failure.message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_markers_win_over_everything_else() {
        let messages = [
            "got status: 429 Too Many Requests",
            "RESOURCE_EXHAUSTED: slow down",
            "Quota exceeded for metric generate_content",
            "API key not valid and also 429",
            r#"400 {"error": {"message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#,
        ];
        for message in messages {
            assert_eq!(classify_message(message), StudyError::QuotaExceeded, "{message}");
        }
    }

    #[test]
    fn auth_markers_classify_as_invalid_credential() {
        assert_eq!(
            classify_message("API key not valid. Please pass a valid API key."),
            StudyError::InvalidCredential
        );
        assert_eq!(
            classify_message(r#"400 Bad Request: {"error": {"message": "bad"}}"#),
            StudyError::InvalidCredential
        );
    }

    #[test]
    fn embedded_json_error_message_is_surfaced() {
        let message = r#"[GoogleGenerativeAI Error]: {"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}}"#;
        assert_eq!(
            classify_message(message),
            StudyError::RemoteError("The model is overloaded.".to_string())
        );
    }

    #[test]
    fn embedded_json_without_error_message_falls_through() {
        let message = r#"unexpected body {"status": "UNAVAILABLE"}"#;
        assert_eq!(
            classify_message(message),
            StudyError::GenericError(message.to_string())
        );
    }

    #[test]
    fn broken_embedded_json_falls_through() {
        let message = "failed near {not json at all}";
        assert_eq!(
            classify_message(message),
            StudyError::GenericError(message.to_string())
        );
    }

    #[test]
    fn long_messages_collapse_to_connection_error() {
        let message = "x".repeat(MAX_SURFACED_MESSAGE_LEN + 1);
        assert_eq!(classify_message(&message), StudyError::ConnectionError);

        let at_limit = "y".repeat(MAX_SURFACED_MESSAGE_LEN);
        assert_eq!(classify_message(&at_limit), StudyError::GenericError(at_limit.clone()));
    }

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(
            classify_message("error sending request"),
            StudyError::GenericError("error sending request".to_string())
        );
        assert_eq!(
            classify_message(""),
            StudyError::GenericError("An unexpected error occurred".to_string())
        );
    }

    #[test]
    fn display_strings_are_user_facing() {
        assert_eq!(
            StudyError::RemoteError("overloaded".to_string()).to_string(),
            "API Error: overloaded"
        );
        assert!(StudyError::QuotaExceeded.to_string().contains("High Traffic"));
        assert!(StudyError::InvalidCredential.needs_user_action());
        assert!(!StudyError::ConnectionError.needs_user_action());
    }
}
